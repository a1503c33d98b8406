//! Document codec
//!
//! A store document is a JSON object mapping each key to an [`Entry`]:
//!
//! ```text
//! {
//!   "alpha": { "class": "i64", "value": 42 },
//!   "beta":  { "class": "acme::Profile", "value": { "name": "x" } }
//! }
//! ```
//!
//! Decoding is two-phase. A whole document is first parsed into untyped
//! entries; an entry's payload is only turned into a concrete value once its
//! type name has been resolved, because a store may hold different value
//! types under different keys.
//!
//! An entry that is not a `class`/`value` pair is kept as a
//! [`Record::Malformed`] tree. It never decodes, but it is written back
//! unchanged, so one bad entry cannot take the rest of the document with it.

use crate::resolver::{Storable, TypeResolver};
use serde::{Deserialize, Serialize};
use stashdb_common::{Error, Result};
use std::collections::BTreeMap;
use tracing::warn;

/// Decoded document, ordered by key so encoded output diffs cleanly
pub type Document = BTreeMap<String, Record>;

/// One slot of a document
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record {
    /// A well-formed tagged value
    Entry(Entry),
    /// Anything else found under a key, kept verbatim
    Malformed(serde_json::Value),
}

impl Record {
    /// Convert an untyped tree, falling back to [`Record::Malformed`]
    pub fn from_value(value: serde_json::Value) -> Self {
        match Entry::deserialize(&value) {
            Ok(entry) => Self::Entry(entry),
            Err(_) => Self::Malformed(value),
        }
    }

    /// The tagged value, if well formed
    pub const fn entry(&self) -> Option<&Entry> {
        match self {
            Self::Entry(entry) => Some(entry),
            Self::Malformed(_) => None,
        }
    }

    /// Decode through `resolver`; a malformed record is a corrupt-data error
    pub fn decode<V>(self, resolver: &dyn TypeResolver<V>) -> Result<V> {
        match self {
            Self::Entry(entry) => entry.decode(resolver),
            Self::Malformed(_) => Err(Error::corrupt("entry is not a class/value pair")),
        }
    }
}

impl From<Entry> for Record {
    fn from(entry: Entry) -> Self {
        Self::Entry(entry)
    }
}

impl PartialEq<Entry> for Record {
    fn eq(&self, other: &Entry) -> bool {
        self.entry() == Some(other)
    }
}

/// A stored value tagged with the name of its concrete type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Type name used to pick a decoder
    #[serde(rename = "class")]
    pub type_name: String,
    /// Untyped payload tree
    #[serde(rename = "value", default)]
    pub payload: serde_json::Value,
}

impl Entry {
    /// Create an entry from its parts
    pub fn new(type_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            type_name: type_name.into(),
            payload,
        }
    }

    /// Wrap a value, capturing its runtime type name
    pub fn encode<V: Storable>(value: &V) -> Result<Self> {
        Ok(Self {
            type_name: value.type_name().into_owned(),
            payload: serde_json::to_value(value)?,
        })
    }

    /// Resolve the type name and decode the payload as that type
    pub fn decode<V>(self, resolver: &dyn TypeResolver<V>) -> Result<V> {
        let descriptor = resolver
            .resolve(&self.type_name)
            .ok_or(Error::UnknownType(self.type_name))?;
        Ok(descriptor.decode(self.payload)?)
    }
}

/// Encode a document as pretty-printed JSON
pub fn encode(document: &Document) -> Result<String> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Decode a document.
///
/// Blank input and a JSON `null` are reported as [`Error::CorruptDocument`];
/// syntax errors and a top level that is not an object as [`Error::Json`].
/// Both are decode errors the caller may treat as "no data". Individual
/// entries never fail the document.
pub fn decode(text: &str) -> Result<Document> {
    if text.trim().is_empty() {
        return Err(Error::corrupt("empty document"));
    }
    let raw = serde_json::from_str::<Option<BTreeMap<String, serde_json::Value>>>(text)?
        .ok_or_else(|| Error::corrupt("null document"))?;

    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let record = Record::from_value(value);
            if record.entry().is_none() {
                warn!("Entry '{}' is not a class/value pair, keeping it as is", key);
            }
            (key, record)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::TypeRegistry;
    use serde_json::json;

    #[test]
    fn test_entry_wire_format() {
        let entry = Entry::encode(&42i64).unwrap();
        assert_eq!(entry.type_name, "i64");

        let mut document = Document::new();
        document.insert("x".into(), entry.into());
        let text = encode(&document).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw, json!({ "x": { "class": "i64", "value": 42 } }));
    }

    #[test]
    fn test_encode_is_pretty() {
        let mut document = Document::new();
        document.insert("b".into(), Entry::new("i64", json!(2)).into());
        document.insert("a".into(), Entry::new("i64", json!(1)).into());
        let text = encode(&document).unwrap();

        assert!(text.contains('\n'));
        assert!(text.find("\"a\"").unwrap() < text.find("\"b\"").unwrap());
    }

    #[test]
    fn test_decode_document() {
        let document =
            decode(r#"{ "k": { "class": "alloc::string::String", "value": "hello" } }"#).unwrap();
        assert_eq!(document.len(), 1);

        let registry = TypeRegistry::<String>::for_value_type();
        let value = document["k"].clone().decode(&registry).unwrap();
        assert_eq!(value, "hello");
    }

    #[test]
    fn test_decode_empty_object_is_data() {
        assert!(decode("{}").unwrap().is_empty());
    }

    #[test]
    fn test_decode_no_data() {
        for text in ["", "   \n", "null"] {
            let err = decode(text).unwrap_err();
            assert!(matches!(err, Error::CorruptDocument(_)), "{text:?}");
        }
    }

    #[test]
    fn test_decode_malformed() {
        for text in ["{ \"k\": ", "[1, 2]", "\"text\"", "\u{0}\u{1}garbage"] {
            let err = decode(text).unwrap_err();
            assert!(err.is_decode_error(), "{text:?}");
        }
    }

    #[test]
    fn test_decode_entry_unknown_type() {
        let registry = TypeRegistry::<i64>::for_value_type();
        let entry = Entry::new("com.acme.Missing", json!(1));
        let err = entry.decode(&registry).unwrap_err();
        assert!(matches!(err, Error::UnknownType(name) if name == "com.acme.Missing"));
    }

    #[test]
    fn test_decode_entry_shape_mismatch() {
        let registry = TypeRegistry::<i64>::for_value_type();
        let entry = Entry::new("i64", json!({ "not": "a number" }));
        assert!(matches!(
            entry.decode(&registry).unwrap_err(),
            Error::Json(_)
        ));
    }

    #[test]
    fn test_entry_without_value_field() {
        let document = decode(r#"{ "k": { "class": "serde_json::value::Value" } }"#).unwrap();
        let expected = Entry::new("serde_json::value::Value", serde_json::Value::Null);
        assert_eq!(document["k"], expected);
    }

    #[test]
    fn test_malformed_entries_kept_verbatim() {
        let text = r#"{
            "good": { "class": "i64", "value": 7 },
            "bad": { "class": 5, "value": 1 },
            "nocls": { "value": 2 },
            "bare": 5
        }"#;
        let document = decode(text).unwrap();
        assert_eq!(document.len(), 4);
        assert_eq!(document["good"], Entry::new("i64", json!(7)));
        assert_eq!(
            document["bad"],
            Record::Malformed(json!({ "class": 5, "value": 1 }))
        );
        assert_eq!(document["nocls"], Record::Malformed(json!({ "value": 2 })));
        assert_eq!(document["bare"], Record::Malformed(json!(5)));

        let registry = TypeRegistry::<i64>::for_value_type();
        assert_eq!(document["good"].clone().decode(&registry).unwrap(), 7);
        assert!(document["bad"].clone().decode(&registry).unwrap_err().is_decode_error());

        // Written back unchanged
        let raw: serde_json::Value = serde_json::from_str(&encode(&document).unwrap()).unwrap();
        assert_eq!(raw["bad"], json!({ "class": 5, "value": 1 }));
        assert_eq!(raw["bare"], json!(5));
        assert_eq!(raw["good"], json!({ "class": "i64", "value": 7 }));
    }
}
