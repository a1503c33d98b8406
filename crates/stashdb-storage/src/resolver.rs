//! Type resolution for stored values
//!
//! Every entry records the name of its value's concrete type. On read the
//! name is handed to a [`TypeResolver`], which returns a [`TypeDescriptor`]
//! able to decode the payload. Resolvers are supplied by whoever opens the
//! store, so a store never depends on a global registry.

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A value that can be written to a store
pub trait Storable: Serialize + Send + Sync + 'static {
    /// Name recorded next to the payload; used to find a decoder on read.
    ///
    /// Types whose values have different concrete shapes (e.g. an enum
    /// serialized untagged) override this per value.
    fn type_name(&self) -> Cow<'static, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }
}

macro_rules! impl_storable {
    ($($t:ty),* $(,)?) => {
        $(impl Storable for $t {})*
    };
}

impl_storable!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    String,
    serde_json::Value,
);

impl<T: Serialize + Send + Sync + 'static> Storable for Vec<T> {}

type DecodeFn<V> = dyn Fn(serde_json::Value) -> serde_json::Result<V> + Send + Sync;

/// Decoder for one stored type name
pub struct TypeDescriptor<V> {
    name: String,
    decode: Arc<DecodeFn<V>>,
}

impl<V> TypeDescriptor<V> {
    /// Create a descriptor from a name and a decode function
    pub fn new<F>(name: impl Into<String>, decode: F) -> Self
    where
        F: Fn(serde_json::Value) -> serde_json::Result<V> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            decode: Arc::new(decode),
        }
    }

    /// Descriptor for `T`, registered under `T`'s type name
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Into<V> + 'static,
    {
        Self::new(std::any::type_name::<T>(), |payload| {
            serde_json::from_value::<T>(payload).map(Into::into)
        })
    }

    /// Type name this descriptor decodes
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decode a payload tree
    pub fn decode(&self, payload: serde_json::Value) -> serde_json::Result<V> {
        (self.decode)(payload)
    }
}

impl<V> Clone for TypeDescriptor<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            decode: Arc::clone(&self.decode),
        }
    }
}

impl<V> fmt::Debug for TypeDescriptor<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Maps stored type names to decoders
pub trait TypeResolver<V>: Send + Sync {
    /// Look up the decoder for `type_name`; `None` if the name is unknown
    fn resolve(&self, type_name: &str) -> Option<TypeDescriptor<V>>;
}

/// Resolver backed by an explicit table of known types
pub struct TypeRegistry<V> {
    types: HashMap<String, TypeDescriptor<V>>,
}

impl<V> TypeRegistry<V> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Registry that knows only `V` itself
    #[must_use]
    pub fn for_value_type() -> Self
    where
        V: DeserializeOwned + 'static,
    {
        let mut registry = Self::new();
        registry.register::<V>();
        registry
    }

    /// Register `T` under its own type name
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: DeserializeOwned + Into<V> + 'static,
    {
        self.insert(TypeDescriptor::of::<T>())
    }

    /// Register a decoder under an arbitrary name
    pub fn register_as<F>(&mut self, name: impl Into<String>, decode: F) -> &mut Self
    where
        F: Fn(serde_json::Value) -> serde_json::Result<V> + Send + Sync + 'static,
    {
        self.insert(TypeDescriptor::new(name, decode))
    }

    /// Add a prepared descriptor, replacing any with the same name
    pub fn insert(&mut self, descriptor: TypeDescriptor<V>) -> &mut Self {
        self.types.insert(descriptor.name.clone(), descriptor);
        self
    }

    /// Check if a type name is known
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Number of known types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl<V> Default for TypeRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TypeResolver<V> for TypeRegistry<V> {
    fn resolve(&self, type_name: &str) -> Option<TypeDescriptor<V>> {
        self.types.get(type_name).cloned()
    }
}

/// A value whose type is only known by name.
///
/// Serializes as the bare payload, so writing it back keeps the original
/// `class`/`value` pair intact.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicValue {
    /// Stored type name
    pub type_name: String,
    /// Untyped payload tree
    pub payload: serde_json::Value,
}

impl DynamicValue {
    pub fn new(type_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            type_name: type_name.into(),
            payload,
        }
    }
}

impl Serialize for DynamicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.payload.serialize(serializer)
    }
}

impl Storable for DynamicValue {
    fn type_name(&self) -> Cow<'static, str> {
        Cow::Owned(self.type_name.clone())
    }
}

/// Resolves every type name to a [`DynamicValue`] carrying that name
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughResolver;

impl TypeResolver<DynamicValue> for PassthroughResolver {
    fn resolve(&self, type_name: &str) -> Option<TypeDescriptor<DynamicValue>> {
        let name = type_name.to_string();
        Some(TypeDescriptor::new(type_name, move |payload| {
            Ok(DynamicValue {
                type_name: name.clone(),
                payload,
            })
        }))
    }
}
