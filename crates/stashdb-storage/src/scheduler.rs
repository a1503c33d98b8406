//! Deferred commit scheduling
//!
//! Mutations call [`CommitScheduler::defer`]; a background thread blocks in
//! [`CommitScheduler::wait_for_due`] and commits once the deadline passes.
//! There is a single deadline slot, so re-arming replaces the pending timer
//! instead of adding one.
//!
//! ```text
//!            defer()                      defer()  (re-arm: now + delay)
//!   IDLE ───────────────▶ PENDING ◀──────────────┐
//!    ▲                      │  │                 │
//!    │  take_pending()      │  └─────────────────┘
//!    └──────────────────────┘
//!        (commit begins)     defer() past the ceiling: deadline = now
//!                            restore() after a failed commit: back to PENDING
//! ```

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// What a call to [`CommitScheduler::defer`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Deferral {
    /// Timer (re)armed for `write_delay` from now
    Armed,
    /// Mutations have waited past the ceiling; commit is due now
    Forced,
    /// Scheduler stopped; only an explicit commit will persist the mutation
    Stopped,
}

#[derive(Debug, Default)]
struct SchedulerState {
    /// When the pending commit is due
    deadline: Option<Instant>,
    /// First unflushed mutation since the last commit
    deferred_since: Option<Instant>,
    stopped: bool,
}

pub(crate) struct CommitScheduler {
    state: Mutex<SchedulerState>,
    wakeup: Condvar,
    write_delay: Duration,
    max_deferred_period: Duration,
}

impl CommitScheduler {
    pub(crate) fn new(write_delay: Duration, max_deferred_period: Duration) -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
            wakeup: Condvar::new(),
            write_delay,
            max_deferred_period,
        }
    }

    /// Record a mutation and arm the commit timer
    pub(crate) fn defer(&self) -> Deferral {
        let now = Instant::now();
        let mut state = self.state.lock();
        let deferred_since = *state.deferred_since.get_or_insert(now);

        if state.stopped {
            return Deferral::Stopped;
        }

        let deferral = if now.duration_since(deferred_since) > self.max_deferred_period {
            state.deadline = Some(now);
            Deferral::Forced
        } else {
            state.deadline = Some(now + self.write_delay);
            Deferral::Armed
        };

        self.wakeup.notify_all();
        deferral
    }

    /// Cancel the timer and clear the deferral. Returns when the oldest
    /// unflushed mutation happened, if there was one.
    pub(crate) fn take_pending(&self) -> Option<Instant> {
        let mut state = self.state.lock();
        state.deadline = None;
        state.deferred_since.take()
    }

    /// Put back a deferral taken by a commit that failed, and retry after
    /// `write_delay`
    pub(crate) fn restore(&self, since: Instant) {
        let retry_at = Instant::now() + self.write_delay;
        let mut state = self.state.lock();
        state.deferred_since = Some(state.deferred_since.map_or(since, |s| s.min(since)));

        if !state.stopped {
            state.deadline = Some(state.deadline.map_or(retry_at, |d| d.min(retry_at)));
            self.wakeup.notify_all();
        }
    }

    /// Check if unflushed mutations exist
    pub(crate) fn is_pending(&self) -> bool {
        self.state.lock().deferred_since.is_some()
    }

    /// Block until the pending deadline passes. Returns false once stopped.
    pub(crate) fn wait_for_due(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                return false;
            }
            match state.deadline {
                Some(deadline) if Instant::now() >= deadline => return true,
                Some(deadline) => {
                    let _ = self.wakeup.wait_until(&mut state, deadline);
                }
                None => self.wakeup.wait(&mut state),
            }
        }
    }

    /// Cancel any pending timer and release the waiting thread
    pub(crate) fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        state.deadline = None;
        self.wakeup.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_defer_arms_and_take_clears() {
        let scheduler = CommitScheduler::new(Duration::from_millis(50), Duration::from_secs(10));
        assert!(!scheduler.is_pending());

        assert_eq!(scheduler.defer(), Deferral::Armed);
        assert!(scheduler.is_pending());

        assert!(scheduler.take_pending().is_some());
        assert!(!scheduler.is_pending());
        assert!(scheduler.take_pending().is_none());
    }

    #[test]
    fn test_restore_rearms_with_original_start() {
        let scheduler = CommitScheduler::new(Duration::from_millis(20), Duration::from_secs(10));
        scheduler.defer();
        let since = scheduler.take_pending().unwrap();

        scheduler.restore(since);
        assert!(scheduler.is_pending());
        assert!(scheduler.wait_for_due());
        assert_eq!(scheduler.take_pending(), Some(since));
    }

    #[test]
    fn test_restore_keeps_older_deferral() {
        let scheduler = CommitScheduler::new(Duration::from_millis(20), Duration::from_secs(10));
        scheduler.defer();
        let since = scheduler.take_pending().unwrap();

        // A mutation lands between the failed commit and the restore
        thread::sleep(Duration::from_millis(5));
        scheduler.defer();
        scheduler.restore(since);
        assert_eq!(scheduler.take_pending(), Some(since));
    }

    #[test]
    fn test_restore_after_stop_stays_pending() {
        let scheduler = CommitScheduler::new(Duration::from_millis(20), Duration::from_secs(10));
        scheduler.defer();
        let since = scheduler.take_pending().unwrap();

        scheduler.stop();
        scheduler.restore(since);
        assert!(scheduler.is_pending());
        assert!(!scheduler.wait_for_due());
    }

    #[test]
    fn test_defer_forces_past_ceiling() {
        let scheduler = CommitScheduler::new(Duration::from_millis(10), Duration::from_millis(30));
        assert_eq!(scheduler.defer(), Deferral::Armed);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(scheduler.defer(), Deferral::Forced);

        // The deferral is measured from the first unflushed mutation
        assert!(scheduler.take_pending().is_some());
        assert_eq!(scheduler.defer(), Deferral::Armed);
    }

    #[test]
    fn test_wait_for_due_respects_rearm() {
        let scheduler = Arc::new(CommitScheduler::new(
            Duration::from_millis(200),
            Duration::from_secs(10),
        ));
        let start = Instant::now();
        scheduler.defer();

        let rearm = Arc::clone(&scheduler);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            rearm.defer();
        });

        assert!(scheduler.wait_for_due());
        assert!(start.elapsed() >= Duration::from_millis(250));
        handle.join().unwrap();
    }

    #[test]
    fn test_stop_releases_waiter() {
        let scheduler = Arc::new(CommitScheduler::new(
            Duration::from_secs(60),
            Duration::from_secs(600),
        ));
        scheduler.defer();

        let waiter = Arc::clone(&scheduler);
        let handle = thread::spawn(move || waiter.wait_for_due());

        thread::sleep(Duration::from_millis(20));
        scheduler.stop();
        assert!(!handle.join().unwrap());

        assert_eq!(scheduler.defer(), Deferral::Stopped);
        assert!(scheduler.is_pending());
    }
}
