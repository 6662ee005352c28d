//! Progress reporting and cooperative cancellation for long-running estimation

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Sink notified once per processed score. Estimation polls
/// [`Progress::is_canceled`] between scores and stops early when it returns true.
pub trait Progress: Sync {
    fn increase_progress(&self);
    fn is_canceled(&self) -> bool;
}

/// No reporting, never canceled
impl Progress for () {
    fn increase_progress(&self) {}

    fn is_canceled(&self) -> bool {
        false
    }
}

/// Outcome of a probability estimation pass
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Estimation {
    Complete,
    /// Stopped by the progress sink; PEPs past the stopping point are unset
    Canceled,
}

impl Estimation {
    pub fn is_complete(self) -> bool {
        self == Estimation::Complete
    }

    /// Combine the outcomes of several estimation passes
    pub fn and(self, other: Estimation) -> Estimation {
        match (self, other) {
            (Estimation::Complete, Estimation::Complete) => Estimation::Complete,
            _ => Estimation::Canceled,
        }
    }
}

/// Thread-safe progress counter that can be canceled from another thread
#[derive(Debug, Default)]
pub struct ProgressCounter {
    processed: AtomicUsize,
    canceled: AtomicBool,
    /// Cancel automatically once this many scores were processed
    limit: Option<usize>,
}

impl ProgressCounter {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }
}

impl Progress for ProgressCounter {
    fn increase_progress(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
            || self.limit.map(|l| self.processed() >= l).unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counter_limit() {
        let counter = ProgressCounter::with_limit(2);
        assert!(!counter.is_canceled());
        counter.increase_progress();
        counter.increase_progress();
        assert!(counter.is_canceled());
        assert_eq!(counter.processed(), 2);
    }

    #[test]
    fn combine() {
        assert!(Estimation::Complete.and(Estimation::Complete).is_complete());
        assert!(!Estimation::Complete.and(Estimation::Canceled).is_complete());
    }
}
