//! Broker-wide backpressure.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Decides how many new backend calls may start.
pub trait CapacityPolicy: Send + Sync + fmt::Debug {
    /// How many of `requested` new calls may start while `outstanding` calls
    /// are in flight.
    fn allowance(&self, outstanding: usize, requested: usize) -> usize;
}

/// Admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl CapacityPolicy for Unbounded {
    fn allowance(&self, _outstanding: usize, requested: usize) -> usize {
        requested
    }
}

/// Caps outstanding calls at a fixed ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxOutstanding(pub usize);

impl CapacityPolicy for MaxOutstanding {
    fn allowance(&self, outstanding: usize, requested: usize) -> usize {
        self.0.saturating_sub(outstanding).min(requested)
    }
}

/// Counter of outstanding calls shared by a broker's fan-outs.
#[derive(Debug, Clone, Default)]
pub(crate) struct OutstandingCalls(Arc<AtomicUsize>);

impl OutstandingCalls {
    /// Reserve up to `requested` slots under `policy`.
    pub(crate) fn reserve(&self, policy: &dyn CapacityPolicy, requested: usize) -> Reservation {
        let mut granted = 0;
        // The closure always returns Some, so the update cannot fail.
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                granted = policy.allowance(current, requested).min(requested);
                Some(current + granted)
            });
        Reservation {
            counter: Arc::clone(&self.0),
            granted,
        }
    }

    pub(crate) fn current(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Slots held for one fan-out; returned on drop.
#[derive(Debug)]
pub(crate) struct Reservation {
    counter: Arc<AtomicUsize>,
    granted: usize,
}

impl Reservation {
    pub(crate) fn granted(&self) -> usize {
        self.granted
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        self.counter.fetch_sub(self.granted, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_outstanding_allowance() {
        let policy = MaxOutstanding(4);
        assert_eq!(policy.allowance(0, 3), 3);
        assert_eq!(policy.allowance(2, 3), 2);
        assert_eq!(policy.allowance(5, 3), 0);
    }

    #[test]
    fn test_reservation_returns_slots() {
        let calls = OutstandingCalls::default();
        let policy = MaxOutstanding(3);

        let first = calls.reserve(&policy, 2);
        let second = calls.reserve(&policy, 2);
        assert_eq!(first.granted(), 2);
        assert_eq!(second.granted(), 1);
        assert_eq!(calls.current(), 3);

        drop(first);
        assert_eq!(calls.current(), 1);
        drop(second);
        assert_eq!(calls.current(), 0);
    }
}
