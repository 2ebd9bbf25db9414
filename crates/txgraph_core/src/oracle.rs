//! Timestamp oracle and uid leasing.
//!
//! The oracle is the single source of transaction ordering. It is an
//! injectable service object: the database holds an `Arc<dyn TimestampOracle>`
//! so tests can substitute their own.

use crate::types::{Timestamp, Uid};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Issues strictly increasing logical timestamps.
pub trait TimestampOracle: Send + Sync + Debug {
    /// Returns a timestamp greater than every value returned before.
    fn allocate(&self) -> Timestamp;

    /// Returns the highest timestamp issued so far, or zero.
    fn current(&self) -> Timestamp;

    /// Makes sure future allocations are greater than `ts`.
    ///
    /// Used by recovery; never moves the oracle backwards.
    fn advance_past(&self, ts: Timestamp);
}

/// Lock-free oracle backed by one atomic counter.
#[derive(Debug, Default)]
pub struct AtomicOracle {
    last: AtomicU64,
}

impl AtomicOracle {
    /// Creates an oracle whose first allocation returns 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an oracle whose first allocation returns `last + 1`.
    #[must_use]
    pub fn starting_after(last: Timestamp) -> Self {
        Self {
            last: AtomicU64::new(last.as_u64()),
        }
    }
}

impl TimestampOracle for AtomicOracle {
    fn allocate(&self) -> Timestamp {
        Timestamp::new(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn current(&self) -> Timestamp {
        Timestamp::new(self.last.load(Ordering::SeqCst))
    }

    fn advance_past(&self, ts: Timestamp) {
        self.last.fetch_max(ts.as_u64(), Ordering::SeqCst);
    }
}

/// Hands out node identifiers for blank nodes.
#[derive(Debug, Default)]
pub struct UidLeaser {
    last: AtomicU64,
}

impl UidLeaser {
    /// Creates a leaser whose first uid is `0x1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Leases one fresh uid.
    pub fn lease(&self) -> Uid {
        Uid::new(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Highest uid leased or observed.
    #[must_use]
    pub fn max_leased(&self) -> Uid {
        Uid::new(self.last.load(Ordering::SeqCst))
    }

    /// Records that `uid` is in use so it is never leased again.
    pub fn advance_past(&self, uid: Uid) {
        self.last.fetch_max(uid.as_u64(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn allocations_increase() {
        let oracle = AtomicOracle::new();
        assert_eq!(oracle.current(), Timestamp::ZERO);
        let a = oracle.allocate();
        let b = oracle.allocate();
        assert_eq!(a, Timestamp::new(1));
        assert!(b > a);
        assert_eq!(oracle.current(), b);
    }

    #[test]
    fn advance_past_never_goes_back() {
        let oracle = AtomicOracle::starting_after(Timestamp::new(10));
        oracle.advance_past(Timestamp::new(4));
        assert_eq!(oracle.allocate(), Timestamp::new(11));
        oracle.advance_past(Timestamp::new(20));
        assert_eq!(oracle.allocate(), Timestamp::new(21));
    }

    #[test]
    fn concurrent_allocations_are_unique() {
        let oracle = Arc::new(AtomicOracle::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let oracle = Arc::clone(&oracle);
                thread::spawn(move || (0..500).map(|_| oracle.allocate()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let batch = handle.join().unwrap();
            assert!(batch.windows(2).all(|w| w[0] < w[1]));
            for ts in batch {
                assert!(seen.insert(ts), "duplicate timestamp {ts}");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn leaser_skips_observed_uids() {
        let leaser = UidLeaser::new();
        assert_eq!(leaser.lease(), Uid::new(1));
        leaser.advance_past(Uid::new(0x10));
        assert_eq!(leaser.lease(), Uid::new(0x11));
        assert_eq!(leaser.max_leased(), Uid::new(0x11));
    }
}
