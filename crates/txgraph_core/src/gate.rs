//! Commit visibility gate.
//!
//! A commit allocates its timestamp, makes its record durable, and only
//! then takes the store lock to apply its writes, so readers never wait on
//! the log. Between allocation and apply the commit is pending. A reader
//! whose timestamp is at or past a pending commit waits here until the
//! commit has landed or failed; everyone else goes straight to the store.
//!
//! Commits are serialized by the coordinator, so at most one is pending.

use crate::oracle::TimestampOracle;
use crate::types::Timestamp;
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
pub(crate) struct CommitGate {
    pending: Mutex<Option<Timestamp>>,
    landed: Condvar,
}

impl CommitGate {
    /// Allocates a timestamp and marks it pending until the guard drops.
    ///
    /// Allocation happens under the gate lock, so a reader that allocates
    /// a later timestamp always observes the pending commit.
    pub(crate) fn begin(&self, oracle: &dyn TimestampOracle) -> PendingCommit<'_> {
        let mut pending = self.pending.lock();
        let ts = oracle.allocate();
        *pending = Some(ts);
        PendingCommit { gate: self, ts }
    }

    /// Blocks while a commit at or below `ts` is pending.
    pub(crate) fn wait_visible(&self, ts: Timestamp) {
        let mut pending = self.pending.lock();
        while matches!(*pending, Some(commit_ts) if commit_ts <= ts) {
            self.landed.wait(&mut pending);
        }
    }

    fn finish(&self) {
        *self.pending.lock() = None;
        self.landed.notify_all();
    }
}

/// A commit timestamp that readers past it must wait for.
#[derive(Debug)]
pub(crate) struct PendingCommit<'a> {
    gate: &'a CommitGate,
    ts: Timestamp,
}

impl PendingCommit<'_> {
    pub(crate) fn ts(&self) -> Timestamp {
        self.ts
    }
}

impl Drop for PendingCommit<'_> {
    fn drop(&mut self) {
        self.gate.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::AtomicOracle;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn earlier_readers_do_not_wait() {
        let oracle = AtomicOracle::new();
        let gate = CommitGate::default();
        let before = oracle.allocate();
        let pending = gate.begin(&oracle);
        assert!(pending.ts() > before);
        gate.wait_visible(before);
    }

    #[test]
    fn later_readers_wait_for_the_pending_commit() {
        let oracle = AtomicOracle::new();
        let gate = CommitGate::default();
        let landed = AtomicBool::new(false);

        thread::scope(|scope| {
            let pending = gate.begin(&oracle);
            let read_ts = oracle.allocate();
            let (gate_ref, landed_ref) = (&gate, &landed);
            let reader = scope.spawn(move || {
                let (gate, landed) = (gate_ref, landed_ref);
                gate.wait_visible(read_ts);
                landed.load(Ordering::SeqCst)
            });
            thread::sleep(Duration::from_millis(20));
            landed.store(true, Ordering::SeqCst);
            drop(pending);
            assert!(reader.join().unwrap());
        });
    }
}
