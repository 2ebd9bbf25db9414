//! Transaction state and the start-timestamp table.
//!
//! ## Lifecycle
//!
//! - An entry is created when a start timestamp is first handed out, by a
//!   fresh query or a fresh stage, or by the first stage call that names
//!   one. Entries opened by a query are idle until something is staged.
//! - Commit or abort resolves the entry and drops its staged writes. The
//!   resolved entry stays around so a repeated commit returns the recorded
//!   outcome.
//! - Only the newest `retention` resolved entries are kept; older ones are
//!   evicted oldest-first. The highest evicted start timestamp becomes the
//!   eviction horizon: unknown timestamps at or below it are rejected rather
//!   than treated as new transactions.
//! - At most `max_idle` idle entries are kept open. Past that the oldest
//!   idle entry that still has nothing staged is aborted, so abandoned
//!   queries cannot pin the gc watermark forever.

use crate::error::{CoreError, CoreResult};
use crate::oracle::TimestampOracle;
use crate::store::Write;
use crate::types::{Key, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Staging; may still commit or abort.
    Open,
    /// Committed at the given timestamp.
    Committed(Timestamp),
    /// Aborted by a conflict, by request, or by drop-all.
    Aborted,
}

/// One transaction, keyed by its start timestamp.
#[derive(Debug)]
pub struct Transaction {
    start_ts: Timestamp,
    state: TxnState,
    keys: BTreeSet<Key>,
    writes: Vec<Write>,
}

impl Transaction {
    /// Creates an open transaction.
    pub(crate) fn new(start_ts: Timestamp) -> Self {
        Self {
            start_ts,
            state: TxnState::Open,
            keys: BTreeSet::new(),
            writes: Vec::new(),
        }
    }

    /// Start timestamp.
    #[must_use]
    pub fn start_ts(&self) -> Timestamp {
        self.start_ts
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Returns true while the transaction can still stage and commit.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == TxnState::Open
    }

    /// Returns true while open with nothing staged.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.is_open() && self.keys.is_empty() && self.writes.is_empty()
    }

    /// Conflict keys accumulated by staging.
    #[must_use]
    pub fn keys(&self) -> &BTreeSet<Key> {
        &self.keys
    }

    /// Staged writes, in staging order.
    #[must_use]
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// Fails unless the transaction is open.
    pub fn ensure_open(&self) -> CoreResult<()> {
        match self.state {
            TxnState::Open => Ok(()),
            TxnState::Committed(commit_ts) => Err(CoreError::AlreadyCommitted {
                start_ts: self.start_ts,
                commit_ts,
            }),
            TxnState::Aborted => Err(CoreError::TxnAborted {
                start_ts: self.start_ts,
            }),
        }
    }

    pub(crate) fn stage(&mut self, writes: Vec<Write>, keys: impl IntoIterator<Item = Key>) {
        self.writes.extend(writes);
        self.keys.extend(keys);
    }

    pub(crate) fn mark_committed(&mut self, commit_ts: Timestamp) {
        self.state = TxnState::Committed(commit_ts);
        self.writes = Vec::new();
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.state = TxnState::Aborted;
        self.writes = Vec::new();
    }
}

/// Shared handle to one transaction.
pub type TxnHandle = Arc<Mutex<Transaction>>;

/// Start timestamp to transaction table.
///
/// Lock order: the table's own locks are never held while a transaction
/// handle is locked by the same caller.
#[derive(Debug)]
pub struct TxnTable {
    entries: RwLock<HashMap<Timestamp, TxnHandle>>,
    open: Mutex<BTreeSet<Timestamp>>,
    resolved: Mutex<VecDeque<Timestamp>>,
    idle: Mutex<VecDeque<Timestamp>>,
    evicted: AtomicU64,
    retention: usize,
    max_idle: usize,
}

/// Default cap on idle entries opened by queries.
pub const DEFAULT_MAX_IDLE: usize = 10_000;

impl TxnTable {
    /// Creates a table keeping at most `retention` resolved entries.
    #[must_use]
    pub fn new(retention: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            open: Mutex::new(BTreeSet::new()),
            resolved: Mutex::new(VecDeque::new()),
            idle: Mutex::new(VecDeque::new()),
            evicted: AtomicU64::new(0),
            retention,
            max_idle: DEFAULT_MAX_IDLE,
        }
    }

    /// Sets how many idle entries may stay open.
    #[must_use]
    pub fn with_idle_limit(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Highest start timestamp whose entry was evicted.
    #[must_use]
    pub fn eviction_horizon(&self) -> Timestamp {
        Timestamp::new(self.evicted.load(Ordering::SeqCst))
    }

    /// Fails with [`CoreError::TxnForgotten`] when `start_ts` is at or
    /// below the eviction horizon.
    pub fn check_not_forgotten(&self, start_ts: Timestamp) -> CoreResult<()> {
        let horizon = self.eviction_horizon();
        if start_ts <= horizon {
            return Err(CoreError::TxnForgotten { start_ts, horizon });
        }
        Ok(())
    }

    /// Looks up a transaction.
    #[must_use]
    pub fn get(&self, start_ts: Timestamp) -> Option<TxnHandle> {
        self.entries.read().get(&start_ts).cloned()
    }

    /// Looks up a transaction, opening it if absent.
    ///
    /// # Errors
    ///
    /// [`CoreError::TxnForgotten`] when the entry is absent and `start_ts`
    /// is at or below the eviction horizon.
    pub fn get_or_open(&self, start_ts: Timestamp) -> CoreResult<TxnHandle> {
        if let Some(handle) = self.get(start_ts) {
            return Ok(handle);
        }
        let mut entries = self.entries.write();
        if let Some(handle) = entries.get(&start_ts) {
            return Ok(Arc::clone(handle));
        }
        self.check_not_forgotten(start_ts)?;
        self.open.lock().insert(start_ts);
        let handle = Arc::new(Mutex::new(Transaction::new(start_ts)));
        entries.insert(start_ts, Arc::clone(&handle));
        Ok(handle)
    }

    /// Allocates a start timestamp and opens its transaction in one step.
    ///
    /// The allocation happens under the open-set lock, so
    /// [`TxnTable::low_watermark`] never sees the timestamp issued but not
    /// yet open.
    pub fn open_fresh(&self, oracle: &dyn TimestampOracle) -> (Timestamp, TxnHandle) {
        let mut entries = self.entries.write();
        let mut open = self.open.lock();
        let start_ts = oracle.allocate();
        open.insert(start_ts);
        drop(open);
        let handle = Arc::new(Mutex::new(Transaction::new(start_ts)));
        entries.insert(start_ts, Arc::clone(&handle));
        (start_ts, handle)
    }

    /// Opens a fresh idle entry for a query, see [`TxnTable::open_fresh`].
    ///
    /// Returns the start timestamp and any idle entries expired to stay
    /// under the limit.
    pub fn open_idle(&self, oracle: &dyn TimestampOracle) -> (Timestamp, Vec<Timestamp>) {
        let (start_ts, _) = self.open_fresh(oracle);
        let candidates: Vec<Timestamp> = {
            let mut idle = self.idle.lock();
            idle.push_back(start_ts);
            let excess = idle.len().saturating_sub(self.max_idle);
            idle.drain(..excess).collect()
        };
        let expired = candidates
            .into_iter()
            .filter(|ts| self.expire_if_idle(*ts))
            .collect();
        (start_ts, expired)
    }

    fn expire_if_idle(&self, start_ts: Timestamp) -> bool {
        let Some(handle) = self.get(start_ts) else {
            return false;
        };
        let mut txn = handle.lock();
        if !txn.is_idle() {
            return false;
        }
        txn.mark_aborted();
        drop(txn);
        self.note_resolved(start_ts);
        debug!(%start_ts, "expired idle transaction");
        true
    }

    /// Lowest open start timestamp, or the oracle's current value when
    /// nothing is open.
    #[must_use]
    pub fn low_watermark(&self, oracle: &dyn TimestampOracle) -> Timestamp {
        let open = self.open.lock();
        open.first().copied().unwrap_or_else(|| oracle.current())
    }

    /// Inserts an already resolved transaction (recovery, empty commits).
    pub fn insert_resolved(&self, start_ts: Timestamp, state: TxnState) -> TxnHandle {
        let mut txn = Transaction::new(start_ts);
        match state {
            TxnState::Committed(commit_ts) => txn.mark_committed(commit_ts),
            TxnState::Aborted => txn.mark_aborted(),
            TxnState::Open => {}
        }
        let handle = Arc::new(Mutex::new(txn));
        self.entries.write().insert(start_ts, Arc::clone(&handle));
        if state == TxnState::Open {
            self.open.lock().insert(start_ts);
        } else {
            self.note_resolved(start_ts);
        }
        handle
    }

    /// Records that `start_ts` was resolved and evicts old entries.
    pub fn note_resolved(&self, start_ts: Timestamp) {
        self.open.lock().remove(&start_ts);
        let evicted: Vec<Timestamp> = {
            let mut resolved = self.resolved.lock();
            resolved.push_back(start_ts);
            let excess = resolved.len().saturating_sub(self.retention);
            resolved.drain(..excess).collect()
        };
        if !evicted.is_empty() {
            let mut entries = self.entries.write();
            for ts in evicted {
                entries.remove(&ts);
                self.evicted.fetch_max(ts.as_u64(), Ordering::SeqCst);
            }
        }
    }

    /// Lowest start timestamp among open transactions.
    #[must_use]
    pub fn min_open(&self) -> Option<Timestamp> {
        self.open.lock().first().copied()
    }

    /// Start timestamps of every open transaction.
    #[must_use]
    pub fn open_start_timestamps(&self) -> Vec<Timestamp> {
        self.open.lock().iter().copied().collect()
    }

    /// Number of entries, open and resolved.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of open transactions.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Uid;

    fn ts(n: u64) -> Timestamp {
        Timestamp::new(n)
    }

    #[test]
    fn open_then_resolve() {
        let table = TxnTable::new(10);
        let handle = table.get_or_open(ts(5)).unwrap();
        assert_eq!(table.min_open(), Some(ts(5)));
        assert!(Arc::ptr_eq(&handle, &table.get_or_open(ts(5)).unwrap()));

        handle.lock().stage(Vec::new(), [Key::for_attr(Uid::new(1), "name")]);
        handle.lock().mark_committed(ts(9));
        table.note_resolved(ts(5));

        assert_eq!(table.min_open(), None);
        let txn = table.get(ts(5)).unwrap();
        assert_eq!(txn.lock().state(), TxnState::Committed(ts(9)));
        assert_eq!(txn.lock().keys().len(), 1);
    }

    #[test]
    fn fresh_transactions_hold_the_watermark() {
        let oracle = crate::oracle::AtomicOracle::new();
        let table = TxnTable::new(10);
        oracle.allocate();
        assert_eq!(table.low_watermark(&oracle), ts(1));

        let (start_ts, handle) = table.open_fresh(&oracle);
        assert_eq!(start_ts, ts(2));
        assert!(handle.lock().is_open());
        oracle.allocate();
        assert_eq!(table.low_watermark(&oracle), ts(2));

        table.note_resolved(start_ts);
        assert_eq!(table.low_watermark(&oracle), ts(3));
    }

    #[test]
    fn ensure_open_reports_outcome() {
        let mut txn = Transaction::new(ts(3));
        assert!(txn.ensure_open().is_ok());
        txn.mark_aborted();
        assert!(matches!(txn.ensure_open(), Err(CoreError::TxnAborted { .. })));

        let mut txn = Transaction::new(ts(3));
        txn.mark_committed(ts(4));
        assert!(matches!(
            txn.ensure_open(),
            Err(CoreError::AlreadyCommitted { .. })
        ));
    }

    #[test]
    fn retention_evicts_oldest_resolved() {
        let table = TxnTable::new(2);
        for n in 1..=3 {
            table.insert_resolved(ts(n), TxnState::Aborted);
        }
        assert!(table.get(ts(1)).is_none());
        assert!(table.get(ts(2)).is_some());
        assert!(table.get(ts(3)).is_some());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn open_entries_are_never_evicted() {
        let table = TxnTable::new(1);
        table.get_or_open(ts(1)).unwrap();
        table.insert_resolved(ts(2), TxnState::Aborted);
        table.insert_resolved(ts(3), TxnState::Aborted);
        assert!(table.get(ts(1)).is_some());
        assert_eq!(table.open_start_timestamps(), vec![ts(1)]);
        assert_eq!(table.open_count(), 1);
    }

    #[test]
    fn evicted_timestamps_cannot_reopen() {
        let table = TxnTable::new(1);
        table.insert_resolved(ts(2), TxnState::Committed(ts(3)));
        table.insert_resolved(ts(4), TxnState::Aborted);
        assert_eq!(table.eviction_horizon(), ts(2));
        assert!(matches!(
            table.get_or_open(ts(2)),
            Err(CoreError::TxnForgotten { .. })
        ));
        assert!(matches!(
            table.get_or_open(ts(1)),
            Err(CoreError::TxnForgotten { .. })
        ));
        assert!(table.get_or_open(ts(4)).is_ok());
        assert!(table.get_or_open(ts(5)).unwrap().lock().is_open());
    }

    #[test]
    fn idle_entries_expire_oldest_first() {
        let oracle = crate::oracle::AtomicOracle::new();
        let table = TxnTable::new(10).with_idle_limit(2);
        let (first, expired) = table.open_idle(&oracle);
        assert!(expired.is_empty());
        let (second, _) = table.open_idle(&oracle);
        table
            .get(second)
            .unwrap()
            .lock()
            .stage(Vec::new(), [Key::for_attr(Uid::new(1), "name")]);

        let (third, expired) = table.open_idle(&oracle);
        assert_eq!(expired, vec![first]);
        assert_eq!(table.get(first).unwrap().lock().state(), TxnState::Aborted);
        assert_eq!(table.low_watermark(&oracle), second);

        let (_, expired) = table.open_idle(&oracle);
        assert!(expired.is_empty(), "staged entries are never expired");
        assert!(table.get(second).unwrap().lock().is_open());
        assert!(table.get(third).unwrap().lock().is_open());
    }
}
