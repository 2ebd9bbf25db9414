//! Commit coordinator.
//!
//! Owns the transaction table and the conflict index, an ordered map from
//! commit timestamp to the keys that commit wrote. A commit for start
//! timestamp `S` scans the index range `(S, ..)`; any shared key aborts it.
//!
//! The index mutex is the commit critical section. Conflict scan, commit
//! timestamp allocation, log append, store apply, and index insert all run
//! while it is held, so no two commits interleave.

use crate::error::{CoreError, CoreResult};
use crate::oracle::TimestampOracle;
use crate::store::Write;
use crate::txn::{TxnState, TxnTable};
use crate::types::{Key, Timestamp};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a successful commit hands to the publisher.
#[derive(Debug)]
pub struct CommitRequest<'a> {
    /// Start timestamp.
    pub start_ts: Timestamp,
    /// Conflict keys to record.
    pub keys: &'a BTreeSet<Key>,
    /// Writes to make visible.
    pub writes: &'a [Write],
}

impl CommitRequest<'_> {
    /// Returns true when nothing needs to be logged or applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.writes.is_empty()
    }
}

/// Result of a commit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Start timestamp.
    pub start_ts: Timestamp,
    /// Commit timestamp.
    pub commit_ts: Timestamp,
    /// True when the transaction had already committed and this call only
    /// reported the recorded outcome.
    pub replayed: bool,
}

/// Conflict-index garbage collection report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// Low watermark used.
    pub watermark: Timestamp,
    /// Index entries removed.
    pub pruned: usize,
    /// Index entries left.
    pub retained: usize,
}

#[derive(Debug, Default)]
struct CommitIndex {
    commits: BTreeMap<Timestamp, BTreeSet<Key>>,
    since_gc: u64,
}

impl CommitIndex {
    fn first_conflict(&self, start_ts: Timestamp, keys: &BTreeSet<Key>) -> Option<Key> {
        self.commits
            .range((Excluded(start_ts), Unbounded))
            .find_map(|(_, written)| keys.intersection(written).next().cloned())
    }
}

/// Serializes commits and decides their outcome.
#[derive(Debug)]
pub struct CommitCoordinator {
    oracle: Arc<dyn TimestampOracle>,
    txns: TxnTable,
    index: Mutex<CommitIndex>,
    horizon: AtomicU64,
    gc_every: u64,
}

impl CommitCoordinator {
    /// Creates a coordinator.
    pub fn new(oracle: Arc<dyn TimestampOracle>, retention: usize, gc_every: u64) -> Self {
        Self {
            oracle,
            txns: TxnTable::new(retention),
            index: Mutex::new(CommitIndex::default()),
            horizon: AtomicU64::new(0),
            gc_every,
        }
    }

    /// Sets how many idle transactions opened by queries stay open.
    #[must_use]
    pub fn with_idle_limit(mut self, max_idle: usize) -> Self {
        self.txns = self.txns.with_idle_limit(max_idle);
        self
    }

    /// The oracle.
    #[must_use]
    pub fn oracle(&self) -> &Arc<dyn TimestampOracle> {
        &self.oracle
    }

    /// The transaction table.
    #[must_use]
    pub fn txns(&self) -> &TxnTable {
        &self.txns
    }

    /// Commit timestamps below this have been pruned from the index.
    #[must_use]
    pub fn horizon(&self) -> Timestamp {
        Timestamp::new(self.horizon.load(Ordering::SeqCst))
    }

    /// Number of commits currently indexed.
    #[must_use]
    pub fn indexed_commits(&self) -> usize {
        self.index.lock().commits.len()
    }

    /// Fails for zero and for timestamps the oracle never issued.
    pub fn check_issued(&self, ts: Timestamp) -> CoreResult<()> {
        if ts.is_zero() {
            return Err(CoreError::invalid_timestamp(ts, "zero is not a start timestamp"));
        }
        if ts > self.oracle.current() {
            return Err(CoreError::invalid_timestamp(ts, "timestamp was never issued"));
        }
        Ok(())
    }

    /// Fails with [`CoreError::TxnTooOld`] when `start_ts` predates the
    /// pruned conflict history.
    pub fn check_not_too_old(&self, start_ts: Timestamp) -> CoreResult<()> {
        let horizon = self.horizon();
        if start_ts < horizon {
            return Err(CoreError::TxnTooOld { start_ts, horizon });
        }
        Ok(())
    }

    /// Commits the transaction started at `start_ts`.
    ///
    /// The checked and recorded key set is `supplied` plus every key
    /// accumulated while staging. `publish` runs inside the critical
    /// section once the commit is known to be conflict-free; it allocates
    /// the commit timestamp, persists the commit, and applies the writes.
    /// If it fails the transaction stays open and the call may be retried.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidTimestamp`] for zero or unissued timestamps
    /// - [`CoreError::UnknownTransaction`] when nothing is known about the
    ///   transaction but keys were supplied
    /// - [`CoreError::TxnForgotten`] when the entry may have been evicted
    /// - [`CoreError::TxnAborted`] if it was aborted earlier
    /// - [`CoreError::TxnConflict`] / [`CoreError::TxnTooOld`] on conflict
    /// - whatever `publish` returns
    pub fn commit<F>(
        &self,
        start_ts: Timestamp,
        supplied: &[Key],
        publish: F,
    ) -> CoreResult<CommitOutcome>
    where
        F: FnOnce(&CommitRequest<'_>) -> CoreResult<Timestamp>,
    {
        self.check_issued(start_ts)?;
        let mut index = self.index.lock();

        let Some(handle) = self.txns.get(start_ts) else {
            self.txns.check_not_forgotten(start_ts)?;
            if !supplied.is_empty() {
                return Err(CoreError::UnknownTransaction { start_ts });
            }
            let commit_ts = publish(&CommitRequest {
                start_ts,
                keys: &BTreeSet::new(),
                writes: &[],
            })?;
            self.txns
                .insert_resolved(start_ts, TxnState::Committed(commit_ts));
            debug!(%start_ts, %commit_ts, "committed empty transaction");
            return Ok(CommitOutcome {
                start_ts,
                commit_ts,
                replayed: false,
            });
        };

        let mut txn = handle.lock();
        match txn.state() {
            TxnState::Committed(commit_ts) => {
                debug!(%start_ts, %commit_ts, "commit replayed");
                return Ok(CommitOutcome {
                    start_ts,
                    commit_ts,
                    replayed: true,
                });
            }
            TxnState::Aborted => return Err(CoreError::TxnAborted { start_ts }),
            TxnState::Open => {}
        }

        let keys: BTreeSet<Key> = txn.keys().iter().chain(supplied).cloned().collect();
        let rejection = match self.check_not_too_old(start_ts) {
            Err(err) => Some(err),
            Ok(()) => index
                .first_conflict(start_ts, &keys)
                .map(|key| CoreError::TxnConflict { start_ts, key }),
        };
        if let Some(err) = rejection {
            txn.mark_aborted();
            drop(txn);
            self.txns.note_resolved(start_ts);
            warn!(%start_ts, keys = keys.len(), error = %err, "transaction aborted");
            return Err(err);
        }

        let commit_ts = publish(&CommitRequest {
            start_ts,
            keys: &keys,
            writes: txn.writes(),
        })?;
        let key_count = keys.len();
        if !keys.is_empty() {
            index.commits.insert(commit_ts, keys);
        }
        txn.mark_committed(commit_ts);
        drop(txn);
        self.txns.note_resolved(start_ts);
        info!(%start_ts, %commit_ts, keys = key_count, "transaction committed");

        index.since_gc += 1;
        if self.gc_every > 0 && index.since_gc >= self.gc_every {
            self.gc_locked(&mut index);
        }

        Ok(CommitOutcome {
            start_ts,
            commit_ts,
            replayed: false,
        })
    }

    /// Aborts the transaction started at `start_ts`.
    ///
    /// Aborting twice is a no-op. Aborting a timestamp that never staged
    /// records it as aborted so later stage calls fail.
    ///
    /// # Errors
    ///
    /// [`CoreError::AlreadyCommitted`] if the transaction committed,
    /// [`CoreError::TxnForgotten`] if its entry may have been evicted.
    pub fn abort(&self, start_ts: Timestamp) -> CoreResult<()> {
        self.check_issued(start_ts)?;
        let handle = self.txns.get_or_open(start_ts)?;
        let mut txn = handle.lock();
        match txn.state() {
            TxnState::Open => {
                txn.mark_aborted();
                drop(txn);
                self.txns.note_resolved(start_ts);
                info!(%start_ts, "transaction aborted by request");
                Ok(())
            }
            TxnState::Aborted => Ok(()),
            TxnState::Committed(commit_ts) => {
                Err(CoreError::AlreadyCommitted { start_ts, commit_ts })
            }
        }
    }

    /// Runs `f` inside the commit critical section.
    pub fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        let _index = self.index.lock();
        f()
    }

    /// Aborts every open transaction, returning their start timestamps.
    pub fn abort_all_open(&self) -> Vec<Timestamp> {
        let open = self.txns.open_start_timestamps();
        for start_ts in &open {
            if let Some(handle) = self.txns.get(*start_ts) {
                let mut txn = handle.lock();
                if txn.is_open() {
                    txn.mark_aborted();
                }
            }
            self.txns.note_resolved(*start_ts);
        }
        open
    }

    /// Records a commit read back from the log during recovery.
    pub fn restore_commit(&self, start_ts: Timestamp, commit_ts: Timestamp, keys: &[Key]) {
        if !keys.is_empty() {
            self.index
                .lock()
                .commits
                .insert(commit_ts, keys.iter().cloned().collect());
        }
        self.txns
            .insert_resolved(start_ts, TxnState::Committed(commit_ts));
    }

    /// Prunes index entries below the low watermark: the lowest open start
    /// timestamp, or the oracle's current value when nothing is open.
    pub fn gc(&self) -> GcStats {
        let mut index = self.index.lock();
        self.gc_locked(&mut index)
    }

    fn gc_locked(&self, index: &mut CommitIndex) -> GcStats {
        index.since_gc = 0;
        let watermark = self.txns.low_watermark(self.oracle.as_ref());
        let retained = index.commits.split_off(&watermark);
        let pruned = std::mem::replace(&mut index.commits, retained).len();
        self.horizon.fetch_max(watermark.as_u64(), Ordering::SeqCst);
        let stats = GcStats {
            watermark,
            pruned,
            retained: index.commits.len(),
        };
        debug!(
            watermark = %stats.watermark,
            pruned = stats.pruned,
            retained = stats.retained,
            "conflict index gc"
        );
        stats
    }
}
