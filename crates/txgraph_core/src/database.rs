//! Database facade and recovery.

use crate::config::CoreConfig;
use crate::coordinator::{CommitCoordinator, CommitOutcome, CommitRequest, GcStats};
use crate::error::{CoreError, CoreResult};
use crate::gate::CommitGate;
use crate::log::{CommitLog, LogRecord};
use crate::mutation::Edit;
use crate::oracle::{AtomicOracle, TimestampOracle, UidLeaser};
use crate::schema::Schema;
use crate::snapshot::{GraphView, Snapshot};
use crate::stager;
use crate::store::{GraphStore, Write};
use crate::txn::TxnState;
use crate::types::{Key, Timestamp, Uid};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use txgraph_storage::{FileBackend, InMemoryBackend, StorageBackend};

/// A schema change or drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alteration {
    /// Drop every predicate and every schema entry.
    DropAll,
    /// Drop one predicate and its schema entry.
    DropAttr(String),
    /// Merge schema text into the current schema.
    Schema(String),
}

/// Result of one stage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    /// Start timestamp, freshly allocated if the caller passed zero.
    pub start_ts: Timestamp,
    /// Conflict keys produced by this call.
    pub keys: Vec<Key>,
    /// Blank node name to resolved uid.
    pub uids: BTreeMap<String, Uid>,
}

/// The main database handle.
///
/// `Database` wires the timestamp oracle, the versioned store, the
/// transaction table and the commit log together:
///
/// - [`Database::read`] evaluates against a consistent snapshot
/// - [`Database::stage`] validates edits and stages them on a transaction
/// - [`Database::commit`] runs conflict detection and publishes the writes
/// - [`Database::alter`] changes the schema or drops data
///
/// # Example
///
/// ```rust,ignore
/// use txgraph_core::{Database, MutationFormat, Timestamp, parse_mutation};
///
/// let db = Database::open_in_memory()?;
/// let edits = parse_mutation(br#"_:a <name> "Alice" ."#, MutationFormat::Rdf)?;
/// let staged = db.stage(Timestamp::ZERO, &edits)?;
/// let outcome = db.commit(staged.start_ts, &[])?;
/// assert!(outcome.commit_ts > staged.start_ts);
/// ```
///
/// # Lock order
///
/// Commit index, then a transaction, then the store. Readers copy a
/// transaction's staged writes before taking the store lock. The commit log
/// is written before the store lock is taken; readers past a commit that
/// has not landed yet wait on the commit gate, not on the store.
#[derive(Debug)]
pub struct Database {
    config: CoreConfig,
    uids: UidLeaser,
    schema: RwLock<Arc<Schema>>,
    store: RwLock<GraphStore>,
    log: CommitLog,
    gate: CommitGate,
    coordinator: CommitCoordinator,
}

impl Database {
    /// Opens a database on `backend`, replaying whatever log it holds.
    ///
    /// # Errors
    ///
    /// Storage errors, or [`CoreError::LogCorruption`] when a complete
    /// record fails its checksum.
    pub fn open(backend: Box<dyn StorageBackend>, config: CoreConfig) -> CoreResult<Self> {
        Self::with_oracle(backend, config, Arc::new(AtomicOracle::new()))
    }

    /// Opens a database whose log lives in `dir`.
    pub fn open_dir(dir: &Path, config: CoreConfig) -> CoreResult<Self> {
        let backend = FileBackend::open_in_dir(dir)?;
        Self::open(Box::new(backend), config)
    }

    /// Opens a fresh in-memory database for testing.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open(Box::new(InMemoryBackend::new()), CoreConfig::default())
    }

    /// Opens a database with a caller-supplied oracle.
    ///
    /// Recovery advances the oracle past every timestamp found in the log.
    pub fn with_oracle(
        backend: Box<dyn StorageBackend>,
        config: CoreConfig,
        oracle: Arc<dyn TimestampOracle>,
    ) -> CoreResult<Self> {
        let log = CommitLog::new(backend, config.sync_on_commit);
        let coordinator = CommitCoordinator::new(
            Arc::clone(&oracle),
            config.resolved_txn_retention,
            config.gc_every_commits,
        )
        .with_idle_limit(config.max_idle_txns);
        let uids = UidLeaser::new();
        let mut store = GraphStore::new();
        let mut schema = Schema::new();

        let replay = log.replay()?;
        let records = replay.records.len();
        for record in replay.records {
            if let Some(ts) = record.max_ts() {
                oracle.advance_past(ts);
            }
            match record {
                LogRecord::Commit {
                    start_ts,
                    commit_ts,
                    keys,
                    writes,
                    max_uid,
                } => {
                    store.apply(commit_ts, &writes);
                    coordinator.restore_commit(start_ts, commit_ts, &keys);
                    uids.advance_past(max_uid);
                }
                LogRecord::Schema { text } => schema.merge(Schema::parse(&text)?),
                LogRecord::DropAll { .. } => {
                    store.clear();
                    schema = Schema::new();
                }
                LogRecord::DropAttr { predicate, .. } => {
                    store.drop_predicate(&predicate);
                    schema.remove(&predicate);
                }
            }
        }
        // Staged writes did not survive; transactions started before the
        // restart must not commit against an index that forgot them.
        let gc = coordinator.gc();
        info!(
            records,
            torn_bytes = replay.torn_bytes,
            last_ts = %oracle.current(),
            horizon = %gc.watermark,
            "recovered commit log"
        );

        Ok(Self {
            config,
            uids,
            schema: RwLock::new(Arc::new(schema)),
            store: RwLock::new(store),
            log,
            gate: CommitGate::default(),
            coordinator,
        })
    }

    /// Configuration the database was opened with.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The timestamp oracle.
    #[must_use]
    pub fn oracle(&self) -> &Arc<dyn TimestampOracle> {
        self.coordinator.oracle()
    }

    /// The commit coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &CommitCoordinator {
        &self.coordinator
    }

    /// Current schema.
    #[must_use]
    pub fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema.read())
    }

    /// State of the transaction started at `start_ts`, if it is known.
    #[must_use]
    pub fn txn_state(&self, start_ts: Timestamp) -> Option<TxnState> {
        self.coordinator
            .txns()
            .get(start_ts)
            .map(|handle| handle.lock().state())
    }

    /// Commit log size in bytes.
    pub fn log_size(&self) -> CoreResult<u64> {
        self.log.size()
    }

    /// Runs `f` against a snapshot at `ts`.
    ///
    /// Zero allocates a fresh timestamp, which is returned alongside the
    /// result and opens an idle transaction there: a later stage or commit
    /// at that timestamp continues it, and it holds the gc watermark until
    /// it resolves or expires. A read pinned to an open transaction's start
    /// timestamp also sees that transaction's staged writes.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTimestamp`] for a timestamp never issued.
    pub fn read<R>(
        &self,
        ts: Timestamp,
        f: impl FnOnce(&dyn GraphView) -> R,
    ) -> CoreResult<(Timestamp, R)> {
        let (read_ts, overlay) = if ts.is_zero() {
            let (start_ts, _expired) = self.coordinator.txns().open_idle(self.oracle().as_ref());
            (start_ts, Vec::new())
        } else {
            self.coordinator.check_issued(ts)?;
            (ts, self.staged_writes(ts))
        };
        self.gate.wait_visible(read_ts);
        let schema = self.schema();
        let store = self.store.read();
        let view = Snapshot::new(&store, &schema, read_ts).with_overlay(&overlay);
        debug!(%read_ts, own_writes = view.has_overlay(), "snapshot read");
        Ok((read_ts, f(&view)))
    }

    fn staged_writes(&self, start_ts: Timestamp) -> Vec<Write> {
        self.coordinator
            .txns()
            .get(start_ts)
            .map(|handle| {
                let txn = handle.lock();
                if txn.is_open() {
                    txn.writes().to_vec()
                } else {
                    Vec::new()
                }
            })
            .unwrap_or_default()
    }

    /// Validates `edits` and stages them on the transaction at `start_ts`.
    ///
    /// Zero allocates a fresh start timestamp. Nothing becomes visible to
    /// other readers until commit.
    ///
    /// # Errors
    ///
    /// - client errors for empty, oversized, or schema-incompatible edits;
    ///   these are raised before any timestamp or uid is allocated
    /// - [`CoreError::TxnAborted`] / [`CoreError::AlreadyCommitted`] when
    ///   the transaction is resolved
    /// - [`CoreError::TxnTooOld`] when `start_ts` predates the pruned
    ///   conflict history; the transaction is aborted
    pub fn stage(&self, start_ts: Timestamp, edits: &[Edit]) -> CoreResult<StageOutcome> {
        if edits.is_empty() {
            return Err(CoreError::EmptyMutation);
        }
        let limit = self.config.max_edits_per_mutation;
        if edits.len() > limit {
            return Err(CoreError::TooManyEdits {
                count: edits.len(),
                limit,
            });
        }
        let schema = self.schema();
        let checked = stager::validate(edits, &schema)?;

        let txns = self.coordinator.txns();
        let (start_ts, handle) = if start_ts.is_zero() {
            txns.open_fresh(self.oracle().as_ref())
        } else {
            self.coordinator.check_issued(start_ts)?;
            (start_ts, txns.get_or_open(start_ts)?)
        };
        self.gate.wait_visible(start_ts);
        let mut txn = handle.lock();
        txn.ensure_open()?;
        if let Err(err) = self.coordinator.check_not_too_old(start_ts) {
            txn.mark_aborted();
            drop(txn);
            txns.note_resolved(start_ts);
            warn!(%start_ts, error = %err, "stage rejected");
            return Err(err);
        }

        let plan = {
            let store = self.store.read();
            let view = Snapshot::new(&store, &schema, start_ts).with_overlay(txn.writes());
            stager::resolve(checked, &schema, &self.uids, &view)?
        };
        debug!(
            %start_ts,
            edits = edits.len(),
            keys = plan.keys.len(),
            blank_nodes = plan.uids.len(),
            "staged mutation"
        );
        let keys: Vec<Key> = plan.keys.iter().cloned().collect();
        txn.stage(plan.writes, plan.keys);
        Ok(StageOutcome {
            start_ts,
            keys,
            uids: plan.uids,
        })
    }

    /// Commits the transaction at `start_ts`, checking `keys` plus every key
    /// accumulated while staging.
    ///
    /// See [`CommitCoordinator::commit`] for the error cases.
    pub fn commit(&self, start_ts: Timestamp, keys: &[Key]) -> CoreResult<CommitOutcome> {
        self.coordinator
            .commit(start_ts, keys, |request| self.publish(request))
    }

    fn publish(&self, request: &CommitRequest<'_>) -> CoreResult<Timestamp> {
        let pending = self.gate.begin(self.oracle().as_ref());
        let commit_ts = pending.ts();
        if request.is_empty() {
            return Ok(commit_ts);
        }
        self.log.append(&LogRecord::Commit {
            start_ts: request.start_ts,
            commit_ts,
            keys: request.keys.iter().cloned().collect(),
            writes: request.writes.to_vec(),
            max_uid: self.uids.max_leased(),
        })?;
        self.store.write().apply(commit_ts, request.writes);
        Ok(commit_ts)
    }

    /// Discards the staged writes of `start_ts` and marks it aborted.
    pub fn abort(&self, start_ts: Timestamp) -> CoreResult<()> {
        self.coordinator.abort(start_ts)
    }

    /// Applies a schema change or drop.
    ///
    /// Alterations run inside the commit critical section and are logged
    /// before they take effect. Dropping everything also aborts every open
    /// transaction.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidSchema`] for unparsable schema text (nothing is
    /// changed), or a storage error from the log.
    pub fn alter(&self, alteration: Alteration) -> CoreResult<()> {
        self.coordinator.exclusive(|| match alteration {
            Alteration::Schema(text) => {
                let parsed = Schema::parse(&text)?;
                let declared = parsed.len();
                self.log.append(&LogRecord::Schema { text })?;
                let mut schema = self.schema.write();
                let mut next = Schema::clone(&schema);
                next.merge(parsed);
                *schema = Arc::new(next);
                info!(declared, total = schema.len(), "schema altered");
                Ok(())
            }
            Alteration::DropAttr(predicate) => {
                let pending = self.gate.begin(self.oracle().as_ref());
                let at = pending.ts();
                self.log.append(&LogRecord::DropAttr {
                    predicate: predicate.clone(),
                    at,
                })?;
                let existed = self.store.write().drop_predicate(&predicate);
                let mut schema = self.schema.write();
                let mut next = Schema::clone(&schema);
                next.remove(&predicate);
                *schema = Arc::new(next);
                info!(%at, predicate = %predicate, existed, "predicate dropped");
                Ok(())
            }
            Alteration::DropAll => {
                let pending = self.gate.begin(self.oracle().as_ref());
                let at = pending.ts();
                self.log.append(&LogRecord::DropAll { at })?;
                let aborted = self.coordinator.abort_all_open();
                self.store.write().clear();
                *self.schema.write() = Arc::new(Schema::new());
                info!(%at, aborted = aborted.len(), "dropped all data");
                Ok(())
            }
        })
    }

    /// Prunes the conflict index now.
    pub fn gc(&self) -> GcStats {
        self.coordinator.gc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{parse_mutation, MutationFormat};
    use crate::value::Value;

    fn rdf(text: &str) -> Vec<Edit> {
        parse_mutation(text.as_bytes(), MutationFormat::Rdf).unwrap()
    }

    fn names(db: &Database, ts: Timestamp) -> Vec<Value> {
        db.read(ts, |view| {
            view.subjects("name")
                .into_iter()
                .flat_map(|uid| view.values(uid, "name"))
                .collect()
        })
        .unwrap()
        .1
    }

    #[test]
    fn staged_writes_visible_only_to_own_reads() {
        let db = Database::open_in_memory().unwrap();
        let staged = db
            .stage(Timestamp::ZERO, &rdf(r#"_:a <name> "Bob" ."#))
            .unwrap();
        let start_ts = staged.start_ts;

        assert!(names(&db, Timestamp::ZERO).is_empty());
        assert_eq!(names(&db, start_ts), vec![Value::Str("Bob".into())]);

        let outcome = db.commit(start_ts, &[]).unwrap();
        assert!(outcome.commit_ts > start_ts);
        assert_eq!(names(&db, Timestamp::ZERO), vec![Value::Str("Bob".into())]);
        assert!(names(&db, start_ts).is_empty());
        assert_eq!(names(&db, outcome.commit_ts).len(), 1);
    }

    #[test]
    fn client_errors_allocate_nothing() {
        let db = Database::open_in_memory().unwrap();
        db.alter(Alteration::Schema("age: int .".into())).unwrap();
        let before = db.oracle().current();
        let err = db
            .stage(Timestamp::ZERO, &rdf(r#"_:a <age> "many" ."#))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Client);
        assert_eq!(db.oracle().current(), before);
        assert!(matches!(
            db.stage(Timestamp::ZERO, &[]),
            Err(CoreError::EmptyMutation)
        ));
    }

    #[test]
    fn too_many_edits() {
        let db = Database::open(
            Box::new(InMemoryBackend::new()),
            CoreConfig::new().max_edits_per_mutation(1),
        )
        .unwrap();
        let err = db
            .stage(Timestamp::ZERO, &rdf("_:a <x> \"1\" .\n_:a <y> \"2\" ."))
            .unwrap_err();
        assert!(matches!(err, CoreError::TooManyEdits { count: 2, limit: 1 }));
    }

    #[test]
    fn read_rejects_unissued_timestamp() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.read(Timestamp::new(50), |_| ()),
            Err(CoreError::InvalidTimestamp { .. })
        ));
        let (ts, ()) = db.read(Timestamp::ZERO, |_| ()).unwrap();
        assert_eq!(ts, Timestamp::new(1));
        assert_eq!(db.txn_state(ts), Some(TxnState::Open));
    }

    #[test]
    fn abort_discards_overlay() {
        let db = Database::open_in_memory().unwrap();
        let staged = db
            .stage(Timestamp::ZERO, &rdf(r#"_:a <name> "Eve" ."#))
            .unwrap();
        db.abort(staged.start_ts).unwrap();
        assert!(names(&db, staged.start_ts).is_empty());
        assert_eq!(db.txn_state(staged.start_ts), Some(TxnState::Aborted));
        assert!(matches!(
            db.stage(staged.start_ts, &rdf(r#"_:b <name> "x" ."#)),
            Err(CoreError::TxnAborted { .. })
        ));
    }

    #[test]
    fn drop_all_aborts_open_transactions() {
        let db = Database::open_in_memory().unwrap();
        db.alter(Alteration::Schema("name: string @index(term) .".into()))
            .unwrap();
        let done = db
            .stage(Timestamp::ZERO, &rdf(r#"_:a <name> "Ann" ."#))
            .unwrap();
        db.commit(done.start_ts, &[]).unwrap();
        let open = db
            .stage(Timestamp::ZERO, &rdf(r#"_:b <name> "Ben" ."#))
            .unwrap();

        db.alter(Alteration::DropAll).unwrap();
        assert!(names(&db, Timestamp::ZERO).is_empty());
        assert!(db.schema().is_empty());
        assert!(matches!(
            db.commit(open.start_ts, &[]),
            Err(CoreError::TxnAborted { .. })
        ));
    }

    #[test]
    fn drop_attr_removes_predicate() {
        let db = Database::open_in_memory().unwrap();
        let t = db
            .stage(Timestamp::ZERO, &rdf("_:a <name> \"A\" .\n_:a <age> \"3\" ."))
            .unwrap();
        db.commit(t.start_ts, &[]).unwrap();
        db.alter(Alteration::DropAttr("name".into())).unwrap();
        let (_, predicates) = db
            .read(Timestamp::ZERO, |view| view.predicates_of(t.uids["a"]))
            .unwrap();
        assert_eq!(predicates, vec!["age".to_string()]);
    }

    #[test]
    fn delete_star_keeps_concurrent_predicates() {
        let db = Database::open_in_memory().unwrap();
        let seed = db
            .stage(Timestamp::ZERO, &rdf(r#"<0x1> <name> "A" ."#))
            .unwrap();
        db.commit(seed.start_ts, &[]).unwrap();

        let wipe = db
            .stage(Timestamp::ZERO, &rdf("delete { <0x1> * * . }"))
            .unwrap();
        let other = db
            .stage(Timestamp::ZERO, &rdf(r#"<0x1> <age> "3" ."#))
            .unwrap();
        db.commit(other.start_ts, &[]).unwrap();
        db.commit(wipe.start_ts, &[]).unwrap();

        let (_, (predicates, age)) = db
            .read(Timestamp::ZERO, |view| {
                (view.predicates_of(Uid::new(1)), view.values(Uid::new(1), "age"))
            })
            .unwrap();
        assert_eq!(predicates, vec!["age".to_string()]);
        assert_eq!(age.len(), 1);
    }

    #[test]
    fn query_timestamp_holds_the_gc_watermark() {
        let db = Database::open(
            Box::new(InMemoryBackend::new()),
            CoreConfig::new().gc_every_commits(1),
        )
        .unwrap();
        let (ts, ()) = db.read(Timestamp::ZERO, |_| ()).unwrap();

        let other = db
            .stage(Timestamp::ZERO, &rdf(r#"<0x2> <name> "B" ."#))
            .unwrap();
        db.commit(other.start_ts, &[]).unwrap();
        assert!(db.coordinator().gc().watermark <= ts);

        db.stage(ts, &rdf(r#"<0x1> <name> "A" ."#)).unwrap();
        let outcome = db.commit(ts, &[]).unwrap();
        assert!(outcome.commit_ts > other.start_ts);
    }

    #[test]
    fn idle_query_timestamps_expire() {
        let db = Database::open(
            Box::new(InMemoryBackend::new()),
            CoreConfig::new().max_idle_txns(2),
        )
        .unwrap();
        let stamps: Vec<Timestamp> = (0..3)
            .map(|_| db.read(Timestamp::ZERO, |_| ()).unwrap().0)
            .collect();
        assert_eq!(db.txn_state(stamps[0]), Some(TxnState::Aborted));
        assert_eq!(db.txn_state(stamps[1]), Some(TxnState::Open));
        assert_eq!(db.txn_state(stamps[2]), Some(TxnState::Open));
    }

    #[test]
    fn evicted_transactions_stay_forgotten() {
        let db = Database::open(
            Box::new(InMemoryBackend::new()),
            CoreConfig::new().resolved_txn_retention(1),
        )
        .unwrap();
        let first = db
            .stage(Timestamp::ZERO, &rdf(r#"_:a <name> "A" ."#))
            .unwrap();
        db.commit(first.start_ts, &[]).unwrap();
        let second = db
            .stage(Timestamp::ZERO, &rdf(r#"_:b <name> "B" ."#))
            .unwrap();
        db.commit(second.start_ts, &[]).unwrap();
        assert!(db.txn_state(first.start_ts).is_none());

        let commit = db.commit(first.start_ts, &[]).unwrap_err();
        assert!(matches!(commit, CoreError::TxnForgotten { .. }), "{commit}");
        let stage = db
            .stage(first.start_ts, &rdf(r#"_:c <name> "C" ."#))
            .unwrap_err();
        assert!(matches!(stage, CoreError::TxnForgotten { .. }), "{stage}");
        assert_eq!(names(&db, Timestamp::ZERO).len(), 2);
    }

    #[test]
    fn reads_before_a_commit_never_wait_on_it() {
        let db = Database::open_in_memory().unwrap();
        let staged = db
            .stage(Timestamp::ZERO, &rdf(r#"_:a <name> "A" ."#))
            .unwrap();
        let pending = db.gate.begin(db.oracle().as_ref());
        assert_eq!(names(&db, staged.start_ts).len(), 1);
        drop(pending);
        assert!(names(&db, Timestamp::ZERO).is_empty());
    }

    #[test]
    fn bad_schema_changes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let size = db.log_size().unwrap();
        assert!(db.alter(Alteration::Schema("name: nonsense .".into())).is_err());
        assert!(db.schema().is_empty());
        assert_eq!(db.log_size().unwrap(), size);
    }
}
