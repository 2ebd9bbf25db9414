//! Stress helpers for txgraph.
//!
//! These drive the oracle and the commit path from many threads at once.

use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};
use txgraph_core::{CoreError, Database, Timestamp, TimestampOracle, Uid};

use crate::fixtures::rdf;

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Transactions per thread.
    pub txns_per_thread: usize,
    /// Distinct nodes written; fewer nodes means more conflicts.
    pub nodes: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            txns_per_thread: 50,
            nodes: 4,
        }
    }
}

/// One successful commit seen by a stress run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    /// Commit timestamp.
    pub commit_ts: Timestamp,
    /// Node written.
    pub node: Uid,
    /// Value written.
    pub value: String,
}

/// Result of a stress run.
#[derive(Debug, Clone, Default)]
pub struct StressReport {
    /// Successful commits.
    pub commits: Vec<CommitEvent>,
    /// Transactions aborted by conflict detection.
    pub conflicts: usize,
    /// Any other failure, with its message.
    pub failures: Vec<String>,
    /// Wall time of the run.
    pub duration: Duration,
}

impl StressReport {
    /// Total transactions attempted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.commits.len() + self.conflicts + self.failures.len()
    }

    /// The value each node should hold: the one from its latest commit.
    #[must_use]
    pub fn expected_final(&self) -> BTreeMap<Uid, String> {
        let mut latest: BTreeMap<Uid, (Timestamp, String)> = BTreeMap::new();
        for event in &self.commits {
            let entry = latest
                .entry(event.node)
                .or_insert((event.commit_ts, event.value.clone()));
            if event.commit_ts >= entry.0 {
                *entry = (event.commit_ts, event.value.clone());
            }
        }
        latest.into_iter().map(|(node, (_, value))| (node, value)).collect()
    }

    /// Merges another report into this one.
    pub fn merge(&mut self, other: StressReport) {
        self.commits.extend(other.commits);
        self.conflicts += other.conflicts;
        self.failures.extend(other.failures);
    }
}

/// Allocates `per_thread` timestamps on each of `threads` threads.
///
/// Returns each thread's timestamps in the order it received them.
pub fn allocate_concurrently(
    oracle: &dyn TimestampOracle,
    threads: usize,
    per_thread: usize,
) -> Vec<Vec<Timestamp>> {
    thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(move || (0..per_thread).map(|_| oracle.allocate()).collect::<Vec<_>>())
            })
            .collect();
        workers
            .into_iter()
            .map(|w| w.join().expect("allocation thread panicked"))
            .collect()
    })
}

/// Runs blind-write transactions on a few shared nodes from many threads.
///
/// Each transaction stages one `<node> <counter>` write, yields, then
/// commits, so overlapping transactions conflict often.
pub fn contended_writes(db: &Database, config: &StressConfig) -> StressReport {
    let start = Instant::now();
    let mut report = thread::scope(|scope| {
        let workers: Vec<_> = (0..config.threads)
            .map(|t| scope.spawn(move || writer(db, config, t)))
            .collect();
        let mut report = StressReport::default();
        for worker in workers {
            report.merge(worker.join().expect("writer thread panicked"));
        }
        report
    });
    report.duration = start.elapsed();
    report
}

fn writer(db: &Database, config: &StressConfig, thread_id: usize) -> StressReport {
    let mut report = StressReport::default();
    for i in 0..config.txns_per_thread {
        let node = Uid::new((i as u64 + thread_id as u64) % config.nodes.max(1) + 1);
        let value = format!("t{thread_id}-{i}");
        let edits = rdf(&format!("<{node}> <counter> \"{value}\" ."));
        let staged = match db.stage(Timestamp::ZERO, &edits) {
            Ok(staged) => staged,
            Err(err) => {
                report.failures.push(err.to_string());
                continue;
            }
        };
        thread::yield_now();
        match db.commit(staged.start_ts, &staged.keys) {
            Ok(outcome) => report.commits.push(CommitEvent {
                commit_ts: outcome.commit_ts,
                node,
                value,
            }),
            Err(CoreError::TxnConflict { .. }) => report.conflicts += 1,
            Err(err) => report.failures.push(err.to_string()),
        }
    }
    report
}
