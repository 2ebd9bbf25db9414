//! Versioned graph store.
//!
//! Every (predicate, node) cell keeps an append-only list of versions, one
//! per commit that touched it. A version holds the full value list as of
//! its commit timestamp, so a read at `ts` is a binary search for the last
//! version with `commit_ts <= ts`. Versions are never rewritten, which is
//! what lets readers at old timestamps keep a stable view.

use crate::types::{Timestamp, Uid};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A resolved write, ready to apply. Blank nodes are already uids and the
/// cardinality decision has been made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Write {
    /// Adds `value`, replacing the current value unless `list` is set.
    Set {
        /// Node.
        uid: Uid,
        /// Predicate.
        predicate: String,
        /// Value written.
        value: Value,
        /// Append to the list instead of replacing.
        list: bool,
    },
    /// Removes one value.
    Delete {
        /// Node.
        uid: Uid,
        /// Predicate.
        predicate: String,
        /// Value removed.
        value: Value,
    },
    /// Removes every value of one predicate. A `<uid> * *` delete stages
    /// one of these per predicate the node had when it was staged.
    ClearPredicate {
        /// Node.
        uid: Uid,
        /// Predicate.
        predicate: String,
    },
}

impl Write {
    /// Node touched by the write.
    #[must_use]
    pub fn uid(&self) -> Uid {
        match self {
            Write::Set { uid, .. }
            | Write::Delete { uid, .. }
            | Write::ClearPredicate { uid, .. } => *uid,
        }
    }

    /// Predicate touched.
    #[must_use]
    pub fn predicate(&self) -> &str {
        match self {
            Write::Set { predicate, .. }
            | Write::Delete { predicate, .. }
            | Write::ClearPredicate { predicate, .. } => predicate,
        }
    }

    /// Returns true if the write can change the cell (`uid`, `predicate`).
    #[must_use]
    pub fn touches(&self, uid: Uid, predicate: &str) -> bool {
        self.uid() == uid && self.predicate() == predicate
    }

    /// Applies the write to the current values of a cell it touches.
    pub fn apply_to(&self, values: &mut Vec<Value>) {
        match self {
            Write::Set { value, list, .. } => {
                if *list {
                    if !values.contains(value) {
                        values.push(value.clone());
                    }
                } else {
                    values.clear();
                    values.push(value.clone());
                }
            }
            Write::Delete { value, .. } => values.retain(|v| v != value),
            Write::ClearPredicate { .. } => values.clear(),
        }
    }
}

#[derive(Debug, Clone)]
struct Version {
    ts: Timestamp,
    values: Vec<Value>,
}

type Cells = BTreeMap<Uid, Vec<Version>>;

/// All committed data, indexed by predicate then node.
#[derive(Debug, Default)]
pub struct GraphStore {
    predicates: BTreeMap<String, Cells>,
}

impl GraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Values of a cell visible at `ts`.
    #[must_use]
    pub fn values_at(&self, uid: Uid, predicate: &str, ts: Timestamp) -> &[Value] {
        self.predicates
            .get(predicate)
            .and_then(|cells| cells.get(&uid))
            .map(|versions| visible(versions, ts))
            .unwrap_or(&[])
    }

    /// Nodes with at least one value for `predicate` at `ts`, ascending.
    #[must_use]
    pub fn subjects_at(&self, predicate: &str, ts: Timestamp) -> Vec<Uid> {
        self.predicates
            .get(predicate)
            .map(|cells| {
                cells
                    .iter()
                    .filter(|(_, versions)| !visible(versions, ts).is_empty())
                    .map(|(uid, _)| *uid)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Predicates with at least one value on `uid` at `ts`, by name.
    #[must_use]
    pub fn predicates_at(&self, uid: Uid, ts: Timestamp) -> Vec<String> {
        self.predicates
            .iter()
            .filter(|(_, cells)| {
                cells
                    .get(&uid)
                    .is_some_and(|versions| !visible(versions, ts).is_empty())
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Applies a committed transaction's writes as one new version per cell.
    ///
    /// `commit_ts` must not be lower than any timestamp applied before.
    pub fn apply(&mut self, commit_ts: Timestamp, writes: &[Write]) {
        for write in writes {
            write.apply_to(self.cell_mut(write.predicate(), write.uid(), commit_ts));
        }
    }

    /// Removes a predicate and all its history.
    pub fn drop_predicate(&mut self, predicate: &str) -> bool {
        self.predicates.remove(predicate).is_some()
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.predicates.clear();
    }

    /// Number of predicates with any history.
    #[must_use]
    pub fn predicate_count(&self) -> usize {
        self.predicates.len()
    }

    fn cell_mut(&mut self, predicate: &str, uid: Uid, ts: Timestamp) -> &mut Vec<Value> {
        let versions = self
            .predicates
            .entry(predicate.to_string())
            .or_default()
            .entry(uid)
            .or_default();
        let reuse = versions.last().is_some_and(|last| last.ts == ts);
        if !reuse {
            let values = versions
                .last()
                .map(|last| last.values.clone())
                .unwrap_or_default();
            versions.push(Version { ts, values });
        }
        let last = versions.len() - 1;
        &mut versions[last].values
    }
}

fn visible(versions: &[Version], ts: Timestamp) -> &[Value] {
    let idx = versions.partition_point(|version| version.ts <= ts);
    if idx == 0 {
        &[]
    } else {
        &versions[idx - 1].values[..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(n: u64) -> Timestamp {
        Timestamp::new(n)
    }

    fn set(uid: u64, predicate: &str, value: Value) -> Write {
        Write::Set {
            uid: Uid::new(uid),
            predicate: predicate.to_string(),
            value,
            list: false,
        }
    }

    fn s(text: &str) -> Value {
        Value::Str(text.to_string())
    }

    #[test]
    fn versions_are_visible_from_their_commit() {
        let mut store = GraphStore::new();
        store.apply(ts(5), &[set(1, "name", s("Alice"))]);
        store.apply(ts(9), &[set(1, "name", s("Bob"))]);

        assert!(store.values_at(Uid::new(1), "name", ts(4)).is_empty());
        assert_eq!(store.values_at(Uid::new(1), "name", ts(5)), &[s("Alice")]);
        assert_eq!(store.values_at(Uid::new(1), "name", ts(8)), &[s("Alice")]);
        assert_eq!(store.values_at(Uid::new(1), "name", ts(9)), &[s("Bob")]);
        assert_eq!(store.values_at(Uid::new(1), "name", ts(100)), &[s("Bob")]);
    }

    #[test]
    fn single_valued_set_replaces_within_one_commit() {
        let mut store = GraphStore::new();
        store.apply(
            ts(3),
            &[set(1, "name", s("Alice")), set(1, "name", s("Bob"))],
        );
        assert_eq!(store.values_at(Uid::new(1), "name", ts(3)), &[s("Bob")]);
    }

    #[test]
    fn list_set_accumulates() {
        let mut store = GraphStore::new();
        let edge = |to: u64| Write::Set {
            uid: Uid::new(1),
            predicate: "friend".into(),
            value: Value::Uid(Uid::new(to)),
            list: true,
        };
        store.apply(ts(2), &[edge(2), edge(3), edge(2)]);
        assert_eq!(
            store.values_at(Uid::new(1), "friend", ts(2)),
            &[Value::Uid(Uid::new(2)), Value::Uid(Uid::new(3))]
        );
    }

    #[test]
    fn deletes_and_clears() {
        let mut store = GraphStore::new();
        store.apply(
            ts(2),
            &[set(1, "name", s("A")), set(1, "age", Value::Int(3)), set(2, "name", s("B"))],
        );
        store.apply(
            ts(4),
            &[Write::Delete {
                uid: Uid::new(2),
                predicate: "name".into(),
                value: s("B"),
            }],
        );
        store.apply(
            ts(6),
            &[
                Write::ClearPredicate { uid: Uid::new(1), predicate: "name".into() },
                Write::ClearPredicate { uid: Uid::new(1), predicate: "age".into() },
            ],
        );

        assert_eq!(store.subjects_at("name", ts(3)), vec![Uid::new(1), Uid::new(2)]);
        assert_eq!(store.subjects_at("name", ts(4)), vec![Uid::new(1)]);
        assert_eq!(
            store.predicates_at(Uid::new(1), ts(5)),
            vec!["age".to_string(), "name".to_string()]
        );
        assert!(store.predicates_at(Uid::new(1), ts(6)).is_empty());
    }

    #[test]
    fn drop_predicate_removes_history() {
        let mut store = GraphStore::new();
        store.apply(ts(2), &[set(1, "name", s("A")), set(1, "age", Value::Int(1))]);
        assert!(store.drop_predicate("name"));
        assert!(!store.drop_predicate("name"));
        assert!(store.values_at(Uid::new(1), "name", ts(2)).is_empty());
        assert_eq!(store.predicate_count(), 1);
        store.clear();
        assert_eq!(store.predicate_count(), 0);
    }

    #[test]
    fn write_touches() {
        let w = set(1, "name", s("A"));
        assert!(w.touches(Uid::new(1), "name"));
        assert!(!w.touches(Uid::new(1), "age"));
        let clear = Write::ClearPredicate { uid: Uid::new(1), predicate: "age".into() };
        assert!(clear.touches(Uid::new(1), "age"));
        assert!(!clear.touches(Uid::new(2), "age"));
    }
}
