//! Snapshot reads.
//!
//! A [`Snapshot`] sees exactly the commits with `commit_ts <= read_ts`.
//! When the read is pinned to an open transaction's start timestamp the
//! transaction's own staged writes are laid over the committed data; no
//! other reader ever sees them.

use crate::schema::Schema;
use crate::store::{GraphStore, Write};
use crate::types::{Timestamp, Uid};
use crate::value::Value;
use std::collections::BTreeSet;

/// Read-only access to the graph at one point in time.
///
/// This is the boundary the query engine evaluates against.
pub trait GraphView {
    /// Timestamp the view is pinned to.
    fn read_ts(&self) -> Timestamp;

    /// Schema in effect for the read.
    fn schema(&self) -> &Schema;

    /// Values of `predicate` on `uid`.
    fn values(&self, uid: Uid, predicate: &str) -> Vec<Value>;

    /// Nodes having at least one value for `predicate`, ascending.
    fn subjects(&self, predicate: &str) -> Vec<Uid>;

    /// Predicates with at least one value on `uid`, by name.
    fn predicates_of(&self, uid: Uid) -> Vec<String>;
}

/// The store as seen at one timestamp, plus an optional own-write overlay.
#[derive(Debug)]
pub struct Snapshot<'a> {
    store: &'a GraphStore,
    schema: &'a Schema,
    read_ts: Timestamp,
    overlay: &'a [Write],
}

impl<'a> Snapshot<'a> {
    /// A view of committed data only.
    #[must_use]
    pub fn new(store: &'a GraphStore, schema: &'a Schema, read_ts: Timestamp) -> Self {
        Self {
            store,
            schema,
            read_ts,
            overlay: &[],
        }
    }

    /// Lays `staged` over the committed data, in order.
    #[must_use]
    pub fn with_overlay(mut self, staged: &'a [Write]) -> Self {
        self.overlay = staged;
        self
    }

    /// Returns true when staged writes are visible through this view.
    #[must_use]
    pub fn has_overlay(&self) -> bool {
        !self.overlay.is_empty()
    }
}

impl GraphView for Snapshot<'_> {
    fn read_ts(&self) -> Timestamp {
        self.read_ts
    }

    fn schema(&self) -> &Schema {
        self.schema
    }

    fn values(&self, uid: Uid, predicate: &str) -> Vec<Value> {
        let mut values = self.store.values_at(uid, predicate, self.read_ts).to_vec();
        for write in self.overlay.iter().filter(|w| w.touches(uid, predicate)) {
            write.apply_to(&mut values);
        }
        values
    }

    fn subjects(&self, predicate: &str) -> Vec<Uid> {
        let committed = self.store.subjects_at(predicate, self.read_ts);
        if self.overlay.is_empty() {
            return committed;
        }
        let mut candidates: BTreeSet<Uid> = committed.into_iter().collect();
        candidates.extend(
            self.overlay
                .iter()
                .filter(|w| matches!(w, Write::Set { predicate: p, .. } if p == predicate))
                .map(Write::uid),
        );
        candidates
            .into_iter()
            .filter(|uid| !self.values(*uid, predicate).is_empty())
            .collect()
    }

    fn predicates_of(&self, uid: Uid) -> Vec<String> {
        let committed = self.store.predicates_at(uid, self.read_ts);
        if self.overlay.is_empty() {
            return committed;
        }
        let mut candidates: BTreeSet<String> = committed.into_iter().collect();
        candidates.extend(self.overlay.iter().filter_map(|w| match w {
            Write::Set {
                uid: target,
                predicate,
                ..
            } if *target == uid => Some(predicate.clone()),
            _ => None,
        }));
        candidates
            .into_iter()
            .filter(|predicate| !self.values(uid, predicate).is_empty())
            .collect()
    }
}
