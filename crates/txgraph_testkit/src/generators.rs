//! Property-based test generators using proptest.
//!
//! Provides strategies for generating mutations and transaction
//! schedules over a small, collision-prone key space.

use proptest::prelude::*;
use std::collections::BTreeSet;
use txgraph_core::{Key, Uid};

/// Predicates the generators draw from.
pub const PREDICATES: &[&str] = &["name", "balance", "tag", "city"];

/// One (node, predicate) cell written by a generated transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cell {
    /// Node uid, always non-zero.
    pub node: u64,
    /// Index into [`PREDICATES`].
    pub predicate: usize,
}

impl Cell {
    /// Predicate name.
    #[must_use]
    pub fn predicate_name(&self) -> &'static str {
        PREDICATES[self.predicate % PREDICATES.len()]
    }

    /// Conflict key this cell produces.
    #[must_use]
    pub fn key(&self) -> Key {
        Key::for_attr(Uid::new(self.node), self.predicate_name())
    }
}

/// Strategy for a cell on one of `nodes` nodes.
pub fn cell_strategy(nodes: u64) -> impl Strategy<Value = Cell> {
    (1..=nodes.max(1), 0..PREDICATES.len()).prop_map(|(node, predicate)| Cell { node, predicate })
}

/// Strategy for a non-empty set of cells.
pub fn cell_set_strategy(nodes: u64, max: usize) -> impl Strategy<Value = BTreeSet<Cell>> {
    prop::collection::btree_set(cell_strategy(nodes), 1..=max.max(1))
}

/// Renders cells as an RDF set block, tagging every value with `tag`.
#[must_use]
pub fn cells_to_rdf(cells: &BTreeSet<Cell>, tag: &str) -> String {
    let mut out = String::from("{ set {\n");
    for cell in cells {
        out.push_str(&format!(
            "  <{}> <{}> \"{tag}\" .\n",
            Uid::new(cell.node),
            cell.predicate_name()
        ));
    }
    out.push_str("} }");
    out
}

/// Strategy for RDF mutations over blank nodes, with the blank names used.
pub fn blank_mutation_strategy() -> impl Strategy<Value = (String, BTreeSet<String>)> {
    prop::collection::vec(
        (
            0..4usize,
            0..PREDICATES.len(),
            prop::string::string_regex("[a-zA-Z ]{1,12}").expect("Invalid regex"),
        ),
        1..12,
    )
    .prop_map(|edits| {
        let mut text = String::new();
        let mut blanks = BTreeSet::new();
        for (blank, predicate, value) in edits {
            let name = format!("n{blank}");
            text.push_str(&format!("_:{name} <{}> \"{value}\" .\n", PREDICATES[predicate]));
            blanks.insert(name);
        }
        (text, blanks)
    })
}

/// A schedule of concurrent transactions.
///
/// Every transaction stages before any commits, then they commit in
/// `commit_order`. Each one therefore started before every commit.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Cells written by each transaction.
    pub txns: Vec<BTreeSet<Cell>>,
    /// Permutation of transaction indexes.
    pub commit_order: Vec<usize>,
}

impl Schedule {
    /// Outcome the coordinator must produce, per transaction: `true` for commit.
    ///
    /// A transaction aborts iff an earlier committer in the order wrote one
    /// of its keys.
    #[must_use]
    pub fn expected_outcomes(&self) -> Vec<bool> {
        let mut outcomes = vec![false; self.txns.len()];
        let mut written: BTreeSet<Cell> = BTreeSet::new();
        for &i in &self.commit_order {
            if self.txns[i].is_disjoint(&written) {
                outcomes[i] = true;
                written.extend(self.txns[i].iter().copied());
            }
        }
        outcomes
    }
}

/// Strategy for schedules of up to `max_txns` transactions.
pub fn schedule_strategy(max_txns: usize, nodes: u64) -> impl Strategy<Value = Schedule> {
    prop::collection::vec(cell_set_strategy(nodes, 3), 1..=max_txns.max(1)).prop_flat_map(|txns| {
        let order: Vec<usize> = (0..txns.len()).collect();
        (Just(txns), Just(order).prop_shuffle())
            .prop_map(|(txns, commit_order)| Schedule { txns, commit_order })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_aborts_later_overlaps() {
        let a = Cell { node: 1, predicate: 0 };
        let b = Cell { node: 2, predicate: 0 };
        let schedule = Schedule {
            txns: vec![
                BTreeSet::from([a]),
                BTreeSet::from([a, b]),
                BTreeSet::from([b]),
            ],
            commit_order: vec![2, 0, 1],
        };
        assert_eq!(schedule.expected_outcomes(), vec![true, false, true]);
    }

    #[test]
    fn cells_render_as_rdf() {
        let cells = BTreeSet::from([Cell { node: 10, predicate: 1 }]);
        assert_eq!(cells_to_rdf(&cells, "t1"), "{ set {\n  <0xa> <balance> \"t1\" .\n} }");
        assert_eq!(cells.iter().next().unwrap().key().as_str(), "0xa|balance");
    }
}
