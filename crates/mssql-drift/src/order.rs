//! Deletion and insertion orders over a dependency graph.
//!
//! Both orders use Kahn's algorithm seeded in input order. Tables with no
//! dependency edges at all follow the resolved tables, and tables that never
//! become ready (members of a foreign-key cycle, or tables waiting on one)
//! come last. Both tails keep input order, so the two fallbacks are symmetric
//! and stable across runs.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;
use tracing::warn;

use crate::core::TableId;
use crate::graph::DependencyGraph;

/// A total order over a table set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderedTableSequence {
    /// Every table exactly once: resolved tables, then `isolated`, then
    /// `unresolved`.
    pub sequence: Vec<TableId>,
    /// Tables without any dependency edge, in input order.
    pub isolated: Vec<TableId>,
    /// Tables appended by the cycle fallback, in input order.
    pub unresolved: Vec<TableId>,
}

impl OrderedTableSequence {
    pub fn iter(&self) -> impl Iterator<Item = &TableId> {
        self.sequence.iter()
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn position(&self, table: &TableId) -> Option<usize> {
        self.sequence.iter().position(|t| t == table)
    }
}

#[derive(Clone, Copy)]
enum Direction {
    /// A table is ready once every table it references is done.
    ParentsFirst,
    /// A table is ready once every table referencing it is done.
    ChildrenFirst,
}

/// Children before parents: a table is deleted only after every table that
/// references it.
pub fn order_for_delete(tables: &[TableId], graph: &DependencyGraph) -> OrderedTableSequence {
    kahn(tables, graph, Direction::ChildrenFirst, "delete")
}

/// Parents before children: a table is inserted only after every table it
/// references.
pub fn order_for_insert(tables: &[TableId], graph: &DependencyGraph) -> OrderedTableSequence {
    kahn(tables, graph, Direction::ParentsFirst, "insert")
}

fn kahn(
    tables: &[TableId],
    graph: &DependencyGraph,
    direction: Direction,
    purpose: &str,
) -> OrderedTableSequence {
    let index: HashMap<&TableId, usize> = tables.iter().enumerate().map(|(i, t)| (t, i)).collect();

    // pending[i]: tables i still waits for; releases[i]: tables waiting on i
    let mut pending = vec![0usize; tables.len()];
    let mut releases: Vec<Vec<usize>> = vec![Vec::new(); tables.len()];
    let mut connected = vec![false; tables.len()];
    for (i, table) in tables.iter().enumerate() {
        let waits_on: Vec<usize> = match direction {
            Direction::ParentsFirst => graph.parents_of(table).filter_map(|p| index.get(p).copied()).collect(),
            Direction::ChildrenFirst => graph.children_of(table).filter_map(|c| index.get(c).copied()).collect(),
        };
        pending[i] = waits_on.len();
        for w in waits_on {
            connected[i] = true;
            connected[w] = true;
            releases[w].push(i);
        }
    }
    for list in &mut releases {
        list.sort_unstable();
    }

    let mut queue: VecDeque<usize> = (0..tables.len())
        .filter(|&i| connected[i] && pending[i] == 0)
        .collect();
    let mut emitted = vec![false; tables.len()];
    let mut sequence = Vec::with_capacity(tables.len());

    while let Some(i) = queue.pop_front() {
        emitted[i] = true;
        sequence.push(tables[i].clone());
        for &next in &releases[i] {
            pending[next] -= 1;
            if pending[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    let isolated: Vec<TableId> = tables
        .iter()
        .enumerate()
        .filter(|(i, _)| !connected[*i])
        .map(|(_, t)| t.clone())
        .collect();
    sequence.extend(isolated.iter().cloned());

    let unresolved: Vec<TableId> = tables
        .iter()
        .enumerate()
        .filter(|(i, _)| connected[*i] && !emitted[*i])
        .map(|(_, t)| t.clone())
        .collect();

    if !unresolved.is_empty() {
        let names: Vec<String> = unresolved.iter().map(ToString::to_string).collect();
        warn!(
            "Foreign-key cycle: {} tables appended to the {} order unresolved: {}",
            unresolved.len(),
            purpose,
            names.join(", ")
        );
        sequence.extend(unresolved.iter().cloned());
    }

    OrderedTableSequence {
        sequence,
        isolated,
        unresolved,
    }
}
