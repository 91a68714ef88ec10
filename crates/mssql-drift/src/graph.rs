//! Foreign-key dependency graph over a set of tables.
//!
//! Edges point from a referencing (child) table to the referenced (parent)
//! table. Multiple foreign keys between the same pair collapse into one
//! edge here; orphan detection still looks at every foreign key separately.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use crate::core::{ForeignKeyEdge, TableId};

/// Dependency graph restricted to one table set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyGraph {
    /// Tables in the order they were supplied.
    tables: Vec<TableId>,
    /// Table -> tables it references (its parents).
    dependencies: BTreeMap<TableId, BTreeSet<TableId>>,
    /// Table -> tables that reference it (its children).
    dependents: BTreeMap<TableId, BTreeSet<TableId>>,
}

impl DependencyGraph {
    /// Build the graph for `tables` from the foreign keys in `edges`.
    ///
    /// Edges with an endpoint outside `tables` are dropped, as are
    /// self-references. Every table gets an entry, even without edges.
    pub fn build(tables: &[TableId], edges: &[ForeignKeyEdge]) -> Self {
        let mut graph = DependencyGraph {
            tables: tables.to_vec(),
            ..Default::default()
        };

        for table in tables {
            graph.dependencies.entry(table.clone()).or_default();
            graph.dependents.entry(table.clone()).or_default();
        }

        let mut dropped = 0usize;
        for edge in edges {
            if !graph.dependencies.contains_key(&edge.child)
                || !graph.dependencies.contains_key(&edge.parent)
            {
                dropped += 1;
                continue;
            }
            // A table never waits on itself
            if edge.is_self_reference() {
                continue;
            }
            if let Some(parents) = graph.dependencies.get_mut(&edge.child) {
                parents.insert(edge.parent.clone());
            }
            if let Some(children) = graph.dependents.get_mut(&edge.parent) {
                children.insert(edge.child.clone());
            }
        }

        debug!(
            "Dependency graph: {} tables, {} edges, {} foreign keys outside the table set",
            graph.tables.len(),
            graph.edge_count(),
            dropped
        );

        graph
    }

    /// Tables in supply order.
    pub fn tables(&self) -> &[TableId] {
        &self.tables
    }

    pub fn contains(&self, table: &TableId) -> bool {
        self.dependencies.contains_key(table)
    }

    /// Tables that `table` references.
    pub fn parents_of(&self, table: &TableId) -> impl Iterator<Item = &TableId> {
        self.dependencies.get(table).into_iter().flatten()
    }

    /// Tables that reference `table`.
    pub fn children_of(&self, table: &TableId) -> impl Iterator<Item = &TableId> {
        self.dependents.get(table).into_iter().flatten()
    }

    /// The full table -> parents mapping.
    pub fn dependencies(&self) -> &BTreeMap<TableId, BTreeSet<TableId>> {
        &self.dependencies
    }

    /// Number of distinct parent/child pairs.
    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn t(name: &str) -> TableId {
        TableId::new("dbo", name)
    }

    pub(crate) fn fk(child: &str, child_col: &str, parent: &str, parent_col: &str) -> ForeignKeyEdge {
        ForeignKeyEdge {
            name: format!("FK_{}_{}", child, parent),
            child: t(child),
            child_column: child_col.to_string(),
            parent: t(parent),
            parent_column: parent_col.to_string(),
        }
    }

    #[test]
    fn test_every_table_is_a_key() {
        let tables = vec![t("A"), t("B")];
        let graph = DependencyGraph::build(&tables, &[]);
        assert_eq!(graph.dependencies().len(), 2);
        assert!(graph.dependencies().values().all(BTreeSet::is_empty));
    }

    #[test]
    fn test_edges_outside_set_are_dropped() {
        let tables = vec![t("Orders"), t("Customers")];
        let edges = vec![
            fk("Orders", "CustomerId", "Customers", "Id"),
            fk("Orders", "RegionId", "Regions", "Id"),
            fk("Audit", "OrderId", "Orders", "Id"),
        ];
        let graph = DependencyGraph::build(&tables, &edges);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.parents_of(&t("Orders")).collect::<Vec<_>>(), vec![&t("Customers")]);
        assert!(!graph.contains(&t("Audit")));
    }

    #[test]
    fn test_parallel_edges_collapse_and_self_references_ignored() {
        let tables = vec![t("Orders"), t("Customers")];
        let edges = vec![
            fk("Orders", "CustomerId", "Customers", "Id"),
            fk("Orders", "BillToId", "Customers", "Id"),
            fk("Orders", "ParentOrderId", "Orders", "Id"),
        ];
        let graph = DependencyGraph::build(&tables, &edges);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.children_of(&t("Customers")).count(), 1);
        assert_eq!(graph.children_of(&t("Orders")).count(), 0);
    }

    #[test]
    fn test_build_is_deterministic() {
        let tables = vec![t("C"), t("A"), t("B")];
        let edges = vec![fk("A", "b", "B", "id"), fk("B", "c", "C", "id")];
        let first = DependencyGraph::build(&tables, &edges);
        let second = DependencyGraph::build(&tables, &edges);
        assert_eq!(first.dependencies(), second.dependencies());
        assert_eq!(first.tables(), second.tables());
    }
}
