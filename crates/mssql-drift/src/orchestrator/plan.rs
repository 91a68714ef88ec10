//! What a migration will touch, computed before anything is changed.

use serde::Serialize;
use tracing::{debug, info};

use crate::core::{Database, ForeignKeyEdge, TableId};
use crate::diff::compare_tables;
use crate::error::Result;
use crate::graph::DependencyGraph;
use crate::order::{order_for_delete, order_for_insert, OrderedTableSequence};

/// Common tables, their dependency graph and both orders.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    /// Tables present in both databases, sorted by (schema, name).
    pub common_tables: Vec<TableId>,
    pub source_only: Vec<TableId>,
    pub target_only: Vec<TableId>,
    pub graph: DependencyGraph,
    pub delete_order: OrderedTableSequence,
    pub insert_order: OrderedTableSequence,
    /// Every foreign key of the target, used for orphan checks.
    pub foreign_keys: Vec<ForeignKeyEdge>,
}

impl MigrationPlan {
    /// Introspect both sides and derive the orders. Read-only.
    pub async fn build(source: &mut dyn Database, target: &mut dyn Database) -> Result<Self> {
        let source_tables = source.list_tables().await?;
        let target_tables = target.list_tables().await?;
        let comparison = compare_tables(&source_tables, &target_tables);

        // Dependencies come from the target: that is where rows are deleted and inserted
        let foreign_keys = target.list_foreign_keys().await?;
        let graph = DependencyGraph::build(&comparison.common, &foreign_keys);
        let delete_order = order_for_delete(&comparison.common, &graph);
        let insert_order = order_for_insert(&comparison.common, &graph);

        Ok(Self {
            common_tables: comparison.common,
            source_only: comparison.only_in_source,
            target_only: comparison.only_in_target,
            graph,
            delete_order,
            insert_order,
            foreign_keys,
        })
    }

    pub fn log(&self) {
        info!(
            "Found {} common tables ({} only in source, {} only in target), {} dependencies",
            self.common_tables.len(),
            self.source_only.len(),
            self.target_only.len(),
            self.graph.edge_count()
        );
        debug!("Delete order: {}", join(&self.delete_order.sequence));
        debug!("Insert order: {}", join(&self.insert_order.sequence));
    }

    /// Text shown to the operator before deletion starts.
    pub fn confirmation_prompt(&self, target_label: &str) -> String {
        format!(
            "This deletes every row of {} tables in {} and reloads them from the source",
            self.common_tables.len(),
            target_label
        )
    }
}

fn join(tables: &[TableId]) -> String {
    tables.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{fk, t};
    use crate::testing::{column, MemoryDatabase};

    #[tokio::test]
    async fn test_plan_uses_target_foreign_keys_only() {
        let cols = || vec![column("Id", "int", false)];
        let mut source = MemoryDatabase::new("source")
            .with_table(t("A"), cols())
            .with_table(t("B"), cols())
            .with_foreign_key(fk("A", "Id", "B", "Id"));
        let mut target = MemoryDatabase::new("target")
            .with_table(t("A"), cols())
            .with_table(t("B"), cols())
            .with_table(t("C"), cols())
            .with_foreign_key(fk("B", "Id", "A", "Id"));

        let plan = MigrationPlan::build(&mut source, &mut target).await.unwrap();

        assert_eq!(plan.common_tables, vec![t("A"), t("B")]);
        assert_eq!(plan.target_only, vec![t("C")]);
        assert_eq!(plan.insert_order.sequence, vec![t("A"), t("B")]);
        assert_eq!(plan.delete_order.sequence, vec![t("B"), t("A")]);
        assert!(plan.confirmation_prompt("prod").contains("2 tables in prod"));
    }
}
