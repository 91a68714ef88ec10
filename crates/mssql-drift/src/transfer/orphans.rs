//! Orphaned foreign-key detection.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::core::{Database, ForeignKeyEdge, KeyValue, RowBatch, SqlValue, TableId};
use crate::error::Result;

use super::report::OrphanReport;

/// Most orphan values spelled out in a single log line.
const LOGGED_ORPHANS: usize = 5;

/// Remove rows whose foreign-key values have no referenced row in the target.
///
/// Every foreign key of `table` is checked on its own, so a row goes as soon
/// as any one of its references is orphaned. Self-references are evaluated
/// after the cross-table keys and repeated until no more rows drop, since
/// removing a row can orphan the rows that point at it.
pub(crate) async fn filter_orphans(
    target: &mut dyn Database,
    table: &TableId,
    batch: &mut RowBatch,
    foreign_keys: &[ForeignKeyEdge],
    lookup_batch: usize,
) -> Result<Vec<OrphanReport>> {
    let (self_refs, cross): (Vec<&ForeignKeyEdge>, Vec<&ForeignKeyEdge>) = foreign_keys
        .iter()
        .filter(|e| &e.child == table)
        .partition(|e| e.is_self_reference());

    let mut reports = Vec::new();
    for edge in cross {
        if let Some(report) = check_edge(target, batch, edge, lookup_batch).await? {
            reports.push(report);
        }
    }

    loop {
        let mut dropped_any = false;
        for edge in &self_refs {
            if let Some(report) = check_edge(target, batch, edge, lookup_batch).await? {
                dropped_any |= report.rows_dropped > 0;
                merge(&mut reports, report);
            }
        }
        if !dropped_any || batch.is_empty() {
            break;
        }
    }

    Ok(reports)
}

async fn check_edge(
    target: &mut dyn Database,
    batch: &mut RowBatch,
    edge: &ForeignKeyEdge,
    lookup_batch: usize,
) -> Result<Option<OrphanReport>> {
    let Some(idx) = batch.column_index(&edge.child_column) else {
        warn!(
            "{}: column {} of {} was not read; reference not checked",
            edge.child, edge.child_column, edge.name
        );
        return Ok(None);
    };

    let (keys, incomparable) = batch.distinct_keys(idx);
    if incomparable > 0 {
        warn!(
            "{}: {} values of {} cannot be compared as keys; those rows are not checked",
            edge.child, incomparable, edge.child_column
        );
    }
    if keys.is_empty() {
        return Ok(None);
    }

    let values: Vec<KeyValue> = keys.iter().cloned().collect();
    let mut existing: HashSet<KeyValue> = HashSet::new();
    for chunk in values.chunks(lookup_batch.max(1)) {
        let found = target
            .existing_key_values(&edge.parent, &edge.parent_column, chunk)
            .await?;
        existing.extend(found.iter().map(KeyValue::lookup_form));
    }
    if edge.is_self_reference() {
        if let Some(parent_idx) = batch.column_index(&edge.parent_column) {
            existing.extend(batch.distinct_keys(parent_idx).0.iter().map(KeyValue::lookup_form));
        }
    }

    let orphans: BTreeSet<KeyValue> = keys
        .into_iter()
        .filter(|k| !existing.contains(&k.lookup_form()))
        .collect();
    debug!(
        "{}: {} distinct values checked against {}.{}, {} orphaned",
        edge.child,
        values.len(),
        edge.parent,
        edge.parent_column,
        orphans.len()
    );
    if orphans.is_empty() {
        return Ok(None);
    }

    let orphan_forms: HashSet<KeyValue> = orphans.iter().map(KeyValue::lookup_form).collect();
    let rows_dropped = batch.retain(|row| {
        row.get(idx)
            .and_then(SqlValue::key)
            .map_or(true, |k| !orphan_forms.contains(&k.lookup_form()))
    });

    let sample: Vec<String> = orphans.iter().take(LOGGED_ORPHANS).map(ToString::to_string).collect();
    warn!(
        "{}: FK {} references {}({}) with {} orphaned values [{}{}]; {} rows skipped",
        edge.child,
        edge.child_column,
        edge.parent,
        edge.parent_column,
        orphans.len(),
        sample.join(", "),
        if orphans.len() > LOGGED_ORPHANS { ", ..." } else { "" },
        rows_dropped
    );

    Ok(Some(OrphanReport {
        foreign_key: edge.name.clone(),
        column: edge.child_column.clone(),
        referenced_table: edge.parent.clone(),
        referenced_column: edge.parent_column.clone(),
        orphan_values: orphans.into_iter().collect(),
        rows_dropped,
    }))
}

/// Reorder rows so a row referenced through a self-referencing foreign key
/// comes before the rows pointing at it. Inserts are split into several
/// statements and each statement is checked on its own, so a parent row in a
/// later statement would fail its children. Rows caught in a reference cycle
/// keep their input order at the end. Returns how many rows changed position.
pub(crate) fn order_self_references(
    table: &TableId,
    batch: &mut RowBatch,
    foreign_keys: &[ForeignKeyEdge],
) -> usize {
    let links: Vec<(usize, usize)> = foreign_keys
        .iter()
        .filter(|e| &e.child == table && e.is_self_reference())
        .filter_map(|e| Some((batch.column_index(&e.child_column)?, batch.column_index(&e.parent_column)?)))
        .collect();
    if links.is_empty() {
        return 0;
    }

    // pending[i]: parents of row i not yet placed; releases[i]: rows waiting on i
    let rows = batch.len();
    let mut pending = vec![0usize; rows];
    let mut releases: Vec<Vec<usize>> = vec![Vec::new(); rows];
    for (child_idx, parent_idx) in links {
        let mut owners: HashMap<KeyValue, usize> = HashMap::new();
        for (i, row) in batch.rows.iter().enumerate() {
            if let Some(key) = row.get(parent_idx).and_then(SqlValue::key) {
                owners.entry(key.lookup_form()).or_insert(i);
            }
        }
        for (i, row) in batch.rows.iter().enumerate() {
            let parent = row
                .get(child_idx)
                .and_then(SqlValue::key)
                .and_then(|k| owners.get(&k.lookup_form()).copied());
            if let Some(p) = parent.filter(|&p| p != i) {
                pending[i] += 1;
                releases[p].push(i);
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..rows).filter(|&i| pending[i] == 0).collect();
    let mut placed = vec![false; rows];
    let mut order = Vec::with_capacity(rows);
    while let Some(i) = queue.pop_front() {
        placed[i] = true;
        order.push(i);
        for &next in &releases[i] {
            pending[next] -= 1;
            if pending[next] == 0 {
                queue.push_back(next);
            }
        }
    }
    order.extend((0..rows).filter(|&i| !placed[i]));

    let moved = order.iter().enumerate().filter(|&(pos, &i)| pos != i).count();
    if moved > 0 {
        debug!("{}: {} rows reordered so referenced rows are inserted first", table, moved);
        let mut slots: Vec<Option<_>> = std::mem::take(&mut batch.rows).into_iter().map(Some).collect();
        batch.rows = order.iter().filter_map(|&i| slots[i].take()).collect();
    }
    moved
}

fn merge(reports: &mut Vec<OrphanReport>, report: OrphanReport) {
    match reports
        .iter_mut()
        .find(|r| r.foreign_key == report.foreign_key && r.column == report.column)
    {
        Some(existing) => {
            existing.rows_dropped += report.rows_dropped;
            let mut values: BTreeSet<KeyValue> = existing.orphan_values.drain(..).collect();
            values.extend(report.orphan_values);
            existing.orphan_values = values.into_iter().collect();
        }
        None => reports.push(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{fk, t};
    use crate::testing::{column, MemoryDatabase};

    fn items_batch(order_ids: &[i64]) -> RowBatch {
        RowBatch::new(
            vec!["ItemId".into(), "OrderId".into()],
            order_ids
                .iter()
                .enumerate()
                .map(|(i, id)| vec![SqlValue::Int(i as i64 + 1), SqlValue::Int(*id)])
                .collect(),
        )
    }

    fn target_with_orders(ids: &[i64]) -> MemoryDatabase {
        MemoryDatabase::new("target")
            .with_table(t("Orders"), vec![column("OrderId", "int", false)])
            .with_rows(&t("Orders"), ids.iter().map(|id| vec![SqlValue::Int(*id)]).collect())
    }

    #[tokio::test]
    async fn test_missing_parent_value_is_dropped_and_reported() {
        let mut target = target_with_orders(&[1, 2]);
        let mut batch = items_batch(&[1, 999, 2, 999]);
        let edges = vec![fk("OrderItems", "OrderId", "Orders", "OrderId")];

        let reports = filter_orphans(&mut target, &t("OrderItems"), &mut batch, &edges, 2000)
            .await
            .unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].orphan_values, vec![KeyValue::Int(999)]);
        assert_eq!(reports[0].rows_dropped, 2);
        assert_eq!(batch.len(), 2);
        assert!(batch.rows.iter().all(|r| r[1] != SqlValue::Int(999)));
    }

    #[tokio::test]
    async fn test_row_dropped_when_any_foreign_key_is_missing() {
        let mut target = MemoryDatabase::new("target")
            .with_table(t("Customers"), vec![column("CustomerId", "int", false)])
            .with_table(t("Products"), vec![column("ProductId", "int", false)])
            .with_rows(&t("Customers"), vec![vec![SqlValue::Int(1)]])
            .with_rows(&t("Products"), vec![vec![SqlValue::Int(10)]]);
        let mut batch = RowBatch::new(
            vec!["SaleId".into(), "CustomerId".into(), "ProductId".into()],
            vec![
                vec![SqlValue::Int(1), SqlValue::Int(1), SqlValue::Int(10)],
                vec![SqlValue::Int(2), SqlValue::Int(5), SqlValue::Int(10)],
                vec![SqlValue::Int(3), SqlValue::Int(1), SqlValue::Int(50)],
            ],
        );
        let edges = vec![
            fk("Sales", "CustomerId", "Customers", "CustomerId"),
            fk("Sales", "ProductId", "Products", "ProductId"),
        ];

        let reports = filter_orphans(&mut target, &t("Sales"), &mut batch, &edges, 2000)
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        let customer = reports.iter().find(|r| r.column == "CustomerId").unwrap();
        let product = reports.iter().find(|r| r.column == "ProductId").unwrap();
        assert_eq!(customer.orphan_values, vec![KeyValue::Int(5)]);
        assert_eq!(customer.rows_dropped, 1);
        assert_eq!(product.orphan_values, vec![KeyValue::Int(50)]);
        assert_eq!(product.rows_dropped, 1);
        assert_eq!(batch.rows, vec![vec![SqlValue::Int(1), SqlValue::Int(1), SqlValue::Int(10)]]);
    }

    #[tokio::test]
    async fn test_nulls_are_not_orphans() {
        let mut target = target_with_orders(&[1]);
        let mut batch = items_batch(&[1]);
        batch.rows.push(vec![SqlValue::Int(9), SqlValue::Null]);
        let edges = vec![fk("OrderItems", "OrderId", "Orders", "OrderId")];

        let reports = filter_orphans(&mut target, &t("OrderItems"), &mut batch, &edges, 2000)
            .await
            .unwrap();
        assert!(reports.is_empty());
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn test_lookups_are_chunked() {
        let mut target = target_with_orders(&[1, 2, 3, 4, 5]);
        let mut batch = items_batch(&[1, 2, 3, 4, 5]);
        let edges = vec![fk("OrderItems", "OrderId", "Orders", "OrderId")];

        filter_orphans(&mut target, &t("OrderItems"), &mut batch, &edges, 2)
            .await
            .unwrap();
        let lookups = target.log.iter().filter(|l| l.starts_with("LOOKUP")).count();
        assert_eq!(lookups, 3);
    }

    #[tokio::test]
    async fn test_self_reference_cascades() {
        // 3 -> 2 -> 1 -> 99 (missing): the whole chain goes
        let mut target = MemoryDatabase::new("target")
            .with_table(t("Employees"), vec![column("Id", "int", false), column("ManagerId", "int", true)]);
        let mut batch = RowBatch::new(
            vec!["Id".into(), "ManagerId".into()],
            vec![
                vec![SqlValue::Int(1), SqlValue::Int(99)],
                vec![SqlValue::Int(2), SqlValue::Int(1)],
                vec![SqlValue::Int(3), SqlValue::Int(2)],
                vec![SqlValue::Int(4), SqlValue::Null],
            ],
        );
        let edges = vec![fk("Employees", "ManagerId", "Employees", "Id")];

        let reports = filter_orphans(&mut target, &t("Employees"), &mut batch, &edges, 2000)
            .await
            .unwrap();

        assert_eq!(batch.len(), 1);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].rows_dropped, 3);
        assert_eq!(
            reports[0].orphan_values,
            vec![KeyValue::Int(1), KeyValue::Int(2), KeyValue::Int(99)]
        );
    }

    #[test]
    fn test_self_referenced_rows_are_ordered_first() {
        // 1 reports to 3, 3 reports to 2, 2 has no manager
        let mut batch = RowBatch::new(
            vec!["Id".into(), "ManagerId".into()],
            vec![
                vec![SqlValue::Int(1), SqlValue::Int(3)],
                vec![SqlValue::Int(3), SqlValue::Int(2)],
                vec![SqlValue::Int(2), SqlValue::Null],
                vec![SqlValue::Int(4), SqlValue::Int(4)],
            ],
        );
        let edges = vec![fk("Employees", "ManagerId", "Employees", "Id")];

        let moved = order_self_references(&t("Employees"), &mut batch, &edges);

        let ids: Vec<&SqlValue> = batch.rows.iter().map(|r| &r[0]).collect();
        assert_eq!(ids, vec![&SqlValue::Int(2), &SqlValue::Int(4), &SqlValue::Int(3), &SqlValue::Int(1)]);
        assert_eq!(moved, 4);
    }

    #[test]
    fn test_rows_without_self_reference_keep_their_order() {
        let mut batch = items_batch(&[2, 1]);
        let edges = vec![fk("OrderItems", "OrderId", "Orders", "OrderId")];

        assert_eq!(order_self_references(&t("OrderItems"), &mut batch, &edges), 0);
        assert_eq!(batch, items_batch(&[2, 1]));
    }

    #[tokio::test]
    async fn test_text_keys_match_case_insensitively() {
        let mut target = MemoryDatabase::new("target")
            .with_table(t("Countries"), vec![column("Code", "nvarchar", false)])
            .with_rows(&t("Countries"), vec![vec!["AR".into()]]);
        let mut batch = RowBatch::new(vec!["Country".into()], vec![vec!["ar".into()], vec!["zz".into()]]);
        let edges = vec![fk("Cities", "Country", "Countries", "Code")];

        let reports = filter_orphans(&mut target, &t("Cities"), &mut batch, &edges, 2000)
            .await
            .unwrap();
        assert_eq!(reports[0].orphan_values, vec![KeyValue::Text("zz".into())]);
        assert_eq!(batch.len(), 1);
    }
}
