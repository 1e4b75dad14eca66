//! In-memory catalog and row store standing in for a live database.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use rust_integrity_audit::errors::AuditError;
use rust_integrity_audit::introspect::SchemaIntrospector;
use rust_integrity_audit::models::ForeignKey;
use rust_integrity_audit::orphans::OrphanDetector;

type Row = HashMap<String, Option<i64>>;

#[derive(Default)]
pub struct FakeDatabase {
    tables: Vec<(String, Vec<ForeignKey>)>,
    rows: RefCell<HashMap<String, Vec<Row>>>,
    /// Every detector call, as `"<op> <fk>"`.
    pub calls: RefCell<Vec<String>>,
    failing_deletes: HashSet<ForeignKey>,
    failing_counts: HashSet<ForeignKey>,
    disconnecting_counts: HashSet<ForeignKey>,
    failing_tables: HashSet<String>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a table (in listing order) with its foreign keys given as
    /// `(column, parent_table, parent_column)`.
    pub fn table(mut self, name: &str, foreign_keys: &[(&str, &str, &str)]) -> Self {
        let fks = foreign_keys
            .iter()
            .map(|(col, parent, parent_col)| ForeignKey::new(name, *col, *parent, *parent_col))
            .collect();
        self.tables.push((name.to_string(), fks));
        self.rows.get_mut().entry(name.to_string()).or_default();
        self
    }

    /// Inserts one row given as `(column, value)` pairs.
    pub fn row(self, table: &str, values: &[(&str, Option<i64>)]) -> Self {
        self.insert(table, values);
        self
    }

    pub fn insert(&self, table: &str, values: &[(&str, Option<i64>)]) {
        let row = values
            .iter()
            .map(|(col, v)| (col.to_string(), *v))
            .collect();
        self.rows
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn fail_delete(mut self, fk: ForeignKey) -> Self {
        self.failing_deletes.insert(fk);
        self
    }

    /// `count` on `fk` fails with a statement-level error.
    pub fn fail_count(mut self, fk: ForeignKey) -> Self {
        self.failing_counts.insert(fk);
        self
    }

    /// `count` on `fk` fails as if the connection dropped.
    pub fn disconnect_on_count(mut self, fk: ForeignKey) -> Self {
        self.disconnecting_counts.insert(fk);
        self
    }

    pub fn fail_metadata(mut self, table: &str) -> Self {
        self.failing_tables.insert(table.to_string());
        self
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows.borrow().get(table).map_or(0, Vec::len)
    }

    pub fn foreign_key(&self, table: &str, column: &str) -> ForeignKey {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .and_then(|(_, fks)| fks.iter().find(|fk| fk.child_column == column))
            .cloned()
            .expect("foreign key declared")
    }

    pub fn calls_for_table(&self, table: &str) -> usize {
        let prefix = format!("{}.", table);
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.split_once(' ').is_some_and(|(_, fk)| fk.starts_with(&prefix)))
            .count()
    }

    fn orphan_positions(&self, fk: &ForeignKey) -> Vec<usize> {
        let rows = self.rows.borrow();
        let parents: HashSet<i64> = rows
            .get(&fk.parent_table)
            .into_iter()
            .flatten()
            .filter_map(|r| r.get(&fk.parent_column).copied().flatten())
            .collect();

        rows.get(&fk.child_table)
            .into_iter()
            .flatten()
            .enumerate()
            .filter(|(_, r)| {
                r.get(&fk.child_column)
                    .copied()
                    .flatten()
                    .is_some_and(|v| !parents.contains(&v))
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    fn record(&self, op: &str, fk: &ForeignKey) {
        self.calls.borrow_mut().push(format!("{} {}", op, fk));
    }
}

impl SchemaIntrospector for FakeDatabase {
    async fn list_tables(&self) -> Result<Vec<String>, AuditError> {
        Ok(self.tables.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>, AuditError> {
        if self.failing_tables.contains(table) {
            return Err(AuditError::Introspection {
                table: Some(table.to_string()),
                source: sqlx::Error::Protocol("catalog unavailable".into()),
            });
        }
        Ok(self
            .tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, fks)| fks.clone())
            .unwrap_or_default())
    }
}

impl OrphanDetector for FakeDatabase {
    async fn exists(&self, fk: &ForeignKey) -> Result<bool, AuditError> {
        self.record("exists", fk);
        Ok(!self.orphan_positions(fk).is_empty())
    }

    async fn count(&self, fk: &ForeignKey) -> Result<u64, AuditError> {
        self.record("count", fk);
        if self.disconnecting_counts.contains(fk) {
            return Err(AuditError::Connectivity(sqlx::Error::PoolClosed));
        }
        if self.failing_counts.contains(fk) {
            return Err(AuditError::Query {
                foreign_key: fk.to_string(),
                source: sqlx::Error::Protocol("Deadlock found".into()),
            });
        }
        Ok(self.orphan_positions(fk).len() as u64)
    }

    async fn delete_orphans(&self, fk: &ForeignKey) -> Result<u64, AuditError> {
        self.record("delete", fk);
        if self.failing_deletes.contains(fk) {
            return Err(AuditError::Repair {
                foreign_key: fk.to_string(),
                source: sqlx::Error::Protocol("Lock wait timeout exceeded".into()),
            });
        }

        let doomed: HashSet<usize> = self.orphan_positions(fk).into_iter().collect();
        let mut rows = self.rows.borrow_mut();
        let table = rows.entry(fk.child_table.clone()).or_default();
        let mut idx = 0;
        table.retain(|_| {
            let keep = !doomed.contains(&idx);
            idx += 1;
            keep
        });
        Ok(doomed.len() as u64)
    }
}

/// The `orders.customer_id -> customers.id` fixture with three orphans.
pub fn shop_with_orphans() -> FakeDatabase {
    FakeDatabase::new()
        .table("customers", &[])
        .table("orders", &[("customer_id", "customers", "id")])
        .row("customers", &[("id", Some(1))])
        .row("customers", &[("id", Some(2))])
        .row("orders", &[("id", Some(10)), ("customer_id", Some(1))])
        .row("orders", &[("id", Some(11)), ("customer_id", Some(2))])
        .row("orders", &[("id", Some(12)), ("customer_id", None)])
        .row("orders", &[("id", Some(13)), ("customer_id", Some(7))])
        .row("orders", &[("id", Some(14)), ("customer_id", Some(8))])
        .row("orders", &[("id", Some(15)), ("customer_id", Some(8))])
}
