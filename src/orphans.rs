//! Orphaned-row detection and removal.
//!
//! Existence, count and delete all render from one [`OrphanQuery`], so the
//! rows that are reported are exactly the rows that are counted and removed.

use crate::db::Database;
use crate::errors::{AuditError, SqlxResultExt};
use crate::models::ForeignKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
}

impl Dialect {
    /// Quotes an identifier, doubling any embedded quote character.
    pub fn quote(self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}

/// The anti-join shared by every orphan statement for one foreign key.
#[derive(Debug, Clone, Copy)]
pub struct OrphanQuery<'a> {
    fk: &'a ForeignKey,
    dialect: Dialect,
}

impl<'a> OrphanQuery<'a> {
    pub fn new(fk: &'a ForeignKey, dialect: Dialect) -> Self {
        Self { fk, dialect }
    }

    /// `FROM child t1 LEFT JOIN parent t2 ... WHERE <orphaned>`.
    fn predicate(&self) -> String {
        let q = |ident: &str| self.dialect.quote(ident);
        let child_col = q(&self.fk.child_column);
        let parent_col = q(&self.fk.parent_column);
        format!(
            "FROM {child} AS t1 LEFT JOIN {parent} AS t2 ON t1.{cc} = t2.{pc} \
             WHERE t2.{pc} IS NULL AND t1.{cc} IS NOT NULL",
            child = q(&self.fk.child_table),
            parent = q(&self.fk.parent_table),
            cc = child_col,
            pc = parent_col,
        )
    }

    pub fn exists_sql(&self) -> String {
        format!("SELECT 1 {} LIMIT 1", self.predicate())
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) {}", self.predicate())
    }

    pub fn delete_sql(&self) -> String {
        match self.dialect {
            Dialect::MySql => format!("DELETE t1 {}", self.predicate()),
            // PostgreSQL has no multi-table DELETE; match rows by physical id.
            Dialect::Postgres => format!(
                "DELETE FROM {} WHERE ctid IN (SELECT t1.ctid {})",
                self.dialect.quote(&self.fk.child_table),
                self.predicate()
            ),
        }
    }
}

/// Finds, counts and removes child rows whose key has no parent row.
#[allow(async_fn_in_trait)]
pub trait OrphanDetector {
    /// True iff at least one orphaned row exists. Stops at the first match.
    async fn exists(&self, fk: &ForeignKey) -> Result<bool, AuditError>;

    /// Exact number of orphaned rows right now.
    async fn count(&self, fk: &ForeignKey) -> Result<u64, AuditError>;

    /// Deletes every orphaned row in one statement and returns how many were
    /// removed. Zero is not an error.
    async fn delete_orphans(&self, fk: &ForeignKey) -> Result<u64, AuditError>;
}

impl OrphanDetector for Database {
    async fn exists(&self, fk: &ForeignKey) -> Result<bool, AuditError> {
        let sql = OrphanQuery::new(fk, self.dialect()).exists_sql();
        tracing::debug!("Checking {} for orphans", fk);
        self.fetch_any(&sql).await.query(fk)
    }

    async fn count(&self, fk: &ForeignKey) -> Result<u64, AuditError> {
        let sql = OrphanQuery::new(fk, self.dialect()).count_sql();
        let count = self.fetch_count(&sql).await.query(fk)?;
        Ok(count.max(0) as u64)
    }

    async fn delete_orphans(&self, fk: &ForeignKey) -> Result<u64, AuditError> {
        let sql = OrphanQuery::new(fk, self.dialect()).delete_sql();
        let affected = self.execute(&sql).await.repair(fk)?;
        tracing::info!("Deleted {} orphaned rows for {}", affected, fk);
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_fk() -> ForeignKey {
        ForeignKey::new("sales_order", "customer_id", "customer_entity", "entity_id")
    }

    #[test]
    fn test_mysql_statements_share_predicate() {
        let fk = orders_fk();
        let query = OrphanQuery::new(&fk, Dialect::MySql);
        let predicate = "FROM `sales_order` AS t1 LEFT JOIN `customer_entity` AS t2 \
                         ON t1.`customer_id` = t2.`entity_id` \
                         WHERE t2.`entity_id` IS NULL AND t1.`customer_id` IS NOT NULL";

        assert_eq!(query.exists_sql(), format!("SELECT 1 {} LIMIT 1", predicate));
        assert_eq!(query.count_sql(), format!("SELECT COUNT(*) {}", predicate));
        assert_eq!(query.delete_sql(), format!("DELETE t1 {}", predicate));
    }

    #[test]
    fn test_postgres_delete_uses_ctid() {
        let fk = orders_fk();
        let query = OrphanQuery::new(&fk, Dialect::Postgres);
        let predicate = "FROM \"sales_order\" AS t1 LEFT JOIN \"customer_entity\" AS t2 \
                         ON t1.\"customer_id\" = t2.\"entity_id\" \
                         WHERE t2.\"entity_id\" IS NULL AND t1.\"customer_id\" IS NOT NULL";

        assert_eq!(query.count_sql(), format!("SELECT COUNT(*) {}", predicate));
        assert_eq!(
            query.delete_sql(),
            format!(
                "DELETE FROM \"sales_order\" WHERE ctid IN (SELECT t1.ctid {})",
                predicate
            )
        );
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(Dialect::MySql.quote("we`ird"), "`we``ird`");
        assert_eq!(Dialect::Postgres.quote("we\"ird"), "\"we\"\"ird\"");
    }
}
