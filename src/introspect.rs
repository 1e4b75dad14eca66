//! Foreign-key discovery from catalog metadata.

use crate::db::{Database, Pool};
use crate::errors::{AuditError, SqlxResultExt};
use crate::models::ForeignKey;

/// Lists tables and their single-column foreign keys.
#[allow(async_fn_in_trait)]
pub trait SchemaIntrospector {
    /// Base tables of the audited schema, in listing order.
    async fn list_tables(&self) -> Result<Vec<String>, AuditError>;

    /// Foreign keys declared on `table` that reference the audited schema.
    /// A table without constraints yields an empty vector.
    async fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>, AuditError>;
}

/// One `(constraint, column, parent table, parent column)` catalog row.
pub type KeyColumnRow = (String, String, String, String);

const MYSQL_TABLES: &str = r#"
    SELECT CAST(TABLE_NAME AS CHAR)
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

const MYSQL_FOREIGN_KEYS: &str = r#"
    SELECT CAST(CONSTRAINT_NAME AS CHAR),
           CAST(COLUMN_NAME AS CHAR),
           CAST(REFERENCED_TABLE_NAME AS CHAR),
           CAST(REFERENCED_COLUMN_NAME AS CHAR)
    FROM information_schema.KEY_COLUMN_USAGE
    WHERE REFERENCED_TABLE_SCHEMA = ?
      AND TABLE_SCHEMA = ?
      AND TABLE_NAME = ?
    ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION
"#;

const PG_TABLES: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1 AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

// PostgreSQL only requires constraint names to be unique per table, so the
// columns are resolved through the constraint's own relations.
const PG_FOREIGN_KEYS: &str = r#"
    SELECT con.conname::text,
           ca.attname::text,
           pt.relname::text,
           pa.attname::text
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class ct ON ct.oid = con.conrelid
    JOIN pg_catalog.pg_namespace cn ON cn.oid = ct.relnamespace
    JOIN pg_catalog.pg_class pt ON pt.oid = con.confrelid
    JOIN pg_catalog.pg_namespace pn ON pn.oid = pt.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
        WITH ORDINALITY AS k(child_attnum, parent_attnum, ord)
    JOIN pg_catalog.pg_attribute ca
      ON ca.attrelid = con.conrelid AND ca.attnum = k.child_attnum
    JOIN pg_catalog.pg_attribute pa
      ON pa.attrelid = con.confrelid AND pa.attnum = k.parent_attnum
    WHERE con.contype = 'f'
      AND cn.nspname = $1
      AND ct.relname = $2
      AND pn.nspname = $1
    ORDER BY con.conname, k.ord
"#;

impl SchemaIntrospector for Database {
    async fn list_tables(&self) -> Result<Vec<String>, AuditError> {
        match &self.pool {
            Pool::MySql(pool) => sqlx::query_scalar(MYSQL_TABLES)
                .bind(self.schema())
                .fetch_all(pool)
                .await
                .introspection(None),
            Pool::Postgres(pool) => sqlx::query_scalar(PG_TABLES)
                .bind(self.schema())
                .fetch_all(pool)
                .await
                .introspection(None),
        }
    }

    async fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>, AuditError> {
        let rows: Vec<KeyColumnRow> = match &self.pool {
            Pool::MySql(pool) => sqlx::query_as(MYSQL_FOREIGN_KEYS)
                .bind(self.schema())
                .bind(self.schema())
                .bind(table)
                .fetch_all(pool)
                .await
                .introspection(Some(table))?,
            Pool::Postgres(pool) => sqlx::query_as(PG_FOREIGN_KEYS)
                .bind(self.schema())
                .bind(table)
                .fetch_all(pool)
                .await
                .introspection(Some(table))?,
        };

        Ok(single_column_keys(table, rows))
    }
}

/// Collapses catalog rows into one `ForeignKey` per constraint, dropping
/// composite constraints. Rows must be ordered by constraint name.
pub fn single_column_keys(table: &str, rows: Vec<KeyColumnRow>) -> Vec<ForeignKey> {
    let mut keys = Vec::new();
    let mut rows = rows.into_iter().peekable();

    while let Some((constraint, column, parent_table, parent_column)) = rows.next() {
        let mut extra = 0usize;
        while rows.peek().is_some_and(|(next, ..)| *next == constraint) {
            rows.next();
            extra += 1;
        }

        if extra > 0 {
            tracing::debug!(
                "Skipping composite foreign key `{}` on `{}`",
                constraint,
                table
            );
            continue;
        }

        keys.push(ForeignKey::new(table, column, parent_table, parent_column));
    }

    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(constraint: &str, column: &str, parent: &str, parent_column: &str) -> KeyColumnRow {
        (
            constraint.to_string(),
            column.to_string(),
            parent.to_string(),
            parent_column.to_string(),
        )
    }

    #[test]
    fn test_single_column_keys_in_constraint_order() {
        let keys = single_column_keys(
            "sales_order",
            vec![
                row("FK_ORDER_CUSTOMER", "customer_id", "customer_entity", "entity_id"),
                row("FK_ORDER_STORE", "store_id", "store", "store_id"),
            ],
        );

        assert_eq!(
            keys,
            vec![
                ForeignKey::new("sales_order", "customer_id", "customer_entity", "entity_id"),
                ForeignKey::new("sales_order", "store_id", "store", "store_id"),
            ]
        );
    }

    #[test]
    fn test_composite_constraints_are_skipped() {
        let keys = single_column_keys(
            "catalog_link",
            vec![
                row("FK_COMPOSITE", "product_id", "catalog_product", "entity_id"),
                row("FK_COMPOSITE", "store_id", "catalog_product", "store_id"),
                row("FK_LINK_TYPE", "link_type_id", "catalog_link_type", "link_type_id"),
            ],
        );

        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].child_column, "link_type_id");
    }

    #[test]
    fn test_pg_query_is_scoped_to_the_constraint_relations() {
        assert!(PG_FOREIGN_KEYS.contains("ca.attrelid = con.conrelid"));
        assert!(PG_FOREIGN_KEYS.contains("pa.attrelid = con.confrelid"));
        assert!(PG_FOREIGN_KEYS.contains("ct.relname = $2"));
    }

    #[test]
    fn test_no_constraints() {
        assert!(single_column_keys("core_config_data", Vec::new()).is_empty());
    }
}
