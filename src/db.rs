use sqlx::{mysql::MySqlPoolOptions, postgres::PgPoolOptions, MySqlPool, PgPool};

use crate::config::{Config, Driver};
use crate::errors::{AuditError, SqlxResultExt};
use crate::orphans::Dialect;

/// The connection pool for whichever engine the config targets.
#[derive(Debug, Clone)]
pub enum Pool {
    MySql(MySqlPool),
    Postgres(PgPool),
}

/// A single database connection plus the schema being audited.
pub struct Database {
    pub pool: Pool,
    schema: String,
}

impl Database {
    /// Opens the connection described by `config`.
    ///
    /// The pool is capped at one connection: every statement of a run goes
    /// through the same session.
    pub async fn connect(config: &Config) -> Result<Self, AuditError> {
        let url = config.connection_url()?;
        let target = format!("{}@{}", config.database, config.host);

        let pool = match config.driver {
            Driver::MySql => Pool::MySql(
                MySqlPoolOptions::new()
                    .max_connections(1)
                    .connect(&url)
                    .await
                    .context(format!("Could not connect to {}", target))?,
            ),
            Driver::Postgres => Pool::Postgres(
                PgPoolOptions::new()
                    .max_connections(1)
                    .connect(&url)
                    .await
                    .context(format!("Could not connect to {}", target))?,
            ),
        };

        let schema: String = match &pool {
            Pool::MySql(pool) => sqlx::query_scalar("SELECT CAST(DATABASE() AS CHAR)")
                .fetch_one(pool)
                .await
                .introspection(None)?,
            Pool::Postgres(pool) => sqlx::query_scalar("SELECT current_schema()::text")
                .fetch_one(pool)
                .await
                .introspection(None)?,
        };

        tracing::info!("Connected to {} (schema `{}`)", target, schema);
        Ok(Self { pool, schema })
    }

    pub fn dialect(&self) -> Dialect {
        match self.pool {
            Pool::MySql(_) => Dialect::MySql,
            Pool::Postgres(_) => Dialect::Postgres,
        }
    }

    /// The schema (MySQL database, PostgreSQL schema) being audited.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Runs a single statement and returns the number of affected rows.
    pub async fn execute(&self, sql: &str) -> Result<u64, sqlx::Error> {
        let affected = match &self.pool {
            Pool::MySql(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
            Pool::Postgres(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
        };
        Ok(affected)
    }

    /// Whether `sql` yields at least one row.
    pub(crate) async fn fetch_any(&self, sql: &str) -> Result<bool, sqlx::Error> {
        let row = match &self.pool {
            Pool::MySql(pool) => sqlx::query(sql).fetch_optional(pool).await?.is_some(),
            Pool::Postgres(pool) => sqlx::query(sql).fetch_optional(pool).await?.is_some(),
        };
        Ok(row)
    }

    /// Single `BIGINT` result of `sql`.
    pub(crate) async fn fetch_count(&self, sql: &str) -> Result<i64, sqlx::Error> {
        match &self.pool {
            Pool::MySql(pool) => sqlx::query_scalar(sql).fetch_one(pool).await,
            Pool::Postgres(pool) => sqlx::query_scalar(sql).fetch_one(pool).await,
        }
    }
}
