//! Utility to print the tables and single-column foreign keys the auditor
//! would check.

use std::path::PathBuf;

use rust_integrity_audit::config::{Config, DEFAULT_ENV_PHP};
use rust_integrity_audit::db::Database;
use rust_integrity_audit::introspect::SchemaIntrospector;

/// Main entry point for the schema inspection utility.
///
/// Uses the same configuration sources as the auditor; an optional first
/// argument overrides the `env.php` path.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let env_php = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_PHP));
    let config = Config::load(&env_php)?;
    let db = Database::connect(&config).await?;

    let tables = db.list_tables().await?;
    println!("Found {} tables in `{}`:", tables.len(), db.schema());
    for table in &tables {
        println!("- {}", table);
        for fk in db.list_foreign_keys(table).await? {
            println!("  - {} -> {}.{}", fk.child_column, fk.parent_table, fk.parent_column);
        }
    }

    Ok(())
}
