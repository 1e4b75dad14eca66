use std::fmt;

use crate::errors::AuditError;
use crate::introspect::SchemaIntrospector;
use crate::models::{Issue, IssueRegistry};
use crate::orphans::OrphanDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Ok,
    Failed,
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableStatus::Ok => write!(f, "OK"),
            TableStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Receives per-table progress while a scan runs.
pub trait ScanObserver {
    /// Called before table `index` (1-based) of `total` is checked.
    fn table_started(&mut self, _index: usize, _total: usize, _table: &str) -> std::io::Result<()> {
        Ok(())
    }

    /// Called once the table is checked.
    fn table_finished(&mut self, _table: &str, _status: TableStatus) -> std::io::Result<()> {
        Ok(())
    }
}

/// Observer for silent scans.
pub struct NoProgress;

impl ScanObserver for NoProgress {}

/// Result of a completed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub registry: IssueRegistry,
    pub tables_scanned: usize,
    pub foreign_keys_checked: usize,
}

/// Walks every table in listing order and records orphaned-row issues.
pub struct ScanOrchestrator<'a, S, D> {
    introspector: &'a S,
    detector: &'a D,
}

impl<'a, S, D> ScanOrchestrator<'a, S, D>
where
    S: SchemaIntrospector,
    D: OrphanDetector,
{
    pub fn new(introspector: &'a S, detector: &'a D) -> Self {
        Self {
            introspector,
            detector,
        }
    }

    /// Runs the scan. Any metadata or query failure aborts it.
    pub async fn run(&self, observer: &mut impl ScanObserver) -> Result<ScanOutcome, AuditError> {
        let tables = self.introspector.list_tables().await?;
        let total = tables.len();
        let mut outcome = ScanOutcome::default();

        for (idx, table) in tables.iter().enumerate() {
            observer.table_started(idx + 1, total, table)?;

            let foreign_keys = self.introspector.list_foreign_keys(table).await?;
            tracing::debug!("Table `{}`: {} foreign keys", table, foreign_keys.len());

            let mut table_issues = 0usize;
            for fk in foreign_keys {
                outcome.foreign_keys_checked += 1;
                if self.detector.exists(&fk).await? {
                    tracing::debug!("Orphaned rows found for {}", fk);
                    outcome.registry.push(Issue::orphaned_record(fk));
                    table_issues += 1;
                }
            }

            let status = if table_issues > 0 {
                TableStatus::Failed
            } else {
                TableStatus::Ok
            };
            outcome.tables_scanned += 1;
            observer.table_finished(table, status)?;
        }

        tracing::info!(
            "Scan complete: {} tables, {} foreign keys, {} issues",
            outcome.tables_scanned,
            outcome.foreign_keys_checked,
            outcome.registry.len()
        );
        Ok(outcome)
    }
}
