use std::fmt;

/// Error taxonomy for the auditor.
///
/// A scan stops on any error. A repair session only stops on fatal ones;
/// `Query` and `Repair` failures are recorded against the issue at hand.
#[derive(Debug)]
pub enum AuditError {
    /// Missing or malformed connection configuration.
    Config(String),
    /// The database connection could not be opened or was lost.
    Connectivity(sqlx::Error),
    /// A catalog metadata query failed.
    Introspection {
        /// Table being introspected, `None` while listing tables.
        table: Option<String>,
        source: sqlx::Error,
    },
    /// An orphan existence/count query failed.
    Query {
        foreign_key: String,
        source: sqlx::Error,
    },
    /// A delete statement failed while repairing an issue.
    Repair {
        foreign_key: String,
        source: sqlx::Error,
    },
    /// Reading a confirmation or writing console output failed.
    Terminal(std::io::Error),
    /// Error with context chain for better diagnostics.
    WithContext {
        source: Box<AuditError>,
        context: String,
    },
}

impl AuditError {
    /// Whether a repair session must stop when this error surfaces.
    pub fn is_fatal(&self) -> bool {
        match self {
            AuditError::Query { .. } | AuditError::Repair { .. } => false,
            AuditError::WithContext { source, .. } => source.is_fatal(),
            _ => true,
        }
    }
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AuditError::Connectivity(e) => write!(f, "Database connection error: {}", e),
            AuditError::Introspection {
                table: Some(table),
                source,
            } => write!(f, "Failed to read metadata for table `{}`: {}", table, source),
            AuditError::Introspection {
                table: None,
                source,
            } => write!(f, "Failed to list tables: {}", source),
            AuditError::Query {
                foreign_key,
                source,
            } => write!(f, "Orphan query failed for {}: {}", foreign_key, source),
            AuditError::Repair {
                foreign_key,
                source,
            } => write!(f, "Repair failed for {}: {}", foreign_key, source),
            AuditError::Terminal(e) => write!(f, "Terminal I/O error: {}", e),
            AuditError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AuditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuditError::Config(_) => None,
            AuditError::Connectivity(e) => Some(e),
            AuditError::Introspection { source, .. }
            | AuditError::Query { source, .. }
            | AuditError::Repair { source, .. } => Some(source),
            AuditError::Terminal(e) => Some(e),
            AuditError::WithContext { source, .. } => Some(source.as_ref()),
        }
    }
}

impl From<std::io::Error> for AuditError {
    fn from(err: std::io::Error) -> Self {
        AuditError::Terminal(err)
    }
}

/// True for failures of the connection itself rather than of one statement.
fn is_connectivity(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// Extension for sqlx results, mapping errors into the audit taxonomy.
pub trait SqlxResultExt<T> {
    /// Metadata query failure; `table` is `None` while listing tables.
    fn introspection(self, table: Option<&str>) -> Result<T, AuditError>;

    /// Orphan existence/count failure for the given foreign key.
    fn query(self, foreign_key: impl fmt::Display) -> Result<T, AuditError>;

    /// Delete failure for the given foreign key.
    fn repair(self, foreign_key: impl fmt::Display) -> Result<T, AuditError>;

    /// Add context; connection-level failures become `Connectivity`.
    fn context(self, context: impl Into<String>) -> Result<T, AuditError>;
}

impl<T> SqlxResultExt<T> for Result<T, sqlx::Error> {
    fn introspection(self, table: Option<&str>) -> Result<T, AuditError> {
        self.map_err(|e| {
            if is_connectivity(&e) {
                AuditError::Connectivity(e)
            } else {
                AuditError::Introspection {
                    table: table.map(str::to_string),
                    source: e,
                }
            }
        })
    }

    fn query(self, foreign_key: impl fmt::Display) -> Result<T, AuditError> {
        self.map_err(|e| {
            if is_connectivity(&e) {
                AuditError::Connectivity(e)
            } else {
                AuditError::Query {
                    foreign_key: foreign_key.to_string(),
                    source: e,
                }
            }
        })
    }

    fn repair(self, foreign_key: impl fmt::Display) -> Result<T, AuditError> {
        // Statement-level failures here stay recoverable, even if the
        // connection dropped: the next issue surfaces that on its own.
        self.map_err(|e| AuditError::Repair {
            foreign_key: foreign_key.to_string(),
            source: e,
        })
    }

    fn context(self, context: impl Into<String>) -> Result<T, AuditError> {
        self.map_err(|e| AuditError::WithContext {
            source: Box::new(AuditError::Connectivity(e)),
            context: context.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_errors_are_recoverable() {
        let err: Result<(), _> =
            Err::<(), _>(sqlx::Error::Protocol("lock wait timeout".into())).repair("a.b -> c.d");
        let err = err.unwrap_err();
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("a.b -> c.d"));
    }

    #[test]
    fn test_query_errors_are_recoverable_unless_connection_is_lost() {
        let err = Err::<(), _>(sqlx::Error::Protocol("deadlock".into()))
            .query("a.b -> c.d")
            .unwrap_err();
        assert!(matches!(err, AuditError::Query { .. }));
        assert!(!err.is_fatal());

        let err = Err::<(), _>(sqlx::Error::PoolClosed)
            .query("a.b -> c.d")
            .unwrap_err();
        assert!(matches!(err, AuditError::Connectivity(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_pool_failures_become_connectivity() {
        let err = Err::<(), _>(sqlx::Error::PoolClosed)
            .introspection(Some("orders"))
            .unwrap_err();
        assert!(matches!(err, AuditError::Connectivity(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_introspection_message_names_table() {
        let err = Err::<(), _>(sqlx::Error::Protocol("boom".into()))
            .introspection(Some("orders"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Failed to read metadata for table `orders`: "));
        assert!(msg.ends_with("boom"));
    }

    #[test]
    fn test_context_chain() {
        let err = Err::<(), _>(sqlx::Error::PoolTimedOut)
            .context("Connecting to shop@localhost")
            .unwrap_err();
        assert!(err.to_string().starts_with("Connecting to shop@localhost: "));
        assert!(err.is_fatal());
    }
}
