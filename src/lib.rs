//! Referential Integrity Audit Library
//!
//! Discovers foreign keys from catalog metadata, finds child rows whose key
//! points at a missing parent row, and removes them interactively on request.
//!
//! # Modules
//!
//! - `config`: Connection settings (`DATABASE_URL`, `DB_*`, Magento `env.php`).
//! - `db`: Database connection and raw statement execution.
//! - `errors`: Error handling types.
//! - `introspect`: Foreign-key discovery.
//! - `models`: Foreign keys, issues and the issue registry.
//! - `orphans`: Orphan existence/count/delete queries.
//! - `repair`: Interactive repair session.
//! - `report`: Console output.
//! - `scan`: Table-by-table scan.

pub mod config;
pub mod db;
pub mod errors;
pub mod introspect;
pub mod models;
pub mod orphans;
pub mod repair;
pub mod report;
pub mod scan;
