//! Versioned schema migrations
//!
//! Each migration is a SQL script tagged with a schema version. The database
//! records the version it is at in `PRAGMA user_version`; on open, every
//! migration after that version is applied in order, each in its own
//! transaction.

use syncbox_core::migration::MigrationList;

use crate::CacheError;

/// Builds the list of schema migrations known to this build
///
/// # Errors
/// Returns `CacheError::MigrationFailed` if two scripts share a version
pub fn schema_migrations() -> Result<MigrationList<&'static str>, CacheError> {
    MigrationList::new([
        (1, include_str!("migrations/0001_queued_changes.sql")),
        (2, include_str!("migrations/0002_failure_counters.sql")),
        (3, include_str!("migrations/0003_path_order_index.sql")),
    ])
    .map_err(|e| CacheError::MigrationFailed(e.to_string()))
}

/// Schema version a fully migrated database reports
pub fn latest_schema_version() -> Result<u32, CacheError> {
    Ok(schema_migrations()?.latest_version().unwrap_or(0))
}
