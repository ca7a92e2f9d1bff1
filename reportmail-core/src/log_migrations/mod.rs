//! Log database migrations - embedded SQL files
//!
//! Kept separate from the main schema so logs.duckdb can be deleted or
//! shipped for troubleshooting without touching ingested data.

/// All log migrations, embedded at compile time.
/// Format: (filename, sql_content)
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_ingest_events.sql", include_str!("001_ingest_events.sql")),
];
