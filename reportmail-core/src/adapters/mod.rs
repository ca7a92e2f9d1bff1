//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the Repository and DirectorySource ports
//! - Microsoft Graph HTTP client for the MailboxGateway port
//! - Local `.eml` directory for the MailboxGateway port
//! - In-memory mailbox for tests and dry runs

pub mod duckdb;
pub mod graph;
pub mod maildir;
pub mod memory;

#[cfg(test)]
pub mod graph_mock;
