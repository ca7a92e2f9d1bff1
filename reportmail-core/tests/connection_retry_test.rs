//! Connection open and retry behaviour
//!
//! Run with: cargo test --test connection_retry_test -- --nocapture

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use reportmail_core::adapters::duckdb::DuckDbRepository;
use reportmail_core::RecordKind;

/// Concurrent connection attempts all succeed
#[test]
fn test_concurrent_connections() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.duckdb");

    {
        let repo = DuckDbRepository::new(&db_path).unwrap();
        repo.ensure_schema().unwrap();
    }

    let barrier = Arc::new(Barrier::new(3));
    let db_path = Arc::new(db_path);

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            let db_path = Arc::clone(&db_path);
            thread::spawn(move || {
                barrier.wait();
                let start = Instant::now();
                match DuckDbRepository::new(&db_path) {
                    Ok(repo) => {
                        println!("Thread {}: opened after {:?}", i, start.elapsed());
                        let count = repo.count_table(RecordKind::DailyTask).map_err(|e| e.to_string());
                        // hold the connection briefly to create contention
                        thread::sleep(Duration::from_millis(100));
                        count
                    }
                    Err(e) => Err(e.to_string()),
                }
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
    assert!(failures.is_empty(), "connections failed: {:?}", failures);
    assert!(results.iter().all(|r| *r.as_ref().unwrap() == 0));
}

/// Opening and closing the same file repeatedly keeps the schema
#[test]
fn test_sequential_connections() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_sequential.duckdb");

    for i in 0..5 {
        let start = Instant::now();
        let repo = DuckDbRepository::new(&db_path).unwrap();
        repo.ensure_schema().unwrap();
        assert_eq!(repo.db_path(), Some(db_path.as_path()));
        println!("Connection {}: opened in {:?}", i, start.elapsed());
    }
}

/// A path that can never be opened fails without waiting out the retries
#[test]
fn test_non_retryable_error_fails_fast() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("missing").join("nested").join("db.duckdb");

    let start = Instant::now();
    let result = DuckDbRepository::new(&db_path);
    assert!(result.is_err());
    assert!(start.elapsed() < Duration::from_millis(750));
}
