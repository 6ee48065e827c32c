//! Concurrent database access tests
//!
//! Several threads share one repository, the way the CLI and an import run
//! share the register. All access serializes on the connection mutex.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::TempDir;

use godsacre_core::adapters::duckdb::DuckDbRepository;
use godsacre_core::domain::{FieldMap, Record};
use godsacre_core::ports::Repository;
use godsacre_core::{EntityKind, Value};

/// Number of concurrent threads
const THREAD_COUNT: usize = 6;

/// Number of iterations per thread
const ITERATIONS_PER_THREAD: usize = 5;

fn spot_key(column: usize) -> FieldMap {
    let mut key = FieldMap::new();
    key.insert("parcel", Value::text("A1"));
    key.insert("row", Value::text("1"));
    key.insert("column", Value::text(column.to_string()));
    key
}

fn shared_repo(temp_dir: &TempDir) -> Arc<DuckDbRepository> {
    let repo = DuckDbRepository::new(&temp_dir.path().join("test_concurrent.duckdb")).unwrap();
    repo.ensure_schema().unwrap();
    Arc::new(repo)
}

/// Test: every thread resolves the same natural keys; each key is stored once
#[test]
fn test_concurrent_get_or_create_same_keys() {
    let temp_dir = TempDir::new().unwrap();
    let repo = shared_repo(&temp_dir);
    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let created = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|thread_id| {
            let repo = Arc::clone(&repo);
            let barrier = Arc::clone(&barrier);
            let created = Arc::clone(&created);
            let errors = Arc::clone(&errors);
            thread::spawn(move || {
                barrier.wait();
                for column in 1..=ITERATIONS_PER_THREAD {
                    match repo.get_or_create(EntityKind::Spot, &spot_key(column), &FieldMap::new())
                    {
                        Ok((_, true)) => {
                            created.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok((_, false)) => {}
                        Err(e) => {
                            eprintln!("Thread {}: error at column {}: {}", thread_id, column, e);
                            errors.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(created.load(Ordering::SeqCst), ITERATIONS_PER_THREAD);
    assert_eq!(
        repo.count(EntityKind::Spot).unwrap() as usize,
        ITERATIONS_PER_THREAD
    );
}

/// Test: readers and writers interleave without errors
#[test]
fn test_concurrent_read_write_operations() {
    let temp_dir = TempDir::new().unwrap();
    let repo = shared_repo(&temp_dir);
    let errors = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];
    for thread_id in 0..THREAD_COUNT {
        let repo = Arc::clone(&repo);
        let errors = Arc::clone(&errors);
        handles.push(thread::spawn(move || {
            for i in 0..ITERATIONS_PER_THREAD {
                let result = if thread_id % 2 == 0 {
                    let mut company = Record::new(EntityKind::Company);
                    company
                        .set("name", Value::text(format!("Firma {}-{}", thread_id, i)))
                        .and_then(|_| repo.save(&mut company))
                } else {
                    repo.find_by_fields(EntityKind::Company, &FieldMap::new())
                        .map(|_| ())
                };
                if let Err(e) = result {
                    eprintln!("Thread {}: {}", thread_id, e);
                    errors.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(errors.load(Ordering::SeqCst), 0);
    let writers = (0..THREAD_COUNT).filter(|t| t % 2 == 0).count();
    assert_eq!(
        repo.count(EntityKind::Company).unwrap() as usize,
        writers * ITERATIONS_PER_THREAD
    );
}

/// Test: links written from several threads all survive
#[test]
fn test_concurrent_relation_writes() {
    let temp_dir = TempDir::new().unwrap();
    let repo = shared_repo(&temp_dir);

    let spots: Vec<i64> = (1..=3)
        .map(|c| {
            repo.get_or_create(EntityKind::Spot, &spot_key(c), &FieldMap::new())
                .unwrap()
                .0
                .id
                .unwrap()
        })
        .collect();
    let spots = Arc::new(spots);

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|_| {
            let repo = Arc::clone(&repo);
            let spots = Arc::clone(&spots);
            thread::spawn(move || {
                let mut construction = Record::new(EntityKind::Construction);
                construction.set("type", Value::text("t")).unwrap();
                repo.save(&mut construction).unwrap();
                repo.set_relation(&construction, "spots", &spots).unwrap();
                construction.id.unwrap()
            })
        })
        .collect();

    let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for id in ids {
        let members = repo
            .relation_values(EntityKind::Construction, id, "spots")
            .unwrap();
        assert_eq!(members.len(), 3);
    }
}
