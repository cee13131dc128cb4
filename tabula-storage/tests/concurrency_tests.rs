//! Cross-thread behaviour of the table engine: serialized mutations, bounded
//! lock waits, idempotent retries.

use std::sync::{Arc, Barrier};
use std::thread;

use proptest::prelude::*;
use serde_json::json;
use tabula_core::{FilterSet, TabulaError};
use tabula_storage::{CreateOptions, GetOptions, ListQuery, UpdateOptions};
use tabula_test_utils::assertions::{assert_busy, assert_conflict, assert_ok};
use tabula_test_utils::fixtures::{fields, memory_catalog, widgets_catalog};
use tabula_test_utils::generators::{arb_field_map, arb_filter_clause};

#[test]
fn test_parallel_creates_get_distinct_ids() {
    let env = memory_catalog();
    let table = env.catalog.provision("Widgets").unwrap();
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                table
                    .create(&fields(json!({"n": n})), CreateOptions::default())
                    .map(|outcome| outcome.record.id)
            })
        })
        .collect();

    let mut ids: Vec<String> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(env.store.data_row_count("Widgets"), 8);
}

#[test]
fn test_parallel_idempotent_creates_write_one_row() {
    let env = memory_catalog();
    let table = env.catalog.provision("Widgets").unwrap();
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let options = CreateOptions {
                    idempotency_key: Some("retry-1".to_string()),
                    ..Default::default()
                };
                table.create(&fields(json!({"name": "A"})), options).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(outcomes.iter().filter(|o| o.created).count(), 1);
    assert!(outcomes.iter().all(|o| o.record.id == outcomes[0].record.id));
    assert_eq!(env.store.data_row_count("Widgets"), 1);
}

#[test]
fn test_racing_updates_with_same_token_one_wins() {
    let env = widgets_catalog();
    let table = env.catalog.provision("Widgets").unwrap();
    let record = table
        .create(&fields(json!({"name": "A"})), CreateOptions::default())
        .unwrap()
        .record;
    let token = record.updated_at;
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["B", "C"]
        .into_iter()
        .map(|name| {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            let id = record.id.clone();
            thread::spawn(move || {
                barrier.wait();
                let options = UpdateOptions {
                    expected_updated_at: token,
                    ..Default::default()
                };
                table.update(&id, &fields(json!({ "name": name })), options)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let (ok, failed): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_ok());
    assert_eq!(ok.len(), 1);
    assert_conflict(&failed[0]);
}

#[test]
fn test_held_lock_makes_writers_busy() {
    let env = memory_catalog();
    let table = env.catalog.provision("Widgets").unwrap();
    let guard = env.catalog.locks().acquire("Widgets").unwrap();

    let result = table.create(&fields(json!({"n": 1})), CreateOptions::default());
    assert_busy(&result);
    if let Err(TabulaError::Busy { timeout_ms, .. }) = result {
        assert_eq!(timeout_ms, 200);
    }

    // Reads do not take the lock.
    assert_ok(&table.list(&ListQuery::default()));

    drop(guard);
    assert_ok(&table.create(&fields(json!({"n": 1})), CreateOptions::default()));
}

#[test]
fn test_readers_see_committed_rows_only() {
    let env = memory_catalog();
    let table = env.catalog.provision("Widgets").unwrap();
    let id = table
        .create(&fields(json!({"n": 1})), CreateOptions::default())
        .unwrap()
        .record
        .id;

    let writer = {
        let table = Arc::clone(&table);
        let id = id.clone();
        thread::spawn(move || {
            for n in 2..20 {
                table
                    .update(&id, &fields(json!({ "n": n })), UpdateOptions::default())
                    .unwrap();
            }
        })
    };
    for _ in 0..20 {
        let record = table.get(&id, GetOptions::default()).unwrap();
        assert!(record.get("n").as_number().is_some());
    }
    writer.join().unwrap();
    let last = table.get(&id, GetOptions::default()).unwrap();
    assert_eq!(last.get("n").as_number(), Some(19.0));
}

mod prop_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Well-formed clauses always parse, and listing never errors on them.
        #[test]
        fn prop_wellformed_filters_never_fail_list(
            records in prop::collection::vec(arb_field_map(), 0..8),
            clauses in prop::collection::vec(arb_filter_clause(), 0..4),
        ) {
            let env = memory_catalog();
            let table = env.catalog.provision("T").unwrap();
            for record in &records {
                table.create(record, CreateOptions::default()).unwrap();
            }

            let filters = FilterSet::from_json(&serde_json::Value::Array(clauses.clone())).unwrap();
            prop_assert!(filters.ignored.is_empty());
            prop_assert_eq!(filters.clauses.len(), clauses.len());

            let page = table.list(&ListQuery { filters, ..Default::default() }).unwrap();
            prop_assert!(page.total <= records.len());
        }
    }
}
