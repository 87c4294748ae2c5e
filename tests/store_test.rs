mod common;

use cwicr::filter::{FilterCondition, FilterOperator, FilterValue};
use cwicr::pipeline::{run, SortKey};
use cwicr::{Field, LoadError, RowStore};
use std::sync::Arc;
use std::time::Duration;

fn cost_over_100() -> Vec<FilterCondition> {
    vec![FilterCondition::new(
        Field::Cost,
        FilterOperator::Gt,
        FilterValue::Number(100.0),
    )]
}

#[test]
fn test_parquet_region_scenario() {
    let (_dir, config) = common::fixture_config();
    let mut store = RowStore::from_config(&config);
    let set = store.load("PQ").unwrap();

    assert_eq!(set.len(), 3);
    assert_eq!(set.rows[2].unit_cost, None);
    assert_eq!(set.rows[0].subtotal, Some(100.0));
    assert!(set.fields.contains(&Field::Material));

    let ids: Vec<&str> = run(&set.rows, "", &cost_over_100(), &[])
        .into_iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(ids, vec!["B"]);
}

#[test]
fn test_csv_region_matches_parquet() {
    let (_dir, config) = common::fixture_config();
    let mut store = RowStore::from_config(&config);
    let csv = store.load("CSV").unwrap();
    let parquet = store.load("PQ").unwrap();
    assert_eq!(csv.rows, parquet.rows);
}

#[test]
fn test_cache_hit_within_ttl() {
    let (_dir, config) = common::fixture_config();
    let mut store = RowStore::from_config(&config);
    let first = store.load("PQ").unwrap();
    let second = store.load("PQ").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    store.invalidate("PQ");
    let third = store.load("PQ").unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
}

#[test]
fn test_expired_entry_is_reread() {
    let (_dir, config) = common::fixture_config();
    let mut store = RowStore::from_config(&config).with_ttl(Duration::ZERO);
    let first = store.load("PQ").unwrap();
    let second = store.load("PQ").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

#[test]
fn test_load_errors() {
    let (_dir, config) = common::fixture_config();
    let mut store = RowStore::from_config(&config);

    let err = store.load("NOWHERE").unwrap_err();
    assert_eq!(err, LoadError::InvalidRegion("NOWHERE".to_string()));
    assert!(!err.is_retryable());

    let err = store.load("GONE").unwrap_err();
    assert!(matches!(err, LoadError::DataUnavailable { .. }));
    assert!(err.is_retryable());
}

#[test]
fn test_sort_and_search_over_loaded_rows() {
    let (_dir, config) = common::fixture_config();
    let mut store = RowStore::from_config(&config);
    let set = store.load("PQ").unwrap();

    let by_cost: Vec<&str> = run(&set.rows, "", &[], &[SortKey::desc(Field::Cost)])
        .into_iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(by_cost, vec!["B", "A", "C"]);

    let masonry: Vec<&str> = run(&set.rows, "MASON", &[], &[])
        .into_iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(masonry, vec!["B"]);
}
