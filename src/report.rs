//! Headless query: load, filter, sort and serialize without the terminal UI.

use serde::Serialize;

use crate::error::LoadError;
use crate::filter::FilterCondition;
use crate::nl_parse::parse_natural_language;
use crate::pipeline::{run_indices, SortKey};
use crate::row::Row;
use crate::store::RowStore;

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub search: String,
    /// Free-text filter, parsed like the UI's query box.
    pub query: String,
    pub conditions: Vec<FilterCondition>,
    pub sort: Vec<SortKey>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub region: String,
    pub currency: String,
    /// Rows that matched, before `limit`.
    pub total: usize,
    pub rows: Vec<Row>,
    pub unrecognized: Vec<String>,
}

pub fn run_report(
    store: &mut RowStore,
    region: &str,
    request: &QueryRequest,
) -> Result<QueryReport, LoadError> {
    let set = store.load(region)?;
    let currency = store
        .region(region)
        .map(|r| r.currency.clone())
        .unwrap_or_default();

    let parsed = parse_natural_language(&request.query);
    let mut conditions = request.conditions.clone();
    conditions.extend(parsed.filters);

    let indices = run_indices(&set.rows, &request.search, &conditions, &request.sort);
    let total = indices.len();
    let rows = indices
        .into_iter()
        .take(request.limit.unwrap_or(usize::MAX))
        .map(|i| set.rows[i].clone())
        .collect();

    Ok(QueryReport {
        region: region.to_string(),
        currency,
        total,
        rows,
        unrecognized: parsed.unrecognized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionConfig;
    use crate::price::FallbackChain;
    use crate::row::Field;
    use crate::store::{MemorySource, RawTable};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn store() -> RowStore {
        let table = RawTable::new()
            .with_texts("rate_code", vec![Some("A"), Some("B"), Some("C")])
            .with_texts(
                "rate_original_name",
                vec![Some("Sand"), Some("Brick"), Some("Steel")],
            )
            .with_numbers("resource_cost", vec![Some(50.0), Some(150.0), None])
            .with_numbers("price_est_median", vec![None, None, Some(90.0)]);
        RowStore::new(
            Arc::new(MemorySource::new().with_table("DE_BERLIN", table)),
            Arc::new(FallbackChain::default()),
        )
        .with_region(
            "DE_BERLIN",
            RegionConfig {
                path: PathBuf::from("DE_BERLIN.parquet"),
                currency: "EUR".to_string(),
                locale: "de-DE".to_string(),
                label: None,
            },
        )
    }

    #[test]
    fn test_report_applies_query_sort_and_limit() {
        let mut store = store();
        let request = QueryRequest {
            query: "cost > 60, bogus words".to_string(),
            sort: vec![SortKey::desc(Field::Cost)],
            limit: Some(1),
            ..Default::default()
        };
        let report = run_report(&mut store, "DE_BERLIN", &request).unwrap();
        assert_eq!(report.currency, "EUR");
        assert_eq!(report.total, 2);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].id, "B");
        assert_eq!(report.unrecognized, vec!["bogus words".to_string()]);
    }

    #[test]
    fn test_report_json_shape() {
        let mut store = store();
        let report = run_report(&mut store, "DE_BERLIN", &QueryRequest::default()).unwrap();
        let value = serde_json::to_value(&report).unwrap();
        for key in ["region", "currency", "total", "rows", "unrecognized"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["rows"][2]["unit_cost"], serde_json::json!(90.0));
    }

    #[test]
    fn test_report_unknown_region() {
        let mut store = store();
        let err = run_report(&mut store, "XX", &QueryRequest::default()).unwrap_err();
        assert!(matches!(err, LoadError::InvalidRegion(_)));
    }
}
