//! Search, filter and sort over a loaded row set.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::filter::{compile_structured, FilterCondition};
use crate::row::{CellValue, Field, Row};
use crate::store::RowSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn arrow(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "↑",
            SortDirection::Descending => "↓",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: Field,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: Field) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(field: Field) -> Self {
        Self {
            field,
            direction: SortDirection::Descending,
        }
    }

    /// Parses `field` or `field:desc` / `field:asc`.
    pub fn parse(s: &str) -> Option<Self> {
        let (name, direction) = match s.split_once(':') {
            Some((name, dir)) => {
                let direction = match dir.trim().to_lowercase().as_str() {
                    "asc" | "ascending" => SortDirection::Ascending,
                    "desc" | "descending" => SortDirection::Descending,
                    _ => return None,
                };
                (name, direction)
            }
            None => (s, SortDirection::Ascending),
        };
        Field::from_key(name).map(|field| Self { field, direction })
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.label(), self.direction.arrow())
    }
}

/// Case-insensitive substring match over the searchable fields.
fn matches_search(row: &Row, needle: &str) -> bool {
    Field::SEARCHABLE.iter().any(|field| {
        let cell = row.value(*field);
        !cell.is_null() && cell.to_text().to_lowercase().contains(needle)
    })
}

/// Orders two non-null cells. Numbers sort before text when a column mixes them.
fn compare_values(a: &CellValue<'_>, b: &CellValue<'_>) -> Ordering {
    match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x.total_cmp(y),
        (CellValue::Text(x), CellValue::Text(y)) => x
            .to_lowercase()
            .cmp(&y.to_lowercase())
            .then_with(|| x.cmp(y)),
        (CellValue::Number(_), CellValue::Text(_)) => Ordering::Less,
        (CellValue::Text(_), CellValue::Number(_)) => Ordering::Greater,
        (CellValue::Null, _) | (_, CellValue::Null) => Ordering::Equal,
    }
}

/// Multi-key comparison. Nulls go last regardless of direction.
pub fn compare_rows(a: &Row, b: &Row, sort: &[SortKey]) -> Ordering {
    for key in sort {
        let (x, y) = (a.value(key.field), b.value(key.field));
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = compare_values(&x, &y);
                match key.direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Source indices of the rows that pass, in display order.
pub fn run_indices(
    rows: &[Row],
    search: &str,
    conditions: &[FilterCondition],
    sort: &[SortKey],
) -> Vec<usize> {
    let needle = search.trim().to_lowercase();
    let predicate = compile_structured(conditions);
    let mut indices: Vec<usize> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| needle.is_empty() || matches_search(row, &needle))
        .filter(|(_, row)| predicate.test(row))
        .map(|(i, _)| i)
        .collect();
    if !sort.is_empty() {
        // `sort_by` is stable: ties keep source order.
        indices.sort_by(|&a, &b| compare_rows(&rows[a], &rows[b], sort));
    }
    indices
}

pub fn run<'a>(
    rows: &'a [Row],
    search: &str,
    conditions: &[FilterCondition],
    sort: &[SortKey],
) -> Vec<&'a Row> {
    run_indices(rows, search, conditions, sort)
        .into_iter()
        .map(|i| &rows[i])
        .collect()
}

struct Memo {
    rows: Arc<RowSet>,
    search: String,
    conditions: Vec<FilterCondition>,
    sort: Vec<SortKey>,
    result: Arc<[usize]>,
}

/// Caches the last pipeline result. Recomputes only when the row set
/// (by identity), search, conditions or sort change.
#[derive(Default)]
pub struct QueryPipeline {
    memo: Option<Memo>,
}

impl QueryPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(
        &mut self,
        rows: &Arc<RowSet>,
        search: &str,
        conditions: &[FilterCondition],
        sort: &[SortKey],
    ) -> Arc<[usize]> {
        if let Some(memo) = &self.memo {
            if Arc::ptr_eq(&memo.rows, rows)
                && memo.search == search
                && memo.conditions == conditions
                && memo.sort == sort
            {
                return Arc::clone(&memo.result);
            }
        }
        let result: Arc<[usize]> = run_indices(&rows.rows, search, conditions, sort).into();
        tracing::debug!(
            region = %rows.region,
            matched = result.len(),
            total = rows.len(),
            "query pipeline recomputed"
        );
        self.memo = Some(Memo {
            rows: Arc::clone(rows),
            search: search.to_string(),
            conditions: conditions.to_vec(),
            sort: sort.to_vec(),
            result: Arc::clone(&result),
        });
        result
    }

    pub fn invalidate(&mut self) {
        self.memo = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterOperator, FilterValue};
    use std::collections::BTreeSet;

    fn rows() -> Vec<Row> {
        vec![
            Row::builder("A")
                .description("Concrete slab")
                .category(Some("Concrete".into()))
                .unit_cost(Some(50.0))
                .build(),
            Row::builder("B")
                .description("Brick wall")
                .category(Some("Masonry".into()))
                .unit_cost(Some(150.0))
                .build(),
            Row::builder("C")
                .description("brick pier")
                .unit_cost(None)
                .build(),
            Row::builder("D")
                .description("Steel beam")
                .category(Some("Steel".into()))
                .unit_cost(Some(50.0))
                .build(),
        ]
    }

    fn ids(rows: Vec<&Row>) -> Vec<&str> {
        rows.into_iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_search_across_fields() {
        let data = rows();
        assert_eq!(ids(run(&data, "BRICK", &[], &[])), vec!["B", "C"]);
        assert_eq!(ids(run(&data, "masonry", &[], &[])), vec!["B"]);
        assert_eq!(ids(run(&data, "d", &[], &[])), vec!["D"]);
        assert_eq!(run(&data, "  ", &[], &[]).len(), 4);
    }

    #[test]
    fn test_search_then_filter() {
        let data = rows();
        let cond =
            FilterCondition::new(Field::Cost, FilterOperator::Gt, FilterValue::Number(100.0));
        assert_eq!(ids(run(&data, "brick", &[cond], &[])), vec!["B"]);
    }

    #[test]
    fn test_sort_is_stable_and_nulls_last() {
        let data = rows();
        let asc = run(&data, "", &[], &[SortKey::asc(Field::Cost)]);
        assert_eq!(ids(asc), vec!["A", "D", "B", "C"]);
        let desc = run(&data, "", &[], &[SortKey::desc(Field::Cost)]);
        assert_eq!(ids(desc), vec!["B", "A", "D", "C"]);
    }

    #[test]
    fn test_text_sort_case_insensitive() {
        let data = rows();
        let sorted = run(&data, "", &[], &[SortKey::asc(Field::Description)]);
        assert_eq!(ids(sorted), vec!["C", "B", "A", "D"]);
    }

    #[test]
    fn test_multi_key_sort() {
        let data = rows();
        let sort = [SortKey::asc(Field::Cost), SortKey::desc(Field::Id)];
        assert_eq!(ids(run(&data, "", &[], &sort)), vec!["D", "A", "B", "C"]);
    }

    #[test]
    fn test_run_indices_refer_to_source() {
        let data = rows();
        assert_eq!(
            run_indices(&data, "", &[], &[SortKey::desc(Field::Cost)]),
            vec![1, 0, 3, 2]
        );
    }

    #[test]
    fn test_parse_sort_key() {
        assert_eq!(SortKey::parse("cost"), Some(SortKey::asc(Field::Cost)));
        assert_eq!(SortKey::parse("total:desc"), Some(SortKey::desc(Field::Total)));
        assert_eq!(SortKey::parse("total:sideways"), None);
        assert_eq!(SortKey::parse("nope"), None);
    }

    #[test]
    fn test_query_pipeline_memoizes() {
        let set = Arc::new(RowSet::new("X", rows(), BTreeSet::new()));
        let mut pipeline = QueryPipeline::new();
        let first = pipeline.run(&set, "brick", &[], &[]);
        let second = pipeline.run(&set, "brick", &[], &[]);
        assert!(Arc::ptr_eq(&first, &second));

        let third = pipeline.run(&set, "steel", &[], &[]);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(&*third, &[3]);

        let reloaded = Arc::new(RowSet::new("X", rows(), BTreeSet::new()));
        let fourth = pipeline.run(&reloaded, "steel", &[], &[]);
        assert!(!Arc::ptr_eq(&third, &fourth));
    }
}
