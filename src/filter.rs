//! Structured filter conditions and their compiled predicate.
//!
//! Null policy: a null cell fails every operator except `neq`, which it
//! passes. The same applies to comparisons that cannot be made at all, such
//! as ordering a non-numeric text against a number.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::row::{CellValue, Field, Row};

#[derive(Debug, Clone, PartialEq, Eq, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    Between,
    In,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Neq => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Gte => ">=",
            FilterOperator::Lt => "<",
            FilterOperator::Lte => "<=",
            FilterOperator::Contains => "contains",
            FilterOperator::Between => "between",
            FilterOperator::In => "in",
        }
    }

    pub fn iterator() -> impl Iterator<Item = FilterOperator> {
        [
            FilterOperator::Eq,
            FilterOperator::Neq,
            FilterOperator::Gt,
            FilterOperator::Gte,
            FilterOperator::Lt,
            FilterOperator::Lte,
            FilterOperator::Contains,
            FilterOperator::Between,
            FilterOperator::In,
        ]
        .iter()
        .copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Currency,
    Area,
    Mass,
    Count,
}

/// Unit attached to a filter value. Display only; never changes comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitTag {
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "GBP")]
    Gbp,
    #[serde(rename = "sqm")]
    SquareMeter,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "t")]
    Tonne,
    #[serde(rename = "pcs")]
    Piece,
}

impl UnitTag {
    pub fn kind(&self) -> UnitKind {
        match self {
            UnitTag::Eur | UnitTag::Usd | UnitTag::Gbp => UnitKind::Currency,
            UnitTag::SquareMeter => UnitKind::Area,
            UnitTag::Kilogram | UnitTag::Tonne => UnitKind::Mass,
            UnitTag::Piece => UnitKind::Count,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            UnitTag::Eur => "€",
            UnitTag::Usd => "$",
            UnitTag::Gbp => "£",
            UnitTag::SquareMeter => "m²",
            UnitTag::Kilogram => "kg",
            UnitTag::Tonne => "t",
            UnitTag::Piece => "pcs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", format_number(*n)),
            Scalar::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterValue {
    Number(f64),
    Text(String),
    /// Inclusive on both bounds.
    Range(f64, f64),
    Set(Vec<Scalar>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: Field,
    pub operator: FilterOperator,
    pub value: FilterValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<UnitTag>,
}

/// Number formatting for labels: integers without decimals, otherwise trimmed.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let s = format!("{:.4}", n);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

impl FilterCondition {
    pub fn new(field: Field, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field,
            operator,
            value,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: Option<UnitTag>) -> Self {
        self.unit = unit;
        self
    }

    /// Display label, e.g. `Material > 500 €` or `Area between 100–500 m²`.
    pub fn label(&self) -> String {
        let suffix = self
            .unit
            .map(|u| format!(" {}", u.symbol()))
            .unwrap_or_default();
        let value = match &self.value {
            FilterValue::Number(n) => format_number(*n),
            FilterValue::Text(s) => format!("\"{}\"", s),
            FilterValue::Range(lo, hi) => {
                format!("{}–{}", format_number(*lo), format_number(*hi))
            }
            FilterValue::Set(values) => {
                let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                format!("{{{}}}", items.join(", "))
            }
        };
        format!(
            "{} {} {}{}",
            self.field.label(),
            self.operator.as_str(),
            value,
            suffix
        )
    }
}

impl fmt::Display for FilterCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A condition with its operand pre-processed for repeated evaluation.
#[derive(Debug, Clone)]
enum Test {
    Compare(FilterOperator, Operand),
    Contains(String),
    Between(f64, f64),
    In(Vec<Operand>),
}

#[derive(Debug, Clone)]
struct Operand {
    number: Option<f64>,
    /// Lowercased text form.
    text: String,
    /// Given as a number, so text cells that do not parse are incomparable.
    numeric: bool,
}

impl Operand {
    fn number(n: f64) -> Self {
        Self {
            number: Some(n),
            text: n.to_string(),
            numeric: true,
        }
    }

    fn text(s: &str) -> Self {
        Self {
            number: s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            text: s.to_lowercase(),
            numeric: false,
        }
    }

    fn scalar(s: &Scalar) -> Self {
        match s {
            Scalar::Number(n) => Self::number(*n),
            Scalar::Text(t) => Self::text(t),
        }
    }

    fn from_value(value: &FilterValue) -> Self {
        match value {
            FilterValue::Number(n) => Self::number(*n),
            FilterValue::Text(t) => Self::text(t),
            FilterValue::Range(lo, _) => Self::number(*lo),
            FilterValue::Set(values) => values
                .first()
                .map(Self::scalar)
                .unwrap_or_else(|| Self::text("")),
        }
    }

    /// Orders a cell against this operand. `None` when incomparable or null.
    fn compare(&self, cell: &CellValue<'_>) -> Option<Ordering> {
        match cell {
            CellValue::Null => None,
            CellValue::Number(n) => n.partial_cmp(&self.number?),
            CellValue::Text(s) => {
                let parsed = self.number.zip(s.trim().parse::<f64>().ok());
                match parsed {
                    Some((rhs, lhs)) => lhs.partial_cmp(&rhs),
                    None if self.numeric => None,
                    None => Some(s.to_lowercase().cmp(&self.text)),
                }
            }
        }
    }
}

fn cell_number(cell: &CellValue<'_>) -> Option<f64> {
    match cell {
        CellValue::Null => None,
        CellValue::Number(n) => Some(*n),
        CellValue::Text(s) => s.trim().parse::<f64>().ok(),
    }
}

#[derive(Debug, Clone)]
struct CompiledCondition {
    field: Field,
    test: Test,
}

impl CompiledCondition {
    fn compile(condition: &FilterCondition) -> Self {
        let test = match (condition.operator, &condition.value) {
            (FilterOperator::Contains, value) => Test::Contains(match value {
                FilterValue::Number(n) => n.to_string(),
                FilterValue::Text(t) => t.to_lowercase(),
                FilterValue::Range(lo, hi) => format!("{}-{}", lo, hi),
                FilterValue::Set(values) => values
                    .first()
                    .map(|v| Operand::scalar(v).text)
                    .unwrap_or_default(),
            }),
            (FilterOperator::Between, FilterValue::Range(lo, hi)) => {
                Test::Between(lo.min(*hi), lo.max(*hi))
            }
            (FilterOperator::Between, FilterValue::Number(n)) => Test::Between(*n, *n),
            (FilterOperator::In, FilterValue::Set(values)) => {
                Test::In(values.iter().map(Operand::scalar).collect())
            }
            (FilterOperator::In, value) => Test::In(vec![Operand::from_value(value)]),
            // A non-numeric `between` operand can match nothing.
            (FilterOperator::Between, _) => Test::Between(f64::INFINITY, f64::NEG_INFINITY),
            (op, value) => Test::Compare(op, Operand::from_value(value)),
        };
        Self {
            field: condition.field,
            test,
        }
    }

    fn matches(&self, row: &Row) -> bool {
        let cell = row.value(self.field);
        match &self.test {
            Test::Contains(needle) => {
                !cell.is_null() && cell.to_text().to_lowercase().contains(needle.as_str())
            }
            Test::Between(lo, hi) => cell_number(&cell).is_some_and(|n| *lo <= n && n <= *hi),
            Test::In(options) => options
                .iter()
                .any(|o| o.compare(&cell) == Some(Ordering::Equal)),
            Test::Compare(op, operand) => {
                let ord = operand.compare(&cell);
                match op {
                    FilterOperator::Eq => ord == Some(Ordering::Equal),
                    FilterOperator::Neq => ord != Some(Ordering::Equal),
                    FilterOperator::Gt => ord == Some(Ordering::Greater),
                    FilterOperator::Gte => {
                        matches!(ord, Some(Ordering::Greater | Ordering::Equal))
                    }
                    FilterOperator::Lt => ord == Some(Ordering::Less),
                    FilterOperator::Lte => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                    FilterOperator::Contains | FilterOperator::Between | FilterOperator::In => {
                        false
                    }
                }
            }
        }
    }
}

/// Conjunction of compiled conditions. Empty accepts every row.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    conditions: Vec<CompiledCondition>,
}

impl Predicate {
    pub fn test(&self, row: &Row) -> bool {
        self.conditions.iter().all(|c| c.matches(row))
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

pub fn compile_structured(conditions: &[FilterCondition]) -> Predicate {
    Predicate {
        conditions: conditions.iter().map(CompiledCondition::compile).collect(),
    }
}

/// Evaluates a single condition.
pub fn condition_matches(condition: &FilterCondition, row: &Row) -> bool {
    CompiledCondition::compile(condition).matches(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, cost: Option<f64>) -> Row {
        Row::builder(id)
            .description(format!("Item {}", id))
            .unit_cost(cost)
            .build()
    }

    fn cond(field: Field, op: FilterOperator, value: FilterValue) -> FilterCondition {
        FilterCondition::new(field, op, value)
    }

    #[test]
    fn test_between_inclusive() {
        let c = cond(
            Field::Cost,
            FilterOperator::Between,
            FilterValue::Range(10.0, 20.0),
        );
        assert!(condition_matches(&c, &row("a", Some(10.0))));
        assert!(condition_matches(&c, &row("a", Some(20.0))));
        assert!(!condition_matches(&c, &row("a", Some(9.999))));
        assert!(!condition_matches(&c, &row("a", Some(20.001))));
    }

    #[test]
    fn test_between_reversed_bounds() {
        let c = cond(
            Field::Cost,
            FilterOperator::Between,
            FilterValue::Range(20.0, 10.0),
        );
        assert!(condition_matches(&c, &row("a", Some(15.0))));
    }

    #[test]
    fn test_null_policy() {
        let null = row("a", None);
        for op in FilterOperator::iterator() {
            let value = match op {
                FilterOperator::Between => FilterValue::Range(0.0, 100.0),
                FilterOperator::In => FilterValue::Set(vec![Scalar::Number(1.0)]),
                _ => FilterValue::Number(1.0),
            };
            let expected = op == FilterOperator::Neq;
            assert_eq!(
                condition_matches(&cond(Field::Cost, op, value), &null),
                expected,
                "operator {:?}",
                op
            );
        }
    }

    #[test]
    fn test_contains_case_insensitive_on_stringified() {
        let r = Row::builder("C-1001")
            .description("Reinforced CONCRETE slab")
            .unit_cost(Some(1250.0))
            .build();
        let text = cond(
            Field::Description,
            FilterOperator::Contains,
            FilterValue::Text("concrete".into()),
        );
        assert!(condition_matches(&text, &r));
        let number = cond(
            Field::Cost,
            FilterOperator::Contains,
            FilterValue::Number(125.0),
        );
        assert!(condition_matches(&number, &r));
    }

    #[test]
    fn test_text_equality_ignores_case() {
        let r = Row::builder("a").category(Some("Concrete".into())).build();
        let c = cond(
            Field::Category,
            FilterOperator::Eq,
            FilterValue::Text("concrete".into()),
        );
        assert!(condition_matches(&c, &r));
    }

    #[test]
    fn test_in_set() {
        let c = cond(
            Field::Id,
            FilterOperator::In,
            FilterValue::Set(vec![Scalar::Text("A".into()), Scalar::Text("B".into())]),
        );
        assert!(condition_matches(&c, &row("a", None)));
        assert!(condition_matches(&c, &row("B", None)));
        assert!(!condition_matches(&c, &row("C", None)));
    }

    #[test]
    fn test_number_vs_unparseable_text() {
        let c = cond(
            Field::Cost,
            FilterOperator::Gt,
            FilterValue::Text("cheap".into()),
        );
        assert!(!condition_matches(&c, &row("a", Some(10.0))));
        let neq = cond(
            Field::Cost,
            FilterOperator::Neq,
            FilterValue::Text("cheap".into()),
        );
        assert!(condition_matches(&neq, &row("a", Some(10.0))));
    }

    #[test]
    fn test_empty_predicate_accepts_all() {
        let p = compile_structured(&[]);
        assert!(p.is_empty());
        assert!(p.test(&row("a", None)));
    }

    #[test]
    fn test_labels() {
        let c = cond(Field::Material, FilterOperator::Gt, FilterValue::Number(500.0))
            .with_unit(Some(UnitTag::Eur));
        assert_eq!(c.label(), "Material > 500 €");
        let r = cond(
            Field::Area,
            FilterOperator::Between,
            FilterValue::Range(100.0, 500.0),
        )
        .with_unit(Some(UnitTag::SquareMeter));
        assert_eq!(r.label(), "Area between 100–500 m²");
        let t = cond(
            Field::Description,
            FilterOperator::Contains,
            FilterValue::Text("brick".into()),
        );
        assert_eq!(t.label(), "Description contains \"brick\"");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(500.0), "500");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(0.125), "0.125");
    }

    #[test]
    fn test_random_conjunctions_match_each_condition() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        let categories = ["Concrete", "Masonry", "Earthworks"];
        let fields = [Field::Cost, Field::Material, Field::Area, Field::Category];
        let ops: Vec<FilterOperator> = FilterOperator::iterator().collect();

        let maybe = |rng: &mut StdRng| {
            if rng.gen_bool(0.25) {
                None
            } else {
                Some(rng.gen_range(0..1000) as f64)
            }
        };

        for i in 0..200 {
            let category = if rng.gen_bool(0.25) {
                None
            } else {
                Some(categories[rng.gen_range(0..categories.len())].to_string())
            };
            let r = Row::builder(format!("R{}", i))
                .category(category)
                .unit_cost(maybe(&mut rng))
                .material_cost(maybe(&mut rng))
                .area(maybe(&mut rng))
                .build();

            let count = rng.gen_range(0..4);
            let conditions: Vec<FilterCondition> = (0..count)
                .map(|_| {
                    let field = fields[rng.gen_range(0..fields.len())];
                    let op = ops[rng.gen_range(0..ops.len())];
                    let value = match (op, field) {
                        (FilterOperator::Between, _) => FilterValue::Range(
                            rng.gen_range(0..1000) as f64,
                            rng.gen_range(0..1000) as f64,
                        ),
                        (FilterOperator::In, Field::Category) => FilterValue::Set(vec![
                            Scalar::Text(categories[rng.gen_range(0..categories.len())].into()),
                        ]),
                        (FilterOperator::In, _) => {
                            FilterValue::Set(vec![Scalar::Number(rng.gen_range(0..1000) as f64)])
                        }
                        (_, Field::Category) => FilterValue::Text(
                            categories[rng.gen_range(0..categories.len())].to_lowercase(),
                        ),
                        _ => FilterValue::Number(rng.gen_range(0..1000) as f64),
                    };
                    cond(field, op, value)
                })
                .collect();

            let expected = conditions.iter().all(|c| condition_matches(c, &r));
            assert_eq!(
                compile_structured(&conditions).test(&r),
                expected,
                "row {:?} conditions {:?}",
                r,
                conditions
            );
        }
    }
}
