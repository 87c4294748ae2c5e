//! Aggregates over the current result set.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::row::Row;

/// Label used for rows without a category.
pub const UNCATEGORIZED: &str = "(uncategorized)";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregate {
    pub count: usize,
    /// Sum of non-null subtotals.
    pub total: f64,
    pub min_cost: Option<f64>,
    pub max_cost: Option<f64>,
    pub mean_cost: Option<f64>,
    #[serde(skip)]
    cost_sum: f64,
    #[serde(skip)]
    cost_count: usize,
}

impl Aggregate {
    fn add(&mut self, row: &Row) {
        self.count += 1;
        if let Some(subtotal) = row.subtotal {
            self.total += subtotal;
        }
        if let Some(cost) = row.unit_cost {
            self.min_cost = Some(self.min_cost.map_or(cost, |m| m.min(cost)));
            self.max_cost = Some(self.max_cost.map_or(cost, |m| m.max(cost)));
            self.cost_sum += cost;
            self.cost_count += 1;
            self.mean_cost = Some(self.cost_sum / self.cost_count as f64);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub overall: Aggregate,
    pub by_category: BTreeMap<String, Aggregate>,
}

pub fn summarize<'a>(rows: impl IntoIterator<Item = &'a Row>) -> Summary {
    let mut summary = Summary::default();
    for row in rows {
        summary.overall.add(row);
        let category = row.category.as_deref().unwrap_or(UNCATEGORIZED);
        summary
            .by_category
            .entry(category.to_string())
            .or_default()
            .add(row);
    }
    summary
}

/// Two decimals with thousands separators: `-1234.5` → `-1,234.50`.
pub fn format_decimal(value: f64) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    // Values that round to zero print unsigned.
    let sign = if value < 0.0 && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// `1234.5, "EUR"` → `1,234.50 EUR`. Display only, no conversion.
pub fn format_amount(value: f64, currency: &str) -> String {
    format!("{} {}", format_decimal(value), currency)
}
