use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Row as TableRow, Table, Widget},
};

use crate::summary::{format_decimal, Aggregate, Summary};

/// Per-category aggregates of the current result.
pub struct SummaryTable<'a> {
    summary: &'a Summary,
    currency: &'a str,
    header_color: Color,
}

impl<'a> SummaryTable<'a> {
    pub fn new(summary: &'a Summary, currency: &'a str) -> Self {
        Self {
            summary,
            currency,
            header_color: Color::Cyan,
        }
    }

    pub fn with_header_color(mut self, color: Color) -> Self {
        self.header_color = color;
        self
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(format_decimal).unwrap_or_default()
}

fn aggregate_row(label: &str, aggregate: &Aggregate) -> TableRow<'static> {
    TableRow::new(vec![
        Line::from(label.to_string()),
        Line::from(aggregate.count.to_string()).right_aligned(),
        Line::from(format_decimal(aggregate.total)).right_aligned(),
        Line::from(optional(aggregate.min_cost)).right_aligned(),
        Line::from(optional(aggregate.mean_cost)).right_aligned(),
        Line::from(optional(aggregate.max_cost)).right_aligned(),
    ])
}

impl Widget for SummaryTable<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let header = TableRow::new(vec![
            "Category".to_string(),
            "Rows".to_string(),
            format!("Total ({})", self.currency),
            "Min cost".to_string(),
            "Mean cost".to_string(),
            "Max cost".to_string(),
        ])
        .style(
            Style::default()
                .fg(self.header_color)
                .add_modifier(Modifier::BOLD),
        );

        let mut rows: Vec<TableRow> = self
            .summary
            .by_category
            .iter()
            .map(|(category, aggregate)| aggregate_row(category, aggregate))
            .collect();
        rows.push(
            aggregate_row("All", &self.summary.overall)
                .style(Style::default().add_modifier(Modifier::BOLD)),
        );

        Table::new(
            rows,
            [
                Constraint::Fill(1),
                Constraint::Length(8),
                Constraint::Length(18),
                Constraint::Length(14),
                Constraint::Length(14),
                Constraint::Length(14),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::TOP).title("Summary"))
        .render(area, buf);
    }
}
