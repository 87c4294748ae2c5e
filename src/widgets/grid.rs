use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Margin, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{
        Block, Borders, Cell, Padding, Paragraph, Row as TableRow, Scrollbar,
        ScrollbarOrientation, ScrollbarState, StatefulWidget, Table, TableState, Widget,
    },
};

use crate::filter::format_number;
use crate::row::{CellValue, Field, Row};
use crate::summary::format_decimal;
use crate::view_state::ViewState;
use crate::virtualize::VirtualScroller;

/// Scroll and highlight state of the grid, owned by the app.
pub struct GridState {
    pub scroller: VirtualScroller,
    table_state: TableState,
}

impl GridState {
    pub fn new(row_height: u64, overscan: usize) -> Self {
        Self {
            scroller: VirtualScroller::new(row_height, overscan),
            table_state: TableState::default(),
        }
    }

    /// Rows shown per page at the last render.
    pub fn page_size(&self) -> usize {
        self.scroller.rows_per_page()
    }
}

/// Default width for a column without a stored width. `None` fills the rest.
pub fn default_width(field: Field) -> Option<u16> {
    match field {
        Field::Id => Some(16),
        Field::Description => None,
        Field::Category => Some(18),
        Field::Unit => Some(8),
        Field::Quantity | Field::Area => Some(10),
        Field::Cost | Field::Total | Field::Material | Field::Labor | Field::Machine => Some(14),
    }
}

pub fn cell_text(row: &Row, field: Field) -> String {
    match row.value(field) {
        CellValue::Null => String::new(),
        CellValue::Number(n) if field.is_monetary() => format_decimal(n),
        CellValue::Number(n) => format_number(n),
        CellValue::Text(s) => s.to_string(),
    }
}

/// Virtualized table over `result`, a list of indices into `rows`.
pub struct Grid<'a> {
    rows: &'a [Row],
    result: &'a [usize],
    view: &'a ViewState,
    currency: &'a str,
    column_cursor: Option<Field>,
    header_color: Color,
    focused_color: Color,
    selected_color: Color,
    dimmed_color: Color,
}

impl<'a> Grid<'a> {
    pub fn new(
        rows: &'a [Row],
        result: &'a [usize],
        view: &'a ViewState,
        currency: &'a str,
    ) -> Self {
        Self {
            rows,
            result,
            view,
            currency,
            column_cursor: None,
            header_color: Color::Cyan,
            focused_color: Color::DarkGray,
            selected_color: Color::Yellow,
            dimmed_color: Color::DarkGray,
        }
    }

    pub fn with_column_cursor(mut self, field: Option<Field>) -> Self {
        self.column_cursor = field;
        self
    }

    pub fn with_colors(
        mut self,
        header: Color,
        focused: Color,
        selected: Color,
        dimmed: Color,
    ) -> Self {
        self.header_color = header;
        self.focused_color = focused;
        self.selected_color = selected;
        self.dimmed_color = dimmed;
        self
    }

    fn header(&self, columns: &[Field]) -> TableRow<'static> {
        let cells = columns.iter().map(|field| {
            let mut title = field.label().to_string();
            if field.is_monetary() && !self.currency.is_empty() {
                title = format!("{} ({})", title, self.currency);
            }
            if let Some(key) = self.view.persisted.sort.iter().find(|k| k.field == *field) {
                title = format!("{} {}", title, key.direction.arrow());
            }
            let mut style = Style::default()
                .fg(self.header_color)
                .add_modifier(Modifier::BOLD);
            if self.column_cursor == Some(*field) {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Cell::from(title).style(style)
        });
        TableRow::new(cells)
    }

    fn constraints(&self, columns: &[Field]) -> Vec<Constraint> {
        columns
            .iter()
            .map(|field| {
                match self.view.column_width(*field).or_else(|| default_width(*field)) {
                    Some(width) => Constraint::Length(width),
                    None => Constraint::Fill(1),
                }
            })
            .collect()
    }
}

impl StatefulWidget for Grid<'_> {
    type State = GridState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let columns = &self.view.persisted.visible_columns;
        if self.result.is_empty() {
            let message = if self.rows.is_empty() {
                "This region has no rows"
            } else {
                "No rows match the current search and filters"
            };
            Paragraph::new(message)
                .centered()
                .style(Style::default().fg(self.dimmed_color))
                .block(
                    Block::default()
                        .borders(Borders::NONE)
                        .padding(Padding::top(area.height / 2)),
                )
                .render(area, buf);
            state.scroller.set_total(0);
            return;
        }

        // One line for the header, one column for the scrollbar.
        let table_area = Rect {
            width: area.width.saturating_sub(1),
            ..area
        };
        let viewport = table_area.height.saturating_sub(1) as u64;
        state.scroller.set_viewport(viewport * state.scroller.row_height());
        state.scroller.set_total(self.result.len());
        if let Some(focused) = self.view.session.focused {
            state.scroller.ensure_visible(focused);
        }

        // Only the window (visible rows plus overscan) is materialized.
        let window = state.scroller.window();
        let first_visible = state.scroller.visible_range().start;
        let body: Vec<TableRow> = self.result[window.range.clone()]
            .iter()
            .map(|&index| {
                let row = &self.rows[index];
                let cells = columns.iter().map(|field| {
                    let text = cell_text(row, *field);
                    if field.is_numeric() {
                        Cell::from(Line::from(text).right_aligned())
                    } else {
                        Cell::from(text)
                    }
                });
                let mut table_row = TableRow::new(cells);
                if self.view.session.selection.contains(&row.id) {
                    table_row = table_row.style(Style::default().fg(self.selected_color));
                }
                table_row
            })
            .collect();

        *state.table_state.offset_mut() = first_visible - window.range.start;
        state.table_state.select(
            self.view
                .session
                .focused
                .filter(|f| window.range.contains(f))
                .map(|f| f - window.range.start),
        );

        let table = Table::new(body, self.constraints(columns))
            .header(self.header(columns))
            .column_spacing(1)
            .row_highlight_style(
                Style::default()
                    .bg(self.focused_color)
                    .add_modifier(Modifier::BOLD),
            );
        StatefulWidget::render(table, table_area, buf, &mut state.table_state);

        let row_height = state.scroller.row_height();
        let position =
            (window.top_padding / row_height) as usize + (first_visible - window.range.start);
        let mut scrollbar = ScrollbarState::new(self.result.len())
            .position(position)
            .viewport_content_length(viewport as usize);
        Scrollbar::new(ScrollbarOrientation::VerticalRight).render(
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            buf,
            &mut scrollbar,
        );
    }
}
