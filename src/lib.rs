use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::{mpsc::Sender, Arc};

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Clear, ListState, Padding, Paragraph, StatefulWidget, Wrap,
};
use ratatui::{buffer::Buffer, layout::Rect, widgets::Widget};

pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod loader;
pub mod logging;
pub mod nl_parse;
pub mod persist;
pub mod pipeline;
pub mod price;
pub mod report;
pub mod row;
pub mod store;
pub mod summary;
pub mod view_state;
pub mod virtualize;
pub mod widgets;

pub use cache::CacheManager;
pub use config::{AppConfig, ConfigManager, DisplayConfig, Theme};
pub use cwicr_cli::Args;
pub use error::LoadError;
pub use loader::{LoadOutcome, LoadRequest, RegionLoader};
pub use persist::{FileKvStore, KvStore, MemoryKvStore};
pub use report::{run_report, QueryReport, QueryRequest};
pub use row::{Field, Row};
pub use store::{RowSet, RowStore};

use nl_parse::parse_natural_language;
use pipeline::{QueryPipeline, SortDirection, SortKey};
use summary::summarize;
use view_state::{ViewAction, ViewMode, ViewState, ViewStore};
use virtualize::clamp_index;
use widgets::controls::Controls;
use widgets::grid::{default_width, Grid, GridState};
use widgets::picker::{centered, Picker, PickerItem};
use widgets::summary::SummaryTable;
use widgets::text_input::{TextInput, TextInputEvent};

/// Application name used for cache directory and other app-specific paths
pub const APP_NAME: &str = "cwicr";

/// Width used when growing or shrinking a column that fills the remaining space.
const FILL_COLUMN_WIDTH: u16 = 30;

pub enum AppEvent {
    Key(KeyEvent),
    Resize(u16, u16),
    /// Switch to a region, from cache or with a background read.
    LoadRegion(String),
    RegionLoaded(LoadOutcome),
    Exit,
    Crash(String),
}

impl From<LoadOutcome> for AppEvent {
    fn from(outcome: LoadOutcome) -> Self {
        AppEvent::RegionLoaded(outcome)
    }
}

/// Where the current region's data stands. `Failed` is distinct from an
/// empty result so the UI can tell "filtered to zero" from "source failed".
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    Loading {
        region: String,
    },
    Ready,
    Failed {
        error: LoadError,
        retryable: bool,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Normal,
    Search,
    Query,
    Columns,
    Regions,
}

#[derive(Debug, Default)]
pub struct DebugState {
    pub enabled: bool,
    pub num_events: usize,
    pub num_frames: usize,
}

pub struct App {
    events: Sender<AppEvent>,
    theme: Theme,
    store: RowStore,
    loader: RegionLoader,
    views: ViewStore,
    /// Region whose rows are on screen.
    region: Option<String>,
    /// Last region asked for, kept for retry.
    requested: Option<String>,
    rows: Option<Arc<RowSet>>,
    pipeline: QueryPipeline,
    result: Arc<[usize]>,
    grid: GridState,
    load_state: LoadState,
    input_mode: InputMode,
    input: TextInput,
    unrecognized: Vec<String>,
    column_cursor: usize,
    picker: ListState,
    show_help: bool,
    debug: DebugState,
}

impl App {
    /// App reading regions with polars, as configured.
    pub fn new(
        events: Sender<AppEvent>,
        config: &AppConfig,
        kv: Arc<dyn KvStore>,
        region: &str,
    ) -> Result<Self> {
        let theme = Theme::from_config(&config.theme)?;
        let store = RowStore::from_config(config);
        let mut app = Self::with_store(events, store, kv, region, &config.display);
        app.input = TextInput::new().with_text_color(theme.get("primary"));
        app.theme = theme;
        app.debug.enabled = config.debug.enabled;
        Ok(app)
    }

    pub fn with_store(
        events: Sender<AppEvent>,
        store: RowStore,
        kv: Arc<dyn KvStore>,
        region: &str,
        display: &DisplayConfig,
    ) -> Self {
        Self {
            events,
            theme: Theme::default(),
            store,
            loader: RegionLoader::new(),
            views: ViewStore::open(kv, region),
            region: None,
            requested: None,
            rows: None,
            pipeline: QueryPipeline::new(),
            result: Arc::from(Vec::new()),
            grid: GridState::new(display.row_height as u64, display.overscan),
            load_state: LoadState::Idle,
            input_mode: InputMode::Normal,
            input: TextInput::new(),
            unrecognized: Vec::new(),
            column_cursor: 0,
            picker: ListState::default(),
            show_help: false,
            debug: DebugState::default(),
        }
    }

    pub fn enable_debug(&mut self) {
        self.debug.enabled = true;
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn view(&self) -> Arc<ViewState> {
        self.views.state()
    }

    pub fn unrecognized(&self) -> &[String] {
        &self.unrecognized
    }

    /// Ids of the current result, in display order.
    pub fn result_ids(&self) -> Vec<&str> {
        match &self.rows {
            Some(rows) => self
                .result
                .iter()
                .map(|&i| rows.rows[i].id.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    fn color(&self, name: &str) -> Color {
        self.theme.get(name)
    }

    fn currency(&self) -> &str {
        self.region
            .as_deref()
            .and_then(|r| self.store.region(r))
            .map(|r| r.currency.as_str())
            .unwrap_or_default()
    }

    /// Re-runs the pipeline against the current view and keeps focus in range.
    fn refresh(&mut self) {
        let state = self.views.state();
        self.result = match &self.rows {
            Some(rows) => self.pipeline.run(
                rows,
                &state.session.search,
                &state.session.filters,
                &state.persisted.sort,
            ),
            None => Arc::from(Vec::new()),
        };
        self.grid.scroller.set_total(self.result.len());

        let total = self.result.len();
        let focused = match clamp_index(state.session.focused, total) {
            None if total > 0 => Some(0),
            other => other,
        };
        if focused != state.session.focused {
            self.views.dispatch(ViewAction::SetFocusedIndex(focused));
        }
        let columns = state.persisted.visible_columns.len();
        self.column_cursor = self.column_cursor.min(columns.saturating_sub(1));
    }

    fn dispatch(&mut self, action: ViewAction) {
        self.views.dispatch(action);
        self.refresh();
    }

    fn install(&mut self, region: String, rows: Arc<RowSet>) {
        tracing::info!(region = %region, rows = rows.len(), "region ready");
        self.views.switch_region(&region);
        self.region = Some(region);
        self.rows = Some(rows);
        self.load_state = LoadState::Ready;
        self.grid.scroller.scroll_to(0);
        self.refresh();
    }

    fn fail(&mut self, error: LoadError) {
        tracing::warn!("region load failed: {}", error);
        self.load_state = LoadState::Failed {
            retryable: error.is_retryable(),
            error,
        };
    }

    fn load_region(&mut self, region: &str) {
        self.requested = Some(region.to_string());
        match self.loader.request(&self.store, region, &self.events) {
            Ok(LoadRequest::Cached(rows)) => self.install(region.to_string(), rows),
            Ok(LoadRequest::Pending(_)) => {
                self.load_state = LoadState::Loading {
                    region: region.to_string(),
                }
            }
            Err(e) => self.fail(e),
        }
    }

    fn focused_field(&self) -> Option<Field> {
        self.views
            .state()
            .persisted
            .visible_columns
            .get(self.column_cursor)
            .copied()
    }

    fn move_focus(&mut self, delta: i64) {
        let total = self.result.len();
        if total == 0 {
            return;
        }
        let current = self.views.state().session.focused.unwrap_or(0) as i64;
        let next = (current + delta).clamp(0, total as i64 - 1) as usize;
        self.dispatch(ViewAction::SetFocusedIndex(Some(next)));
    }

    fn focus_to(&mut self, index: usize) {
        if !self.result.is_empty() {
            let index = index.min(self.result.len() - 1);
            self.dispatch(ViewAction::SetFocusedIndex(Some(index)));
        }
    }

    /// none → ascending → descending → none on the column under the cursor.
    fn cycle_sort(&mut self) {
        let Some(field) = self.focused_field() else {
            return;
        };
        let current = self
            .views
            .state()
            .persisted
            .sort
            .first()
            .filter(|k| k.field == field)
            .map(|k| k.direction);
        let sort = match current {
            None => vec![SortKey::asc(field)],
            Some(SortDirection::Ascending) => vec![SortKey::desc(field)],
            Some(SortDirection::Descending) => Vec::new(),
        };
        self.dispatch(ViewAction::SetSort(sort));
    }

    fn resize_column(&mut self, delta: i32) {
        let Some(field) = self.focused_field() else {
            return;
        };
        let width = self
            .views
            .state()
            .column_width(field)
            .or_else(|| default_width(field))
            .unwrap_or(FILL_COLUMN_WIDTH);
        let width = (width as i32 + delta).clamp(0, u16::MAX as i32) as u16;
        self.dispatch(ViewAction::SetColumnWidth(field, width));
    }

    fn toggle_selection(&mut self) {
        let state = self.views.state();
        let id = match (&self.rows, state.session.focused) {
            (Some(rows), Some(focused)) => self
                .result
                .get(focused)
                .map(|&i| rows.rows[i].id.clone()),
            _ => None,
        };
        if let Some(id) = id {
            self.dispatch(ViewAction::ToggleRowSelection(id));
        }
    }

    fn open_input(&mut self, mode: InputMode) {
        self.input_mode = mode;
        self.input.clear();
        if mode == InputMode::Search {
            let search = self.views.state().session.search.clone();
            self.input.set_value(&search);
        }
        self.input.set_focused(true);
    }

    fn close_input(&mut self) {
        self.input_mode = InputMode::Normal;
        self.input.set_focused(false);
    }

    fn open_picker(&mut self, mode: InputMode) {
        self.input_mode = mode;
        let selected = match mode {
            InputMode::Regions => self
                .region
                .as_deref()
                .and_then(|r| self.store.region_keys().position(|k| k == r))
                .unwrap_or(0),
            _ => 0,
        };
        self.picker = ListState::default().with_selected(Some(selected));
    }

    fn picker_len(&self) -> usize {
        match self.input_mode {
            InputMode::Columns => Field::ALL.len(),
            InputMode::Regions => self.store.region_keys().count(),
            _ => 0,
        }
    }

    fn picker_items(&self) -> Vec<PickerItem> {
        match self.input_mode {
            InputMode::Columns => {
                let state = self.views.state();
                Field::ALL
                    .iter()
                    .map(|f| PickerItem::checkbox(f.label(), state.is_visible(*f)))
                    .collect()
            }
            InputMode::Regions => self
                .store
                .region_keys()
                .filter_map(|key| {
                    let region = self.store.region(key)?;
                    let label = region.label.as_deref().unwrap_or(key);
                    Some(PickerItem::plain(format!(
                        "{:<16} {} ({})",
                        key, label, region.currency
                    )))
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    fn picker_key(&mut self, event: &KeyEvent) -> Option<AppEvent> {
        let len = self.picker_len();
        let selected = self.picker.selected().unwrap_or(0);
        match event.code {
            KeyCode::Esc | KeyCode::Char('q') => self.input_mode = InputMode::Normal,
            KeyCode::Char('c') if self.input_mode == InputMode::Columns => {
                self.input_mode = InputMode::Normal
            }
            KeyCode::Tab if self.input_mode == InputMode::Regions => {
                self.input_mode = InputMode::Normal
            }
            KeyCode::Down | KeyCode::Char('j') if len > 0 => {
                self.picker.select(Some((selected + 1).min(len - 1)));
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.picker.select(Some(selected.saturating_sub(1)));
            }
            KeyCode::Enter | KeyCode::Char(' ') => match self.input_mode {
                InputMode::Columns => {
                    if let Some(field) = Field::ALL.get(selected) {
                        self.dispatch(ViewAction::ToggleColumn(*field));
                    }
                }
                InputMode::Regions => {
                    let region = self.store.region_keys().nth(selected).map(str::to_string);
                    self.input_mode = InputMode::Normal;
                    return region.map(AppEvent::LoadRegion);
                }
                _ => {}
            },
            _ => {}
        }
        None
    }

    fn input_key(&mut self, event: &KeyEvent) -> Option<AppEvent> {
        match self.input.handle_key(event) {
            TextInputEvent::Cancel => {
                if self.input_mode == InputMode::Search {
                    self.dispatch(ViewAction::SetSearch(String::new()));
                }
                self.close_input();
            }
            TextInputEvent::Submit => {
                let text = self.input.value().trim().to_string();
                match self.input_mode {
                    InputMode::Search => self.dispatch(ViewAction::SetSearch(text)),
                    InputMode::Query => {
                        let parsed = parse_natural_language(&text);
                        tracing::debug!(
                            filters = parsed.filters.len(),
                            unrecognized = parsed.unrecognized.len(),
                            "parsed query"
                        );
                        for condition in parsed.filters {
                            self.views.dispatch(ViewAction::AddFilter(condition));
                        }
                        self.unrecognized = parsed.unrecognized;
                        self.refresh();
                    }
                    _ => {}
                }
                self.close_input();
            }
            TextInputEvent::None | TextInputEvent::HistoryChanged => {
                // Search filters as you type.
                if self.input_mode == InputMode::Search {
                    let text = self.input.value().trim().to_string();
                    self.dispatch(ViewAction::SetSearch(text));
                }
            }
        }
        None
    }

    fn key(&mut self, event: &KeyEvent) -> Option<AppEvent> {
        if event.kind != KeyEventKind::Press {
            return None;
        }
        if event.code == KeyCode::Char('c') && event.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(AppEvent::Exit);
        }
        match self.input_mode {
            InputMode::Search | InputMode::Query => return self.input_key(event),
            InputMode::Columns | InputMode::Regions => return self.picker_key(event),
            InputMode::Normal => {}
        }
        if self.show_help {
            self.show_help = false;
            return None;
        }

        let page = self.grid.page_size().max(1) as i64;
        match event.code {
            KeyCode::Char('q') => return Some(AppEvent::Exit),
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Down | KeyCode::Char('j') => self.move_focus(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_focus(-1),
            KeyCode::PageDown => self.move_focus(page),
            KeyCode::PageUp => self.move_focus(-page),
            KeyCode::Home | KeyCode::Char('g') => self.focus_to(0),
            KeyCode::End | KeyCode::Char('G') => self.focus_to(usize::MAX),
            KeyCode::Left | KeyCode::Char('h') => {
                self.column_cursor = self.column_cursor.saturating_sub(1)
            }
            KeyCode::Right | KeyCode::Char('l') => {
                let columns = self.views.state().persisted.visible_columns.len();
                self.column_cursor = (self.column_cursor + 1).min(columns.saturating_sub(1));
            }
            KeyCode::Char('<') => self.resize_column(-2),
            KeyCode::Char('>') => self.resize_column(2),
            KeyCode::Char('s') => self.cycle_sort(),
            KeyCode::Char('/') => self.open_input(InputMode::Search),
            KeyCode::Char(':') | KeyCode::Char('f') => self.open_input(InputMode::Query),
            KeyCode::Char('x') => {
                let count = self.views.state().session.filters.len();
                if count > 0 {
                    self.dispatch(ViewAction::RemoveFilter(count - 1));
                }
            }
            KeyCode::Char('X') => {
                self.unrecognized.clear();
                self.dispatch(ViewAction::ClearFilters);
            }
            KeyCode::Char(' ') => self.toggle_selection(),
            KeyCode::Char('u') => self.dispatch(ViewAction::ClearSelection),
            KeyCode::Char('v') => {
                let mode = match self.views.state().persisted.view_mode {
                    ViewMode::Table => ViewMode::Summary,
                    ViewMode::Summary => ViewMode::Table,
                };
                self.dispatch(ViewAction::SetViewMode(mode));
            }
            KeyCode::Char('c') => self.open_picker(InputMode::Columns),
            KeyCode::Tab => self.open_picker(InputMode::Regions),
            KeyCode::Char('R') => {
                self.unrecognized.clear();
                self.column_cursor = 0;
                self.dispatch(ViewAction::ResetToDefaults);
            }
            KeyCode::Char('r') => {
                if let LoadState::Failed {
                    retryable: true, ..
                } = self.load_state
                {
                    return self.requested.clone().map(AppEvent::LoadRegion);
                }
            }
            KeyCode::Esc => {
                self.unrecognized.clear();
            }
            _ => {}
        }
        None
    }

    pub fn event(&mut self, event: AppEvent) -> Option<AppEvent> {
        self.debug.num_events += 1;
        match event {
            AppEvent::Key(key) => self.key(&key),
            AppEvent::LoadRegion(region) => {
                self.load_region(&region);
                None
            }
            AppEvent::RegionLoaded(outcome) => {
                if let Some(outcome) = self.loader.accept(outcome) {
                    match outcome.result {
                        Ok(set) => {
                            let rows = self.store.insert(set);
                            self.install(outcome.region, rows);
                        }
                        Err(e) => self.fail(e),
                    }
                }
                None
            }
            AppEvent::Resize(_, _) => None,
            AppEvent::Exit | AppEvent::Crash(_) => None,
        }
    }

    fn status_line(&self) -> Line<'static> {
        let state = self.views.state();
        let primary = self.color("primary");
        let mut spans = vec![];
        match &self.region {
            Some(region) => {
                let label = self
                    .store
                    .region(region)
                    .and_then(|r| r.label.clone())
                    .unwrap_or_else(|| region.clone());
                spans.push(Span::styled(
                    format!(" {} ", label),
                    Style::default().fg(primary).add_modifier(Modifier::BOLD),
                ));
                spans.push(Span::raw(format!("[{}] ", self.currency())));
            }
            None => spans.push(Span::raw(" ")),
        }
        if let LoadState::Loading { region } = &self.load_state {
            spans.push(Span::styled(
                format!("Loading {}... ", region),
                Style::default().fg(self.color("warning")),
            ));
        }
        if !state.session.search.is_empty() {
            spans.push(Span::raw(format!("search: \"{}\" ", state.session.search)));
        }
        for (i, condition) in state.session.filters.iter().enumerate() {
            spans.push(Span::styled(
                format!("[{}] {}", i + 1, condition.label()),
                Style::default().fg(primary),
            ));
            spans.push(Span::raw(" "));
        }
        Line::from(spans)
    }

    fn render_help(&self, area: Rect, buf: &mut Buffer) {
        const HELP: [(&str, &str); 20] = [
            ("j / k, arrows", "Move focus"),
            ("PgUp / PgDn", "Page"),
            ("g / G", "First / last row"),
            ("h / l", "Column cursor"),
            ("< / >", "Narrow / widen column"),
            ("s", "Cycle sort on column"),
            ("/", "Search"),
            (": or f", "Filter query, e.g. cost > 100, unit m2"),
            ("x", "Remove last filter"),
            ("X", "Clear filters"),
            ("Space", "Select row"),
            ("u", "Clear selection"),
            ("v", "Table / summary"),
            ("c", "Columns"),
            ("Tab", "Region"),
            ("R", "Reset view"),
            ("r", "Retry failed load"),
            ("Esc", "Dismiss warnings"),
            ("?", "Help"),
            ("q", "Quit"),
        ];
        let lines: Vec<Line> = HELP
            .iter()
            .map(|(key, action)| {
                Line::from(vec![
                    Span::styled(
                        format!("{:<16}", key),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(*action),
                ])
            })
            .collect();
        let rect = centered(area, 60, HELP.len() as u16 + 2);
        Clear.render(rect, buf);
        Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(self.color("primary")))
                    .title("Keys"),
            )
            .render(rect, buf);
    }

    fn render_message(&self, message: &str, color: Color, area: Rect, buf: &mut Buffer) {
        Paragraph::new(message.to_string())
            .centered()
            .wrap(Wrap { trim: true })
            .style(Style::default().fg(color))
            .block(Block::default().padding(Padding::top(area.height / 2)))
            .render(area, buf);
    }

    fn render_main(&mut self, area: Rect, buf: &mut Buffer) {
        if let LoadState::Failed { error, retryable } = &self.load_state {
            if self.rows.is_none() || !*retryable {
                let mut message = error.user_message();
                if *retryable {
                    message.push_str("\nPress r to retry.");
                }
                let color = self.color("error");
                self.render_message(&message, color, area, buf);
                return;
            }
        }
        let Some(rows) = self.rows.clone() else {
            let message = match &self.load_state {
                LoadState::Loading { region } => format!("Loading {}...", region),
                _ => "No region loaded. Press Tab to pick one.".to_string(),
            };
            let color = self.color("dimmed");
            self.render_message(&message, color, area, buf);
            return;
        };

        let state = self.views.state();
        let currency = self.currency().to_string();
        match state.persisted.view_mode {
            ViewMode::Table => {
                let column = state.persisted.visible_columns.get(self.column_cursor).copied();
                let grid = Grid::new(&rows.rows, &self.result, &state, &currency)
                    .with_column_cursor(column)
                    .with_colors(
                        self.color("table_header"),
                        self.color("table_focused"),
                        self.color("table_selected"),
                        self.color("dimmed"),
                    );
                grid.render(area, buf, &mut self.grid);
            }
            ViewMode::Summary => {
                let summary = summarize(self.result.iter().map(|&i| &rows.rows[i]));
                SummaryTable::new(&summary, &currency)
                    .with_header_color(self.color("table_header"))
                    .render(area, buf);
            }
        }
    }
}

impl Widget for &mut App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        self.debug.num_frames += 1;

        let failed_with_rows =
            matches!(self.load_state, LoadState::Failed { .. }) && self.rows.is_some();
        let mut constraints = vec![Constraint::Length(1)];
        let editing = matches!(self.input_mode, InputMode::Search | InputMode::Query);
        if editing {
            constraints.push(Constraint::Length(3));
        }
        constraints.push(Constraint::Fill(1));
        let warning = !self.unrecognized.is_empty() || failed_with_rows;
        if warning {
            constraints.push(Constraint::Length(1));
        }
        constraints.push(Constraint::Length(1));
        if self.debug.enabled {
            constraints.push(Constraint::Length(1));
        }
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        let mut i = 0;
        Paragraph::new(self.status_line()).render(layout[i], buf);
        i += 1;

        if editing {
            let title = match self.input_mode {
                InputMode::Search => "Search",
                _ => "Filter (e.g. cost > 100, area 10-50, category concrete)",
            };
            let block = Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(self.color("primary")))
                .title(title);
            let inner = block.inner(layout[i]);
            block.render(layout[i], buf);
            (&self.input).render(inner, buf);
            i += 1;
        }

        let main_area = layout[i];
        self.render_main(main_area, buf);
        i += 1;

        if warning {
            let text = match &self.load_state {
                LoadState::Failed { error, retryable } if self.rows.is_some() => {
                    let retry = if *retryable { " (r to retry)" } else { "" };
                    format!("{}{}", error.user_message(), retry)
                }
                _ => format!("Not understood: {}", self.unrecognized.join(" | ")),
            };
            Paragraph::new(text)
                .style(Style::default().fg(self.color("warning")))
                .render(layout[i], buf);
            i += 1;
        }

        let total = self.rows.as_ref().map_or(0, |r| r.len());
        let selected = self.views.state().session.selection.len();
        let controls = Controls::new()
            .with_counts(self.result.len(), total, selected)
            .with_dimmed(self.input_mode != InputMode::Normal)
            .with_query_active(!self.views.state().session.filters.is_empty())
            .with_background(self.color("controls_bg"));
        (&controls).render(layout[i], buf);
        i += 1;

        if self.debug.enabled {
            let window = self.grid.scroller.window();
            Paragraph::new(format!(
                "events: {}  frames: {}  window: {:?}  offset: {}  state: {:?}",
                self.debug.num_events,
                self.debug.num_frames,
                window.range,
                window.scroll_offset,
                self.load_state
            ))
            .style(Style::default().fg(self.color("dimmed")))
            .render(layout[i], buf);
        }

        if self.show_help {
            self.render_help(main_area, buf);
        }
        if matches!(self.input_mode, InputMode::Columns | InputMode::Regions) {
            let items = self.picker_items();
            let title = if self.input_mode == InputMode::Columns {
                "Columns"
            } else {
                "Region"
            };
            Picker::new(title, &items)
                .with_border_color(self.color("primary"))
                .render(main_area, buf, &mut self.picker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionConfig;
    use crate::price::FallbackChain;
    use crate::store::{MemorySource, RawTable};
    use std::path::PathBuf;
    use std::sync::mpsc::{channel, Receiver};
    use std::time::Duration;

    fn region(currency: &str) -> RegionConfig {
        RegionConfig {
            path: PathBuf::from("unused.parquet"),
            currency: currency.to_string(),
            locale: "en-US".to_string(),
            label: None,
        }
    }

    fn app() -> (App, Receiver<AppEvent>) {
        let berlin = RawTable::new()
            .with_texts("rate_code", vec![Some("A"), Some("B"), Some("C")])
            .with_texts(
                "rate_original_name",
                vec![Some("Sand"), Some("Brick wall"), Some("Steel beam")],
            )
            .with_numbers("resource_cost", vec![Some(50.0), Some(150.0), None])
            .with_numbers("price_est_median", vec![None, None, None]);
        let paris = RawTable::new()
            .with_texts("rate_code", vec![Some("P1")])
            .with_numbers("resource_cost", vec![Some(1.0)]);
        let source = MemorySource::new()
            .with_table("DE_BERLIN", berlin)
            .with_table("FR_PARIS", paris);
        let store = RowStore::new(
            Arc::new(source),
            Arc::new(FallbackChain {
                order: FallbackChain::default().order,
                default: None,
            }),
        )
        .with_region("DE_BERLIN", region("EUR"))
        .with_region("FR_PARIS", region("EUR"))
        .with_region("MISSING", region("USD"));
        let (tx, rx) = channel();
        let app = App::with_store(
            tx,
            store,
            Arc::new(MemoryKvStore::new()),
            "DE_BERLIN",
            &DisplayConfig::default(),
        );
        (app, rx)
    }

    fn settle(app: &mut App, rx: &Receiver<AppEvent>) {
        if !app.loader.is_loading() {
            return;
        }
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(5)) {
            let follow = app.event(event);
            assert!(follow.is_none());
            if !app.loader.is_loading() {
                break;
            }
        }
    }

    fn load(app: &mut App, rx: &Receiver<AppEvent>, region: &str) {
        app.event(AppEvent::LoadRegion(region.to_string()));
        settle(app, rx);
    }

    fn press(app: &mut App, code: KeyCode) -> Option<AppEvent> {
        app.event(AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)))
    }

    fn type_line(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
        press(app, KeyCode::Enter);
    }

    #[test]
    fn test_load_and_filter_scenario() {
        let (mut app, rx) = app();
        load(&mut app, &rx, "DE_BERLIN");
        assert_eq!(app.load_state(), &LoadState::Ready);
        assert_eq!(app.result_ids(), vec!["A", "B", "C"]);

        press(&mut app, KeyCode::Char(':'));
        assert_eq!(app.input_mode(), InputMode::Query);
        type_line(&mut app, "cost > 100");
        assert_eq!(app.input_mode(), InputMode::Normal);
        assert_eq!(app.result_ids(), vec!["B"]);
        assert!(app.unrecognized().is_empty());

        press(&mut app, KeyCode::Char('X'));
        assert_eq!(app.result_ids().len(), 3);
    }

    #[test]
    fn test_unrecognized_query_keeps_valid_filters() {
        let (mut app, rx) = app();
        load(&mut app, &rx, "DE_BERLIN");
        press(&mut app, KeyCode::Char('f'));
        type_line(&mut app, "cost < 100, gibberish here");
        assert_eq!(app.result_ids(), vec!["A"]);
        assert_eq!(app.unrecognized(), ["gibberish here".to_string()]);
    }

    #[test]
    fn test_search_is_live_and_escape_clears() {
        let (mut app, rx) = app();
        load(&mut app, &rx, "DE_BERLIN");
        press(&mut app, KeyCode::Char('/'));
        for c in "brick".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        assert_eq!(app.result_ids(), vec!["B"]);
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.result_ids().len(), 3);
    }

    #[test]
    fn test_focus_clamped_when_result_shrinks() {
        let (mut app, rx) = app();
        load(&mut app, &rx, "DE_BERLIN");
        press(&mut app, KeyCode::Char('G'));
        assert_eq!(app.view().session.focused, Some(2));
        press(&mut app, KeyCode::Char(':'));
        type_line(&mut app, "cost > 100");
        assert_eq!(app.view().session.focused, Some(0));
    }

    #[test]
    fn test_sort_cycles_on_cursor_column() {
        let (mut app, rx) = app();
        load(&mut app, &rx, "DE_BERLIN");
        // Cost is the fifth default column.
        for _ in 0..4 {
            press(&mut app, KeyCode::Char('l'));
        }
        press(&mut app, KeyCode::Char('s'));
        assert_eq!(app.result_ids(), vec!["A", "B", "C"]);
        press(&mut app, KeyCode::Char('s'));
        assert_eq!(app.result_ids(), vec!["B", "A", "C"]);
        press(&mut app, KeyCode::Char('s'));
        assert!(app.view().persisted.sort.is_empty());
    }

    #[test]
    fn test_selection_survives_filtering() {
        let (mut app, rx) = app();
        load(&mut app, &rx, "DE_BERLIN");
        press(&mut app, KeyCode::Char('j'));
        press(&mut app, KeyCode::Char(' '));
        assert!(app.view().session.selection.contains("B"));
        press(&mut app, KeyCode::Char(':'));
        type_line(&mut app, "cost < 100");
        assert!(app.view().session.selection.contains("B"));
        press(&mut app, KeyCode::Char('u'));
        assert!(app.view().session.selection.is_empty());
    }

    #[test]
    fn test_failed_load_is_retryable_and_keeps_rows() {
        let (mut app, rx) = app();
        load(&mut app, &rx, "DE_BERLIN");
        load(&mut app, &rx, "MISSING");
        assert!(matches!(
            app.load_state(),
            LoadState::Failed {
                retryable: true,
                ..
            }
        ));
        assert_eq!(app.region(), Some("DE_BERLIN"));
        assert_eq!(app.result_ids().len(), 3);
        match press(&mut app, KeyCode::Char('r')) {
            Some(AppEvent::LoadRegion(region)) => assert_eq!(region, "MISSING"),
            _ => panic!("expected a retry"),
        }
    }

    #[test]
    fn test_invalid_region_is_not_retryable() {
        let (mut app, _rx) = app();
        app.event(AppEvent::LoadRegion("NOPE".to_string()));
        assert_eq!(
            app.load_state(),
            &LoadState::Failed {
                error: LoadError::InvalidRegion("NOPE".to_string()),
                retryable: false,
            }
        );
        assert!(press(&mut app, KeyCode::Char('r')).is_none());
    }

    #[test]
    fn test_region_switch_resets_session() {
        let (mut app, rx) = app();
        load(&mut app, &rx, "DE_BERLIN");
        press(&mut app, KeyCode::Char(':'));
        type_line(&mut app, "cost > 100");
        load(&mut app, &rx, "FR_PARIS");
        assert_eq!(app.region(), Some("FR_PARIS"));
        assert!(app.view().session.filters.is_empty());
        assert_eq!(app.result_ids(), vec!["P1"]);
    }

    #[test]
    fn test_column_picker_toggles() {
        let (mut app, rx) = app();
        load(&mut app, &rx, "DE_BERLIN");
        press(&mut app, KeyCode::Char('c'));
        assert_eq!(app.input_mode(), InputMode::Columns);
        // First entry is the code column.
        press(&mut app, KeyCode::Enter);
        assert!(!app.view().is_visible(Field::Id));
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.input_mode(), InputMode::Normal);
    }

    #[test]
    fn test_render_states() {
        let (mut app, rx) = app();
        let area = Rect::new(0, 0, 100, 20);
        let text = |app: &mut App| {
            let mut buf = Buffer::empty(area);
            app.render(area, &mut buf);
            (0..area.height)
                .flat_map(|y| (0..area.width).map(move |x| (x, y)))
                .map(|(x, y)| buf[(x, y)].symbol().to_string())
                .collect::<String>()
        };
        assert!(text(&mut app).contains("No region loaded"));
        load(&mut app, &rx, "DE_BERLIN");
        assert!(text(&mut app).contains("Brick wall"));
        press(&mut app, KeyCode::Char(':'));
        type_line(&mut app, "cost > 1000");
        assert!(text(&mut app).contains("No rows match"));
        press(&mut app, KeyCode::Char('v'));
        assert!(text(&mut app).contains("Summary"));
    }

    #[test]
    fn test_quit() {
        let (mut app, _rx) = app();
        assert!(matches!(
            press(&mut app, KeyCode::Char('q')),
            Some(AppEvent::Exit)
        ));
    }
}
