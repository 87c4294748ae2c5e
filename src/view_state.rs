//! Grid layout and selection state, changed only through [`ViewAction`]s.
//!
//! The persisted half (mode, columns, sort, widths) survives restarts per
//! region. The session half (selection, focus, filters, search) does not.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

use crate::filter::FilterCondition;
use crate::persist::KvStore;
use crate::pipeline::SortKey;
use crate::row::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Table,
    Summary,
}

pub const DEFAULT_COLUMNS: [Field; 7] = [
    Field::Id,
    Field::Description,
    Field::Category,
    Field::Unit,
    Field::Cost,
    Field::Quantity,
    Field::Total,
];

/// Narrowest column the grid will draw.
pub const MIN_COLUMN_WIDTH: u16 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedView {
    pub view_mode: ViewMode,
    /// Never empty.
    pub visible_columns: Vec<Field>,
    pub sort: Vec<SortKey>,
    pub column_widths: BTreeMap<Field, u16>,
}

impl Default for PersistedView {
    fn default() -> Self {
        Self {
            view_mode: ViewMode::Table,
            visible_columns: DEFAULT_COLUMNS.to_vec(),
            sort: Vec::new(),
            column_widths: BTreeMap::new(),
        }
    }
}

impl PersistedView {
    /// Reads a stored blob. `None` when it does not deserialize; a blob
    /// without visible columns gets the default columns.
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        let mut view: PersistedView = serde_json::from_value(value).ok()?;
        view.visible_columns = dedup(view.visible_columns);
        if view.visible_columns.is_empty() {
            view.visible_columns = DEFAULT_COLUMNS.to_vec();
        }
        view.column_widths
            .values_mut()
            .for_each(|w| *w = (*w).max(MIN_COLUMN_WIDTH));
        Some(view)
    }
}

fn dedup(fields: Vec<Field>) -> Vec<Field> {
    let mut seen = BTreeSet::new();
    fields.into_iter().filter(|f| seen.insert(*f)).collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionView {
    pub selection: BTreeSet<String>,
    pub focused: Option<usize>,
    pub filters: Vec<FilterCondition>,
    pub search: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub persisted: PersistedView,
    pub session: SessionView,
}

impl ViewState {
    pub fn with_persisted(persisted: PersistedView) -> Self {
        Self {
            persisted,
            session: SessionView::default(),
        }
    }

    pub fn is_visible(&self, field: Field) -> bool {
        self.persisted.visible_columns.contains(&field)
    }

    pub fn column_width(&self, field: Field) -> Option<u16> {
        self.persisted.column_widths.get(&field).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewAction {
    SetViewMode(ViewMode),
    SetSort(Vec<SortKey>),
    SetVisibleColumns(Vec<Field>),
    ToggleColumn(Field),
    SetColumnWidth(Field, u16),
    ToggleRowSelection(String),
    SetFocusedIndex(Option<usize>),
    ClearSelection,
    ResetToDefaults,
    AddFilter(FilterCondition),
    RemoveFilter(usize),
    ClearFilters,
    SetSearch(String),
}

/// Applies one action. Total: payloads that make no sense leave the state as is.
pub fn reduce(state: &ViewState, action: ViewAction) -> ViewState {
    let mut next = state.clone();
    let persisted = &mut next.persisted;
    let session = &mut next.session;
    match action {
        ViewAction::SetViewMode(mode) => persisted.view_mode = mode,
        ViewAction::SetSort(sort) => persisted.sort = sort,
        ViewAction::SetVisibleColumns(columns) => {
            let columns = dedup(columns);
            if !columns.is_empty() {
                persisted.visible_columns = columns;
            }
        }
        ViewAction::ToggleColumn(field) => {
            let columns = &mut persisted.visible_columns;
            if let Some(pos) = columns.iter().position(|f| *f == field) {
                // The last visible column stays.
                if columns.len() > 1 {
                    columns.remove(pos);
                }
            } else {
                // Re-shown columns go back to their canonical position.
                let rank = |f: &Field| Field::ALL.iter().position(|a| a == f);
                let at = columns
                    .iter()
                    .position(|f| rank(f) > rank(&field))
                    .unwrap_or(columns.len());
                columns.insert(at, field);
            }
        }
        ViewAction::SetColumnWidth(field, width) => {
            persisted
                .column_widths
                .insert(field, width.max(MIN_COLUMN_WIDTH));
        }
        ViewAction::ToggleRowSelection(id) => {
            if !session.selection.remove(&id) {
                session.selection.insert(id);
            }
        }
        ViewAction::SetFocusedIndex(index) => session.focused = index,
        ViewAction::ClearSelection => session.selection.clear(),
        ViewAction::ResetToDefaults => return ViewState::default(),
        ViewAction::AddFilter(condition) => {
            if !session.filters.contains(&condition) {
                session.filters.push(condition);
            }
        }
        ViewAction::RemoveFilter(index) => {
            if index < session.filters.len() {
                session.filters.remove(index);
            }
        }
        ViewAction::ClearFilters => session.filters.clear(),
        ViewAction::SetSearch(search) => session.search = search,
    }
    next
}

fn storage_key(region: &str) -> String {
    format!("view_{}", region)
}

/// Owner of the current [`ViewState`] snapshot for one region.
pub struct ViewStore {
    state: Arc<ViewState>,
    region: String,
    kv: Arc<dyn KvStore>,
    subscribers: Vec<Sender<Arc<ViewState>>>,
}

fn restore(kv: &dyn KvStore, region: &str) -> PersistedView {
    match kv.get(&storage_key(region)) {
        None => PersistedView::default(),
        Some(value) => PersistedView::from_value(value).unwrap_or_else(|| {
            tracing::warn!(region, "stored view is invalid, using defaults");
            PersistedView::default()
        }),
    }
}

impl ViewStore {
    pub fn open(kv: Arc<dyn KvStore>, region: &str) -> Self {
        let persisted = restore(kv.as_ref(), region);
        Self {
            state: Arc::new(ViewState::with_persisted(persisted)),
            region: region.to_string(),
            kv,
            subscribers: Vec::new(),
        }
    }

    pub fn state(&self) -> Arc<ViewState> {
        Arc::clone(&self.state)
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Receives every new snapshot after it is installed.
    pub fn subscribe(&mut self) -> Receiver<Arc<ViewState>> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn dispatch(&mut self, action: ViewAction) -> Arc<ViewState> {
        let next = reduce(&self.state, action);
        if next == *self.state {
            return self.state();
        }
        let persisted_changed = next.persisted != self.state.persisted;
        self.install(next, persisted_changed);
        self.state()
    }

    /// Switches to another region's stored layout. Session state resets.
    pub fn switch_region(&mut self, region: &str) -> Arc<ViewState> {
        if region == self.region {
            return self.state();
        }
        let persisted = restore(self.kv.as_ref(), region);
        self.region = region.to_string();
        self.install(ViewState::with_persisted(persisted), false);
        self.state()
    }

    fn install(&mut self, next: ViewState, persist: bool) {
        if persist {
            match serde_json::to_value(&next.persisted) {
                Ok(value) => {
                    if let Err(e) = self.kv.set(&storage_key(&self.region), value) {
                        tracing::warn!(region = %self.region, "failed to store view: {}", e);
                    }
                }
                Err(e) => tracing::warn!("failed to encode view: {}", e),
            }
        }
        self.state = Arc::new(next);
        let snapshot = &self.state;
        self.subscribers
            .retain(|tx| tx.send(Arc::clone(snapshot)).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterOperator, FilterValue};
    use crate::persist::MemoryKvStore;
    use crate::pipeline::SortDirection;

    #[test]
    fn test_last_column_cannot_be_hidden() {
        let mut state = ViewState::default();
        state = reduce(&state, ViewAction::SetVisibleColumns(vec![Field::Cost]));
        let after = reduce(&state, ViewAction::ToggleColumn(Field::Cost));
        assert_eq!(after.persisted.visible_columns, vec![Field::Cost]);
    }

    #[test]
    fn test_toggling_everything_keeps_one_column() {
        let mut state = ViewState::default();
        for _ in 0..3 {
            for field in Field::ALL {
                state = reduce(&state, ViewAction::ToggleColumn(field));
                assert!(!state.persisted.visible_columns.is_empty());
            }
        }
    }

    #[test]
    fn test_empty_visible_columns_is_noop() {
        let state = ViewState::default();
        let after = reduce(&state, ViewAction::SetVisibleColumns(vec![]));
        assert_eq!(after, state);
    }

    #[test]
    fn test_toggle_restores_canonical_position() {
        let state = ViewState::default();
        let hidden = reduce(&state, ViewAction::ToggleColumn(Field::Category));
        assert!(!hidden.is_visible(Field::Category));
        let shown = reduce(&hidden, ViewAction::ToggleColumn(Field::Category));
        assert_eq!(shown.persisted.visible_columns, DEFAULT_COLUMNS.to_vec());
        let area = reduce(&shown, ViewAction::ToggleColumn(Field::Area));
        assert_eq!(area.persisted.visible_columns.last(), Some(&Field::Area));
    }

    #[test]
    fn test_selection_and_focus() {
        let mut state = ViewState::default();
        state = reduce(&state, ViewAction::ToggleRowSelection("A".into()));
        state = reduce(&state, ViewAction::ToggleRowSelection("B".into()));
        state = reduce(&state, ViewAction::ToggleRowSelection("A".into()));
        assert_eq!(state.session.selection.len(), 1);
        assert!(state.session.selection.contains("B"));
        state = reduce(&state, ViewAction::SetFocusedIndex(Some(4)));
        assert_eq!(state.session.focused, Some(4));
        state = reduce(&state, ViewAction::ClearSelection);
        assert!(state.session.selection.is_empty());
    }

    #[test]
    fn test_filters() {
        let cond = FilterCondition::new(Field::Cost, FilterOperator::Gt, FilterValue::Number(1.0));
        let mut state = reduce(&ViewState::default(), ViewAction::AddFilter(cond.clone()));
        state = reduce(&state, ViewAction::AddFilter(cond));
        assert_eq!(state.session.filters.len(), 1);
        state = reduce(&state, ViewAction::RemoveFilter(7));
        assert_eq!(state.session.filters.len(), 1);
        state = reduce(&state, ViewAction::RemoveFilter(0));
        assert!(state.session.filters.is_empty());
    }

    #[test]
    fn test_reset_to_defaults() {
        let mut state = reduce(&ViewState::default(), ViewAction::SetViewMode(ViewMode::Summary));
        state = reduce(&state, ViewAction::SetSearch("brick".into()));
        assert_eq!(reduce(&state, ViewAction::ResetToDefaults), ViewState::default());
    }

    #[test]
    fn test_column_width_has_floor() {
        let state = reduce(&ViewState::default(), ViewAction::SetColumnWidth(Field::Cost, 0));
        assert_eq!(state.column_width(Field::Cost), Some(MIN_COLUMN_WIDTH));
    }

    #[test]
    fn test_store_persists_only_persisted_changes() {
        let kv = Arc::new(MemoryKvStore::new());
        let mut store = ViewStore::open(kv.clone(), "DE_BERLIN");
        store.dispatch(ViewAction::SetSearch("brick".into()));
        store.dispatch(ViewAction::ToggleRowSelection("A".into()));
        assert!(kv.is_empty());

        store.dispatch(ViewAction::SetSort(vec![SortKey {
            field: Field::Cost,
            direction: SortDirection::Descending,
        }]));
        assert!(kv.get("view_DE_BERLIN").is_some());
    }

    #[test]
    fn test_store_round_trip_and_session_reset() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let mut store = ViewStore::open(kv.clone(), "ES_BARCELONA");
        store.dispatch(ViewAction::ToggleColumn(Field::Unit));
        store.dispatch(ViewAction::SetColumnWidth(Field::Description, 40));
        store.dispatch(ViewAction::SetViewMode(ViewMode::Summary));
        store.dispatch(ViewAction::SetSearch("x".into()));
        let saved = store.state().persisted.clone();

        let reopened = ViewStore::open(kv, "ES_BARCELONA");
        assert_eq!(reopened.state().persisted, saved);
        assert_eq!(reopened.state().session, SessionView::default());
    }

    #[test]
    fn test_corrupt_blob_falls_back() -> color_eyre::Result<()> {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        kv.set("view_X", serde_json::json!({"view_mode": 42}))?;
        let store = ViewStore::open(kv.clone(), "X");
        assert_eq!(store.state().persisted, PersistedView::default());

        kv.set("view_Y", serde_json::json!({"visible_columns": []}))?;
        let store = ViewStore::open(kv, "Y");
        assert_eq!(
            store.state().persisted.visible_columns,
            DEFAULT_COLUMNS.to_vec()
        );
        Ok(())
    }

    #[test]
    fn test_subscribers_see_new_snapshots() {
        let mut store = ViewStore::open(Arc::new(MemoryKvStore::new()), "X");
        let rx = store.subscribe();
        store.dispatch(ViewAction::SetSearch("a".into()));
        // Unchanged state does not notify.
        store.dispatch(ViewAction::SetSearch("a".into()));
        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].session.search, "a");
    }

    #[test]
    fn test_switch_region_loads_its_layout() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let mut store = ViewStore::open(kv.clone(), "A");
        store.dispatch(ViewAction::SetViewMode(ViewMode::Summary));
        store.dispatch(ViewAction::SetSearch("q".into()));
        let b = store.switch_region("B");
        assert_eq!(b.persisted.view_mode, ViewMode::Table);
        assert!(b.session.search.is_empty());
        let a = store.switch_region("A");
        assert_eq!(a.persisted.view_mode, ViewMode::Summary);
    }
}
