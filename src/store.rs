//! Region-keyed row store.
//!
//! A region's dataset is read once through a [`DatasetSource`], mapped into
//! typed [`Row`]s and kept for `ttl`. All shape coercion (NaN, blank strings,
//! missing ids) happens here so the query pipeline only ever sees clean rows.

use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{AppConfig, ColumnMapping, RegionConfig};
use crate::error::LoadError;
use crate::price::{PriceCandidates, PricePolicy};
use crate::row::{Field, Row};

/// One column of a source table, before typing into rows.
#[derive(Debug, Clone, PartialEq)]
pub enum RawColumn {
    Numbers(Vec<Option<f64>>),
    Texts(Vec<Option<String>>),
}

impl RawColumn {
    fn number(&self, index: usize) -> Option<f64> {
        match self {
            RawColumn::Numbers(values) => values.get(index).copied().flatten(),
            RawColumn::Texts(values) => values
                .get(index)
                .and_then(|v| v.as_deref())
                .and_then(|s| s.trim().parse::<f64>().ok()),
        }
    }

    fn text(&self, index: usize) -> Option<String> {
        match self {
            RawColumn::Numbers(values) => values
                .get(index)
                .copied()
                .flatten()
                .map(|n| n.to_string()),
            RawColumn::Texts(values) => values.get(index).cloned().flatten(),
        }
    }

    fn len(&self) -> usize {
        match self {
            RawColumn::Numbers(values) => values.len(),
            RawColumn::Texts(values) => values.len(),
        }
    }
}

/// Named columns as read from a dataset file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    height: usize,
    columns: HashMap<String, RawColumn>,
}

impl RawTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_numbers(mut self, name: &str, values: Vec<Option<f64>>) -> Self {
        self.insert(name, RawColumn::Numbers(values));
        self
    }

    pub fn with_texts(mut self, name: &str, values: Vec<Option<&str>>) -> Self {
        let values = values.into_iter().map(|v| v.map(str::to_string)).collect();
        self.insert(name, RawColumn::Texts(values));
        self
    }

    pub fn insert(&mut self, name: &str, column: RawColumn) {
        self.height = self.height.max(column.len());
        self.columns.insert(name.to_string(), column);
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    fn number(&self, name: &str, index: usize) -> Option<f64> {
        self.columns.get(name).and_then(|c| c.number(index))
    }

    fn text(&self, name: &str, index: usize) -> Option<String> {
        self.columns.get(name).and_then(|c| c.text(index))
    }
}

/// Reads the raw table of one region.
pub trait DatasetSource: Send + Sync {
    /// `columns` lists the source columns the mapping needs; others may be skipped.
    fn read(&self, region: &str, path: &Path, columns: &[&str]) -> Result<RawTable, LoadError>;
}

/// Parquet and CSV files through polars.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolarsSource;

impl PolarsSource {
    fn read_dataframe(path: &Path) -> PolarsResult<DataFrame> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match extension.as_deref() {
            Some("csv") => CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(10_000))
                .try_into_reader_with_file_path(Some(path.into()))?
                .finish(),
            _ => {
                let file = File::open(path)?;
                ParquetReader::new(file).finish()
            }
        }
    }
}

impl DatasetSource for PolarsSource {
    fn read(&self, region: &str, path: &Path, columns: &[&str]) -> Result<RawTable, LoadError> {
        if !path.exists() {
            return Err(LoadError::unavailable(
                region,
                format!("file not found: {}", path.display()),
            ));
        }
        let df = Self::read_dataframe(path).map_err(|e| LoadError::unavailable(region, e))?;
        raw_table_from_dataframe(&df, columns).map_err(|e| LoadError::unavailable(region, e))
    }
}

/// Converts the wanted columns of `df`: numeric dtypes to f64, everything else to text.
pub fn raw_table_from_dataframe(df: &DataFrame, columns: &[&str]) -> PolarsResult<RawTable> {
    let wanted: HashSet<&str> = columns.iter().copied().collect();
    let mut table = RawTable::new();
    for column in df.get_columns() {
        let name = column.name().as_str();
        if !wanted.contains(name) {
            continue;
        }
        if column.dtype().is_numeric() {
            let cast = column.cast(&DataType::Float64)?;
            let values: Vec<Option<f64>> = cast.f64()?.into_iter().collect();
            table.insert(name, RawColumn::Numbers(values));
        } else {
            let cast = column.cast(&DataType::String)?;
            let values: Vec<Option<String>> = cast
                .str()?
                .into_iter()
                .map(|v| v.map(str::to_string))
                .collect();
            table.insert(name, RawColumn::Texts(values));
        }
    }
    // A table where every wanted column is absent still has a height.
    table.height = table.height.max(df.height());
    Ok(table)
}

/// Fixed in-memory tables keyed by region.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<String, RawTable>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, region: &str, table: RawTable) -> Self {
        self.tables.insert(region.to_string(), table);
        self
    }
}

impl DatasetSource for MemorySource {
    fn read(&self, region: &str, _path: &Path, _columns: &[&str]) -> Result<RawTable, LoadError> {
        self.tables
            .get(region)
            .cloned()
            .ok_or_else(|| LoadError::unavailable(region, "no table registered"))
    }
}

/// Rows of one region load, plus the fields the source actually carried.
#[derive(Debug, Clone)]
pub struct RowSet {
    pub region: String,
    pub rows: Vec<Row>,
    pub fields: BTreeSet<Field>,
    pub loaded_at: Instant,
}

impl RowSet {
    pub fn new(region: impl Into<String>, rows: Vec<Row>, fields: BTreeSet<Field>) -> Self {
        Self {
            region: region.into(),
            rows,
            fields,
            loaded_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Maps raw source records to rows using the column mapping and price policy.
pub fn rows_from_raw(
    region: &str,
    table: &RawTable,
    columns: &ColumnMapping,
    policy: &dyn PricePolicy,
) -> Result<RowSet, LoadError> {
    if table.height() > 0 && !table.has_column(&columns.id) {
        return Err(LoadError::unavailable(
            region,
            format!("missing id column '{}'", columns.id),
        ));
    }

    let mut rows = Vec::with_capacity(table.height());
    let mut dropped = 0usize;
    for i in 0..table.height() {
        let id = match table.text(&columns.id, i) {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                dropped += 1;
                continue;
            }
        };
        let candidates = PriceCandidates {
            resource_cost: table.number(&columns.resource_cost, i),
            median_estimate: table.number(&columns.median_estimate, i),
            mean_estimate: table.number(&columns.mean_estimate, i),
        };
        let row = Row::builder(id)
            .description(table.text(&columns.description, i).unwrap_or_default())
            .unit(table.text(&columns.unit, i))
            .category(table.text(&columns.category, i))
            .unit_cost(policy.unit_cost(&candidates))
            .quantity(table.number(&columns.quantity, i))
            .total_override(table.number(&columns.total, i))
            .material_cost(table.number(&columns.material, i))
            .labor_cost(table.number(&columns.labor, i))
            .machine_cost(table.number(&columns.machine, i))
            .area(table.number(&columns.area, i))
            .build();
        rows.push(row);
    }
    if dropped > 0 {
        tracing::warn!(region, dropped, "dropped rows without an id");
    }

    let mut fields = BTreeSet::from([Field::Id]);
    let present = |name: &String| table.has_column(name);
    if present(&columns.description) {
        fields.insert(Field::Description);
    }
    if present(&columns.unit) {
        fields.insert(Field::Unit);
    }
    if present(&columns.category) {
        fields.insert(Field::Category);
    }
    if present(&columns.quantity) {
        fields.insert(Field::Quantity);
    }
    let has_cost = rows.iter().any(|r| r.unit_cost.is_some())
        || present(&columns.resource_cost)
        || present(&columns.median_estimate)
        || present(&columns.mean_estimate);
    if has_cost {
        fields.insert(Field::Cost);
    }
    if present(&columns.total) || (has_cost && present(&columns.quantity)) {
        fields.insert(Field::Total);
    }
    for (name, field) in [
        (&columns.material, Field::Material),
        (&columns.labor, Field::Labor),
        (&columns.machine, Field::Machine),
        (&columns.area, Field::Area),
    ] {
        if present(name) {
            fields.insert(field);
        }
    }

    Ok(RowSet::new(region, rows, fields))
}

/// Everything needed to read one region off the event-loop thread.
pub struct PreparedLoad {
    region: String,
    path: PathBuf,
    columns: ColumnMapping,
    source: Arc<dyn DatasetSource>,
    policy: Arc<dyn PricePolicy>,
}

impl PreparedLoad {
    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn run(self) -> Result<RowSet, LoadError> {
        let started = Instant::now();
        let wanted = [
            self.columns.id.as_str(),
            self.columns.description.as_str(),
            self.columns.unit.as_str(),
            self.columns.category.as_str(),
            self.columns.quantity.as_str(),
            self.columns.resource_cost.as_str(),
            self.columns.median_estimate.as_str(),
            self.columns.mean_estimate.as_str(),
            self.columns.total.as_str(),
            self.columns.material.as_str(),
            self.columns.labor.as_str(),
            self.columns.machine.as_str(),
            self.columns.area.as_str(),
        ];
        let table = self.source.read(&self.region, &self.path, &wanted)?;
        let set = rows_from_raw(&self.region, &table, &self.columns, self.policy.as_ref())?;
        tracing::info!(
            region = %self.region,
            rows = set.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "region loaded"
        );
        Ok(set)
    }
}

struct Region {
    config: RegionConfig,
    path: PathBuf,
}

/// Region-keyed cache over a [`DatasetSource`].
pub struct RowStore {
    regions: BTreeMap<String, Region>,
    columns: ColumnMapping,
    source: Arc<dyn DatasetSource>,
    policy: Arc<dyn PricePolicy>,
    ttl: Duration,
    cache: HashMap<String, Arc<RowSet>>,
}

impl RowStore {
    pub fn new(source: Arc<dyn DatasetSource>, policy: Arc<dyn PricePolicy>) -> Self {
        Self {
            regions: BTreeMap::new(),
            columns: ColumnMapping::default(),
            source,
            policy,
            ttl: Duration::from_secs(300),
            cache: HashMap::new(),
        }
    }

    /// Store reading files with polars, using the config's regions, mapping and pricing.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut store = Self::new(Arc::new(PolarsSource), Arc::new(config.price_policy()))
            .with_columns(config.columns.clone())
            .with_ttl(Duration::from_secs(config.cache.ttl_secs));
        for (key, region) in &config.regions {
            let path = config.region_path(region);
            store = store.with_region_at(key, region.clone(), path);
        }
        store
    }

    pub fn with_columns(mut self, columns: ColumnMapping) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_region(self, key: &str, config: RegionConfig) -> Self {
        let path = config.path.clone();
        self.with_region_at(key, config, path)
    }

    fn with_region_at(mut self, key: &str, config: RegionConfig, path: PathBuf) -> Self {
        self.regions.insert(key.to_string(), Region { config, path });
        self
    }

    pub fn region(&self, key: &str) -> Option<&RegionConfig> {
        self.regions.get(key).map(|r| &r.config)
    }

    pub fn region_keys(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    /// Cached set for `key` if it is younger than the TTL.
    pub fn cached(&self, key: &str) -> Option<Arc<RowSet>> {
        self.cache
            .get(key)
            .filter(|set| set.loaded_at.elapsed() < self.ttl)
            .cloned()
    }

    /// Validates `key` and captures what a background read needs.
    pub fn prepare(&self, key: &str) -> Result<PreparedLoad, LoadError> {
        let region = self
            .regions
            .get(key)
            .ok_or_else(|| LoadError::InvalidRegion(key.to_string()))?;
        Ok(PreparedLoad {
            region: key.to_string(),
            path: region.path.clone(),
            columns: self.columns.clone(),
            source: Arc::clone(&self.source),
            policy: Arc::clone(&self.policy),
        })
    }

    /// Caches a freshly read set and returns the shared handle.
    pub fn insert(&mut self, set: RowSet) -> Arc<RowSet> {
        let set = Arc::new(set);
        self.cache.insert(set.region.clone(), Arc::clone(&set));
        set
    }

    /// Synchronous load: cache hit, or read now.
    pub fn load(&mut self, key: &str) -> Result<Arc<RowSet>, LoadError> {
        let prepared = self.prepare(key)?;
        if let Some(set) = self.cached(key) {
            tracing::debug!(region = key, "row store cache hit");
            return Ok(set);
        }
        let set = prepared.run()?;
        Ok(self.insert(set))
    }

    pub fn invalidate(&mut self, key: &str) {
        self.cache.remove(key);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
