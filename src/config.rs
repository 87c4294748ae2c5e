use color_eyre::eyre::eyre;
use color_eyre::Result;
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::price::{FallbackChain, PriceSource};

/// Locates and writes files in the cwicr config directory.
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Uses `config_dir` as is. Tests point this at a temp dir.
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    /// `<platform config dir>/<app_name>`.
    pub fn new(app_name: &str) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| eyre!("Could not determine config directory"))?
            .join(app_name);

        Ok(Self { config_dir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self, path: &str) -> PathBuf {
        self.config_dir.join(path)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }

    /// The commented template written by `--write-default-config`.
    pub fn generate_default_config(&self) -> String {
        DEFAULT_CONFIG_TEMPLATE.to_string()
    }

    /// Refuses to overwrite an existing file unless `force`.
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let config_path = self.config_path("config.toml");

        if config_path.exists() && !force {
            return Err(eyre!(
                "Config file already exists at {}. Use --force to overwrite.",
                config_path.display()
            ));
        }

        self.ensure_config_dir()?;
        std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)?;

        Ok(config_path)
    }
}

/// Everything read from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Format version; only "0.1" is accepted.
    pub version: String,
    pub dataset: DatasetConfig,
    pub regions: BTreeMap<String, RegionConfig>,
    pub columns: ColumnMapping,
    pub pricing: PricingConfig,
    pub cache: CacheConfig,
    pub display: DisplayConfig,
    pub theme: ThemeConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct DatasetConfig {
    /// Base directory for relative region paths. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
}

/// Display and source settings for one region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegionConfig {
    pub path: PathBuf,
    pub currency: String,
    pub locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Source column name for each row field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnMapping {
    pub id: String,
    pub description: String,
    pub unit: String,
    pub category: String,
    pub quantity: String,
    pub resource_cost: String,
    pub median_estimate: String,
    pub mean_estimate: String,
    pub total: String,
    pub material: String,
    pub labor: String,
    pub machine: String,
    pub area: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PricingConfig {
    pub order: Vec<PriceSource>,
    /// Unit cost used when no source in `order` has a value. Unset means null.
    pub default: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub default_region: Option<String>,
    pub overscan: usize,
    pub row_height: u32,
    pub event_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub colors: ColorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColorConfig {
    pub primary: String,
    pub dimmed: String,
    pub error: String,
    pub warning: String,
    pub controls_bg: String,
    pub table_header: String,
    pub table_focused: String,
    pub table_selected: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub enabled: bool,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: "0.1".to_string(),
            dataset: DatasetConfig::default(),
            regions: default_regions(),
            columns: ColumnMapping::default(),
            pricing: PricingConfig::default(),
            cache: CacheConfig::default(),
            display: DisplayConfig::default(),
            theme: ThemeConfig::default(),
            debug: DebugConfig::default(),
        }
    }
}

fn default_regions() -> BTreeMap<String, RegionConfig> {
    [
        ("AR_DUBAI", "AED", "ar-AE", "Dubai"),
        ("DE_BERLIN", "EUR", "de-DE", "Berlin"),
        ("EN_TORONTO", "CAD", "en-CA", "Toronto"),
        ("ES_BARCELONA", "EUR", "es-ES", "Barcelona"),
        ("FR_PARIS", "EUR", "fr-FR", "Paris"),
        ("HI_MUMBAI", "INR", "hi-IN", "Mumbai"),
        ("PT_SAOPAULO", "BRL", "pt-BR", "São Paulo"),
        ("RU_STPETERSBURG", "RUB", "ru-RU", "St. Petersburg"),
        ("ZH_SHANGHAI", "CNY", "zh-CN", "Shanghai"),
    ]
    .into_iter()
    .map(|(key, currency, locale, label)| {
        (
            key.to_string(),
            RegionConfig {
                path: PathBuf::from(format!("{}.parquet", key)),
                currency: currency.to_string(),
                locale: locale.to_string(),
                label: Some(label.to_string()),
            },
        )
    })
    .collect()
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            id: "rate_code".to_string(),
            description: "rate_original_name".to_string(),
            unit: "rate_unit".to_string(),
            category: "category_type".to_string(),
            quantity: "resource_quantity".to_string(),
            resource_cost: "resource_cost".to_string(),
            median_estimate: "price_est_median".to_string(),
            mean_estimate: "price_est_mean".to_string(),
            total: "total_cost_position".to_string(),
            material: "cost_of_materials".to_string(),
            labor: "cost_of_labor".to_string(),
            machine: "cost_of_machines".to_string(),
            area: "area".to_string(),
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        let chain = FallbackChain::default();
        Self {
            order: chain.order,
            default: chain.default,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_region: None,
            overscan: 5,
            row_height: 1,
            event_poll_interval_ms: 25,
        }
    }
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            colors: ColorConfig::default(),
        }
    }
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            primary: "cyan".to_string(),
            dimmed: "dark_gray".to_string(),
            error: "red".to_string(),
            warning: "yellow".to_string(),
            controls_bg: "indexed(236)".to_string(),
            table_header: "white".to_string(),
            table_focused: "indexed(238)".to_string(),
            table_selected: "green".to_string(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_level: "info".to_string(),
        }
    }
}

// Loading
impl AppConfig {
    /// Defaults, then the user's `config.toml` on top, then validation.
    pub fn load(app_name: &str) -> Result<Self> {
        let config_manager = ConfigManager::new(app_name)?;
        Self::load_from(&config_manager)
    }

    /// Load configuration using the config.toml inside `config_manager`'s directory
    pub fn load_from(config_manager: &ConfigManager) -> Result<Self> {
        let mut config = AppConfig::default();

        if let Some(user_config) = Self::load_user_config(config_manager)? {
            config.merge(user_config);
        }

        config.validate()?;

        Ok(config)
    }

    fn load_user_config(config_manager: &ConfigManager) -> Result<Option<AppConfig>> {
        let config_path = config_manager.config_path("config.toml");

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            eyre!(
                "Failed to read config file at {}: {}",
                config_path.display(),
                e
            )
        })?;

        toml::from_str(&content).map(Some).map_err(|e| {
            eyre!(
                "Failed to parse config file at {}: {}",
                config_path.display(),
                e
            )
        })
    }

    /// Fields of `other` that differ from the defaults win.
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != AppConfig::default().version {
            self.version = other.version;
        }

        if other.dataset.data_dir.is_some() {
            self.dataset.data_dir = other.dataset.data_dir;
        }
        // User regions extend the built-in table and replace same-named entries.
        for (key, region) in other.regions {
            self.regions.insert(key, region);
        }
        self.columns.merge(other.columns);
        self.pricing.merge(other.pricing);
        self.cache.merge(other.cache);
        self.display.merge(other.display);
        self.theme.merge(other.theme);
        self.debug.merge(other.debug);
    }

    /// Rejects values the app cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with("0.1") {
            return Err(eyre!(
                "Unsupported config version: {}. Expected 0.1.x",
                self.version
            ));
        }

        for (key, region) in &self.regions {
            let code = region.currency.as_str();
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(eyre!(
                    "Invalid currency code '{}' for region {}. Expected ISO 4217 (e.g. EUR)",
                    code,
                    key
                ));
            }
        }

        if let Some(region) = &self.display.default_region {
            if !self.regions.contains_key(region) {
                return Err(eyre!("default_region '{}' is not a configured region", region));
            }
        }

        if self.display.row_height == 0 {
            return Err(eyre!("row_height must be greater than 0"));
        }

        if self.display.event_poll_interval_ms == 0 {
            return Err(eyre!("event_poll_interval_ms must be greater than 0"));
        }

        if self.pricing.order.is_empty() && self.pricing.default.is_none() {
            return Err(eyre!(
                "pricing.order is empty and pricing.default is unset; no unit cost could be selected"
            ));
        }

        self.theme.colors.validate()?;

        Ok(())
    }

    /// Absolute path of a region's dataset file.
    pub fn region_path(&self, region: &RegionConfig) -> PathBuf {
        if region.path.is_absolute() {
            return region.path.clone();
        }
        let base = self
            .dataset
            .data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join(crate::APP_NAME)))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join(&region.path)
    }

    pub fn price_policy(&self) -> FallbackChain {
        FallbackChain {
            order: self.pricing.order.clone(),
            default: self.pricing.default,
        }
    }
}

impl ColumnMapping {
    pub fn merge(&mut self, other: Self) {
        let default = ColumnMapping::default();
        macro_rules! take {
            ($($field:ident),*) => {
                $(
                    if other.$field != default.$field {
                        self.$field = other.$field;
                    }
                )*
            };
        }
        take!(
            id,
            description,
            unit,
            category,
            quantity,
            resource_cost,
            median_estimate,
            mean_estimate,
            total,
            material,
            labor,
            machine,
            area
        );
    }
}

impl PricingConfig {
    pub fn merge(&mut self, other: Self) {
        let default = PricingConfig::default();
        if other.order != default.order {
            self.order = other.order;
        }
        if other.default != default.default {
            self.default = other.default;
        }
    }
}

impl CacheConfig {
    pub fn merge(&mut self, other: Self) {
        let default = CacheConfig::default();
        if other.ttl_secs != default.ttl_secs {
            self.ttl_secs = other.ttl_secs;
        }
    }
}

impl DisplayConfig {
    pub fn merge(&mut self, other: Self) {
        let default = DisplayConfig::default();
        if other.default_region.is_some() {
            self.default_region = other.default_region;
        }
        if other.overscan != default.overscan {
            self.overscan = other.overscan;
        }
        if other.row_height != default.row_height {
            self.row_height = other.row_height;
        }
        if other.event_poll_interval_ms != default.event_poll_interval_ms {
            self.event_poll_interval_ms = other.event_poll_interval_ms;
        }
    }
}

impl ThemeConfig {
    pub fn merge(&mut self, other: Self) {
        self.colors.merge(other.colors);
    }
}

impl ColorConfig {
    fn entries(&self) -> [(&'static str, &str); 8] {
        [
            ("primary", &self.primary),
            ("dimmed", &self.dimmed),
            ("error", &self.error),
            ("warning", &self.warning),
            ("controls_bg", &self.controls_bg),
            ("table_header", &self.table_header),
            ("table_focused", &self.table_focused),
            ("table_selected", &self.table_selected),
        ]
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in self.entries() {
            parse_color(value).map_err(|e| eyre!("Invalid color for {}: {}", name, e))?;
        }
        Ok(())
    }

    pub fn merge(&mut self, other: Self) {
        let default = ColorConfig::default();
        macro_rules! take {
            ($($field:ident),*) => {
                $(
                    if other.$field != default.$field {
                        self.$field = other.$field;
                    }
                )*
            };
        }
        take!(
            primary,
            dimmed,
            error,
            warning,
            controls_bg,
            table_header,
            table_focused,
            table_selected
        );
    }
}

impl DebugConfig {
    pub fn merge(&mut self, other: Self) {
        let default = DebugConfig::default();
        if other.enabled != default.enabled {
            self.enabled = other.enabled;
        }
        if other.log_level != default.log_level {
            self.log_level = other.log_level;
        }
    }
}

/// Parse a color name, `#rrggbb` hex, or `indexed(N)`.
pub fn parse_color(s: &str) -> Result<Color> {
    let trimmed = s.trim().to_lowercase();
    if let Some(inner) = trimmed
        .strip_prefix("indexed(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let index: u8 = inner
            .trim()
            .parse()
            .map_err(|_| eyre!("Invalid color index: {}", inner))?;
        return Ok(Color::Indexed(index));
    }
    Color::from_str(&trimmed).map_err(|_| eyre!("Unknown color: {}", s))
}

/// Colors by name, parsed once at startup.
#[derive(Debug, Clone)]
pub struct Theme {
    pub colors: HashMap<String, Color>,
}

impl Theme {
    /// Parses every configured color.
    pub fn from_config(config: &ThemeConfig) -> Result<Self> {
        let mut colors = HashMap::new();
        for (name, value) in config.colors.entries() {
            colors.insert(name.to_string(), parse_color(value)?);
        }
        Ok(Self { colors })
    }

    /// `Color::Reset` for unknown names.
    pub fn get(&self, name: &str) -> Color {
        self.colors.get(name).copied().unwrap_or(Color::Reset)
    }
}

impl Default for Theme {
    fn default() -> Self {
        // Default colors always parse; fall back to an empty map if they ever stop to.
        Self::from_config(&ThemeConfig::default()).unwrap_or_else(|_| Self {
            colors: HashMap::new(),
        })
    }
}

// Template
const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../config/default.toml");
