#![allow(dead_code)]

use cwicr::config::{AppConfig, RegionConfig};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Three rows: A costs 50, B costs 150, C has no price at all.
pub fn scenario_frame() -> DataFrame {
    df!(
        "rate_code" => ["A", "B", "C"],
        "rate_original_name" => ["Sand fill", "Brick wall", "Steel beam"],
        "rate_unit" => ["m3", "m2", "t"],
        "category_type" => [Some("Earthworks"), Some("Masonry"), None],
        "resource_quantity" => [Some(2.0), Some(1.0), Some(4.0)],
        "resource_cost" => [Some(50.0), Some(150.0), None],
        "price_est_median" => [None::<f64>, None, None],
        "cost_of_materials" => [Some(600.0), Some(100.0), None],
        "area" => [Some(20.0), Some(80.0), None]
    )
    .unwrap()
}

pub fn write_parquet(dir: &Path, name: &str, df: &mut DataFrame) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).unwrap();
    ParquetWriter::new(file).finish(df).unwrap();
    path
}

pub fn write_csv(dir: &Path, name: &str, df: &mut DataFrame) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    CsvWriter::new(&mut file).finish(df).unwrap();
    path
}

fn region(path: PathBuf, currency: &str) -> RegionConfig {
    RegionConfig {
        path,
        currency: currency.to_string(),
        locale: "en-US".to_string(),
        label: None,
    }
}

/// Config with `PQ` (parquet), `CSV` (csv) and `GONE` (missing file) regions
/// inside a temp dir. Rows without a price stay null.
pub fn fixture_config() -> (TempDir, AppConfig) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut df = scenario_frame();
    let parquet = write_parquet(dir.path(), "pq.parquet", &mut df);
    let csv = write_csv(dir.path(), "csv.csv", &mut df);

    let mut config = AppConfig::default();
    config.regions.clear();
    config.regions.insert("PQ".to_string(), region(parquet, "EUR"));
    config.regions.insert("CSV".to_string(), region(csv, "USD"));
    config.regions.insert(
        "GONE".to_string(),
        region(dir.path().join("missing.parquet"), "EUR"),
    );
    config.pricing.default = None;
    (dir, config)
}
