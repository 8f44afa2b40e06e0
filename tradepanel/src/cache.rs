//! Per-period cache of pipeline intermediates: a parquet table next to a
//! JSON manifest recording the schema version and the exact parameters the
//! table was built from, so staleness is detectable rather than assumed.
//! Any read problem is a miss, never an error.

use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Period;
use crate::error::PanelError;

/// Bumped whenever the shape of a cached table changes.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Cache kind for the validated per-period export tables.
pub const EXPORTS: &str = "exports";
/// Cache kind for the per-period disaster panels.
pub const DISASTERS: &str = "disasters";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheManifest {
    pub schema_version: u32,
    pub year_start: i32,
    pub year_end: i32,
    pub exclusion_hash: u64,
    pub rows: usize,
    pub created_at: String,
}

/// Order-insensitive digest of the exclusion set, so a config change
/// invalidates entries built under a different one.
pub fn exclusion_hash(excluded: &[String]) -> u64 {
    let mut codes: Vec<String> = excluded.iter().map(|c| c.trim().to_uppercase()).collect();
    codes.sort();
    codes.dedup();
    let mut hasher = DefaultHasher::new();
    codes.hash(&mut hasher);
    hasher.finish()
}

fn data_path(cache_dir: &Path, kind: &str, period: Period) -> PathBuf {
    cache_dir.join(format!("{kind}_{}.parquet", period.key()))
}

fn manifest_path(cache_dir: &Path, kind: &str, period: Period) -> PathBuf {
    cache_dir.join(format!("{kind}_{}.json", period.key()))
}

/// Read a cached table if a valid entry exists for exactly these
/// parameters. Every failure mode (absent files, unreadable manifest,
/// version or parameter mismatch, unreadable parquet) is a miss.
pub fn read(
    cache_dir: &Path,
    kind: &str,
    period: Period,
    excluded: &[String],
) -> Option<DataFrame> {
    match try_read(cache_dir, kind, period, excluded) {
        Ok(Some(df)) => {
            info!("Loaded {kind} {period} from cache ({} rows)", df.height());
            Some(df)
        }
        Ok(None) => {
            debug!("Cache miss for {kind} {period}");
            None
        }
        Err(e) => {
            warn!("{e}; recomputing");
            None
        }
    }
}

fn try_read(
    cache_dir: &Path,
    kind: &str,
    period: Period,
    excluded: &[String],
) -> Result<Option<DataFrame>, PanelError> {
    let manifest_file = manifest_path(cache_dir, kind, period);
    let data_file = data_path(cache_dir, kind, period);
    if !manifest_file.exists() || !data_file.exists() {
        return Ok(None);
    }

    let failure = |detail: String| PanelError::CacheReadFailure(format!("{kind} {period}: {detail}"));
    let contents = std::fs::read_to_string(&manifest_file).map_err(|e| failure(e.to_string()))?;
    let manifest: CacheManifest =
        serde_json::from_str(&contents).map_err(|e| failure(e.to_string()))?;
    if manifest.schema_version != CACHE_SCHEMA_VERSION
        || manifest.year_start != period.start
        || manifest.year_end != period.end
        || manifest.exclusion_hash != exclusion_hash(excluded)
    {
        return Err(failure("entry is stale".to_string()));
    }

    let df = LazyFrame::scan_parquet(&data_file, ScanArgsParquet::default())
        .and_then(|lf| lf.collect())
        .map_err(|e| failure(e.to_string()))?;
    Ok(Some(df))
}

/// Write a cache entry. The parquet table lands first and the manifest
/// last, so an interrupted write never yields a readable-but-wrong entry.
pub fn write(
    cache_dir: &Path,
    kind: &str,
    period: Period,
    excluded: &[String],
    df: &DataFrame,
) -> Result<(), PanelError> {
    std::fs::create_dir_all(cache_dir)?;
    let data_file = data_path(cache_dir, kind, period);
    let file = File::create(&data_file)?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .finish(&mut df.clone())?;

    let manifest = CacheManifest {
        schema_version: CACHE_SCHEMA_VERSION,
        year_start: period.start,
        year_end: period.end,
        exclusion_hash: exclusion_hash(excluded),
        rows: df.height(),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    std::fs::write(
        manifest_path(cache_dir, kind, period),
        serde_json::to_string_pretty(&manifest).map_err(anyhow::Error::from)?,
    )?;
    info!("Cache saved: {}", data_file.display());
    Ok(())
}

/// Remove the cache entry for one period, if present. Returns whether
/// anything was deleted.
pub fn clear(cache_dir: &Path, kind: &str, period: Period) -> Result<bool, PanelError> {
    let mut removed = false;
    for path in [
        data_path(cache_dir, kind, period),
        manifest_path(cache_dir, kind, period),
    ] {
        if path.exists() {
            std::fs::remove_file(&path)?;
            removed = true;
        }
    }
    if removed {
        info!("Cache deleted: {kind} {period}");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df!("ISO" => &["USA", "FRA"], "Year" => &[2001i32, 2002]).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let period = Period::new(2001, 2002);
        let excluded = vec!["YUG".to_string()];
        write(dir.path(), EXPORTS, period, &excluded, &sample()).unwrap();
        let back = read(dir.path(), EXPORTS, period, &excluded).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_absent_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(dir.path(), EXPORTS, Period::new(2001, 2002), &[]).is_none());
    }

    #[test]
    fn test_changed_exclusions_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let period = Period::new(2001, 2002);
        write(dir.path(), EXPORTS, period, &["YUG".to_string()], &sample()).unwrap();
        assert!(read(dir.path(), EXPORTS, period, &["ANT".to_string()]).is_none());
    }

    #[test]
    fn test_exclusion_hash_ignores_order_and_case() {
        let a = exclusion_hash(&["yug".to_string(), "ANT".to_string()]);
        let b = exclusion_hash(&["ANT".to_string(), "YUG".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_corrupt_manifest_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let period = Period::new(2001, 2002);
        let excluded: Vec<String> = vec![];
        write(dir.path(), DISASTERS, period, &excluded, &sample()).unwrap();
        std::fs::write(dir.path().join("disasters_2001_2002.json"), "not json").unwrap();
        assert!(read(dir.path(), DISASTERS, period, &excluded).is_none());
    }

    #[test]
    fn test_clear_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let period = Period::new(2001, 2002);
        let excluded: Vec<String> = vec![];
        write(dir.path(), EXPORTS, period, &excluded, &sample()).unwrap();
        assert!(clear(dir.path(), EXPORTS, period).unwrap());
        assert!(read(dir.path(), EXPORTS, period, &excluded).is_none());
        assert!(!clear(dir.path(), EXPORTS, period).unwrap());
    }
}
