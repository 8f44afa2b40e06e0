use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use log::{debug, error, warn};
use polars::frame::DataFrame;

use crate::config::{Config, Period};

// Re-exports
pub use column_names as COL;

// Modules
pub mod aggregate;
pub mod cache;
pub mod categories;
pub mod column_names;
pub mod config;
pub mod dataset;
pub mod emdat;
pub mod error;
pub mod exports;
pub mod geomet;
pub mod iso;
pub mod panel;
pub mod sheets;
pub mod significance;
pub mod validate;
pub mod worldbank;

/// Type for the tradepanel pipeline and API. Each stage processes the
/// configured periods sequentially and independently; a failing period is
/// logged and skipped so its siblings still succeed.
pub struct TradePanel {
    pub config: Config,
}

impl TradePanel {
    /// Setup the pipeline with default configuration
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Setup the pipeline with custom configuration
    pub fn new_with_config(config: Config) -> Self {
        debug!("config: {config:?}");
        Self { config }
    }

    /// Collect, validate and cache the export table of every configured
    /// period. Returns the non-empty period tables.
    pub fn collect_exports(&self, clear_cache: bool) -> Result<BTreeMap<Period, DataFrame>> {
        let mut results = BTreeMap::new();
        for period in self.config.periods.iter().copied() {
            if clear_cache {
                cache::clear(&self.config.cache_dir, cache::EXPORTS, period)?;
            }
            if let Some(df) = cache::read(
                &self.config.cache_dir,
                cache::EXPORTS,
                period,
                &self.config.excluded_iso_codes,
            ) {
                results.insert(period, df);
                continue;
            }
            let df = exports::load(&self.config, period)?;
            if df.is_empty() {
                warn!("No export data for {period}");
                continue;
            }
            let df = exports::validate(df)?;
            if df.is_empty() {
                warn!("Export data for {period} failed validation");
                continue;
            }
            cache::write(
                &self.config.cache_dir,
                cache::EXPORTS,
                period,
                &self.config.excluded_iso_codes,
                &df,
            )?;
            results.insert(period, df);
        }
        Ok(results)
    }

    /// Build, validate and cache the disaster panel of every configured
    /// period. A period-fatal invariant violation (demographic coverage
    /// gap) aborts that period only.
    pub fn build_disasters(&self, clear_cache: bool) -> Result<BTreeMap<Period, DataFrame>> {
        let mut results = BTreeMap::new();
        for period in self.config.periods.iter().copied() {
            if clear_cache {
                cache::clear(&self.config.cache_dir, cache::DISASTERS, period)?;
            }
            if let Some(df) = cache::read(
                &self.config.cache_dir,
                cache::DISASTERS,
                period,
                &self.config.excluded_iso_codes,
            ) {
                results.insert(period, df);
                continue;
            }
            let cached_exports = cache::read(
                &self.config.cache_dir,
                cache::EXPORTS,
                period,
                &self.config.excluded_iso_codes,
            );
            match panel::build(&self.config, period, cached_exports.as_ref()) {
                Ok(df) if df.is_empty() => {
                    warn!("Disaster panel for {period} is empty; period skipped")
                }
                Ok(df) => {
                    cache::write(
                        &self.config.cache_dir,
                        cache::DISASTERS,
                        period,
                        &self.config.excluded_iso_codes,
                        &df,
                    )?;
                    results.insert(period, df);
                }
                Err(e) => error!("Disaster panel for {period} failed: {e}"),
            }
        }
        Ok(results)
    }

    /// Emit one econometric dataset CSV per period from the cached export
    /// and disaster tables. Returns the written paths.
    pub fn emit_datasets(&self) -> Result<BTreeMap<Period, PathBuf>> {
        let mut written = BTreeMap::new();
        for period in self.config.periods.iter().copied() {
            let Some(exports) = cache::read(
                &self.config.cache_dir,
                cache::EXPORTS,
                period,
                &self.config.excluded_iso_codes,
            ) else {
                error!("Export cache not found for {period}");
                continue;
            };
            let Some(panel) = cache::read(
                &self.config.cache_dir,
                cache::DISASTERS,
                period,
                &self.config.excluded_iso_codes,
            ) else {
                error!("Disaster cache not found for {period}");
                continue;
            };
            match dataset::build(&self.config, period, exports, panel) {
                Ok(df) if df.is_empty() => warn!("Dataset for {period} is empty; not written"),
                Ok(mut df) => {
                    let path = dataset::write_csv(&mut df, &self.config, period)?;
                    written.insert(period, path);
                }
                Err(e) => error!("Dataset preparation for {period} failed: {e}"),
            }
        }
        Ok(written)
    }
}

impl Default for TradePanel {
    fn default() -> Self {
        Self::new()
    }
}
