use std::fmt::Display;
use std::path::PathBuf;

use nonempty::{nonempty, NonEmpty};
use serde::{Deserialize, Serialize};

use crate::categories::DisasterCategory;

/// A [start, end] year window, inclusive on both ends. Periods key the
/// cache entries and the emitted datasets.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub start: i32,
    pub end: i32,
}

impl Period {
    pub fn new(start: i32, end: i32) -> Self {
        Self { start, end }
    }

    /// Key string used in cache and dataset file names.
    pub fn key(&self) -> String {
        format!("{}_{}", self.start, self.end)
    }

    pub fn contains(&self, year: i32) -> bool {
        year >= self.start && year <= self.end
    }

    pub fn years(&self) -> std::ops::RangeInclusive<i32> {
        self.start..=self.end
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the raw source files (exports/, emdat/, geomet/,
    /// world_bank/, undesa/ subdirectories).
    pub data_dir: PathBuf,
    /// Directory for per-period cached intermediates.
    pub cache_dir: PathBuf,
    /// Directory the final per-period CSVs are written to.
    pub datasets_dir: PathBuf,
    /// Year windows to process, independently and in order.
    pub periods: NonEmpty<Period>,
    /// ISO3 codes excluded from every source (obsolete/dependent territories).
    pub excluded_iso_codes: Vec<String>,
    /// Canonical disaster categories carried through the panel.
    pub disaster_categories: Vec<DisasterCategory>,
    /// Countries below this population count as small.
    pub small_country_threshold: f64,
    /// Year used for the poor/small country counts in run summaries.
    pub reference_year: i32,
    /// Default logging verbosity when RUST_LOG is unset.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: "data".into(),
            cache_dir: "cache".into(),
            datasets_dir: "datasets".into(),
            periods: nonempty![Period::new(1979, 2000), Period::new(2000, 2024)],
            excluded_iso_codes: ["ANT", "CSK", "DDR", "SUN", "YUG", "SCG"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            disaster_categories: DisasterCategory::all(),
            small_country_threshold: 1_000_000.0,
            reference_year: 2016,
            log_level: "info".into(),
        }
    }
}

impl Config {
    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    pub fn emdat_dir(&self) -> PathBuf {
        self.data_dir.join("emdat")
    }

    pub fn geomet_dir(&self) -> PathBuf {
        self.data_dir.join("geomet")
    }

    pub fn worldbank_dir(&self) -> PathBuf {
        self.data_dir.join("world_bank")
    }

    pub fn undesa_dir(&self) -> PathBuf {
        self.data_dir.join("undesa")
    }
}
