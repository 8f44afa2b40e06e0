//! EM-DAT disaster-event loader. The source ships two incompatible shapes
//! split at the year 2000: an event-per-row workbook for the early era and a
//! pre-aggregated country-year workbook for the later one.

use log::{error, info, warn};
use polars::prelude::*;

use crate::config::{Config, Period};
use crate::error::PanelError;
use crate::iso;
use crate::sheets::{read_sheet, SheetSpec};
use crate::COL;

pub mod paths {
    /// Event-level workbook covering the early era.
    pub const EVENTS_FILE: &str = "EM-DAT 1979-2000.xlsx";
    pub const EVENTS_SHEET: &str = "EM-DAT Data";
    /// Country-year workbook covering the later era.
    pub const COUNTRIES_FILE: &str = "EM-DAT countries 2000+.xlsx";
}

/// Sentinel occupying the year column of the aggregated workbook's tag row.
const YEAR_SENTINEL: &str = "#date +occurred";

/// Load EM-DAT rows for `period`, normalised to a common shape carrying an
/// integer `Year`. A missing source file is an error for the log, not for
/// the run: the loader returns an empty frame and the period is skipped
/// downstream if nothing else covers it.
pub fn load(config: &Config, period: Period) -> Result<DataFrame, PanelError> {
    let result = if period.end <= 2000 {
        load_event_era(config, period)
    } else {
        load_aggregated_era(config, period)
    };
    match result {
        Ok(df) => {
            info!("Loaded {} EM-DAT rows for {period}", df.height());
            Ok(df)
        }
        Err(PanelError::SourceUnavailable(path)) => {
            error!("EM-DAT file not found: {}", path.display());
            Ok(DataFrame::empty())
        }
        Err(PanelError::SchemaMismatch { name, missing }) => {
            error!("EM-DAT schema mismatch in {name}: missing {missing:?}");
            Ok(DataFrame::empty())
        }
        Err(e) => Err(e),
    }
}

fn load_event_era(config: &Config, period: Period) -> Result<DataFrame, PanelError> {
    let path = config.emdat_dir().join(paths::EVENTS_FILE);
    let df = read_sheet(
        &path,
        SheetSpec {
            sheet: Some(paths::EVENTS_SHEET),
            ..Default::default()
        },
    )?;
    if !df.get_column_names().contains(&COL::START_YEAR) {
        warn!("Column '{}' absent from the event-era workbook", COL::START_YEAR);
        return Err(PanelError::SchemaMismatch {
            name: paths::EVENTS_FILE.to_string(),
            missing: vec![COL::START_YEAR.to_string()],
        });
    }
    let df = df
        .lazy()
        .with_column(col(COL::START_YEAR).cast(DataType::Int32).alias(COL::YEAR))
        .filter(col(COL::YEAR).is_not_null())
        .filter(
            col(COL::YEAR)
                .gt_eq(lit(period.start))
                .and(col(COL::YEAR).lt_eq(lit(period.end))),
        )
        .collect()?;
    normalize(df, config)
}

fn load_aggregated_era(config: &Config, period: Period) -> Result<DataFrame, PanelError> {
    let path = config.emdat_dir().join(paths::COUNTRIES_FILE);
    // The second sheet row is a malformed header and is dropped at read time
    let df = read_sheet(
        &path,
        SheetSpec {
            skip_rows: &[1],
            ..Default::default()
        },
    )?;
    if !df.get_column_names().contains(&COL::YEAR) {
        warn!("Column '{}' absent from the aggregated-era workbook", COL::YEAR);
        return Err(PanelError::SchemaMismatch {
            name: paths::COUNTRIES_FILE.to_string(),
            missing: vec![COL::YEAR.to_string()],
        });
    }
    let df = df
        .lazy()
        .filter(col(COL::YEAR).neq(lit(YEAR_SENTINEL)).fill_null(lit(true)))
        .with_column(col(COL::YEAR).cast(DataType::Int32))
        .filter(col(COL::YEAR).is_not_null())
        .filter(
            col(COL::YEAR)
                .gt_eq(lit(period.start))
                .and(col(COL::YEAR).lt_eq(lit(period.end))),
        )
        .collect()?;
    normalize(df, config)
}

fn normalize(df: DataFrame, config: &Config) -> Result<DataFrame, PanelError> {
    if df.is_empty() || !df.get_column_names().contains(&COL::ISO) {
        return Ok(df);
    }
    Ok(iso::normalize_iso_default(df, &config.excluded_iso_codes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_source_yields_empty_not_error() {
        let config = Config {
            data_dir: "/nonexistent".into(),
            ..Default::default()
        };
        let df = load(&config, Period::new(1979, 2000)).unwrap();
        assert!(df.is_empty());
    }

    #[test]
    fn test_era_boundary_selects_event_file_for_2000() {
        // A window ending in 2000 must use the event-level workbook; this is
        // observable through which missing file gets reported, so both eras
        // go through the same recovery path
        let config = Config {
            data_dir: "/nonexistent".into(),
            ..Default::default()
        };
        assert!(load(&config, Period::new(1979, 2000)).unwrap().is_empty());
        assert!(load(&config, Period::new(2000, 2024)).unwrap().is_empty());
    }
}
