//! GeoMet intensity loader: country-year rows with per-hazard physical
//! impact proxies, consumed from the parquet conversion of the source table.

use log::{error, info, warn};
use polars::prelude::*;

use crate::config::{Config, Period};
use crate::error::PanelError;
use crate::iso;
use crate::COL;

pub mod paths {
    pub const INTENSITY_FILE: &str = "geomet_intensity.parquet";
}

/// Load GeoMet rows for `period` with canonical `ISO`/`Year` keys. A
/// missing file logs an error and returns an empty frame.
pub fn load(config: &Config, period: Period) -> Result<DataFrame, PanelError> {
    let path = config.geomet_dir().join(paths::INTENSITY_FILE);
    if !path.exists() {
        error!("GeoMet file not found: {}", path.display());
        return Ok(DataFrame::empty());
    }
    let df = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())?.collect()?;
    info!("Loaded GeoMet data: {} records", df.height());

    let mut df = df;
    if !df.get_column_names().contains(&COL::GEOMET_YEAR) {
        warn!("No '{}' column found in GeoMet data", COL::GEOMET_YEAR);
        return Ok(DataFrame::empty());
    }
    df.rename(COL::GEOMET_YEAR, COL::YEAR)?;
    if df.get_column_names().contains(&COL::GEOMET_ISO) {
        df.rename(COL::GEOMET_ISO, COL::ISO)?;
    }

    let df = df
        .lazy()
        .with_column(col(COL::YEAR).cast(DataType::Int32))
        .filter(
            col(COL::YEAR)
                .gt_eq(lit(period.start))
                .and(col(COL::YEAR).lt_eq(lit(period.end))),
        )
        .collect()?;
    if !df.get_column_names().contains(&COL::ISO) {
        warn!("No '{}' column found in GeoMet data", COL::ISO);
        return Ok(DataFrame::empty());
    }
    let df = iso::normalize_iso_default(df, &config.excluded_iso_codes)?;
    info!("Filtered to {} GeoMet records for {period}", df.height());
    Ok(df)
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
        let df = load(&config, Period::new(2000, 2024)).unwrap();
        assert!(df.is_empty());
    }

    #[test]
    fn test_loads_and_windows_parquet_source() {
        let dir = tempfile::tempdir().unwrap();
        let geomet_dir = dir.path().join("geomet");
        std::fs::create_dir_all(&geomet_dir).unwrap();
        let mut df = df!(
            COL::GEOMET_ISO => &["usa", "fra", "deu"],
            COL::GEOMET_YEAR => &[2001i32, 2005, 1999],
            "killed_pop_eq" => &[1.0f64, 2.0, 3.0],
        )
        .unwrap();
        let file =
            std::fs::File::create(geomet_dir.join(paths::INTENSITY_FILE)).unwrap();
        ParquetWriter::new(file).finish(&mut df).unwrap();

        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let out = load(&config, Period::new(2000, 2024)).unwrap();
        assert_eq!(out.height(), 2);
        let isos: Vec<&str> = out
            .column(COL::ISO)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(isos, vec!["USA", "FRA"]);
    }
}
