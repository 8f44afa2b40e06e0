//! Final emitter: joins the validated disaster panel onto the per-period
//! export table at the (ISO, Year, product) grain and adds the derived
//! log/group columns the downstream statistical consumer expects.

use std::path::PathBuf;

use log::{info, warn};
use polars::prelude::*;

use crate::categories::DisasterCategory;
use crate::config::{Config, Period};
use crate::error::PanelError;
use crate::iso;
use crate::COL;

/// Income groups collapsing to the "High" half of the internal split.
const HIGH_INCOME_GROUPS: [&str; 2] = ["High income", "Upper middle income"];

fn present(df: &DataFrame, column: &str) -> bool {
    df.get_column_names().contains(&column)
}

/// Columns of the emitted dataset, in order: identifiers, trade values,
/// disaster variables, significance/extreme flags, demographic controls.
fn keep_columns(df: &DataFrame, categories: &[DisasterCategory]) -> Vec<String> {
    let mut columns: Vec<String> = [
        COL::YEAR,
        COL::COUNTRY,
        COL::ISO,
        COL::CMD_CODE,
        COL::FOB_VALUE,
        COL::IS_AGRI,
    ]
    .iter()
    .map(|c| c.to_string())
    .collect();
    for category in categories {
        columns.extend([
            category.deaths_col(),
            category.affected_col(),
            category.events_col(),
            category.intensity_col(),
            category.sig_median_col(),
            category.sig_p90_col(),
            category.sig_abs1000_col(),
            category.sig_anydeaths_col(),
            category.geomet_sig_p90_col(),
            category.extreme_emdat_col(),
            category.extreme_geomet_col(),
        ]);
    }
    columns.push(COL::DISASTER_INDEX.to_string());
    columns.extend(
        [
            COL::IS_POOR_COUNTRY,
            COL::IS_SMALL_COUNTRY,
            COL::POPULATION,
            COL::INCOME_GROUP,
        ]
        .iter()
        .map(|c| c.to_string()),
    );
    columns.into_iter().filter(|c| present(df, c)).collect()
}

/// Inner-join the panel onto the export table and derive the analysis
/// columns. Both inputs are re-normalised against the exclusion set first.
pub fn build(
    config: &Config,
    period: Period,
    exports: DataFrame,
    panel: DataFrame,
) -> Result<DataFrame, PanelError> {
    let exports = iso::normalize_iso_default(exports, &config.excluded_iso_codes)?;
    let panel = iso::normalize_iso_default(panel, &config.excluded_iso_codes)?;

    if !present(&exports, COL::IS_AGRI) {
        return Err(PanelError::MissingColumns(vec![COL::IS_AGRI.to_string()]));
    }

    // The panel's display name yields to the export reporter name
    let panel_side = if present(&panel, COL::COUNTRY) {
        panel.lazy().drop([COL::COUNTRY])
    } else {
        panel.lazy()
    };
    let merged = exports
        .lazy()
        .select([
            col(COL::YEAR),
            col(COL::COUNTRY),
            col(COL::ISO),
            col(COL::CMD_CODE),
            col(COL::FOB_VALUE),
            col(COL::IS_AGRI),
        ])
        .join(
            panel_side,
            [col(COL::ISO), col(COL::YEAR)],
            [col(COL::ISO), col(COL::YEAR)],
            JoinArgs::new(JoinType::Inner),
        )
        .collect()?;

    let missing: Vec<String> = [
        COL::IS_POOR_COUNTRY,
        COL::IS_SMALL_COUNTRY,
        COL::INCOME_GROUP,
        COL::POPULATION,
    ]
    .iter()
    .filter(|c| !present(&merged, c))
    .map(|c| c.to_string())
    .collect();
    if !missing.is_empty() {
        return Err(PanelError::MissingColumns(missing));
    }

    let categories = &config.disaster_categories;
    let keep: Vec<Expr> = keep_columns(&merged, categories)
        .iter()
        .map(|c| col(c))
        .collect();
    let mut lf = merged.lazy().select(keep);

    lf = with_derived_columns(lf, categories)?;

    let df = lf.collect()?;
    info!(
        "Econometric dataset {period}: {} observations",
        df.height()
    );
    Ok(df)
}

fn with_derived_columns(
    lf: LazyFrame,
    categories: &[DisasterCategory],
) -> Result<LazyFrame, PanelError> {
    let df = lf.collect()?;
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut lf = df.clone().lazy();

    // Aggregate occurrence and death counts across categories, in logs
    let event_cols: Vec<String> = categories
        .iter()
        .map(|c| c.events_col())
        .filter(|c| names.contains(c))
        .collect();
    if let Some(sum_events) = sum_expr(&event_cols) {
        lf = lf.with_column(sum_events.alias(COL::SUM_EVENTS)).with_column(
            col(COL::SUM_EVENTS)
                .cast(DataType::Float64)
                .log1p()
                .alias(COL::LN_TOTAL_OCCURRENCE),
        );
    }
    let death_cols: Vec<String> = categories
        .iter()
        .map(|c| c.deaths_col())
        .filter(|c| names.contains(c))
        .collect();
    if let Some(sum_deaths) = sum_expr(&death_cols) {
        lf = lf.with_column(sum_deaths.alias(COL::SUM_DEATHS)).with_column(
            col(COL::SUM_DEATHS)
                .cast(DataType::Float64)
                .log1p()
                .alias(COL::LN_TOTAL_DEATHS),
        );
    }
    for category in categories {
        let events = category.events_col();
        if names.contains(&events) {
            lf = lf.with_column(
                col(&events)
                    .cast(DataType::Float64)
                    .log1p()
                    .alias(&category.ln_count_col()),
            );
        }
    }

    // Simplified income and size splits
    let high = Series::new("high_income", HIGH_INCOME_GROUPS.to_vec());
    lf = lf.with_column(
        when(col(COL::INCOME_GROUP).is_in(lit(high)))
            .then(lit("High"))
            .otherwise(lit("Low"))
            .alias(COL::INCOME_GROUP_INTERNAL),
    );
    let population_median = df
        .column(COL::POPULATION)?
        .cast(&DataType::Float64)?
        .f64()?
        .median();
    let size_group = match population_median {
        Some(median) => when(col(COL::POPULATION).cast(DataType::Float64).gt(lit(median)))
            .then(lit("Large"))
            .otherwise(lit("Small")),
        None => when(lit(false)).then(lit("Large")).otherwise(lit("Small")),
    };
    lf = lf.with_column(size_group.alias(COL::SIZE_GROUP));

    // First difference of log population within each country-product series
    lf = lf
        .sort(
            [COL::ISO, COL::CMD_CODE, COL::YEAR],
            SortMultipleOptions::default(),
        )
        .with_column(
            col(COL::POPULATION)
                .cast(DataType::Float64)
                .log(std::f64::consts::E)
                .alias(COL::LN_POPULATION),
        )
        .with_column(
            (col(COL::LN_POPULATION)
                - col(COL::LN_POPULATION)
                    .shift(lit(1))
                    .over([col(COL::ISO), col(COL::CMD_CODE)]))
            .alias(COL::D_LN_POPULATION),
        );
    Ok(lf)
}

fn sum_expr(columns: &[String]) -> Option<Expr> {
    columns
        .iter()
        .map(|c| col(c).cast(DataType::Float64).fill_null(lit(0.0)))
        .reduce(|a, b| a + b)
}

/// Write the dataset as `econometric_dataset_{start}_{end}.csv`.
pub fn write_csv(
    df: &mut DataFrame,
    config: &Config,
    period: Period,
) -> Result<PathBuf, PanelError> {
    if df.is_empty() {
        warn!("Dataset for {period} is empty; writing headers only");
    }
    std::fs::create_dir_all(&config.datasets_dir)?;
    let path = config
        .datasets_dir
        .join(format!("econometric_dataset_{}.csv", period.key()));
    let mut file = std::fs::File::create(&path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    info!("Saved econometric dataset: {} ({} rows)", path.display(), df.height());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exports_fixture() -> DataFrame {
        df!(
            COL::YEAR => &[2010i32, 2010, 2011, 2010],
            COL::COUNTRY => &["United States", "United States", "United States", "France"],
            COL::ISO => &["USA", "USA", "USA", "FRA"],
            COL::CMD_CODE => &["01", "85", "01", "01"],
            COL::FOB_VALUE => &[1000.0f64, 2000.0, 1200.0, 700.0],
            COL::IS_AGRI => &[true, false, true, true],
        )
        .unwrap()
    }

    fn panel_fixture() -> DataFrame {
        df!(
            COL::ISO => &["USA", "USA"],
            COL::YEAR => &[2010i32, 2011],
            COL::COUNTRY => &["United States", "United States"],
            "flood_deaths" => &[35.0f64, 0.0],
            "flood_events" => &[3i32, 0],
            COL::POPULATION => &[310_000_000.0f64, 312_000_000.0],
            COL::INCOME_GROUP => &["High income", "High income"],
            COL::IS_POOR_COUNTRY => &[0i32, 0],
            COL::IS_SMALL_COUNTRY => &[0i32, 0],
        )
        .unwrap()
    }

    #[test]
    fn test_inner_join_grain_is_country_year_product() {
        let config = Config::default();
        let df = build(
            &config,
            Period::new(2010, 2011),
            exports_fixture(),
            panel_fixture(),
        )
        .unwrap();
        // FRA/2010 has no panel row, so its export rows drop out; USA keeps
        // one row per (year, product)
        assert_eq!(df.height(), 3);
        let isos: Vec<&str> = df
            .column(COL::ISO)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert!(isos.iter().all(|i| *i == "USA"));
    }

    #[test]
    fn test_log_transforms() {
        let config = Config::default();
        let df = build(
            &config,
            Period::new(2010, 2011),
            exports_fixture(),
            panel_fixture(),
        )
        .unwrap();
        // Rows sort by (ISO, cmdCode, Year); the first is USA/01/2010
        let ln_count = df.column("ln_flood_count").unwrap().f64().unwrap();
        assert!((ln_count.get(0).unwrap() - (4.0f64).ln()).abs() < 1e-12);
        let ln_deaths = df.column(COL::LN_TOTAL_DEATHS).unwrap().f64().unwrap();
        assert!((ln_deaths.get(0).unwrap() - (36.0f64).ln()).abs() < 1e-12);
        let sum_events = df.column(COL::SUM_EVENTS).unwrap().f64().unwrap();
        assert_eq!(sum_events.get(0), Some(3.0));
    }

    #[test]
    fn test_income_and_size_groups() {
        let config = Config::default();
        let df = build(
            &config,
            Period::new(2010, 2011),
            exports_fixture(),
            panel_fixture(),
        )
        .unwrap();
        let internal: Vec<&str> = df
            .column(COL::INCOME_GROUP_INTERNAL)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert!(internal.iter().all(|g| *g == "High"));
        // Population 312M sits above the 3-row median of 310M
        let sizes: Vec<&str> = df
            .column(COL::SIZE_GROUP)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert!(sizes.contains(&"Large"));
        assert!(sizes.contains(&"Small"));
    }

    #[test]
    fn test_population_log_difference_within_series() {
        let config = Config::default();
        let df = build(
            &config,
            Period::new(2010, 2011),
            exports_fixture(),
            panel_fixture(),
        )
        .unwrap();
        let d_ln = df.column(COL::D_LN_POPULATION).unwrap().f64().unwrap();
        // USA/01/2010 opens its series; USA/01/2011 differs by
        // ln(312e6) - ln(310e6)
        assert!(d_ln.get(0).is_none());
        let expected = (312_000_000.0f64).ln() - (310_000_000.0f64).ln();
        assert!((d_ln.get(1).unwrap() - expected).abs() < 1e-12);
        // USA/85/2010 opens a new product series even for the same country
        assert!(d_ln.get(2).is_none());
    }

    #[test]
    fn test_missing_demographics_in_panel_is_fatal() {
        let config = Config::default();
        let panel = df!(
            COL::ISO => &["USA"],
            COL::YEAR => &[2010i32],
            "flood_deaths" => &[1.0f64],
        )
        .unwrap();
        let result = build(
            &config,
            Period::new(2010, 2010),
            exports_fixture(),
            panel,
        );
        assert!(matches!(result, Err(PanelError::MissingColumns(_))));
    }
}
