//! Demographic loader: World Bank income classification broadcast onto the
//! UN country-year population table.

use log::{error, info};
use polars::prelude::*;

use crate::config::Config;
use crate::error::PanelError;
use crate::iso;
use crate::sheets::{read_sheet, SheetSpec};
use crate::COL;

pub mod paths {
    pub const INCOME_FILE: &str = "country_income_classification.xlsx";
    pub const POPULATION_FILE: &str = "total_population.xlsx";
    pub const POPULATION_SHEET: &str = "Estimates";
    /// Zero-based row index of the population sheet's header.
    pub const POPULATION_HEADER_ROW: usize = 16;
}

/// Income groups counting as poor for the `is_poor_country` covariate.
const POOR_INCOME_GROUPS: [&str; 2] = ["Low income", "Lower middle income"];

/// Population rows are restricted to actual countries, not regional
/// aggregates.
const COUNTRY_ROW_TYPE: &str = "Country/Area";

/// The population column arrives in thousands.
const POPULATION_UNIT: f64 = 1000.0;

/// Load the (ISO, Year) demographic table: population, income group and the
/// derived poor/small booleans. Failures log an error and return an empty
/// frame; the coverage validator turns that into a period-fatal condition.
pub fn load(config: &Config) -> Result<DataFrame, PanelError> {
    match try_load(config) {
        Ok(df) => Ok(df),
        Err(PanelError::SourceUnavailable(path)) => {
            error!("Demographic source not found: {}", path.display());
            Ok(DataFrame::empty())
        }
        Err(PanelError::SchemaMismatch { name, missing }) => {
            error!("Demographic schema mismatch in {name}: missing {missing:?}");
            Ok(DataFrame::empty())
        }
        Err(e) => Err(e),
    }
}

fn try_load(config: &Config) -> Result<DataFrame, PanelError> {
    let income = load_income(config)?;
    let population = load_population(config)?;

    // Income classification is time-invariant in the source, so the merge
    // key is the country code alone
    let df = population
        .lazy()
        .join(
            income.lazy(),
            [col(COL::ISO)],
            [col(COL::ISO)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(
            col(COL::POPULATION)
                .lt(lit(config.small_country_threshold))
                .alias(COL::IS_SMALL_COUNTRY),
        )
        .collect()?;
    let df = iso::normalize_iso_default(df, &config.excluded_iso_codes)?;
    info!(
        "Loaded demographic data: {} country-year rows",
        df.height()
    );
    Ok(df)
}

fn load_income(config: &Config) -> Result<DataFrame, PanelError> {
    let path = config.worldbank_dir().join(paths::INCOME_FILE);
    let mut df = read_sheet(&path, SheetSpec::default())?;
    let names = df.get_column_names();
    let missing: Vec<String> = [COL::INCOME_CODE, COL::INCOME_GROUP]
        .iter()
        .filter(|c| !names.contains(c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PanelError::SchemaMismatch {
            name: paths::INCOME_FILE.to_string(),
            missing,
        });
    }
    df.rename(COL::INCOME_CODE, COL::ISO)?;
    let poor = Series::new("poor_groups", POOR_INCOME_GROUPS.to_vec());
    Ok(df
        .lazy()
        .with_column(
            col(COL::INCOME_GROUP)
                .is_in(lit(poor))
                .fill_null(lit(false))
                .alias(COL::IS_POOR_COUNTRY),
        )
        .select([col(COL::ISO), col(COL::INCOME_GROUP), col(COL::IS_POOR_COUNTRY)])
        .collect()?)
}

fn load_population(config: &Config) -> Result<DataFrame, PanelError> {
    let path = config.undesa_dir().join(paths::POPULATION_FILE);
    let mut df = read_sheet(
        &path,
        SheetSpec {
            sheet: Some(paths::POPULATION_SHEET),
            header_row: paths::POPULATION_HEADER_ROW,
            ..Default::default()
        },
    )?;
    let names = df.get_column_names();
    let missing: Vec<String> = [COL::POP_ISO3, COL::YEAR, COL::POP_COUNT]
        .iter()
        .filter(|c| !names.contains(c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PanelError::SchemaMismatch {
            name: paths::POPULATION_FILE.to_string(),
            missing,
        });
    }
    df.rename(COL::POP_ISO3, COL::ISO)?;
    df.rename(COL::POP_COUNT, COL::POPULATION)?;
    if df.get_column_names().contains(&COL::POP_REGION) {
        df.rename(COL::POP_REGION, COL::COUNTRY)?;
    }

    let has_type = df.get_column_names().contains(&COL::POP_TYPE);
    let mut lf = df.lazy();
    // Only actual country rows, not regional aggregates
    if has_type {
        lf = lf.filter(col(COL::POP_TYPE).eq(lit(COUNTRY_ROW_TYPE)));
    }
    let df = lf
        .filter(col(COL::ISO).is_not_null())
        .with_columns([
            (col(COL::POPULATION).cast(DataType::Float64) * lit(POPULATION_UNIT))
                .alias(COL::POPULATION),
            col(COL::YEAR).cast(DataType::Int32),
        ])
        .filter(col(COL::YEAR).is_not_null())
        .select([col(COL::ISO), col(COL::YEAR), col(COL::POPULATION)])
        .collect()?;
    let df = iso::normalize_iso_default(df, &config.excluded_iso_codes)?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_sources_yield_empty_not_error() {
        let config = Config {
            data_dir: "/nonexistent".into(),
            ..Default::default()
        };
        let df = load(&config).unwrap();
        assert!(df.is_empty());
    }

    #[test]
    fn test_poor_income_groups() {
        assert!(POOR_INCOME_GROUPS.contains(&"Low income"));
        assert!(POOR_INCOME_GROUPS.contains(&"Lower middle income"));
        assert!(!POOR_INCOME_GROUPS.contains(&"High income"));
    }
}
