//! Hard coverage invariants on the demographic covariates. A gap here
//! signals a demographic-source coverage hole that would silently bias the
//! panel, so it aborts the period instead of being filled with defaults.

use log::{error, warn};
use polars::prelude::*;

use crate::config::Period;
use crate::error::PanelError;
use crate::COL;

/// How many offending rows get logged before truncating the examples.
const MAX_EXAMPLE_ROWS: usize = 10;

fn required_columns() -> [&'static str; 4] {
    [
        COL::IS_POOR_COUNTRY,
        COL::IS_SMALL_COUNTRY,
        COL::INCOME_GROUP,
        COL::POPULATION,
    ]
}

/// Fail fast if any required demographic column is absent from the schema.
pub fn require_schema(df: &DataFrame) -> Result<(), PanelError> {
    let names = df.get_column_names();
    let missing: Vec<String> = required_columns()
        .iter()
        .filter(|c| !names.contains(c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        error!("Required demographic columns missing from panel: {missing:?}");
        return Err(PanelError::MissingColumns(missing));
    }
    Ok(())
}

fn distinct_isos_with_null(df: &DataFrame, column: &str) -> Result<Vec<String>, PanelError> {
    let offending = df
        .clone()
        .lazy()
        .filter(col(column).is_null())
        .select([col(COL::ISO)])
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    let mut isos: Vec<String> = offending
        .column(COL::ISO)?
        .str()?
        .into_iter()
        .flatten()
        .map(|s| s.to_string())
        .collect();
    isos.sort();
    Ok(isos)
}

fn log_example_rows(df: &DataFrame, column: &str) -> Result<(), PanelError> {
    let has_country = df.get_column_names().contains(&COL::COUNTRY);
    let mut select = vec![col(COL::ISO), col(COL::YEAR)];
    if has_country {
        select.push(col(COL::COUNTRY));
    }
    let examples = df
        .clone()
        .lazy()
        .filter(col(column).is_null())
        .select(select)
        .limit(MAX_EXAMPLE_ROWS as u32)
        .collect()?;
    let isos = examples.column(COL::ISO)?.str()?;
    let years = examples.column(COL::YEAR)?.i32()?;
    for i in 0..examples.height() {
        let country = if has_country {
            examples
                .column(COL::COUNTRY)?
                .str()?
                .get(i)
                .unwrap_or("?")
                .to_string()
        } else {
            "?".to_string()
        };
        error!(
            "  missing {column}: ({}, {}, {country})",
            isos.get(i).unwrap_or("?"),
            years.get(i).map(|y| y.to_string()).unwrap_or_else(|| "?".into()),
        );
    }
    Ok(())
}

/// Enforce the coverage invariant on a joined panel: `Population`,
/// `is_poor_country` and `is_small_country` must contain no nulls — any
/// null aborts the period with full diagnostics. `Income group` is the sole
/// exception: nulls are tolerated, logged, and coerced to the literal "NA".
/// On success the covariates are strictly typed.
pub fn enforce_coverage(df: DataFrame, period: Period) -> Result<DataFrame, PanelError> {
    require_schema(&df)?;

    for column in [COL::IS_POOR_COUNTRY, COL::IS_SMALL_COUNTRY, COL::POPULATION] {
        let nulls = df.column(column)?.null_count();
        if nulls > 0 {
            error!(
                "{nulls} missing values in column '{column}' after demographic join \
                 (period {period}); aborting this period"
            );
            log_example_rows(&df, column)?;
            let isos = distinct_isos_with_null(&df, column)?;
            error!("Full list of affected ISO codes: {isos:?}");
            return Err(PanelError::CoverageGap {
                column: column.to_string(),
                nulls,
                period: period.key(),
                isos,
            });
        }
    }

    let income_nulls = df.column(COL::INCOME_GROUP)?.null_count();
    if income_nulls > 0 {
        let isos = distinct_isos_with_null(&df, COL::INCOME_GROUP)?;
        warn!(
            "{} ISO code(s) lack an income group: {isos:?} (imputing \"NA\")",
            isos.len()
        );
    }

    Ok(df
        .lazy()
        .with_columns([
            col(COL::IS_POOR_COUNTRY).cast(DataType::Int32),
            col(COL::IS_SMALL_COUNTRY).cast(DataType::Int32),
            col(COL::POPULATION).cast(DataType::Float64),
            col(COL::INCOME_GROUP)
                .cast(DataType::String)
                .fill_null(lit("NA")),
        ])
        .collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel_fixture(population: Vec<Option<f64>>) -> DataFrame {
        df!(
            COL::ISO => &["AAA", "BBB", "CCC"],
            COL::YEAR => &[2001i32, 2001, 2002],
            COL::COUNTRY => &["Aland", "Bland", "Cland"],
            COL::POPULATION => population,
            COL::IS_POOR_COUNTRY => &[true, false, false],
            COL::IS_SMALL_COUNTRY => &[false, false, true],
            COL::INCOME_GROUP => &[Some("Low income"), Some("High income"), None],
        )
        .unwrap()
    }

    #[test]
    fn test_engineered_population_gap_is_fatal() {
        let df = panel_fixture(vec![Some(1.0), None, Some(3.0)]);
        let err = enforce_coverage(df, Period::new(2001, 2002)).unwrap_err();
        match err {
            PanelError::CoverageGap { column, nulls, isos, .. } => {
                assert_eq!(column, COL::POPULATION);
                assert_eq!(nulls, 1);
                assert_eq!(isos, vec!["BBB".to_string()]);
            }
            other => panic!("expected CoverageGap, got {other}"),
        }
    }

    #[test]
    fn test_income_group_nulls_coerce_to_na() {
        let df = panel_fixture(vec![Some(1.0), Some(2.0), Some(3.0)]);
        let out = enforce_coverage(df, Period::new(2001, 2002)).unwrap();
        let incomes: Vec<&str> = out
            .column(COL::INCOME_GROUP)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(incomes, vec!["Low income", "High income", "NA"]);
        // Booleans are strictly typed to 0/1 on the way out
        assert_eq!(
            out.column(COL::IS_POOR_COUNTRY).unwrap().i32().unwrap().get(0),
            Some(1)
        );
    }

    #[test]
    fn test_missing_schema_column_names_the_missing() {
        let df = df!(
            COL::ISO => &["AAA"],
            COL::YEAR => &[2001i32],
            COL::POPULATION => &[1.0f64],
        )
        .unwrap();
        let err = require_schema(&df).unwrap_err();
        match err {
            PanelError::MissingColumns(missing) => {
                assert!(missing.contains(&COL::IS_POOR_COUNTRY.to_string()));
                assert!(missing.contains(&COL::INCOME_GROUP.to_string()));
                assert!(!missing.contains(&COL::POPULATION.to_string()));
            }
            other => panic!("expected MissingColumns, got {other}"),
        }
    }
}
