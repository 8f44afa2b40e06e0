//! Significance and extreme-event flags. Every threshold here is relative
//! to the Year cross-section it is computed in, never a global constant:
//! the same death count can be significant in one year and not in another.

use log::{debug, warn};
use polars::prelude::*;

use crate::categories::DisasterCategory;
use crate::error::PanelError;
use crate::COL;

const ABSOLUTE_DEATH_THRESHOLD: f64 = 1000.0;

/// Add the per-category significance flags and extreme-event indicators to
/// a panel. Flags are 0/1 integers.
///
/// Per category: `sig_median` and `sig_p90` compare the deaths/population
/// ratio against that year's cross-sectional median and 90th percentile
/// (zero population leaves the ratio undefined; an empty cross-section
/// defaults the threshold to 0 and every flag to false); `sig_abs1000` and
/// `sig_anydeaths` are absolute; `geomet_sig_p90` ranks the category
/// intensity within the year. The `extreme_*` columns are definitional
/// aliases of the p90 flags, kept under both names for the downstream
/// consumer.
pub fn add_flags(
    df: DataFrame,
    categories: &[DisasterCategory],
) -> Result<DataFrame, PanelError> {
    if df.is_empty() {
        return Ok(df);
    }
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let has_population = names.contains(&COL::POPULATION.to_string());
    if !has_population {
        warn!("Panel lacks a population column; ratio-based flags are skipped");
    }

    let mut flag_exprs: Vec<Expr> = vec![];
    let mut extreme_exprs: Vec<Expr> = vec![];
    for category in categories {
        let deaths_col = category.deaths_col();
        if !names.contains(&deaths_col) {
            warn!("Panel lacks '{deaths_col}'; flags for this category are skipped");
            continue;
        }
        let deaths = col(&deaths_col).cast(DataType::Float64);

        if has_population {
            // Zero population means the ratio is undefined, not infinite
            let population = when(col(COL::POPULATION).cast(DataType::Float64).gt(lit(0.0)))
                .then(col(COL::POPULATION).cast(DataType::Float64))
                .otherwise(lit(NULL));
            let ratio = deaths.clone() / population;
            let median_threshold = ratio
                .clone()
                .median()
                .over([col(COL::YEAR)])
                .fill_null(lit(0.0));
            let p90_threshold = ratio
                .clone()
                .quantile(lit(0.9), QuantileInterpolOptions::Linear)
                .over([col(COL::YEAR)])
                .fill_null(lit(0.0));
            flag_exprs.push(
                ratio
                    .clone()
                    .gt(median_threshold)
                    .fill_null(lit(false))
                    .cast(DataType::Int32)
                    .alias(&category.sig_median_col()),
            );
            flag_exprs.push(
                ratio
                    .gt(p90_threshold)
                    .fill_null(lit(false))
                    .cast(DataType::Int32)
                    .alias(&category.sig_p90_col()),
            );
            extreme_exprs
                .push(col(&category.sig_p90_col()).alias(&category.extreme_emdat_col()));
        }
        flag_exprs.push(
            deaths
                .clone()
                .gt(lit(ABSOLUTE_DEATH_THRESHOLD))
                .fill_null(lit(false))
                .cast(DataType::Int32)
                .alias(&category.sig_abs1000_col()),
        );
        flag_exprs.push(
            deaths
                .gt(lit(0.0))
                .fill_null(lit(false))
                .cast(DataType::Int32)
                .alias(&category.sig_anydeaths_col()),
        );

        let intensity_col = category.intensity_col();
        if names.contains(&intensity_col) {
            let intensity = col(&intensity_col).cast(DataType::Float64);
            let p90_threshold = intensity
                .clone()
                .quantile(lit(0.9), QuantileInterpolOptions::Linear)
                .over([col(COL::YEAR)])
                .fill_null(lit(0.0));
            flag_exprs.push(
                intensity
                    .gt(p90_threshold)
                    .fill_null(lit(false))
                    .cast(DataType::Int32)
                    .alias(&category.geomet_sig_p90_col()),
            );
            extreme_exprs
                .push(col(&category.geomet_sig_p90_col()).alias(&category.extreme_geomet_col()));
        }
    }

    // Extreme indicators alias the freshly created p90 flags, so they go
    // through a second projection
    let out = df
        .lazy()
        .with_columns(flag_exprs)
        .with_columns(extreme_exprs)
        .collect()?;
    debug!("Derived significance flags for {} categories", categories.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Five countries observed in two years with identical absolute death
    /// counts; only the population distribution differs between years.
    fn two_year_fixture() -> DataFrame {
        df!(
            COL::ISO => &["AAA", "BBB", "CCC", "DDD", "EEE",
                          "AAA", "BBB", "CCC", "DDD", "EEE"],
            COL::YEAR => &[2001i32, 2001, 2001, 2001, 2001,
                           2002, 2002, 2002, 2002, 2002],
            "earthquake_deaths" => &[10.0f64, 10.0, 10.0, 10.0, 10.0,
                                     10.0, 10.0, 10.0, 10.0, 10.0],
            COL::POPULATION => &[100.0f64, 200.0, 300.0, 400.0, 500.0,
                                 100.0, 100.0, 100.0, 100.0, 100.0],
        )
        .unwrap()
    }

    fn flags_for(df: &DataFrame, column: &str) -> Vec<i32> {
        df.column(column)
            .unwrap()
            .i32()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    #[test]
    fn test_flags_track_within_year_rank_not_absolute_value() {
        let out = add_flags(two_year_fixture(), &[DisasterCategory::Earthquake]).unwrap();
        let median_flags = flags_for(&out, "earthquake_sig_median");
        // 2001: ratios 0.1, 0.05, 0.033, 0.025, 0.02; median is 0.033, so
        // only the two smallest countries exceed it. 2002: every ratio
        // equals 0.1 = the median, and the comparison is strict.
        assert_eq!(median_flags, vec![1, 1, 0, 0, 0, 0, 0, 0, 0, 0]);

        let p90_flags = flags_for(&out, "earthquake_sig_p90");
        // 2001's 90th percentile (linear) is 0.08; only AAA's 0.1 exceeds it
        assert_eq!(p90_flags, vec![1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_absolute_flags_ignore_population() {
        let df = df!(
            COL::ISO => &["AAA", "BBB", "CCC"],
            COL::YEAR => &[2001i32, 2001, 2001],
            "earthquake_deaths" => &[1500.0f64, 3.0, 0.0],
            COL::POPULATION => &[100.0f64, 100.0, 100.0],
        )
        .unwrap();
        let out = add_flags(df, &[DisasterCategory::Earthquake]).unwrap();
        assert_eq!(flags_for(&out, "earthquake_sig_abs1000"), vec![1, 0, 0]);
        assert_eq!(flags_for(&out, "earthquake_sig_anydeaths"), vec![1, 1, 0]);
    }

    #[test]
    fn test_zero_population_leaves_ratio_undefined() {
        let df = df!(
            COL::ISO => &["AAA", "BBB"],
            COL::YEAR => &[2001i32, 2001],
            "earthquake_deaths" => &[50.0f64, 1.0],
            COL::POPULATION => &[0.0f64, 100.0],
        )
        .unwrap();
        let out = add_flags(df, &[DisasterCategory::Earthquake]).unwrap();
        // AAA's ratio is undefined, so it can never be flagged however large
        // its death count
        assert_eq!(flags_for(&out, "earthquake_sig_median"), vec![0, 0]);
    }

    #[test]
    fn test_empty_cross_section_defaults_all_flags_false() {
        let df = df!(
            COL::ISO => &["AAA", "BBB"],
            COL::YEAR => &[2001i32, 2001],
            "earthquake_deaths" => &[50.0f64, 10.0],
            COL::POPULATION => &[0.0f64, 0.0],
        )
        .unwrap();
        let out = add_flags(df, &[DisasterCategory::Earthquake]).unwrap();
        assert_eq!(flags_for(&out, "earthquake_sig_median"), vec![0, 0]);
        assert_eq!(flags_for(&out, "earthquake_sig_p90"), vec![0, 0]);
    }

    #[test]
    fn test_extreme_indicators_alias_p90_flags() {
        let mut df = two_year_fixture();
        df.with_column(Series::new(
            "earthquake_intensity",
            &[9.0f64, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        ))
        .unwrap();
        let out = add_flags(df, &[DisasterCategory::Earthquake]).unwrap();
        assert_eq!(
            flags_for(&out, "extreme_earthquake_emdat"),
            flags_for(&out, "earthquake_sig_p90")
        );
        assert_eq!(
            flags_for(&out, "extreme_earthquake_geomet"),
            flags_for(&out, "earthquake_geomet_sig_p90")
        );
        // The 9.0 intensity in 2001 tops its year's cross-section
        assert_eq!(flags_for(&out, "earthquake_geomet_sig_p90")[0], 1);
    }
}
