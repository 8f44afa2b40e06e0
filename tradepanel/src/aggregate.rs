//! Collapses event-level and intensity-level disaster records into one row
//! per (ISO, Year) with per-category count/impact columns.

use log::{error, info, warn};
use polars::prelude::*;

use crate::categories::DisasterCategory;
use crate::error::PanelError;
use crate::COL;

fn rename_if_present(df: &mut DataFrame, from: &str, to: &str) {
    let has_from = df.get_column_names().contains(&from);
    let has_to = df.get_column_names().contains(&to);
    if has_from && !has_to {
        let _ = df.rename(from, to);
    }
}

/// Aggregate event rows into one row per (ISO, Country, Year) carrying a
/// {deaths, affected, events} triplet per canonical category. Raw type
/// labels are mapped through the category dictionary; labels that no
/// category claims are excluded. Post-merge gaps are structural zeros.
pub fn aggregate_events(
    df: DataFrame,
    categories: &[DisasterCategory],
) -> Result<DataFrame, PanelError> {
    if df.is_empty() {
        warn!("No disaster event data to aggregate");
        return Ok(df);
    }
    let mut df = df;
    rename_if_present(&mut df, COL::REPORTER_ISO, COL::ISO);
    rename_if_present(&mut df, COL::REPORTER_DESC, COL::COUNTRY);
    rename_if_present(&mut df, COL::REF_YEAR, COL::YEAR);

    let names = df.get_column_names();
    for required in [COL::ISO, COL::YEAR] {
        if !names.contains(&required) {
            error!("Disaster event data lacks column '{required}'");
            return Ok(DataFrame::empty());
        }
    }
    // Columns with a safe default are created rather than failing the era
    let mut defaults = vec![];
    if !names.contains(&COL::COUNTRY) {
        warn!("Missing column in disaster event data: '{}'", COL::COUNTRY);
        defaults.push(lit(NULL).cast(DataType::String).alias(COL::COUNTRY));
    }
    if !names.contains(&COL::DISASTER_TYPE) {
        warn!("Missing column in disaster event data: '{}'", COL::DISASTER_TYPE);
        defaults.push(lit("Unknown").alias(COL::DISASTER_TYPE));
    }
    if !names.contains(&COL::TOTAL_DEATHS) {
        warn!("Missing column in disaster event data: '{}'", COL::TOTAL_DEATHS);
        defaults.push(lit(0.0).alias(COL::TOTAL_DEATHS));
    }
    if !names.contains(&COL::TOTAL_AFFECTED) {
        warn!("Missing column in disaster event data: '{}'", COL::TOTAL_AFFECTED);
        defaults.push(lit(0.0).alias(COL::TOTAL_AFFECTED));
    }
    let df = if defaults.is_empty() {
        df
    } else {
        df.lazy().with_columns(defaults).collect()?
    };

    let base = df
        .lazy()
        .with_columns([
            col(COL::TOTAL_DEATHS).cast(DataType::Float64),
            col(COL::TOTAL_AFFECTED).cast(DataType::Float64),
        ])
        .collect()?;

    let mut merged: Option<LazyFrame> = None;
    for category in categories {
        let labels = Series::new(
            "labels",
            category
                .raw_labels()
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>(),
        );
        let agg = base
            .clone()
            .lazy()
            .filter(col(COL::DISASTER_TYPE).is_in(lit(labels)))
            .group_by([col(COL::ISO), col(COL::COUNTRY), col(COL::YEAR)])
            .agg([
                col(COL::TOTAL_DEATHS).sum().alias(&category.deaths_col()),
                col(COL::TOTAL_AFFECTED).sum().alias(&category.affected_col()),
                len().cast(DataType::Int32).alias(&category.events_col()),
            ]);
        merged = Some(match merged {
            None => agg,
            Some(acc) => acc.join(
                agg,
                [col(COL::ISO), col(COL::COUNTRY), col(COL::YEAR)],
                [col(COL::ISO), col(COL::COUNTRY), col(COL::YEAR)],
                JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
            ),
        });
    }
    let Some(merged) = merged else {
        warn!("No disaster categories configured");
        return Ok(DataFrame::empty());
    };

    // Post-merge gaps mean "no event of this type recorded", not missing data
    let zero_fill: Vec<Expr> = categories
        .iter()
        .flat_map(|c| {
            [
                col(&c.deaths_col()).fill_null(lit(0.0)),
                col(&c.affected_col()).fill_null(lit(0.0)),
                col(&c.events_col()).fill_null(lit(0).cast(DataType::Int32)),
            ]
        })
        .collect();
    let out = merged
        .with_columns(zero_fill)
        .sort([COL::ISO, COL::YEAR], SortMultipleOptions::default())
        .collect()?;
    info!(
        "Aggregated disaster events: {} country-year observations",
        out.height()
    );
    Ok(out)
}

/// Aggregate the intensity source: within each category, sum the physical
/// impact proxies row-wise, then sum by (ISO, Year); categories merge by
/// outer join.
pub fn aggregate_intensity(
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

    let mut merged: Option<LazyFrame> = None;
    for category in categories {
        let proxies: Vec<String> = category
            .intensity_proxies()
            .into_iter()
            .filter(|p| names.contains(p))
            .collect();
        if proxies.is_empty() {
            continue;
        }
        let row_intensity = proxies
            .iter()
            .map(|p| col(p).cast(DataType::Float64).fill_null(lit(0.0)))
            .reduce(|a, b| a + b)
            .expect("proxy list is non-empty");
        let agg = df
            .clone()
            .lazy()
            .with_column(row_intensity.alias(&category.intensity_col()))
            .group_by([col(COL::ISO), col(COL::YEAR)])
            .agg([col(&category.intensity_col()).sum()]);
        merged = Some(match merged {
            None => agg,
            Some(acc) => acc.join(
                agg,
                [col(COL::ISO), col(COL::YEAR)],
                [col(COL::ISO), col(COL::YEAR)],
                JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
            ),
        });
    }
    let Some(merged) = merged else {
        warn!("Intensity source carries no recognised proxy columns");
        return Ok(DataFrame::empty());
    };
    let out = merged
        .sort([COL::ISO, COL::YEAR], SortMultipleOptions::default())
        .collect()?;
    info!(
        "Aggregated intensity data: {} country-year observations",
        out.height()
    );
    Ok(out)
}
