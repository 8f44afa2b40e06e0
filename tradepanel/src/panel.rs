//! Panel Builder: computes the admissible (ISO, Year) key set across
//! sources, materialises a dense panel, joins every derived column onto it
//! and applies the per-column fill policy. Event counts zero-fill
//! (structural absence); demographic covariates stay null for the
//! validator.

use std::collections::BTreeSet;

use log::{error, info, warn};
use polars::prelude::*;

use crate::aggregate;
use crate::categories::DisasterCategory;
use crate::config::{Config, Period};
use crate::error::PanelError;
use crate::significance;
use crate::validate;
use crate::{emdat, geomet, worldbank};
use crate::COL;

type KeySet = BTreeSet<(String, i32)>;

/// Distinct (ISO, Year) pairs of a frame; empty if the frame lacks either
/// key column.
fn key_set(df: &DataFrame) -> Result<KeySet, PanelError> {
    let names = df.get_column_names();
    if df.is_empty() || !names.contains(&COL::ISO) || !names.contains(&COL::YEAR) {
        return Ok(KeySet::new());
    }
    let isos = df.column(COL::ISO)?.str()?;
    let years = df.column(COL::YEAR)?.i32()?;
    let mut keys = KeySet::new();
    for (iso, year) in isos.into_iter().zip(years.into_iter()) {
        if let (Some(iso), Some(year)) = (iso, year) {
            keys.insert((iso.to_string(), year));
        }
    }
    Ok(keys)
}

/// The candidate key set is the union over the disaster sources and the
/// cached export table; it is then restricted to keys with population data,
/// because downstream per-capita normalisation requires population.
fn admissible_keys(
    events: &DataFrame,
    intensity: &DataFrame,
    exports: Option<&DataFrame>,
    demographics: &DataFrame,
) -> Result<KeySet, PanelError> {
    let mut keys = key_set(events)?;
    keys.extend(key_set(intensity)?);
    if let Some(exports) = exports {
        keys.extend(key_set(exports)?);
    }
    if !demographics.is_empty() {
        let population_keys = key_set(demographics)?;
        keys.retain(|key| population_keys.contains(key));
    }
    Ok(keys)
}

/// Combine the two disaster sources with an explicit precedence: the
/// event-based aggregate is the left table and only the intensity columns
/// join from the intensity source, so the event source wins any collision.
fn combine_sources(
    events: DataFrame,
    intensity: DataFrame,
) -> Result<Option<DataFrame>, PanelError> {
    match (events.is_empty(), intensity.is_empty()) {
        (false, false) => {
            let combined = events
                .lazy()
                .join(
                    intensity.lazy(),
                    [col(COL::ISO), col(COL::YEAR)],
                    [col(COL::ISO), col(COL::YEAR)],
                    JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
                )
                .collect()?;
            info!("Merged event and intensity disaster sources");
            Ok(Some(combined))
        }
        (false, true) => {
            warn!("Only event-based disaster data used (intensity source unavailable)");
            Ok(Some(events))
        }
        (true, false) => {
            warn!("Only intensity-based disaster data used (event source unavailable)");
            Ok(Some(intensity))
        }
        (true, true) => Ok(None),
    }
}

fn backfill_country(df: DataFrame, source: &DataFrame) -> Result<DataFrame, PanelError> {
    let has_source_country = source.get_column_names().contains(&COL::COUNTRY);
    let mut df = df;
    if !df.get_column_names().contains(&COL::COUNTRY) {
        df = df
            .lazy()
            .with_column(lit(NULL).cast(DataType::String).alias(COL::COUNTRY))
            .collect()?;
    }
    if !has_source_country {
        return Ok(df);
    }
    // First non-null display name per ISO; an already-present value wins
    let info = source
        .clone()
        .lazy()
        .select([col(COL::ISO), col(COL::COUNTRY)])
        .filter(col(COL::COUNTRY).is_not_null())
        .unique_stable(Some(vec![COL::ISO.to_string()]), UniqueKeepStrategy::First);
    Ok(df
        .lazy()
        .join(
            info,
            [col(COL::ISO)],
            [col(COL::ISO)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(
            coalesce(&[col(COL::COUNTRY), col("Country_right")]).alias(COL::COUNTRY),
        )
        .drop(["Country_right"])
        .collect()?)
}

/// Per-category disaster columns present in `df`, in registry order.
fn disaster_columns(df: &DataFrame, categories: &[DisasterCategory]) -> Vec<String> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    categories
        .iter()
        .flat_map(|c| {
            [
                c.deaths_col(),
                c.affected_col(),
                c.events_col(),
                c.intensity_col(),
            ]
        })
        .filter(|c| names.contains(c))
        .collect()
}

/// Composite intensity index: each `*_intensity` column is normalised by
/// its panel-wide standard deviation (columns with zero or undefined
/// deviation pass through raw), then all normalised columns sum row-wise.
/// Computed once, on the full joined panel; never recomputed after the
/// final year/country restriction.
pub fn compute_disaster_index(
    df: DataFrame,
    categories: &[DisasterCategory],
) -> Result<DataFrame, PanelError> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    let intensity_cols: Vec<String> = categories
        .iter()
        .map(|c| c.intensity_col())
        .filter(|c| names.contains(c))
        .collect();
    if intensity_cols.is_empty() {
        warn!("No intensity columns present; disaster_index is not computed");
        return Ok(df);
    }

    let mut normalised: Vec<Expr> = vec![];
    for column in &intensity_cols {
        let std = df
            .column(column)?
            .cast(&DataType::Float64)?
            .f64()?
            .std(1);
        let expr = match std {
            Some(std) if std > 0.0 => col(column).cast(DataType::Float64) / lit(std),
            _ => col(column).cast(DataType::Float64),
        };
        normalised.push(expr);
    }
    let index = normalised
        .into_iter()
        .reduce(|a, b| a + b)
        .expect("intensity column list is non-empty")
        .alias(COL::DISASTER_INDEX);
    info!("Computed disaster_index from {intensity_cols:?}");
    Ok(df.lazy().with_column(index).collect()?)
}

/// Assemble a panel for `period` from pre-aggregated sources. `exports`
/// contributes candidate keys only; its product-level rows join later in
/// the emitter.
pub fn assemble_panel(
    config: &Config,
    period: Period,
    events: DataFrame,
    intensity: DataFrame,
    demographics: DataFrame,
    exports: Option<&DataFrame>,
) -> Result<DataFrame, PanelError> {
    let categories = &config.disaster_categories;

    let keys = admissible_keys(&events, &intensity, exports, &demographics)?;
    let Some(combined) = combine_sources(events, intensity)? else {
        error!("No disaster data available for {period}");
        return Ok(DataFrame::empty());
    };
    if keys.is_empty() {
        warn!("No admissible (ISO, Year) keys for {period}");
        return Ok(DataFrame::empty());
    }

    let (isos, years): (Vec<String>, Vec<i32>) = keys.into_iter().unzip();
    let panel = df!(COL::ISO => isos, COL::YEAR => years)?;

    // One row per key; first encountered row wins on key collision
    let combined_unique = combined
        .clone()
        .lazy()
        .unique_stable(
            Some(vec![COL::ISO.to_string(), COL::YEAR.to_string()]),
            UniqueKeepStrategy::First,
        );
    let df = panel
        .lazy()
        .join(
            combined_unique,
            [col(COL::ISO), col(COL::YEAR)],
            [col(COL::ISO), col(COL::YEAR)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;
    let df = backfill_country(df, &combined)?;

    // Structural zeros: absence of an event is a measurement of zero
    let zero_fill: Vec<Expr> = disaster_columns(&df, categories)
        .into_iter()
        .map(|c| col(&c).fill_null(lit(0).cast(DataType::Int32)).alias(&c))
        .collect();
    let mut df = df.lazy().with_columns(zero_fill).collect()?;

    // Demographic covariates join without fill; gaps are for the validator
    if !demographics.is_empty() {
        let demo = demographics.clone().lazy().select([
            col(COL::ISO),
            col(COL::YEAR),
            col(COL::POPULATION),
            col(COL::INCOME_GROUP),
            col(COL::IS_POOR_COUNTRY),
            col(COL::IS_SMALL_COUNTRY),
        ]);
        df = df
            .lazy()
            .join(
                demo,
                [col(COL::ISO), col(COL::YEAR)],
                [col(COL::ISO), col(COL::YEAR)],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?;
        info!("Joined demographic covariates onto the panel");
    }
    validate::require_schema(&df)?;

    let df = compute_disaster_index(df, categories)?;
    let df = significance::add_flags(df, categories)?;
    let df = validate::enforce_coverage(df, period)?;

    // Final restriction to the requested window and named countries
    let before = df.height();
    let df = df
        .lazy()
        .filter(
            col(COL::YEAR)
                .gt_eq(lit(period.start))
                .and(col(COL::YEAR).lt_eq(lit(period.end))),
        )
        .collect()?;
    if df.height() < before {
        warn!(
            "{} row(s) outside [{period}] dropped from the final panel",
            before - df.height()
        );
    }
    let before = df.height();
    let df = df
        .lazy()
        .filter(col(COL::COUNTRY).is_not_null())
        .collect()?;
    if df.height() < before {
        warn!(
            "{} row(s) without a country name dropped from the final panel",
            before - df.height()
        );
    }

    log_summary(&df, config, period)?;
    Ok(df)
}

/// Build the disaster panel for `period` from the raw sources. `exports`
/// is the cached export table for the same period, when available.
pub fn build(
    config: &Config,
    period: Period,
    exports: Option<&DataFrame>,
) -> Result<DataFrame, PanelError> {
    info!("Creating disaster panel for {period}");
    let emdat_raw = emdat::load(config, period)?;
    let geomet_raw = geomet::load(config, period)?;
    let demographics = worldbank::load(config)?;

    let events = aggregate::aggregate_events(emdat_raw, &config.disaster_categories)?;
    let intensity = aggregate::aggregate_intensity(geomet_raw, &config.disaster_categories)?;
    assemble_panel(config, period, events, intensity, demographics, exports)
}

fn log_summary(df: &DataFrame, config: &Config, period: Period) -> Result<(), PanelError> {
    if df.is_empty() {
        warn!("Panel for {period} is empty");
        return Ok(());
    }
    let years = df.column(COL::YEAR)?.i32()?;
    let n_countries = df.column(COL::ISO)?.n_unique()?;
    let reference = config.reference_year;
    let at_reference = |flag: &str| -> Result<usize, PanelError> {
        Ok(df
            .clone()
            .lazy()
            .filter(
                col(COL::YEAR)
                    .eq(lit(reference))
                    .and(col(flag).eq(lit(1))),
            )
            .collect()?
            .height())
    };
    info!(
        "Panel {period}: {} observations, years {}-{}, {} countries; \
         reference year {reference}: {} poor, {} small",
        df.height(),
        years.min().unwrap_or_default(),
        years.max().unwrap_or_default(),
        n_countries,
        at_reference(COL::IS_POOR_COUNTRY)?,
        at_reference(COL::IS_SMALL_COUNTRY)?,
    );
    Ok(())
}
