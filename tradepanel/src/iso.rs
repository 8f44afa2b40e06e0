//! Country-code normalisation applied inline by every loader.

use polars::prelude::*;

use crate::COL;

/// Canonicalise the country-code column of `df`: uppercase and trim every
/// value, drop rows whose code is null, not exactly three characters, or a
/// stringified null ("NAN"), and drop rows whose code is in `exclude`.
///
/// Malformed rows are filtered silently rather than raised; applying the
/// normaliser twice yields the same result as once.
pub fn normalize_iso(
    df: DataFrame,
    iso_col: &str,
    exclude: &[String],
) -> PolarsResult<DataFrame> {
    let exclude_set: Vec<String> = exclude
        .iter()
        .map(|code| code.trim().to_uppercase())
        .collect();
    let excluded = Series::new("excluded", exclude_set);
    df.lazy()
        .with_column(
            col(iso_col)
                .cast(DataType::String)
                .str()
                .strip_chars(lit(NULL))
                .str()
                .to_uppercase()
                .alias(iso_col),
        )
        .filter(
            col(iso_col)
                .is_not_null()
                .and(col(iso_col).neq(lit("NAN")))
                .and(col(iso_col).str().len_chars().eq(lit(3u32)))
                .and(col(iso_col).is_in(lit(excluded)).not()),
        )
        .collect()
}

/// Shorthand for the common case of normalising the canonical ISO column.
pub fn normalize_iso_default(df: DataFrame, exclude: &[String]) -> PolarsResult<DataFrame> {
    normalize_iso(df, COL::ISO, exclude)
}
