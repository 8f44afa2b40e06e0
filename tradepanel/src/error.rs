//! Error types.

use std::path::PathBuf;

/// Failure taxonomy of the panel pipeline. Loader-level variants are
/// recovered locally (empty result plus a log line); `CoverageGap` and
/// `MissingColumns` abort the current period only.
#[derive(thiserror::Error, Debug)]
pub enum PanelError {
    #[error("Source file not available: {0}")]
    SourceUnavailable(PathBuf),
    #[error("Schema mismatch in {name}: missing columns {missing:?}")]
    SchemaMismatch { name: String, missing: Vec<String> },
    #[error("Required demographic columns absent from panel: {0:?}")]
    MissingColumns(Vec<String>),
    #[error(
        "{nulls} missing values in required column '{column}' after demographic join \
         (period {period}); affected ISO codes: {isos:?}"
    )]
    CoverageGap {
        column: String,
        nulls: usize,
        period: String,
        isos: Vec<String>,
    },
    #[error("Remote fetch quota exhausted")]
    QuotaExceeded,
    #[error("Cache read failure: {0}")]
    CacheReadFailure(String),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Wrapped IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coverage_gap_names_column_and_isos() {
        let err = PanelError::CoverageGap {
            column: "Population".into(),
            nulls: 3,
            period: "1979_2000".into(),
            isos: vec!["ABW".into(), "PRI".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("Population"));
        assert!(msg.contains("ABW"));
        assert!(msg.contains("3 missing values"));
    }
}
