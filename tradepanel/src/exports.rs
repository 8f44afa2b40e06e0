//! Export (trade) loader: selects the delimited files covering a requested
//! window from their filename year stamps, harmonises them onto the
//! canonical schema and derives the agricultural flag. Also hosts the seam
//! for the remote trade-data collaborator.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{debug, error, info, warn};
use polars::prelude::*;
use regex::Regex;

use crate::config::{Config, Period};
use crate::error::PanelError;
use crate::iso;
use crate::COL;

/// Agricultural chapters of the legacy numeric classification scheme.
const S2_AGRI_CODES: [i32; 19] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 21, 22, 23, 24, 25, 29, 41, 42, 43,
];

/// Columns every validated export row must carry.
fn key_columns() -> Vec<&'static str> {
    vec![
        COL::YEAR,
        COL::COUNTRY,
        COL::ISO,
        COL::CLASSIFICATION_CODE,
        COL::CLASSIFICATION_SCHEME,
        COL::CMD_CODE,
        COL::IS_AGRI,
        COL::FOB_VALUE,
    ]
}

/// Years covered by an export file, read from its name. Recognises
/// `YYYY-YYYY_exports*` ranges and `YYYY_exports*` single years.
pub fn extract_years_from_filename(filename: &str) -> Vec<i32> {
    let range_re = Regex::new(r"(\d{4})-(\d{4})_exports").unwrap();
    if let Some(caps) = range_re.captures(filename) {
        let start: i32 = caps[1].parse().unwrap();
        let end: i32 = caps[2].parse().unwrap();
        if start <= end {
            return (start..=end).collect();
        }
        return vec![];
    }
    let single_re = Regex::new(r"(\d{4})_exports").unwrap();
    if let Some(caps) = single_re.captures(filename) {
        return vec![caps[1].parse().unwrap()];
    }
    vec![]
}

fn export_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return vec![];
    };
    entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            name.contains("exports") && name.ends_with(".csv")
        })
        .sorted()
        .collect()
}

/// The subset of files in `dir` whose covered years intersect the window,
/// together with the target years no file covers.
pub fn select_files(dir: &Path, period: Period) -> (Vec<PathBuf>, Vec<i32>) {
    let mut files_to_load = vec![];
    let mut years_covered = std::collections::BTreeSet::new();
    for path in export_files(dir) {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let years = extract_years_from_filename(name);
        let overlap: Vec<i32> = years
            .iter()
            .copied()
            .filter(|y| period.contains(*y))
            .collect();
        if !overlap.is_empty() {
            debug!("{name} covers {} year(s) of {period}", overlap.len());
            years_covered.extend(overlap);
            files_to_load.push(path);
        }
    }
    let missing: Vec<i32> = period
        .years()
        .filter(|y| !years_covered.contains(y))
        .collect();
    (files_to_load, missing)
}

fn read_export_csv(path: &Path) -> PolarsResult<DataFrame> {
    // Everything reads as Utf8 so that files with mixed inferred dtypes
    // concatenate; numeric columns are cast afterwards
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(CsvParseOptions::default().with_encoding(CsvEncoding::LossyUtf8))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
}

fn rename_if_present(df: &mut DataFrame, from: &str, to: &str) {
    if df.get_column_names().contains(&from) {
        let _ = df.rename(from, to);
    }
}

/// Load the export table for `period`. Missing files or columns are not
/// fatal: the loader logs an error and returns an empty frame so the period
/// can be skipped downstream.
pub fn load(config: &Config, period: Period) -> Result<DataFrame, PanelError> {
    let exports_dir = config.exports_dir();
    let (files, missing_years) = select_files(&exports_dir, period);
    if !missing_years.is_empty() {
        warn!("No export file covers years {missing_years:?} of {period}");
    }
    if files.is_empty() {
        error!(
            "No export data found for {period} in {}",
            exports_dir.display()
        );
        return Ok(DataFrame::empty());
    }

    let mut frames = vec![];
    for path in &files {
        match read_export_csv(path) {
            Ok(df) => frames.push(df.lazy()),
            Err(e) => warn!("Failed to read {}: {e}", path.display()),
        }
    }
    if frames.is_empty() {
        error!("No export file could be read for {period}");
        return Ok(DataFrame::empty());
    }

    let mut df = concat_lf_diagonal(frames, UnionArgs::default())?.collect()?;
    rename_if_present(&mut df, COL::REF_YEAR, COL::YEAR);
    rename_if_present(&mut df, COL::REPORTER_ISO, COL::ISO);
    rename_if_present(&mut df, COL::REPORTER_DESC, COL::COUNTRY);

    let required = [
        COL::YEAR,
        COL::ISO,
        COL::CLASSIFICATION_SCHEME,
        COL::CMD_CODE,
        COL::FOB_VALUE,
    ];
    let names = df.get_column_names();
    let missing: Vec<String> = required
        .iter()
        .filter(|c| !names.contains(c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        error!("Export data for {period} is missing columns {missing:?}");
        return Ok(DataFrame::empty());
    }

    let df = df
        .lazy()
        .with_columns([
            col(COL::YEAR).cast(DataType::Int32),
            col(COL::FOB_VALUE).cast(DataType::Float64),
        ])
        .filter(
            col(COL::YEAR)
                .gt_eq(lit(period.start))
                .and(col(COL::YEAR).lt_eq(lit(period.end))),
        )
        .collect()?;

    let df = iso::normalize_iso_default(df, &config.excluded_iso_codes)?;
    let df = with_agricultural_flag(df)?;
    debug!("Loaded {} export rows for {period}", df.height());
    Ok(df)
}

/// Derive `is_agri` from the classification scheme tag and product code.
/// Unrecognised scheme tags default the flag to false with a warning.
pub fn with_agricultural_flag(df: DataFrame) -> PolarsResult<DataFrame> {
    let scheme = col(COL::CLASSIFICATION_SCHEME)
        .cast(DataType::String)
        .str()
        .strip_chars(lit(NULL))
        .str()
        .to_uppercase();
    // The legacy scheme tag appears both as "S2" and as "SITC2"
    let is_s2 = scheme.clone().eq(lit("S2")).or(scheme.clone().eq(lit("SITC2")));
    let is_hs = scheme.clone().eq(lit("HS"));

    let s2_codes = Series::new("s2_agri", S2_AGRI_CODES.to_vec());
    let hs_codes = Series::new(
        "hs_agri",
        (1..=24).map(|i| format!("{i:02}")).collect::<Vec<_>>(),
    );

    let s2_flag = col(COL::CMD_CODE)
        .cast(DataType::String)
        .str()
        .strip_chars(lit(NULL))
        .cast(DataType::Int32)
        .is_in(lit(s2_codes))
        .fill_null(lit(false));
    let hs_flag = col(COL::CMD_CODE)
        .cast(DataType::String)
        .str()
        .strip_chars(lit(NULL))
        .str()
        .zfill(lit(2))
        .is_in(lit(hs_codes))
        .fill_null(lit(false));

    let out = df
        .lazy()
        .with_column(
            when(is_s2)
                .then(s2_flag)
                .when(is_hs)
                .then(hs_flag)
                .otherwise(lit(false))
                .alias(COL::IS_AGRI),
        )
        .collect()?;

    let unrecognized = out
        .clone()
        .lazy()
        .filter(
            col(COL::CLASSIFICATION_SCHEME)
                .cast(DataType::String)
                .str()
                .strip_chars(lit(NULL))
                .str()
                .to_uppercase()
                .is_in(lit(Series::new("known", vec!["S2", "SITC2", "HS"])))
                .not()
                .and(col(COL::CLASSIFICATION_SCHEME).is_not_null()),
        )
        .collect()?;
    if unrecognized.height() > 0 {
        warn!(
            "{} export rows carry an unrecognised classification scheme; \
             their agricultural flag defaults to false",
            unrecognized.height()
        );
    }
    Ok(out)
}

/// Enforce the export-record invariants: every key column present, no nulls
/// in any of them, and a strictly positive free-on-board value.
pub fn validate(df: DataFrame) -> Result<DataFrame, PanelError> {
    if df.is_empty() {
        return Ok(df);
    }
    let names = df.get_column_names();
    let missing: Vec<String> = key_columns()
        .into_iter()
        .filter(|c| !names.contains(c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        error!("Export table is missing required columns {missing:?}");
        return Ok(DataFrame::empty());
    }

    let not_null = key_columns()
        .into_iter()
        .map(|c| col(c).is_not_null())
        .reduce(|a, b| a.and(b))
        .expect("key column list is non-empty");
    let out = df
        .lazy()
        .filter(not_null.and(col(COL::FOB_VALUE).gt(lit(0.0))))
        .select([
            col(COL::YEAR),
            col(COL::COUNTRY),
            col(COL::ISO),
            col(COL::CLASSIFICATION_CODE),
            col(COL::CLASSIFICATION_SCHEME),
            col(COL::CMD_CODE),
            col(COL::IS_AGRI),
            col(COL::FOB_VALUE),
        ])
        .sort([COL::YEAR, COL::COUNTRY], SortMultipleOptions::default())
        .collect()?;
    Ok(out)
}

/// Seam for the remote trade-data collaborator. Implementations perform the
/// actual network I/O; the pipeline only drives them year by year.
pub trait ExportFetcher {
    /// Fetch one year of export records. `Ok(None)` means the source has no
    /// data for that year; `Err(PanelError::QuotaExceeded)` halts the run.
    fn fetch_year(&mut self, year: i32) -> Result<Option<DataFrame>, PanelError>;
}

/// Result of a fetch pass over a window.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub fetched: Vec<i32>,
    pub skipped: Vec<i32>,
    /// Set when the quota was exhausted before the window was complete.
    /// Already-written years are retained.
    pub incomplete: bool,
}

/// Download the years of `period` that no local file covers, writing one
/// `{year}_exports.csv` per fetched year. Stops (without rolling back) on
/// quota exhaustion.
pub fn fetch_missing_years(
    fetcher: &mut dyn ExportFetcher,
    exports_dir: &Path,
    period: Period,
) -> Result<FetchOutcome, PanelError> {
    std::fs::create_dir_all(exports_dir)?;
    let (_, missing_years) = select_files(exports_dir, period);
    if missing_years.is_empty() {
        debug!("All years of {period} already covered locally");
        return Ok(FetchOutcome::default());
    }
    info!("Fetching {} missing year(s) for {period}", missing_years.len());

    let mut outcome = FetchOutcome::default();
    for year in missing_years {
        match fetcher.fetch_year(year) {
            Ok(Some(mut df)) => {
                let path = exports_dir.join(format!("{year}_exports.csv"));
                let mut file = std::fs::File::create(&path)?;
                CsvWriter::new(&mut file).finish(&mut df)?;
                info!("Fetched year {year}: {} records", df.height());
                outcome.fetched.push(year);
            }
            Ok(None) => {
                warn!("Year {year}: no data available");
                outcome.skipped.push(year);
            }
            Err(PanelError::QuotaExceeded) => {
                error!("Fetch quota exhausted at year {year}; keeping partial results");
                outcome.incomplete = true;
                break;
            }
            Err(e) => {
                warn!("Year {year}: fetch failed ({e})");
                outcome.skipped.push(year);
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_years_single_and_range() {
        assert_eq!(extract_years_from_filename("1988_exports_plus.csv"), vec![1988]);
        assert_eq!(
            extract_years_from_filename("1979-1982_exports.csv"),
            vec![1979, 1980, 1981, 1982]
        );
        assert!(extract_years_from_filename("exports_all.csv").is_empty());
    }

    #[test]
    fn test_range_takes_precedence_over_single_year_match() {
        // The single-year pattern would also match the second group here
        assert_eq!(
            extract_years_from_filename("1979-1980_exports.csv"),
            vec![1979, 1980]
        );
    }

    fn export_fixture() -> DataFrame {
        df!(
            COL::YEAR => &[2010i32, 2010, 2010, 2010],
            COL::COUNTRY => &["United States", "United States", "France", "France"],
            COL::ISO => &["USA", "USA", "FRA", "FRA"],
            COL::CLASSIFICATION_CODE => &["H5", "H5", "S2", "S2"],
            COL::CLASSIFICATION_SCHEME => &["HS", "HS", "S2", "S2"],
            COL::CMD_CODE => &["01", "85", "22", "71"],
            COL::FOB_VALUE => &[1000.0f64, 2000.0, 500.0, 800.0],
        )
        .unwrap()
    }

    #[test]
    fn test_agricultural_flag_hs_round_trip() {
        let df = with_agricultural_flag(export_fixture()).unwrap();
        let flags: Vec<bool> = df
            .column(COL::IS_AGRI)
            .unwrap()
            .bool()
            .unwrap()
            .into_no_null_iter()
            .collect();
        // HS "01" is within chapters 01..24, "85" is not; S2 22 is
        // agricultural, 71 is not
        assert_eq!(flags, vec![true, false, true, false]);
        let usa_agri = df
            .clone()
            .lazy()
            .filter(col(COL::ISO).eq(lit("USA")).and(col(COL::IS_AGRI)))
            .collect()
            .unwrap();
        assert_eq!(usa_agri.height(), 1);
    }

    #[test]
    fn test_unknown_scheme_defaults_to_false() {
        let df = df!(
            COL::CLASSIFICATION_SCHEME => &["B4"],
            COL::CMD_CODE => &["01"],
        )
        .unwrap();
        let out = with_agricultural_flag(df).unwrap();
        let flag = out.column(COL::IS_AGRI).unwrap().bool().unwrap().get(0);
        assert_eq!(flag, Some(false));
    }

    #[test]
    fn test_validate_drops_nonpositive_and_null_rows() {
        let df = df!(
            COL::YEAR => &[Some(2010i32), Some(2010), None],
            COL::COUNTRY => &["A", "B", "C"],
            COL::ISO => &["AAA", "BBB", "CCC"],
            COL::CLASSIFICATION_CODE => &["H5", "H5", "H5"],
            COL::CLASSIFICATION_SCHEME => &["HS", "HS", "HS"],
            COL::CMD_CODE => &["01", "02", "03"],
            COL::IS_AGRI => &[true, true, true],
            COL::FOB_VALUE => &[100.0f64, 0.0, 50.0],
        )
        .unwrap();
        let out = validate(df).unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(
            out.column(COL::ISO).unwrap().str().unwrap().get(0),
            Some("AAA")
        );
    }

    #[test]
    fn test_validate_missing_column_yields_empty() {
        let df = df!(COL::YEAR => &[2010i32], COL::ISO => &["AAA"]).unwrap();
        let out = validate(df).unwrap();
        assert!(out.is_empty());
    }

    struct ScriptedFetcher {
        responses: Vec<(i32, Result<Option<DataFrame>, PanelError>)>,
    }

    impl ExportFetcher for ScriptedFetcher {
        fn fetch_year(&mut self, year: i32) -> Result<Option<DataFrame>, PanelError> {
            let idx = self
                .responses
                .iter()
                .position(|(y, _)| *y == year)
                .expect("unexpected year requested");
            self.responses.remove(idx).1
        }
    }

    #[test]
    fn test_fetch_stops_on_quota_and_keeps_partials() {
        let dir = tempfile::tempdir().unwrap();
        let year_df = |y: i32| {
            df!(COL::REF_YEAR => &[y], COL::REPORTER_ISO => &["USA"], COL::FOB_VALUE => &[1.0f64])
                .unwrap()
        };
        let mut fetcher = ScriptedFetcher {
            responses: vec![
                (2001, Ok(Some(year_df(2001)))),
                (2002, Err(PanelError::QuotaExceeded)),
                (2003, Ok(Some(year_df(2003)))),
            ],
        };
        let outcome =
            fetch_missing_years(&mut fetcher, dir.path(), Period::new(2001, 2003)).unwrap();
        assert!(outcome.incomplete);
        assert_eq!(outcome.fetched, vec![2001]);
        // The year fetched before exhaustion is retained on disk
        assert!(dir.path().join("2001_exports.csv").exists());
        assert!(!dir.path().join("2003_exports.csv").exists());
    }
}
