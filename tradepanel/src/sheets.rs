//! Spreadsheet-to-dataframe adapter. Worksheets are materialised as all-Utf8
//! frames; loaders apply non-strict casts downstream so unparseable cells
//! become nulls instead of read failures.

use std::path::Path;

use anyhow::Context;
use calamine::{open_workbook_auto, Data, Reader};
use log::debug;
use polars::prelude::*;

use crate::error::PanelError;

/// Which worksheet to read and where its table starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SheetSpec<'a> {
    /// Worksheet name; the first sheet when `None`.
    pub sheet: Option<&'a str>,
    /// Zero-based row index of the header row. Rows above it are ignored.
    pub header_row: usize,
    /// Absolute row indices (same basis as `header_row`) to drop from the
    /// body, e.g. a known malformed sub-header.
    pub skip_rows: &'a [usize],
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Data::Error(_) => None,
        other => Some(format!("{other}")),
    }
}

/// Read one worksheet into a `DataFrame` with every column typed Utf8.
pub fn read_sheet(path: &Path, spec: SheetSpec) -> Result<DataFrame, PanelError> {
    if !path.exists() {
        return Err(PanelError::SourceUnavailable(path.to_path_buf()));
    }
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    let sheet_name = match spec.sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .with_context(|| format!("Workbook {} has no sheets", path.display()))?,
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet '{sheet_name}' of {}", path.display()))?;

    let mut rows = range.rows().enumerate();
    let headers: Vec<String> = loop {
        match rows.next() {
            Some((idx, row)) if idx == spec.header_row => {
                let mut seen: Vec<String> = Vec::with_capacity(row.len());
                for (i, cell) in row.iter().enumerate() {
                    let mut name =
                        cell_to_string(cell).unwrap_or_else(|| format!("_column_{i}"));
                    // Column names must be unique for the frame constructor
                    if seen.contains(&name) {
                        name = format!("{name}_{i}");
                    }
                    seen.push(name);
                }
                break seen;
            }
            Some(_) => continue,
            None => {
                return Err(PanelError::SchemaMismatch {
                    name: path.display().to_string(),
                    missing: vec![format!("header row {}", spec.header_row)],
                })
            }
        }
    };

    let mut columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for (idx, row) in rows {
        if spec.skip_rows.contains(&idx) {
            continue;
        }
        for (i, column) in columns.iter_mut().enumerate() {
            column.push(row.get(i).and_then(cell_to_string));
        }
    }

    let series: Vec<Series> = headers
        .iter()
        .zip(columns)
        .map(|(name, values)| Series::new(name, values))
        .collect();
    let df = DataFrame::new(series)?;
    debug!(
        "Read sheet '{sheet_name}' from {}: {} rows x {} columns",
        path.display(),
        df.height(),
        df.width()
    );
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_to_string_trims_and_drops_empties() {
        assert_eq!(cell_to_string(&Data::String("  ABW ".into())), Some("ABW".into()));
        assert_eq!(cell_to_string(&Data::String("   ".into())), None);
        assert_eq!(cell_to_string(&Data::Empty), None);
    }

    #[test]
    fn test_numeric_cells_format_without_trailing_zeroes() {
        assert_eq!(cell_to_string(&Data::Float(2005.0)), Some("2005".into()));
        assert_eq!(cell_to_string(&Data::Int(42)), Some("42".into()));
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let err = read_sheet(Path::new("/nonexistent/file.xlsx"), SheetSpec::default());
        assert!(matches!(err, Err(PanelError::SourceUnavailable(_))));
    }
}
