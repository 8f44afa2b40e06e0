use std::collections::BTreeMap;
use std::path::PathBuf;

use comfy_table::{presets::NOTHING, *};
use polars::frame::DataFrame;
use polars::prelude::ChunkAgg;

use tradepanel::config::Period;
use tradepanel::COL;

fn bordered_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

fn year_range(df: &DataFrame) -> String {
    let Ok(years) = df.column(COL::YEAR) else {
        return "-".into();
    };
    let Ok(years) = years.i32() else {
        return "-".into();
    };
    match (years.min(), years.max()) {
        (Some(min), Some(max)) if min != max => format!("{min}-{max}"),
        (Some(min), _) => format!("{min}"),
        _ => "-".into(),
    }
}

fn unique_count(df: &DataFrame, column: &str) -> String {
    df.column(column)
        .ok()
        .and_then(|s| s.n_unique().ok())
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".into())
}

/// One summary row per processed period: observations, actual year span,
/// country count, and product count where the table has a product grain.
pub fn display_period_summaries(stage: &str, results: &BTreeMap<Period, DataFrame>) {
    let mut table = bordered_table();
    table.set_header(vec![
        Cell::new("Period").add_attribute(Attribute::Bold),
        Cell::new("Observations").add_attribute(Attribute::Bold),
        Cell::new("Years").add_attribute(Attribute::Bold),
        Cell::new("Countries").add_attribute(Attribute::Bold),
        Cell::new("Products").add_attribute(Attribute::Bold),
    ]);
    for (period, df) in results {
        let products = if df.get_column_names().contains(&COL::CMD_CODE) {
            unique_count(df, COL::CMD_CODE)
        } else {
            "-".into()
        };
        table.add_row(vec![
            period.to_string(),
            df.height().to_string(),
            year_range(df),
            unique_count(df, COL::ISO),
            products,
        ]);
    }
    println!("\n{stage}:\n{table}");
}

/// Where each period's dataset landed.
pub fn display_written_datasets(written: &BTreeMap<Period, PathBuf>) {
    let mut table = bordered_table();
    table.set_header(vec![
        Cell::new("Period").add_attribute(Attribute::Bold),
        Cell::new("Dataset").add_attribute(Attribute::Bold),
    ]);
    for (period, path) in written {
        table.add_row(vec![period.to_string(), path.display().to_string()]);
    }
    println!("\n{table}");
}
