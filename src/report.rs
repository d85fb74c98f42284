// tsmctl - multi-server command runner for IBM Spectrum Protect
// Copyright (C) 2025 tsmctl contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Report rendering.
//!
//! Every header column is rendered for every row; a column missing from a
//! row, or holding null, renders as `-`. Output problems here are fatal for
//! the whole run, unlike per-server failures which are data.

use crate::aggregate::AggregatedResult;
use anyhow::{Context, Result, anyhow, bail};
use clap::ValueEnum;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Missing-value token shared by all formats.
const MISSING: &str = "-";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Xlsx,
    Csv,
    Html,
}

/// Writes the aggregated table to `path` in the requested format.
///
/// CSV and HTML overwrite an existing target; XLSX appends a new sheet to an
/// existing workbook (or creates a fresh one).
pub fn write_report(
    result: &AggregatedResult,
    format: ReportFormat,
    path: &Path,
    sheet_name: &str,
) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.is_dir() {
        bail!("report directory {} does not exist", dir.display());
    }

    match format {
        ReportFormat::Csv => write_csv(result, path),
        ReportFormat::Html => write_html(result, path),
        ReportFormat::Xlsx => write_xlsx(result, path, sheet_name),
    }
}

fn cell_text(row: &Map<String, Value>, column: &str) -> String {
    match row.get(column) {
        None | Some(Value::Null) => MISSING.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn write_csv(result: &AggregatedResult, path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .with_context(|| format!("could not create csv file {}", path.display()))?;

    writer.write_record(&result.header)?;
    for row in &result.rows {
        writer.write_record(result.header.iter().map(|column| cell_text(row, column)))?;
    }
    writer
        .flush()
        .with_context(|| format!("could not write csv file {}", path.display()))
}

fn write_html(result: &AggregatedResult, path: &Path) -> Result<()> {
    let mut html = String::from(
        "<html>\n<head>\n\t<title>TSM Report</title>\n</head>\n\n<body>\n<table>\n\n\t<tr>\n",
    );
    for column in &result.header {
        html.push_str(&format!("\t\t<th>{column}</th>\n"));
    }
    html.push_str("\t</tr>\n");
    for row in &result.rows {
        html.push_str("\t<tr>\n");
        for column in &result.header {
            html.push_str(&format!("\t\t<td>{}</td>\n", cell_text(row, column)));
        }
        html.push_str("\t</tr>\n");
    }
    html.push_str("</table>\n</body>\n</html>");

    fs::write(path, html).with_context(|| format!("could not create html file {}", path.display()))
}

fn write_xlsx(result: &AggregatedResult, path: &Path, sheet_name: &str) -> Result<()> {
    let mut book = if path.exists() {
        umya_spreadsheet::reader::xlsx::read(path)
            .with_context(|| format!("could not access the target file {}", path.display()))?
    } else {
        let mut book = umya_spreadsheet::new_file();
        // A fresh workbook comes with a default sheet we do not want.
        let _ = book.remove_sheet_by_name("Sheet1");
        book
    };

    let sheet = book
        .new_sheet(sheet_name)
        .map_err(|e| anyhow!("could not create sheet `{sheet_name}`: {e}"))?;

    for (col, column) in result.header.iter().enumerate() {
        let coordinate = ((col + 1) as u32, 1u32);
        sheet.get_cell_mut(coordinate).set_value(column.as_str());
        let style = sheet.get_style_mut(coordinate);
        style.get_font_mut().set_bold(true);
        style.get_font_mut().get_color_mut().set_argb("FF043891");
        style.set_background_color("FFDDDDDD");
    }

    for (row_index, row) in result.rows.iter().enumerate() {
        for (col, column) in result.header.iter().enumerate() {
            sheet
                .get_cell_mut(((col + 1) as u32, (row_index + 2) as u32))
                .set_value(cell_text(row, column));
        }
    }

    sheet.set_auto_filter(format!(
        "A1:{}{}",
        column_letter(result.header.len()),
        result.rows.len() + 1
    ));

    for (col, column) in result.header.iter().enumerate() {
        let widest = result
            .rows
            .iter()
            .map(|row| cell_text(row, column).len())
            .chain([column.len()])
            .max()
            .unwrap_or(1);
        sheet
            .get_column_dimension_mut(&column_letter(col + 1))
            .set_width((widest + 6) as f64);
    }

    umya_spreadsheet::writer::xlsx::write(&book, path)
        .with_context(|| format!("could not save report file {}", path.display()))
}

/// 1-based column index to spreadsheet letters (1 -> A, 27 -> AA).
fn column_letter(mut index: usize) -> String {
    let mut letters = String::new();
    while index > 0 {
        let remainder = (index - 1) % 26;
        letters.insert(0, (b'A' + remainder as u8) as char);
        index = (index - 1) / 26;
    }
    letters
}
