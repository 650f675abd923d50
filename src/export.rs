use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use serde_json::{Map, Value, json};
use tokio::fs;

use stimline_extract::FeatureTable;
use stimline_types::{ExtractError, ExtractResult};

use crate::settings::ExportSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Tsv,
    Csv,
    Json,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Tsv => "tsv",
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    pub fn delimiter(&self) -> Option<char> {
        match self {
            ExportFormat::Tsv => Some('\t'),
            ExportFormat::Csv => Some(','),
            ExportFormat::Json => None,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tsv" => Ok(ExportFormat::Tsv),
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExtractError::validation(format!(
                "unknown export format '{other}'"
            ))),
        }
    }
}

/// Render a merged table as delimited text: one row per stimulus, columns in
/// table order, cells the stimulus never measured filled with `missing`.
pub fn render_delimited(table: &FeatureTable, delimiter: char, missing: &str) -> String {
    let mut output = String::new();

    let mut header: Vec<String> = vec!["onset".to_string(), "duration".to_string()];
    header.extend(table.columns().iter().cloned());
    let _ = writeln!(
        &mut output,
        "{}",
        header
            .iter()
            .map(|name| escape_cell(name, delimiter))
            .collect::<Vec<_>>()
            .join(&delimiter.to_string())
    );

    for row in table.rows() {
        let mut cells: Vec<String> = Vec::with_capacity(table.columns().len() + 2);
        cells.push(render_time(row.stim().onset, missing));
        cells.push(render_time(row.stim().duration, missing));
        for cell in row.cells() {
            cells.push(match cell {
                Some(value) => escape_cell(&render_value(value), delimiter),
                None => missing.to_string(),
            });
        }
        let _ = writeln!(&mut output, "{}", cells.join(&delimiter.to_string()));
    }

    output
}

/// JSON view of a merged table. Row objects carry only measured values; the
/// column list spells out the full union so absent names stay recognizable.
pub fn table_to_json(table: &FeatureTable) -> Value {
    let rows: Vec<Value> = table
        .rows()
        .iter()
        .map(|row| {
            let mut values = Map::new();
            for (column, cell) in table.columns().iter().zip(row.cells()) {
                if let Some(value) = cell {
                    values.insert(column.clone(), value.clone());
                }
            }
            json!({
                "onset": row.stim().onset,
                "duration": row.stim().duration,
                "index": row.stim().index,
                "values": Value::Object(values),
            })
        })
        .collect();

    json!({
        "columns": table.columns(),
        "rows": rows,
    })
}

/// Write a merged table to disk in the configured format.
pub async fn write_table(
    path: &Path,
    table: &FeatureTable,
    settings: &ExportSettings,
) -> ExtractResult<()> {
    let encoded = match settings.format {
        ExportFormat::Tsv => render_delimited(table, '\t', &settings.missing_marker).into_bytes(),
        ExportFormat::Csv => render_delimited(table, ',', &settings.missing_marker).into_bytes(),
        ExportFormat::Json => {
            let value = table_to_json(table);
            let encoded = if settings.pretty {
                serde_json::to_vec_pretty(&value)
            } else {
                serde_json::to_vec(&value)
            };
            encoded.map_err(|err| {
                ExtractError::validation(format!("failed to encode table as JSON: {err}"))
            })?
        }
    };
    fs::write(path, encoded).await?;
    Ok(())
}

fn render_time(value: Option<f64>, missing: &str) -> String {
    match value {
        Some(value) => format!("{value}"),
        None => missing.to_string(),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_cell(cell: &str, delimiter: char) -> String {
    if cell.contains(delimiter) || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}
