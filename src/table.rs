//! CSV loading and saving for [`Dataset`].
//!
//! A column is numeric when every non-empty cell parses as `f64`; empty
//! cells and `NaN` become missing. Anything else is kept as text.

use std::path::Path;
use tracing::debug;

use crate::dataset::{Column, Dataset};
use crate::error::Result;

/// Read a delimited table with a header row
pub fn read_csv(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (column, field) in cells.iter_mut().zip(record.iter()) {
            column.push(field.trim().to_string());
        }
    }

    let mut dataset = Dataset::new();
    for (name, raw) in headers.into_iter().zip(cells) {
        dataset.insert(name, parse_column(raw))?;
    }

    debug!(
        path = %path.display(),
        rows = dataset.row_count(),
        columns = dataset.column_names().len(),
        "Loaded table"
    );
    Ok(dataset)
}

fn parse_column(raw: Vec<String>) -> Column {
    let parsed: Option<Vec<f64>> = raw
        .iter()
        .map(|cell| {
            if cell.is_empty() {
                Some(f64::NAN)
            } else {
                cell.parse::<f64>().ok()
            }
        })
        .collect();

    match parsed {
        Some(values) => Column::Numeric(values),
        None => Column::Text(raw),
    }
}

/// Write a dataset with a header row; missing numeric values are left empty
pub fn write_csv(dataset: &Dataset, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(dataset.column_names())?;

    let columns: Vec<&Column> = dataset
        .column_names()
        .iter()
        .filter_map(|name| dataset.column(name))
        .collect();

    for row in 0..dataset.row_count() {
        let record: Vec<String> = columns
            .iter()
            .map(|column| match column {
                Column::Numeric(v) if v[row].is_nan() => String::new(),
                Column::Numeric(v) => v[row].to_string(),
                Column::Text(v) => v[row].clone(),
            })
            .collect();
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
