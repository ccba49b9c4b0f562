//! Row-aligned tabular data.
//!
//! A [`Dataset`] maps column names to equally long sequences, in insertion
//! order. Numeric columns use NaN as the missing-value marker; text columns
//! carry site labels such as country or climate class.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{ErosivityError, Result};

/// One column of a [`Dataset`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    /// Numeric values, NaN where missing
    Numeric(Vec<f64>),
    /// Free-form labels
    Text(Vec<String>),
}

impl Column {
    /// Number of rows in the column
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    /// Whether the column has no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&i| v[i]).collect()),
            Column::Text(v) => Column::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }
}

/// An ordered, row-aligned table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    names: Vec<String>,
    columns: HashMap<String, Column>,
    rows: usize,
}

impl Dataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows shared by all columns
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Column names in insertion order
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Look up a column of either kind
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Add a column, or replace an existing one in place.
    ///
    /// The first column fixes the row count; later columns must match it.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if !self.names.is_empty() && column.len() != self.rows {
            return Err(ErosivityError::LengthMismatch {
                left: self.rows,
                right: column.len(),
            });
        }
        if self.names.is_empty() {
            self.rows = column.len();
        }
        if !self.columns.contains_key(&name) {
            self.names.push(name.clone());
        }
        self.columns.insert(name, column);
        Ok(())
    }

    /// Add or replace a numeric column
    pub fn insert_numeric(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        self.insert(name, Column::Numeric(values))
    }

    /// Add or replace a text column
    pub fn insert_text(&mut self, name: impl Into<String>, values: Vec<String>) -> Result<()> {
        self.insert(name, Column::Text(values))
    }

    /// Builder form of [`Dataset::insert_numeric`]
    pub fn with_numeric(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.insert_numeric(name, values)?;
        Ok(self)
    }

    /// Builder form of [`Dataset::insert_text`]
    pub fn with_text(mut self, name: impl Into<String>, values: Vec<String>) -> Result<Self> {
        self.insert_text(name, values)?;
        Ok(self)
    }

    /// Remove a column, returning it if present
    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let column = self.columns.remove(name)?;
        self.names.retain(|n| n != name);
        if self.names.is_empty() {
            self.rows = 0;
        }
        Some(column)
    }

    /// Borrow a numeric column
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match self.columns.get(name) {
            Some(Column::Numeric(v)) => Ok(v),
            Some(Column::Text(_)) => Err(ErosivityError::InvalidParameter {
                param: name.to_string(),
                message: "column is not numeric".to_string(),
            }),
            None => Err(ErosivityError::MissingColumn {
                name: name.to_string(),
            }),
        }
    }

    /// Borrow a text column
    pub fn text(&self, name: &str) -> Result<&[String]> {
        match self.columns.get(name) {
            Some(Column::Text(v)) => Ok(v),
            Some(Column::Numeric(_)) => Err(ErosivityError::InvalidParameter {
                param: name.to_string(),
                message: "column is not text".to_string(),
            }),
            None => Err(ErosivityError::MissingColumn {
                name: name.to_string(),
            }),
        }
    }

    /// Fail unless every named column exists and is numeric
    pub fn require_numeric(&self, names: &[&str]) -> Result<()> {
        for name in names {
            self.numeric(name)?;
        }
        Ok(())
    }

    /// New dataset holding the given rows, in the given order
    pub fn select_rows(&self, rows: &[usize]) -> Dataset {
        let columns = self
            .names
            .iter()
            .map(|name| (name.clone(), self.columns[name].select(rows)))
            .collect();
        Dataset {
            names: self.names.clone(),
            columns,
            rows: rows.len(),
        }
    }

    /// Keep rows where every named column is present and `>= floor`.
    ///
    /// Surviving rows are renumbered from zero.
    pub fn filter_min(&self, names: &[&str], floor: f64) -> Result<Dataset> {
        let criteria = names
            .iter()
            .map(|name| self.numeric(name))
            .collect::<Result<Vec<_>>>()?;

        let keep: Vec<usize> = (0..self.rows)
            .filter(|&i| criteria.iter().all(|col| !col[i].is_nan() && col[i] >= floor))
            .collect();

        Ok(self.select_rows(&keep))
    }

    /// Row-wise sum of every numeric column starting with `prefix` into
    /// `target`, then drop the summed columns.
    ///
    /// Missing values are skipped; a row with no present parts sums to zero.
    /// Returns the number of columns folded in.
    pub fn sum_columns_with_prefix(&mut self, prefix: &str, target: &str) -> Result<usize> {
        let parts: Vec<String> = self
            .names
            .iter()
            .filter(|n| n.starts_with(prefix) && n.as_str() != target)
            .filter(|n| matches!(self.columns[n.as_str()], Column::Numeric(_)))
            .cloned()
            .collect();

        if parts.is_empty() {
            return Err(ErosivityError::MissingColumn {
                name: format!("{}*", prefix),
            });
        }

        let mut total = vec![0.0; self.rows];
        for part in &parts {
            for (acc, v) in total.iter_mut().zip(self.numeric(part)?) {
                if !v.is_nan() {
                    *acc += v;
                }
            }
        }

        for part in &parts {
            self.drop_column(part);
        }
        self.insert_numeric(target, total)?;
        Ok(parts.len())
    }

    /// Multiply a numeric column by a constant in place
    pub fn scale_column(&mut self, name: &str, factor: f64) -> Result<()> {
        match self.columns.get_mut(name) {
            Some(Column::Numeric(v)) => {
                v.iter_mut().for_each(|x| *x *= factor);
                Ok(())
            }
            Some(Column::Text(_)) => Err(ErosivityError::InvalidParameter {
                param: name.to_string(),
                message: "cannot scale a text column".to_string(),
            }),
            None => Err(ErosivityError::MissingColumn {
                name: name.to_string(),
            }),
        }
    }

    /// Stack numeric columns into an `(rows, names.len())` matrix
    pub fn feature_matrix(&self, names: &[&str]) -> Result<Array2<f64>> {
        if names.is_empty() {
            return Err(ErosivityError::EmptyInput {
                context: "feature column list".to_string(),
            });
        }
        let columns = names
            .iter()
            .map(|name| self.numeric(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Array2::from_shape_fn((self.rows, names.len()), |(i, j)| {
            columns[j][i]
        }))
    }
}
