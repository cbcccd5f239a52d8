//! Model-facing feature matrix

use crate::error::{PipelineError, Result};
use ndarray::{Array2, ArrayView1, Axis};
use std::path::Path;

/// Row-major feature matrix with named columns.
///
/// Column order is fixed by the artifact that produced it and is never
/// rearranged downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Assemble a matrix from equally long columns.
    pub fn from_columns(columns: Vec<(String, Vec<f64>)>, rows: usize) -> Result<Self> {
        let mut values = Array2::zeros((rows, columns.len()));
        let mut names = Vec::with_capacity(columns.len());
        for (j, (name, column)) in columns.into_iter().enumerate() {
            if column.len() != rows {
                return Err(PipelineError::validation(
                    name,
                    format!("expected {} rows, got {}", rows, column.len()),
                ));
            }
            values
                .column_mut(j)
                .iter_mut()
                .zip(column)
                .for_each(|(cell, v)| *cell = v);
            names.push(name);
        }
        Ok(Self {
            columns: names,
            values,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// A column by name.
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|j| self.values.column(j))
    }

    /// A row in column order.
    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.values.row(i)
    }

    /// Largest absolute element-wise difference, or `None` if the shapes or column names differ.
    pub fn max_abs_diff(&self, other: &FeatureMatrix) -> Option<f64> {
        if self.columns != other.columns || self.values.dim() != other.values.dim() {
            return None;
        }
        Some(
            self.values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
        )
    }

    /// Write the matrix as CSV with a header row.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(&self.columns)?;
        for row in self.values.axis_iter(Axis(0)) {
            writer.write_record(row.iter().map(|v| v.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }
}
