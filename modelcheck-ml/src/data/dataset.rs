//! In-memory columnar dataset.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Numerical,
    Categorical,
    Text,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Numerical => "NUMERICAL",
            Self::Categorical => "CATEGORICAL",
            Self::Text => "TEXT",
        };
        f.write_str(name)
    }
}

/// Values of one column. `None` is a missing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Numerical(Vec<Option<f32>>),
    Categorical(Vec<Option<String>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn empty(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::Numerical => Self::Numerical(Vec::new()),
            ColumnType::Categorical => Self::Categorical(Vec::new()),
            ColumnType::Text => Self::Text(Vec::new()),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Numerical(_) => ColumnType::Numerical,
            Self::Categorical(_) => ColumnType::Categorical,
            Self::Text(_) => ColumnType::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Numerical(v) => v.len(),
            Self::Categorical(v) | Self::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, indices: &[usize]) -> Self {
        match self {
            Self::Numerical(v) => Self::Numerical(indices.iter().map(|&i| v[i]).collect()),
            Self::Categorical(v) => {
                Self::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
            }
            Self::Text(v) => Self::Text(indices.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    fn extend_from(&mut self, other: &Self) -> Result<(), MlError> {
        match (self, other) {
            (Self::Numerical(a), Self::Numerical(b)) => a.extend_from_slice(b),
            (Self::Categorical(a), Self::Categorical(b)) | (Self::Text(a), Self::Text(b)) => {
                a.extend(b.iter().cloned())
            }
            (a, b) => {
                return Err(MlError::dataset(format!(
                    "cannot concatenate {} values onto a {} column",
                    b.column_type(),
                    a.column_type()
                )));
            }
        }
        Ok(())
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Numerical(f32),
    Categorical(String),
    Text(String),
    Missing,
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Textual form used by the file writers; missing values are empty.
    pub fn to_field(&self) -> String {
        match self {
            Self::Numerical(v) => v.to_string(),
            Self::Categorical(s) | Self::Text(s) => s.clone(),
            Self::Missing => String::new(),
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }
}

/// Ordered columnar table of examples. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<Column>,
    nrow: usize,
}

impl Dataset {
    /// Build a dataset, checking that columns have unique names and equal lengths.
    pub fn new(columns: Vec<Column>) -> Result<Self, MlError> {
        let nrow = columns.first().map(|c| c.data.len()).unwrap_or(0);
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(MlError::dataset(format!(
                    "duplicate column name \"{}\"",
                    column.name
                )));
            }
            if column.data.len() != nrow {
                return Err(MlError::dataset(format!(
                    "column \"{}\" has {} rows, expected {nrow}",
                    column.name,
                    column.data.len()
                )));
            }
        }
        Ok(Self { columns, nrow })
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column by name, as a dataset error when absent.
    pub fn require_column(&self, name: &str) -> Result<&Column, MlError> {
        self.column(name)
            .ok_or_else(|| MlError::dataset(format!("column \"{name}\" not found in dataset")))
    }

    pub fn numerical(&self, name: &str) -> Result<&[Option<f32>], MlError> {
        match &self.require_column(name)?.data {
            ColumnData::Numerical(v) => Ok(v),
            other => Err(MlError::dataset(format!(
                "column \"{name}\" is {}, expected NUMERICAL",
                other.column_type()
            ))),
        }
    }

    pub fn categorical(&self, name: &str) -> Result<&[Option<String>], MlError> {
        match &self.require_column(name)?.data {
            ColumnData::Categorical(v) => Ok(v),
            other => Err(MlError::dataset(format!(
                "column \"{name}\" is {}, expected CATEGORICAL",
                other.column_type()
            ))),
        }
    }

    /// Cell value at (`row`, `col`). Panics if out of range.
    pub fn value(&self, row: usize, col: usize) -> Value {
        match &self.columns[col].data {
            ColumnData::Numerical(v) => v[row].map_or(Value::Missing, Value::Numerical),
            ColumnData::Categorical(v) => v[row]
                .as_ref()
                .map_or(Value::Missing, |s| Value::Categorical(s.clone())),
            ColumnData::Text(v) => v[row]
                .as_ref()
                .map_or(Value::Missing, |s| Value::Text(s.clone())),
        }
    }

    /// New dataset made of the given rows, in the given order (repeats allowed).
    pub fn extract_rows(&self, indices: &[usize]) -> Result<Self, MlError> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.nrow) {
            return Err(MlError::dataset(format!(
                "row index {bad} out of range for {} rows",
                self.nrow
            )));
        }
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.data.select(indices)))
            .collect();
        Ok(Self {
            columns,
            nrow: indices.len(),
        })
    }

    /// Concatenate datasets sharing the same column layout.
    pub fn concat(parts: &[Self]) -> Result<Self, MlError> {
        let Some(first) = parts.first() else {
            return Ok(Self::default());
        };
        let mut columns = first.columns.clone();
        for part in &parts[1..] {
            if part.column_names() != first.column_names() {
                return Err(MlError::dataset(
                    "cannot concatenate datasets with different columns",
                ));
            }
            for (dst, src) in columns.iter_mut().zip(&part.columns) {
                dst.data.extend_from(&src.data)?;
            }
        }
        Self::new(columns)
    }
}
