//! Data specification: column types, vocabularies and numerical statistics.

use crate::data::csv::RawTable;
use crate::data::dataset::{Column, ColumnData, ColumnType, Dataset};
use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Strings read as a missing value.
const MISSING_TOKENS: &[&str] = &["", "NA", "na", "N/A", "nan", "NaN"];

pub fn is_missing_token(s: &str) -> bool {
    MISSING_TOKENS.contains(&s)
}

/// Schema metadata of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSpecification {
    pub columns: Vec<ColumnSpec>,
    pub created_num_rows: usize,
}

/// Specification of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub num_missing: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numerical: Option<NumericalSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorical: Option<CategoricalSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericalSpec {
    pub min: f32,
    pub max: f32,
    pub mean: f64,
    pub std_dev: f64,
}

/// Vocabulary of a categorical or text column, most frequent first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalSpec {
    pub vocabulary: Vec<VocabularyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub value: String,
    pub count: usize,
}

impl CategoricalSpec {
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.vocabulary.iter().map(|e| e.value.as_str())
    }

    pub fn contains(&self, value: &str) -> bool {
        self.vocabulary.iter().any(|e| e.value == value)
    }
}

/// User hints applied while inferring a specification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSpecificationGuide {
    #[serde(default)]
    pub column_guides: Vec<ColumnGuide>,
    /// Columns dropped from the specification.
    #[serde(default)]
    pub ignore_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnGuide {
    pub column_name: String,
    pub column_type: ColumnType,
}

impl DataSpecificationGuide {
    /// Guide forcing `column` to `column_type`.
    pub fn with_column(mut self, column: impl Into<String>, column_type: ColumnType) -> Self {
        self.column_guides.push(ColumnGuide {
            column_name: column.into(),
            column_type,
        });
        self
    }

    fn forced_type(&self, column: &str) -> Option<ColumnType> {
        self.column_guides
            .iter()
            .find(|g| g.column_name == column)
            .map(|g| g.column_type)
    }

    fn is_ignored(&self, column: &str) -> bool {
        self.ignore_columns.iter().any(|c| c == column)
    }

    /// Load a guide stored as JSON.
    pub fn load(path: &std::path::Path) -> Result<Self, MlError> {
        modelcheck_core::persistence::load_json(path)
            .map_err(|e| crate::error::io_at(path, e))?
            .ok_or_else(|| MlError::config(format!("guide file {} not found", path.display())))
    }
}

/// Infer a column type from raw string values.
///
/// A column whose non-missing values all parse as numbers is numerical;
/// everything else is categorical. Text columns are only obtained through a guide.
pub fn infer_column_type<'a>(values: impl IntoIterator<Item = &'a str>) -> ColumnType {
    let mut has_value = false;
    for v in values {
        let v = v.trim();
        if is_missing_token(v) {
            continue;
        }
        has_value = true;
        if v.parse::<f32>().is_err() {
            return ColumnType::Categorical;
        }
    }
    if has_value {
        ColumnType::Numerical
    } else {
        ColumnType::Categorical
    }
}

impl DataSpecification {
    /// Infer a specification from a raw table.
    pub fn infer(raw: &RawTable, guide: &DataSpecificationGuide) -> Result<Self, MlError> {
        let dataset = Self::typed_from_raw(raw, guide)?;
        Ok(Self::from_dataset(&dataset))
    }

    /// Compute a specification from an already typed dataset.
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let columns = dataset.columns().iter().map(column_spec).collect();
        Self {
            columns,
            created_num_rows: dataset.nrow(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn require_column(&self, name: &str) -> Result<&ColumnSpec, MlError> {
        self.column(name).ok_or_else(|| {
            MlError::config(format!("column \"{name}\" is not in the data specification"))
        })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Type the cells of a raw table according to this specification.
    ///
    /// Columns absent from the table are entirely missing; table columns absent
    /// from the specification are dropped.
    pub fn parse_raw(&self, raw: &RawTable) -> Result<Dataset, MlError> {
        let mut columns = Vec::with_capacity(self.columns.len());
        for spec in &self.columns {
            let index = raw.header.iter().position(|h| *h == spec.name);
            let cells: Vec<&str> = match index {
                Some(i) => raw.column_values(i).collect(),
                None => vec![""; raw.rows.len()],
            };
            columns.push(parse_column(&spec.name, spec.column_type, &cells)?);
        }
        Dataset::new(columns)
    }

    fn typed_from_raw(raw: &RawTable, guide: &DataSpecificationGuide) -> Result<Dataset, MlError> {
        let mut columns = Vec::new();
        for (i, name) in raw.header.iter().enumerate() {
            if guide.is_ignored(name) {
                continue;
            }
            let cells: Vec<&str> = raw.column_values(i).collect();
            let column_type = guide
                .forced_type(name)
                .unwrap_or_else(|| infer_column_type(cells.iter().copied()));
            columns.push(parse_column(name, column_type, &cells)?);
        }
        Dataset::new(columns)
    }

    /// Human-readable summary, one line per column.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "Number of records: {}\nNumber of columns: {}\n",
            self.created_num_rows,
            self.columns.len()
        );
        for (i, c) in self.columns.iter().enumerate() {
            out.push_str(&format!("  {i}: \"{}\" {}", c.name, c.column_type));
            if let Some(n) = &c.numerical {
                out.push_str(&format!(
                    " mean:{:.4} min:{} max:{} sd:{:.4}",
                    n.mean, n.min, n.max, n.std_dev
                ));
            }
            if let Some(cat) = &c.categorical {
                out.push_str(&format!(" has-dict vocab-size:{}", cat.vocabulary.len()));
            }
            if c.num_missing > 0 {
                out.push_str(&format!(" num-nas:{}", c.num_missing));
            }
            out.push('\n');
        }
        out
    }
}

fn parse_column(name: &str, column_type: ColumnType, cells: &[&str]) -> Result<Column, MlError> {
    let data = match column_type {
        ColumnType::Numerical => {
            let mut values = Vec::with_capacity(cells.len());
            for (row, cell) in cells.iter().enumerate() {
                let cell = cell.trim();
                if is_missing_token(cell) {
                    values.push(None);
                    continue;
                }
                let v = cell.parse::<f32>().map_err(|_| {
                    MlError::dataset(format!(
                        "row {row} of numerical column \"{name}\" holds non-numerical value \"{cell}\""
                    ))
                })?;
                values.push(Some(v));
            }
            ColumnData::Numerical(values)
        }
        ColumnType::Categorical => ColumnData::Categorical(owned_strings(cells)),
        ColumnType::Text => ColumnData::Text(owned_strings(cells)),
    };
    Ok(Column::new(name, data))
}

fn owned_strings(cells: &[&str]) -> Vec<Option<String>> {
    cells
        .iter()
        .map(|c| (!is_missing_token(c)).then(|| c.to_string()))
        .collect()
}

fn column_spec(column: &Column) -> ColumnSpec {
    let mut spec = ColumnSpec {
        name: column.name.clone(),
        column_type: column.column_type(),
        num_missing: 0,
        numerical: None,
        categorical: None,
    };
    match &column.data {
        ColumnData::Numerical(values) => {
            let present: Vec<f32> = values.iter().flatten().copied().collect();
            spec.num_missing = values.len() - present.len();
            if !present.is_empty() {
                let n = present.len() as f64;
                let mean = present.iter().map(|&v| v as f64).sum::<f64>() / n;
                let var = present
                    .iter()
                    .map(|&v| (v as f64 - mean).powi(2))
                    .sum::<f64>()
                    / n;
                spec.numerical = Some(NumericalSpec {
                    min: present.iter().copied().fold(f32::INFINITY, f32::min),
                    max: present.iter().copied().fold(f32::NEG_INFINITY, f32::max),
                    mean,
                    std_dev: var.sqrt(),
                });
            }
        }
        ColumnData::Categorical(values) | ColumnData::Text(values) => {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for v in values {
                match v {
                    Some(s) => *counts.entry(s.as_str()).or_default() += 1,
                    None => spec.num_missing += 1,
                }
            }
            let mut vocabulary: Vec<VocabularyEntry> = counts
                .into_iter()
                .map(|(value, count)| VocabularyEntry {
                    value: value.to_string(),
                    count,
                })
                .collect();
            vocabulary.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
            spec.categorical = Some(CategoricalSpec { vocabulary });
        }
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::csv::parse_csv;

    #[test]
    fn test_infer_column_type() {
        assert_eq!(infer_column_type(["1", "2.5", ""]), ColumnType::Numerical);
        assert_eq!(infer_column_type(["1", "x"]), ColumnType::Categorical);
        assert_eq!(infer_column_type(["", "NA"]), ColumnType::Categorical);
    }

    #[test]
    fn test_infer_with_guide() {
        let raw = parse_csv("f,LABEL,notes\n1,0,x\n2,1,y\n3,1,\n").unwrap();
        let guide = DataSpecificationGuide::default()
            .with_column("LABEL", ColumnType::Categorical)
            .with_column("notes", ColumnType::Text);
        let spec = DataSpecification::infer(&raw, &guide).unwrap();

        assert_eq!(spec.created_num_rows, 3);
        assert_eq!(spec.column("f").unwrap().column_type, ColumnType::Numerical);
        let label = spec.column("LABEL").unwrap();
        assert_eq!(label.column_type, ColumnType::Categorical);
        let vocab: Vec<&str> = label.categorical.as_ref().unwrap().values().collect();
        assert_eq!(vocab, vec!["1", "0"]);
        let notes = spec.column("notes").unwrap();
        assert_eq!(notes.column_type, ColumnType::Text);
        assert_eq!(notes.num_missing, 1);
    }

    #[test]
    fn test_numerical_statistics() {
        let raw = parse_csv("x\n1\n3\nNA\n").unwrap();
        let spec = DataSpecification::infer(&raw, &DataSpecificationGuide::default()).unwrap();
        let x = spec.column("x").unwrap();
        let n = x.numerical.unwrap();
        assert_eq!(x.num_missing, 1);
        assert_eq!(n.min, 1.0);
        assert_eq!(n.max, 3.0);
        assert!((n.mean - 2.0).abs() < 1e-9);
        assert!((n.std_dev - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ignore_columns() {
        let raw = parse_csv("a,b\n1,2\n").unwrap();
        let guide = DataSpecificationGuide {
            ignore_columns: vec!["b".into()],
            ..Default::default()
        };
        let spec = DataSpecification::infer(&raw, &guide).unwrap();
        assert!(spec.column("b").is_none());
        assert!(spec.require_column("b").unwrap_err().is_config());
    }

    #[test]
    fn test_parse_raw_follows_spec_types() {
        let raw = parse_csv("a,b\n1,2\n").unwrap();
        let guide = DataSpecificationGuide::default().with_column("b", ColumnType::Categorical);
        let spec = DataSpecification::infer(&raw, &guide).unwrap();
        let other = parse_csv("b,a\n7,8\n").unwrap();
        let ds = spec.parse_raw(&other).unwrap();
        assert_eq!(ds.numerical("a").unwrap(), &[Some(8.0)]);
        assert_eq!(ds.categorical("b").unwrap(), &[Some("7".to_string())]);
    }

    #[test]
    fn test_parse_raw_rejects_bad_number() {
        let raw = parse_csv("a\n1\n").unwrap();
        let spec = DataSpecification::infer(&raw, &DataSpecificationGuide::default()).unwrap();
        let bad = parse_csv("a\nxyz\n").unwrap();
        assert!(spec.parse_raw(&bad).is_err());
    }
}
