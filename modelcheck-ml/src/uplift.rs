//! Export of uplift predictions for offline uplift analysis.

use crate::data::csv::{RawTable, format_csv};
use crate::data::dataset::{ColumnData, Dataset};
use crate::error::{MlError, io_at};
use crate::model::{Model, Prediction, predict_dataset};
use std::collections::BTreeSet;
use std::path::Path;

/// Columns of the exported file.
pub const UPLIFT_CSV_HEADER: [&str; 4] = ["uplift", "response", "weight", "group"];

/// Write one row per example: predicted uplift, observed response, weight and
/// treatment group.
///
/// Groups index the sorted treatment values, so the lexicographically first
/// value is the control group 0. An example without a treatment has an empty
/// group. Categorical responses are written as their class index.
pub fn export_uplift_predictions_csv(
    model: &dyn Model,
    dataset: &Dataset,
    weight_column: Option<&str>,
    path: &Path,
) -> Result<usize, MlError> {
    if !model.task().is_uplift() {
        return Err(MlError::config(format!(
            "uplift export needs an uplift model, got a {} model",
            model.task()
        )));
    }
    let treatment = model
        .uplift_treatment()
        .ok_or_else(|| MlError::config("uplift model has no treatment column"))?;
    let treatments = dataset.categorical(treatment)?;
    let groups: Vec<&str> = treatments
        .iter()
        .flatten()
        .map(String::as_str)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let responses: Vec<Option<String>> = match &dataset.require_column(model.label())?.data {
        ColumnData::Numerical(values) => {
            values.iter().map(|v| v.map(|v| v.to_string())).collect()
        }
        ColumnData::Categorical(values) => values
            .iter()
            .map(|v| {
                v.as_ref().and_then(|v| {
                    model
                        .label_classes()
                        .iter()
                        .position(|c| c == v)
                        .map(|i| i.to_string())
                })
            })
            .collect(),
        ColumnData::Text(_) => {
            return Err(MlError::config("uplift response cannot be a text column"));
        }
    };
    let weights: Vec<f32> = match weight_column {
        Some(column) => dataset
            .numerical(column)?
            .iter()
            .map(|w| w.unwrap_or(0.0))
            .collect(),
        None => vec![1.0; dataset.nrow()],
    };

    let predictions = predict_dataset(model.reference_engine().as_ref(), dataset, 256)?;
    let mut table = RawTable {
        header: UPLIFT_CSV_HEADER.iter().map(|h| h.to_string()).collect(),
        rows: Vec::new(),
    };
    for (row, prediction) in predictions.iter().enumerate() {
        let Prediction::Uplift { treatment_effect } = prediction else {
            return Err(MlError::model(format!(
                "uplift model produced a non-uplift prediction: {prediction}"
            )));
        };
        let group = treatments[row]
            .as_deref()
            .and_then(|t| groups.iter().position(|g| *g == t))
            .map(|g| g.to_string())
            .unwrap_or_default();
        table.rows.push(vec![
            treatment_effect.first().copied().unwrap_or(0.0).to_string(),
            responses[row].clone().unwrap_or_default(),
            weights[row].to_string(),
            group,
        ]);
    }

    modelcheck_core::persistence::atomic_write(path, format_csv(&table)?.as_bytes())
        .map_err(|e| io_at(path, e))?;
    tracing::info!(path = %path.display(), rows = table.rows.len(), "Exported uplift predictions");
    Ok(table.rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::csv::parse_csv;
    use crate::data::dataset::tests::toy_dataset;
    use crate::linear::model::tests::toy_model;
    use crate::model::Task;

    #[test]
    fn test_rejects_non_uplift_model() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = export_uplift_predictions_csv(
            &toy_model(),
            &toy_dataset(),
            None,
            &dir.path().join("uplift.csv"),
        )
        .unwrap_err();
        assert!(err.is_config());
    }

    fn uplift_model(treatment: &str, treatments: &[&str]) -> crate::linear::LinearModel {
        let mut model = toy_model();
        model.task = Task::NumericalUplift;
        model.label = "f1".into();
        model.classes.clear();
        model.treatment = Some(treatment.into());
        model.treatments = treatments.iter().map(|t| t.to_string()).collect();
        model.features.remove(0);
        for head in &mut model.heads {
            head.weights.remove(0);
        }
        model
    }

    #[test]
    fn test_missing_treatment_keeps_its_row() {
        let model = uplift_model("color", &["blue", "red"]);
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("uplift.csv");
        let rows = export_uplift_predictions_csv(&model, &toy_dataset(), None, &path).unwrap();
        assert_eq!(rows, 4);
        let table = parse_csv(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let groups: Vec<&str> = table.column_values(3).collect();
        assert_eq!(groups, vec!["1", "0", "", "1"]);
    }

    #[test]
    fn test_export_groups() {
        let model = uplift_model("LABEL", &["a", "b"]);
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("uplift.csv");
        let rows = export_uplift_predictions_csv(&model, &toy_dataset(), None, &path).unwrap();
        assert_eq!(rows, 4);
        let table = parse_csv(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(table.header, UPLIFT_CSV_HEADER);
        let groups: Vec<&str> = table.column_values(3).collect();
        assert_eq!(groups, vec!["0", "1", "0", "1"]);
        let responses: Vec<&str> = table.column_values(1).collect();
        assert_eq!(responses, vec!["1", "", "3", "4"]);
    }
}
