//! Serialization round trips: save, reload, and require identical behavior.

use crate::data::dataset::Dataset;
use crate::error::MlError;
use crate::model::io::{deserialize_model, load_model, save_model, serialize_model};
use crate::model::{Model, ModelLoaderRegistry, SerializationForm, predict_dataset};
use crate::verify::report::{VerificationFailure, VerificationReport};
use std::path::Path;
use tracing::info;

/// Persist `model` in `form` and load it back.
pub fn reload_model(
    model: &dyn Model,
    form: SerializationForm,
    loaders: &ModelLoaderRegistry,
    scratch: &Path,
) -> Result<Box<dyn Model>, MlError> {
    match form {
        SerializationForm::Directory => {
            let dir = scratch.join(format!("roundtrip_{}", uuid::Uuid::new_v4()));
            save_model(model, &dir)?;
            load_model(&dir, loaders)
        }
        SerializationForm::Bytes => deserialize_model(&serialize_model(model)?, loaders),
    }
}

fn check_form(
    model: &dyn Model,
    form: SerializationForm,
    loaders: &ModelLoaderRegistry,
    dataset: &Dataset,
    scratch: &Path,
    batch_size: usize,
    expected: &[crate::model::Prediction],
) -> Vec<VerificationFailure> {
    let failure = |message: String| vec![VerificationFailure::Serialization { form, message }];

    let reloaded = match reload_model(model, form, loaders, scratch) {
        Ok(reloaded) => reloaded,
        Err(e) => return failure(e.to_string()),
    };
    if reloaded.kind() != model.kind()
        || reloaded.task() != model.task()
        || reloaded.label() != model.label()
    {
        return failure(format!(
            "reloaded model is {} / {} / \"{}\", expected {} / {} / \"{}\"",
            reloaded.kind(),
            reloaded.task(),
            reloaded.label(),
            model.kind(),
            model.task(),
            model.label()
        ));
    }
    let actual = match predict_dataset(reloaded.reference_engine().as_ref(), dataset, batch_size) {
        Ok(actual) => actual,
        Err(e) => return failure(format!("reloaded model cannot predict: {e}")),
    };
    expected
        .iter()
        .zip(actual)
        .enumerate()
        .filter(|(_, (expected, actual))| !expected.bit_equal(actual))
        .map(|(row, (expected, actual))| VerificationFailure::SerializationMismatch {
            form,
            row,
            expected: expected.clone(),
            actual,
        })
        .collect()
}

/// Round-trip `model` through both serialized forms.
///
/// Each reloaded model must have the same kind, task and label, and its
/// reference engine must produce bit-identical predictions on `dataset`.
pub fn check_serialization_roundtrip(
    model: &dyn Model,
    loaders: &ModelLoaderRegistry,
    dataset: &Dataset,
    scratch: &Path,
    batch_size: usize,
) -> Result<VerificationReport, MlError> {
    let expected = predict_dataset(model.reference_engine().as_ref(), dataset, batch_size)?;
    let mut report = VerificationReport::new();
    for form in SerializationForm::ALL {
        let failures = check_form(model, form, loaders, dataset, scratch, batch_size, &expected);
        info!(%form, failures = failures.len(), "Serialization round trip checked");
        report.failures.extend(failures);
    }
    Ok(report)
}
