//! Rank of an attribute in a variable importance list.

use crate::data::schema::DataSpecification;
use crate::error::MlError;
use crate::model::VariableImportance;

/// 0-based rank of `attribute` in `importances`, most important first.
///
/// The attribute must exist in `spec` and appear in the list.
pub fn variable_importance_rank(
    attribute: &str,
    spec: &DataSpecification,
    importances: &[VariableImportance],
) -> Result<usize, MlError> {
    spec.require_column(attribute)?;
    importances
        .iter()
        .position(|vi| vi.attribute == attribute)
        .ok_or_else(|| {
            MlError::not_found(format!(
                "attribute \"{attribute}\" has no variable importance"
            ))
        })
}
