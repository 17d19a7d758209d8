//! Model abstraction shared by every artifact kind.

use std::fmt;

use biota_core::{BiotaError, BiotaResult};
use biota_ts::FeatureRow;
use serde::{Deserialize, Serialize};

/// Row-major model input, one `Option<f64>` per declared feature column.
pub type FeatureMatrix = Vec<Vec<Option<f64>>>;

/// A pre-trained model consumed by the ensemble.
///
/// Implementations are immutable after loading and shared across threads.
pub trait Model: Send + Sync + fmt::Debug {
    /// Ordered feature columns the model was trained on.
    fn feature_names(&self) -> &[String];

    /// One prediction per row. For classifiers this is the hard class (0 or 1).
    fn predict(&self, rows: &FeatureMatrix) -> BiotaResult<Vec<f64>>;

    /// `[P(class=0), P(class=1)]` per row. Only classifiers support this.
    fn predict_proba(&self, _rows: &FeatureMatrix) -> BiotaResult<Vec<[f64; 2]>> {
        Err(BiotaError::Model(
            "predict_proba is only available for classifiers".into(),
        ))
    }

    fn is_classifier(&self) -> bool {
        false
    }

    /// Structural checks run before a model is admitted into a `ModelSet`.
    fn validate(&self) -> BiotaResult<()> {
        Ok(())
    }
}

/// The four models of the ensemble, in invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    PresenceClassifier,
    RichnessRegressor,
    AbundanceRegressor,
    ShannonRegressor,
}

impl ModelRole {
    pub const ALL: [ModelRole; 4] = [
        ModelRole::PresenceClassifier,
        ModelRole::RichnessRegressor,
        ModelRole::AbundanceRegressor,
        ModelRole::ShannonRegressor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::PresenceClassifier => "presence_classifier",
            ModelRole::RichnessRegressor => "richness_regressor",
            ModelRole::AbundanceRegressor => "abundance_regressor",
            ModelRole::ShannonRegressor => "shannon_regressor",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project feature rows onto a model's declared columns.
///
/// A column that exists with a missing value becomes `None`; a column that
/// does not exist at all is a [`BiotaError::ModelFeatureMismatch`].
pub fn project(
    rows: &[FeatureRow],
    feature_names: &[String],
    model: ModelRole,
) -> BiotaResult<FeatureMatrix> {
    rows.iter()
        .map(|row| {
            feature_names
                .iter()
                .map(|name| {
                    row.column(name)
                        .ok_or_else(|| BiotaError::ModelFeatureMismatch {
                            model: model.as_str().to_string(),
                            column: name.clone(),
                        })
                })
                .collect()
        })
        .collect()
}

pub(crate) fn check_width(rows: &FeatureMatrix, expected: usize) -> BiotaResult<()> {
    match rows.iter().position(|row| row.len() != expected) {
        Some(idx) => Err(BiotaError::Model(format!(
            "row {idx} has {} features, model expects {expected}",
            rows[idx].len()
        ))),
        None => Ok(()),
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
