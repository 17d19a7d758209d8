//! On-disk model artifacts.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use biota_core::{BiotaError, BiotaResult};
use serde::{Deserialize, Serialize};

use crate::linear::LinearModel;
use crate::model::Model;
use crate::tree::TreeEnsemble;

/// A serialized model, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    TreeEnsemble(TreeEnsemble),
    Linear(LinearModel),
}

impl ModelArtifact {
    pub fn from_json(json: &str) -> BiotaResult<Self> {
        let artifact: ModelArtifact = serde_json::from_str(json)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn load(path: &Path) -> BiotaResult<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|err| match err {
            BiotaError::Parse(msg) => {
                BiotaError::Parse(format!("{}: {msg}", path.display()))
            }
            BiotaError::Model(msg) => {
                BiotaError::Model(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    pub fn validate(&self) -> BiotaResult<()> {
        match self {
            ModelArtifact::TreeEnsemble(model) => model.validate(),
            ModelArtifact::Linear(model) => model.validate(),
        }
    }

    pub fn into_model(self) -> Arc<dyn Model> {
        match self {
            ModelArtifact::TreeEnsemble(model) => Arc::new(model),
            ModelArtifact::Linear(model) => Arc::new(model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_linear_artifact() {
        let json = r#"{"kind": "linear", "feature_names": ["evi"], "coefficients": [3.0], "intercept": 1.0}"#;
        let model = ModelArtifact::from_json(json).unwrap().into_model();
        assert_eq!(model.feature_names(), ["evi".to_string()]);
        assert_eq!(model.predict(&vec![vec![Some(2.0)]]).unwrap(), vec![7.0]);
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        let err = ModelArtifact::from_json(r#"{"kind": "svm"}"#).unwrap_err();
        assert!(matches!(err, BiotaError::Parse(_)));
    }

    #[test]
    fn invalid_artifact_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("richness_regressor.json");
        fs::write(
            &path,
            r#"{"kind": "linear", "feature_names": ["a", "b"], "coefficients": [1.0]}"#,
        )
        .unwrap();
        let err = ModelArtifact::load(&path).unwrap_err();
        assert!(err.to_string().contains("richness_regressor.json"));
    }
}
