//! The loaded set of ensemble models.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use biota_core::{BiotaError, BiotaResult};
use tracing::{debug, info};

use crate::artifact::ModelArtifact;
use crate::model::{Model, ModelRole};

/// All four models, keyed by role. Construction fails unless every role is
/// present, every model passes its structural checks, and the presence model
/// is a classifier.
#[derive(Debug, Clone)]
pub struct ModelSet {
    models: BTreeMap<ModelRole, Arc<dyn Model>>,
}

impl ModelSet {
    pub fn from_models(models: BTreeMap<ModelRole, Arc<dyn Model>>) -> BiotaResult<Self> {
        for role in ModelRole::ALL {
            if !models.contains_key(&role) {
                return Err(BiotaError::MissingModel(role.to_string()));
            }
        }
        for (role, model) in &models {
            model.validate().map_err(|err| match err {
                BiotaError::Model(msg) => BiotaError::Model(format!("{role}: {msg}")),
                other => other,
            })?;
        }
        let set = Self { models };
        if !set.get(ModelRole::PresenceClassifier).is_classifier() {
            return Err(BiotaError::Model(format!(
                "{} must be a binary classifier",
                ModelRole::PresenceClassifier
            )));
        }
        Ok(set)
    }

    /// Load `<role>.json` for every role from `dir`.
    pub fn load_dir(dir: &Path) -> BiotaResult<Self> {
        let mut models = BTreeMap::new();
        for role in ModelRole::ALL {
            let path = dir.join(role.file_name());
            if !path.is_file() {
                return Err(BiotaError::MissingModel(format!(
                    "{role} (expected {})",
                    path.display()
                )));
            }
            let model = ModelArtifact::load(&path)?.into_model();
            debug!(
                model = %role,
                features = model.feature_names().len(),
                "loaded model artifact"
            );
            models.insert(role, model);
        }
        info!("loaded {} models from {}", models.len(), dir.display());
        Self::from_models(models)
    }

    pub fn get(&self, role: ModelRole) -> &dyn Model {
        // from_models guarantees every role is present
        self.models[&role].as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelRole, &dyn Model)> {
        self.models.iter().map(|(role, model)| (*role, model.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::{Link, LinearModel};
    use crate::tree::{Objective, Tree, TreeEnsemble, TreeNode};
    use std::fs;

    fn linear(link: Link) -> Arc<dyn Model> {
        Arc::new(LinearModel::new(vec!["evi".into()], vec![1.0], 0.0, link))
    }

    fn full_set() -> BTreeMap<ModelRole, Arc<dyn Model>> {
        ModelRole::ALL
            .into_iter()
            .map(|role| {
                let link = if role == ModelRole::PresenceClassifier {
                    Link::Logistic
                } else {
                    Link::Identity
                };
                (role, linear(link))
            })
            .collect()
    }

    #[test]
    fn missing_role_fails_fast() {
        let mut models = full_set();
        models.remove(&ModelRole::AbundanceRegressor);
        let err = ModelSet::from_models(models).unwrap_err();
        assert!(matches!(err, BiotaError::MissingModel(name) if name == "abundance_regressor"));
    }

    #[test]
    fn presence_model_must_classify() {
        let mut models = full_set();
        models.insert(ModelRole::PresenceClassifier, linear(Link::Identity));
        assert!(matches!(
            ModelSet::from_models(models),
            Err(BiotaError::Model(_))
        ));
    }

    #[test]
    fn loads_directory_of_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        for role in ModelRole::ALL {
            let link = if role == ModelRole::PresenceClassifier {
                "logistic"
            } else {
                "identity"
            };
            fs::write(
                dir.path().join(role.file_name()),
                format!(
                    r#"{{"kind": "linear", "feature_names": ["evi"], "coefficients": [1.0], "link": "{link}"}}"#
                ),
            )
            .unwrap();
        }
        let set = ModelSet::load_dir(dir.path()).unwrap();
        assert_eq!(set.iter().count(), 4);

        fs::remove_file(dir.path().join("shannon_regressor.json")).unwrap();
        let err = ModelSet::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, BiotaError::MissingModel(_)));
    }

    #[test]
    fn malformed_in_memory_models_are_rejected() {
        let looping = TreeEnsemble {
            feature_names: vec!["evi".into()],
            objective: Objective::Regression,
            base_score: 0.0,
            trees: vec![Tree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 0,
                        threshold: 0.5,
                        default_left: true,
                        left: 0,
                        right: 1,
                    },
                    TreeNode::Leaf { value: 1.0 },
                ],
            }],
        };
        let mut models = full_set();
        models.insert(ModelRole::AbundanceRegressor, Arc::new(looping));
        let err = ModelSet::from_models(models).unwrap_err();
        assert!(
            matches!(&err, BiotaError::Model(msg) if msg.starts_with("abundance_regressor: tree 0 node 0")),
            "{err}"
        );

        let unknown_feature = TreeEnsemble {
            feature_names: vec!["evi".into()],
            objective: Objective::Regression,
            base_score: 0.0,
            trees: vec![Tree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 3,
                        threshold: 0.5,
                        default_left: true,
                        left: 1,
                        right: 2,
                    },
                    TreeNode::Leaf { value: 1.0 },
                    TreeNode::Leaf { value: 2.0 },
                ],
            }],
        };
        let mut models = full_set();
        models.insert(ModelRole::ShannonRegressor, Arc::new(unknown_feature));
        assert!(matches!(
            ModelSet::from_models(models),
            Err(BiotaError::Model(_))
        ));

        let mut models = full_set();
        models.insert(
            ModelRole::RichnessRegressor,
            Arc::new(LinearModel::new(vec!["evi".into()], vec![], 0.0, Link::Identity)),
        );
        assert!(matches!(
            ModelSet::from_models(models),
            Err(BiotaError::Model(_))
        ));
    }
}
