//! Gradient-boosted decision tree ensembles.
//!
//! Nodes are stored flat per tree; children are indices into the same node
//! list. A row goes left when `x <= threshold`, and follows `default_left`
//! when the feature is missing, matching how boosted trees route NaNs.

use biota_core::{BiotaError, BiotaResult};
use serde::{Deserialize, Serialize};

use crate::model::{check_width, sigmoid, FeatureMatrix, Model};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    Regression,
    Binary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        #[serde(default = "default_left")]
        default_left: bool,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

fn default_left() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walk from the root to a leaf. Validation guarantees termination.
    fn score(&self, row: &[Option<f64>]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    default_left,
                    left,
                    right,
                } => {
                    let go_left = match row[*feature] {
                        Some(x) if !x.is_nan() => x <= *threshold,
                        _ => *default_left,
                    };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub objective: Objective,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    fn raw_scores(&self, rows: &FeatureMatrix) -> BiotaResult<Vec<f64>> {
        check_width(rows, self.feature_names.len())?;
        Ok(rows
            .iter()
            .map(|row| {
                self.base_score + self.trees.iter().map(|tree| tree.score(row)).sum::<f64>()
            })
            .collect())
    }
}

impl Model for TreeEnsemble {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, rows: &FeatureMatrix) -> BiotaResult<Vec<f64>> {
        let raw = self.raw_scores(rows)?;
        Ok(match self.objective {
            Objective::Regression => raw,
            Objective::Binary => raw
                .into_iter()
                .map(|score| if sigmoid(score) >= 0.5 { 1.0 } else { 0.0 })
                .collect(),
        })
    }

    fn predict_proba(&self, rows: &FeatureMatrix) -> BiotaResult<Vec<[f64; 2]>> {
        if self.objective != Objective::Binary {
            return Err(BiotaError::Model(
                "predict_proba requires a binary objective".into(),
            ));
        }
        Ok(self
            .raw_scores(rows)?
            .into_iter()
            .map(|score| {
                let p = sigmoid(score);
                [1.0 - p, p]
            })
            .collect())
    }

    fn is_classifier(&self) -> bool {
        self.objective == Objective::Binary
    }

    /// Check that every split references a known feature and that children
    /// point strictly forward, so traversal always reaches a leaf.
    fn validate(&self) -> BiotaResult<()> {
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(BiotaError::Model(format!("tree {t} has no nodes")));
            }
            for (n, node) in tree.nodes.iter().enumerate() {
                if let TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } = node
                {
                    if *feature >= self.feature_names.len() {
                        return Err(BiotaError::Model(format!(
                            "tree {t} node {n} splits on feature {feature}, but only {} features are declared",
                            self.feature_names.len()
                        )));
                    }
                    for child in [*left, *right] {
                        if child <= n || child >= tree.nodes.len() {
                            return Err(BiotaError::Model(format!(
                                "tree {t} node {n} has invalid child index {child}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One stump on `evi`: <= 0.3 → 1.0, > 0.3 → 5.0, missing → right.
    fn stump(objective: Objective) -> TreeEnsemble {
        TreeEnsemble {
            feature_names: vec!["temp_c".into(), "evi".into()],
            objective,
            base_score: 0.5,
            trees: vec![Tree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 1,
                        threshold: 0.3,
                        default_left: false,
                        left: 1,
                        right: 2,
                    },
                    TreeNode::Leaf { value: 1.0 },
                    TreeNode::Leaf { value: 5.0 },
                ],
            }],
        }
    }

    #[test]
    fn routes_by_threshold_and_missing_direction() {
        let model = stump(Objective::Regression);
        model.validate().unwrap();
        let rows = vec![
            vec![Some(10.0), Some(0.3)],
            vec![Some(10.0), Some(0.8)],
            vec![Some(10.0), None],
        ];
        assert_eq!(model.predict(&rows).unwrap(), vec![1.5, 5.5, 5.5]);
        assert!(model.predict_proba(&rows).is_err());
    }

    #[test]
    fn binary_objective_yields_probabilities() {
        let mut model = stump(Objective::Binary);
        model.base_score = -1.0;
        let rows = vec![vec![None, Some(0.1)], vec![None, Some(0.9)]];
        let proba = model.predict_proba(&rows).unwrap();
        assert!((proba[0][1] - 0.5).abs() < 1e-12);
        assert!((proba[1][1] - sigmoid(4.0)).abs() < 1e-12);
        assert!((proba[1][0] + proba[1][1] - 1.0).abs() < 1e-12);
        assert_eq!(model.predict(&rows).unwrap(), vec![1.0, 1.0]);
        assert!(model.is_classifier());
    }

    #[test]
    fn deserializes_from_json() {
        let json = r#"{
            "feature_names": ["evi"],
            "objective": "regression",
            "trees": [{"nodes": [
                {"type": "split", "feature": 0, "threshold": 0.5, "left": 1, "right": 2},
                {"type": "leaf", "value": -2.0},
                {"type": "leaf", "value": 2.0}
            ]}]
        }"#;
        let model: TreeEnsemble = serde_json::from_str(json).unwrap();
        model.validate().unwrap();
        assert_eq!(model.predict(&vec![vec![None]]).unwrap(), vec![-2.0]);
    }

    #[test]
    fn rejects_malformed_trees() {
        let mut model = stump(Objective::Regression);
        model.trees[0].nodes[0] = TreeNode::Split {
            feature: 7,
            threshold: 0.0,
            default_left: true,
            left: 1,
            right: 2,
        };
        assert!(model.validate().is_err());

        let mut cyclic = stump(Objective::Regression);
        cyclic.trees[0].nodes[0] = TreeNode::Split {
            feature: 0,
            threshold: 0.0,
            default_left: true,
            left: 0,
            right: 2,
        };
        assert!(cyclic.validate().is_err());
    }

    #[test]
    fn wrong_row_width_is_an_error() {
        let model = stump(Objective::Regression);
        assert!(model.predict(&vec![vec![Some(1.0)]]).is_err());
    }
}
