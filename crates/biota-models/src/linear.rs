//! Linear and logistic models.

use biota_core::{BiotaError, BiotaResult};
use serde::{Deserialize, Serialize};

use crate::model::{check_width, sigmoid, FeatureMatrix, Model};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Link {
    #[default]
    Identity,
    Logistic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
    #[serde(default)]
    pub link: Link,
}

impl LinearModel {
    pub fn new(feature_names: Vec<String>, coefficients: Vec<f64>, intercept: f64, link: Link) -> Self {
        Self {
            feature_names,
            coefficients,
            intercept,
            link,
        }
    }

    /// Missing inputs contribute nothing to the linear term.
    fn linear_terms(&self, rows: &FeatureMatrix) -> BiotaResult<Vec<f64>> {
        check_width(rows, self.feature_names.len())?;
        Ok(rows
            .iter()
            .map(|row| {
                self.intercept
                    + row
                        .iter()
                        .zip(&self.coefficients)
                        .filter_map(|(value, coef)| value.filter(|v| !v.is_nan()).map(|v| v * coef))
                        .sum::<f64>()
            })
            .collect())
    }
}

impl Model for LinearModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, rows: &FeatureMatrix) -> BiotaResult<Vec<f64>> {
        let terms = self.linear_terms(rows)?;
        Ok(match self.link {
            Link::Identity => terms,
            Link::Logistic => terms
                .into_iter()
                .map(|z| if sigmoid(z) >= 0.5 { 1.0 } else { 0.0 })
                .collect(),
        })
    }

    fn predict_proba(&self, rows: &FeatureMatrix) -> BiotaResult<Vec<[f64; 2]>> {
        if self.link != Link::Logistic {
            return Err(BiotaError::Model(
                "predict_proba requires a logistic link".into(),
            ));
        }
        Ok(self
            .linear_terms(rows)?
            .into_iter()
            .map(|z| {
                let p = sigmoid(z);
                [1.0 - p, p]
            })
            .collect())
    }

    fn is_classifier(&self) -> bool {
        self.link == Link::Logistic
    }

    fn validate(&self) -> BiotaResult<()> {
        if self.coefficients.len() != self.feature_names.len() {
            return Err(BiotaError::Model(format!(
                "linear model has {} coefficients for {} features",
                self.coefficients.len(),
                self.feature_names.len()
            )));
        }
        if let Some(bad) = self.coefficients.iter().position(|c| !c.is_finite()) {
            return Err(BiotaError::Model(format!(
                "coefficient for '{}' is not finite",
                self.feature_names[bad]
            )));
        }
        Ok(())
    }
}
