//! Runs the four models in dependency order over one month's feature rows.

use biota_core::{BiotaError, BiotaResult};
use biota_ts::FeatureRow;
use tracing::debug;

use crate::model::{project, ModelRole};
use crate::registry::ModelSet;

/// Post-processed ensemble output for one feature row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnsemblePrediction {
    pub richness: f64,
    pub abundance: f64,
    pub shannon: f64,
    pub has_richness: bool,
    pub presence_probability: f64,
}

pub struct EnsembleRunner<'a> {
    models: &'a ModelSet,
}

impl<'a> EnsembleRunner<'a> {
    pub fn new(models: &'a ModelSet) -> Self {
        Self { models }
    }

    /// Predict every row in one batch per model.
    ///
    /// The classifier runs first and its positive-class probability is
    /// written to each row's `presence_prob` before the regressors see it.
    /// Regressor outputs are clamped at zero, and a zero richness forces
    /// `has_richness` off.
    pub fn run(&self, rows: &mut [FeatureRow]) -> BiotaResult<Vec<EnsemblePrediction>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let classifier = self.models.get(ModelRole::PresenceClassifier);
        let inputs = project(
            rows,
            classifier.feature_names(),
            ModelRole::PresenceClassifier,
        )?;
        let proba = classifier.predict_proba(&inputs)?;
        let classes = classifier.predict(&inputs)?;
        check_len(ModelRole::PresenceClassifier, proba.len(), rows.len())?;
        check_len(ModelRole::PresenceClassifier, classes.len(), rows.len())?;
        for (row, p) in rows.iter_mut().zip(&proba) {
            row.presence_prob = Some(p[1]);
        }

        let richness = self.regress(ModelRole::RichnessRegressor, rows)?;
        let abundance = self.regress(ModelRole::AbundanceRegressor, rows)?;
        let shannon = self.regress(ModelRole::ShannonRegressor, rows)?;

        debug!(rows = rows.len(), "ensemble batch complete");

        Ok((0..rows.len())
            .map(|i| EnsemblePrediction {
                richness: richness[i],
                abundance: abundance[i],
                shannon: shannon[i],
                has_richness: classes[i] >= 0.5 && richness[i] != 0.0,
                presence_probability: proba[i][1],
            })
            .collect())
    }

    fn regress(&self, role: ModelRole, rows: &[FeatureRow]) -> BiotaResult<Vec<f64>> {
        let model = self.models.get(role);
        let inputs = project(rows, model.feature_names(), role)?;
        let raw = model.predict(&inputs)?;
        check_len(role, raw.len(), rows.len())?;
        Ok(raw.into_iter().map(clamp_non_negative).collect())
    }
}

/// `max(0, x)`; a NaN prediction is treated as zero.
pub fn clamp_non_negative(value: f64) -> f64 {
    if value > 0.0 {
        value
    } else {
        0.0
    }
}

fn check_len(role: ModelRole, got: usize, expected: usize) -> BiotaResult<()> {
    if got == expected {
        Ok(())
    } else {
        Err(BiotaError::Model(format!(
            "{role} returned {got} predictions for {expected} rows"
        )))
    }
}
