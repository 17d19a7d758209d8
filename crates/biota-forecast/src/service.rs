//! Load-once, serve-many entry point.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::OnceCell;

use biota_core::{BiotaError, BiotaResult, GridId};

use crate::bundle::ResourceBundle;
use crate::result::RolloutOutput;
use crate::rollout::{RolloutController, RolloutSettings};

/// Holds the [`ResourceBundle`] once it has been loaded.
///
/// Requests made before initialization fail with
/// [`BiotaError::NotReady`]. Each rollout works on its own copy of the
/// history, so any number of requests may run against one service.
#[derive(Debug, Default)]
pub struct ForecastService {
    bundle: OnceCell<Arc<ResourceBundle>>,
    settings: RolloutSettings,
}

impl ForecastService {
    pub fn new(settings: RolloutSettings) -> Self {
        Self {
            bundle: OnceCell::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &RolloutSettings {
        &self.settings
    }

    /// Install an already loaded bundle. Fails if one is installed.
    pub fn initialize(&self, bundle: ResourceBundle) -> BiotaResult<()> {
        self.bundle
            .set(Arc::new(bundle))
            .map_err(|_| BiotaError::Validation("forecast service is already initialized".into()))
    }

    /// Run `load` unless a bundle is already installed. Concurrent callers
    /// block until the first load finishes.
    pub fn initialize_with<F>(&self, load: F) -> BiotaResult<Arc<ResourceBundle>>
    where
        F: FnOnce() -> BiotaResult<ResourceBundle>,
    {
        self.bundle
            .get_or_try_init(|| load().map(Arc::new))
            .cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.bundle.get().is_some()
    }

    pub fn bundle(&self) -> BiotaResult<Arc<ResourceBundle>> {
        self.bundle.get().cloned().ok_or_else(|| {
            BiotaError::NotReady("historical panel and models are still loading".into())
        })
    }

    pub fn run_rollout(&self, target_months: &[NaiveDate]) -> BiotaResult<RolloutOutput> {
        let bundle = self.bundle()?;
        RolloutController::new(&bundle, &self.settings).run(target_months)
    }

    pub fn run_scenario_rollout(
        &self,
        grid_ids: &[GridId],
        target_months: &[NaiveDate],
        modifications: &BTreeMap<String, f64>,
    ) -> BiotaResult<RolloutOutput> {
        let bundle = self.bundle()?;
        RolloutController::new(&bundle, &self.settings).run_scenario(
            grid_ids,
            target_months,
            modifications,
        )
    }
}
