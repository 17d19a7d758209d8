//! Month-by-month forecast rollout.
//!
//! A rollout is a fold over the ascending target months. The accumulator,
//! [`RolloutState`], carries the working history: a private copy of the
//! panel cut off before the first target month, to which every month's
//! predictions are appended so the next month's lag and rolling features
//! are computed from them. Each month runs the same sub-stages; a failure
//! in any of them aborts the whole rollout and names the stage.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use biota_core::{end_of_month, BiotaError, BiotaResult, GridId, ObservationRow, Panel};
use biota_models::{EnsemblePrediction, EnsembleRunner};
use biota_scenarios::ScenarioOverrides;
use biota_ts::{compute_features, FeatureConfig, FeatureRow};

use crate::baseline::{BaselineSynthesizer, DynamicBaselinePolicy};
use crate::bundle::ResourceBundle;
use crate::composite::CompositeWeights;
use crate::result::{ContextFeatures, PredictedMetrics, PredictionResult, RolloutOutput};

pub mod stage {
    pub const SYNTH_BASELINE: &str = "synth_baseline";
    pub const ASSEMBLE_WINDOW: &str = "assemble_window";
    pub const RECOMPUTE_FEATURES: &str = "recompute_features";
    pub const PREDICT: &str = "predict";
    pub const POSTPROCESS: &str = "postprocess";
    pub const APPEND_HISTORY: &str = "append_history";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloutSettings {
    pub features: FeatureConfig,
    pub baseline_policy: DynamicBaselinePolicy,
    pub composite: CompositeWeights,
    /// History rows per grid that feed each month's feature recomputation.
    pub trailing_window: usize,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            baseline_policy: DynamicBaselinePolicy::default(),
            composite: CompositeWeights::default(),
            trailing_window: 12,
        }
    }
}

impl RolloutSettings {
    pub fn validate(&self) -> BiotaResult<()> {
        self.features.validate()?;
        if self.trailing_window == 0 {
            return Err(BiotaError::Config(
                "trailing_window must be at least 1".into(),
            ));
        }
        if self.trailing_window < self.features.max_lookback() {
            warn!(
                trailing_window = self.trailing_window,
                lookback = self.features.max_lookback(),
                "trailing window is shorter than the longest lag; those features will be missing"
            );
        }
        Ok(())
    }
}

/// Which grids a rollout computes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridScope {
    All,
    Only(BTreeSet<GridId>),
}

/// Accumulator threaded through the monthly fold.
#[derive(Debug, Clone)]
pub struct RolloutState {
    pub working: Panel,
    pub results: RolloutOutput,
}

pub struct RolloutController<'a> {
    bundle: &'a ResourceBundle,
    settings: &'a RolloutSettings,
    baseline: BaselineSynthesizer,
}

impl<'a> RolloutController<'a> {
    pub fn new(bundle: &'a ResourceBundle, settings: &'a RolloutSettings) -> Self {
        Self {
            bundle,
            settings,
            baseline: BaselineSynthesizer::new(settings.baseline_policy),
        }
    }

    /// Forecast every grid of the panel for `months`.
    pub fn run(&self, months: &[NaiveDate]) -> BiotaResult<RolloutOutput> {
        self.execute(months, None, &GridScope::All)
    }

    /// Forecast `grid_ids` with `modifications` written over their baseline
    /// rows. Only those grids are computed and returned.
    pub fn run_scenario(
        &self,
        grid_ids: &[GridId],
        months: &[NaiveDate],
        modifications: &BTreeMap<String, f64>,
    ) -> BiotaResult<RolloutOutput> {
        let overrides =
            ScenarioOverrides::new(grid_ids, modifications, self.bundle.panel().extra_columns())?;
        let scope = GridScope::Only(overrides.grid_ids().clone());
        self.execute(months, Some(&overrides), &scope)
    }

    pub fn execute(
        &self,
        months: &[NaiveDate],
        overrides: Option<&ScenarioOverrides>,
        scope: &GridScope,
    ) -> BiotaResult<RolloutOutput> {
        self.settings.validate()?;
        let mut months: Vec<NaiveDate> = months.iter().copied().map(end_of_month).collect();
        months.sort();
        months.dedup();
        let (Some(&first), Some(&last)) = (months.first(), months.last()) else {
            return Ok(RolloutOutput::new());
        };

        info!(
            months = months.len(),
            first = %first,
            last = %last,
            scenario = overrides.is_some(),
            "starting rollout"
        );
        let state = self.initial_state(first, scope);
        let state = months
            .iter()
            .try_fold(state, |state, &month| self.step(state, month, overrides))?;
        info!(grids = state.results.len(), "rollout complete");
        Ok(state.results)
    }

    /// Working history for a rollout whose first target month is `first`.
    pub fn initial_state(&self, first: NaiveDate, scope: &GridScope) -> RolloutState {
        let panel = self.bundle.panel();
        let working = match scope {
            GridScope::All => panel.truncated_before(first),
            GridScope::Only(grids) => panel.slice(Some(grids), None, None).truncated_before(first),
        };

        let requested = match scope {
            GridScope::All => panel.grid_ids(),
            GridScope::Only(grids) => grids.clone(),
        };
        let usable = working.grid_ids();
        let skipped = requested.difference(&usable).count();
        if skipped > 0 {
            warn!(
                grids = skipped,
                before = %first,
                "grids have no history before the first target month; they are left out"
            );
        }

        RolloutState {
            working,
            results: RolloutOutput::new(),
        }
    }

    /// Forecast one month and fold the predictions into `state`.
    pub fn step(
        &self,
        mut state: RolloutState,
        month: NaiveDate,
        overrides: Option<&ScenarioOverrides>,
    ) -> BiotaResult<RolloutState> {
        let month = end_of_month(month);
        info!(month = %month, "forecasting month");

        let baseline = self
            .synth_baseline(&state.working, month, overrides)
            .map_err(|err| rollout_error(month, stage::SYNTH_BASELINE, err))?;
        debug!(stage = stage::SYNTH_BASELINE, rows = baseline.len());
        if baseline.is_empty() {
            warn!(month = %month, "no grid has history before this month");
            return Ok(state);
        }
        let expected = baseline.len();

        let window = self
            .assemble_window(&state.working, baseline, month)
            .map_err(|err| rollout_error(month, stage::ASSEMBLE_WINDOW, err))?;
        debug!(stage = stage::ASSEMBLE_WINDOW, rows = window.len());

        let mut feature_rows = self
            .recompute_features(&window, month, expected)
            .map_err(|err| rollout_error(month, stage::RECOMPUTE_FEATURES, err))?;
        debug!(stage = stage::RECOMPUTE_FEATURES, rows = feature_rows.len());

        let predictions = EnsembleRunner::new(self.bundle.models())
            .run(&mut feature_rows)
            .map_err(|err| rollout_error(month, stage::PREDICT, err))?;
        debug!(stage = stage::PREDICT, rows = predictions.len());

        let (results, predicted_rows) = self
            .postprocess(feature_rows, &predictions, month)
            .map_err(|err| rollout_error(month, stage::POSTPROCESS, err))?;
        debug!(stage = stage::POSTPROCESS, rows = results.len());

        state
            .working
            .append(predicted_rows)
            .map_err(|err| rollout_error(month, stage::APPEND_HISTORY, err))?;
        for (grid_id, result) in results {
            state.results.entry(grid_id).or_default().push(result);
        }
        debug!(stage = stage::APPEND_HISTORY, history = state.working.len());

        Ok(state)
    }

    fn synth_baseline(
        &self,
        working: &Panel,
        month: NaiveDate,
        overrides: Option<&ScenarioOverrides>,
    ) -> BiotaResult<Vec<ObservationRow>> {
        if working
            .time_range()
            .is_some_and(|(_, latest)| latest >= month)
        {
            return Err(BiotaError::Data(format!(
                "working history already reaches {month}"
            )));
        }
        let mut rows = self.baseline.synthesize(working, month);
        if let Some(overrides) = overrides {
            overrides.apply(&mut rows);
        }
        Ok(rows)
    }

    /// Trailing history of every baselined grid followed by its baseline row.
    fn assemble_window(
        &self,
        working: &Panel,
        baseline: Vec<ObservationRow>,
        month: NaiveDate,
    ) -> BiotaResult<Vec<ObservationRow>> {
        let mut window =
            Vec::with_capacity(baseline.len() * (self.settings.trailing_window + 1));
        for row in baseline {
            if row.timestamp != month {
                return Err(BiotaError::Data(format!(
                    "baseline row for grid {} is dated {}",
                    row.grid_id, row.timestamp
                )));
            }
            window.extend_from_slice(working.trailing_window(
                row.grid_id,
                month,
                self.settings.trailing_window,
            ));
            window.push(row);
        }
        Ok(window)
    }

    fn recompute_features(
        &self,
        window: &[ObservationRow],
        month: NaiveDate,
        expected: usize,
    ) -> BiotaResult<Vec<FeatureRow>> {
        let rows: Vec<FeatureRow> = compute_features(window, &self.settings.features)
            .into_iter()
            .filter(|row| row.timestamp() == month)
            .collect();
        if rows.len() != expected {
            return Err(BiotaError::Data(format!(
                "expected {expected} feature rows for {month}, found {}",
                rows.len()
            )));
        }
        let (kept, empty): (Vec<FeatureRow>, Vec<FeatureRow>) =
            rows.into_iter().partition(|row| !row.is_entirely_null());
        if !empty.is_empty() {
            warn!(
                month = %month,
                grids = empty.len(),
                "dropping entirely empty feature rows"
            );
        }
        Ok(kept)
    }

    /// Build the result records and the rows appended to the working history.
    fn postprocess(
        &self,
        rows: Vec<FeatureRow>,
        predictions: &[EnsemblePrediction],
        month: NaiveDate,
    ) -> BiotaResult<(Vec<(GridId, PredictionResult)>, Vec<ObservationRow>)> {
        if rows.len() != predictions.len() {
            return Err(BiotaError::Model(format!(
                "{} predictions for {} feature rows",
                predictions.len(),
                rows.len()
            )));
        }
        let mut results = Vec::with_capacity(rows.len());
        let mut appended = Vec::with_capacity(rows.len());
        for (row, prediction) in rows.into_iter().zip(predictions) {
            let composite = self.settings.composite.index(
                prediction.richness,
                prediction.abundance,
                prediction.shannon,
            );
            if !composite.is_finite() {
                return Err(BiotaError::Model(format!(
                    "composite index for grid {} is not finite",
                    row.observation.grid_id
                )));
            }

            let mut observation = row.observation;
            results.push((
                observation.grid_id,
                PredictionResult {
                    date: month,
                    predictions: PredictedMetrics {
                        richness: prediction.richness,
                        abundance: prediction.abundance,
                        shannon: prediction.shannon,
                        composite_index: composite,
                    },
                    has_richness: prediction.has_richness,
                    presence_probability: prediction.presence_probability,
                    context_features: ContextFeatures::from_row(
                        &observation,
                        prediction.presence_probability,
                    ),
                },
            ));

            observation.biodiversity.richness = Some(prediction.richness);
            observation.biodiversity.abundance = Some(prediction.abundance);
            observation.biodiversity.shannon = Some(prediction.shannon);
            observation.has_richness = Some(prediction.has_richness);
            appended.push(observation);
        }
        Ok((results, appended))
    }
}

fn rollout_error(month: NaiveDate, stage: &'static str, source: BiotaError) -> BiotaError {
    BiotaError::Rollout {
        month,
        stage,
        source: Box::new(source),
    }
}
