use biota_core::GridId;
use biota_scenarios::ResolvedScenario;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One scenario rollout within a batch.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub job_id: String,
    pub scenario_id: String,
    pub grid_ids: Vec<GridId>,
    pub target_months: Vec<NaiveDate>,
    pub modifications: BTreeMap<String, f64>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJobRecord {
    pub job_id: String,
    pub scenario_id: String,
    pub target_months: Vec<String>,
    pub status: JobStatus,
    pub error: Option<String>,
    /// Grids that produced at least one prediction.
    pub grids: usize,
    pub output: String,
}

pub fn jobs_from_scenarios(scenarios: &[ResolvedScenario]) -> Vec<BatchJob> {
    scenarios
        .iter()
        .map(|scenario| BatchJob {
            job_id: format!("scenario:{}", scenario.scenario_id),
            scenario_id: scenario.scenario_id.clone(),
            grid_ids: scenario.grid_ids.clone(),
            target_months: scenario.target_months.clone(),
            modifications: scenario.modifications.clone(),
            tags: scenario.tags.clone(),
        })
        .collect()
}
