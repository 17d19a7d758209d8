//! The per-batch record of which scenarios ran and where their forecasts went.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::job::{BatchJobRecord, JobStatus};

/// Task label stamped on every scenario batch manifest.
pub const SCENARIO_ROLLOUT_TASK: &str = "scenario-rollout";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchManifest {
    pub created_at: DateTime<Utc>,
    pub task: String,
    pub num_jobs: usize,
    pub success: usize,
    pub failure: usize,
    pub jobs: Vec<BatchJobRecord>,
}

impl BatchManifest {
    /// Summarize finished scenario jobs; counts are derived from the records.
    pub fn from_records(jobs: Vec<BatchJobRecord>) -> Self {
        let success = jobs.iter().filter(|job| job.status == JobStatus::Ok).count();
        Self {
            created_at: Utc::now(),
            task: SCENARIO_ROLLOUT_TASK.to_string(),
            num_jobs: jobs.len(),
            success,
            failure: jobs.len() - success,
            jobs,
        }
    }

    pub fn scenario(&self, scenario_id: &str) -> Option<&BatchJobRecord> {
        self.jobs.iter().find(|job| job.scenario_id == scenario_id)
    }

    pub fn failed(&self) -> impl Iterator<Item = &BatchJobRecord> {
        self.jobs.iter().filter(|job| job.status == JobStatus::Error)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating manifest directory '{}'", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing batch manifest")?;
        fs::write(path, json)
            .with_context(|| format!("writing batch manifest '{}'", path.display()))
    }

    /// Read a scenario batch manifest back, refusing other tasks and
    /// summaries that disagree with their job list.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading batch manifest '{}'", path.display()))?;
        let manifest: Self = serde_json::from_str(&json)
            .with_context(|| format!("parsing batch manifest '{}'", path.display()))?;
        if manifest.task != SCENARIO_ROLLOUT_TASK {
            bail!(
                "'{}' records task '{}', not a scenario rollout",
                path.display(),
                manifest.task
            );
        }
        let failed = manifest.failed().count();
        if manifest.num_jobs != manifest.jobs.len()
            || manifest.failure != failed
            || manifest.success + failed != manifest.jobs.len()
        {
            bail!(
                "'{}' summary ({} jobs, {} ok, {} failed) does not match its {} job records",
                path.display(),
                manifest.num_jobs,
                manifest.success,
                manifest.failure,
                manifest.jobs.len()
            );
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(scenario_id: &str, status: JobStatus) -> BatchJobRecord {
        BatchJobRecord {
            job_id: format!("scenario:{scenario_id}"),
            scenario_id: scenario_id.into(),
            target_months: vec!["2025-01-31".into()],
            status,
            error: (status == JobStatus::Error)
                .then(|| "Validation error: scenario requires at least one grid id".into()),
            grids: if status == JobStatus::Ok { 3 } else { 0 },
            output: format!("out/{scenario_id}/forecast.json"),
        }
    }

    #[test]
    fn counts_follow_job_outcomes() {
        let manifest = BatchManifest::from_records(vec![
            record("baseline", JobStatus::Ok),
            record("drought", JobStatus::Error),
            record("greening", JobStatus::Ok),
        ]);
        assert_eq!(manifest.task, SCENARIO_ROLLOUT_TASK);
        assert_eq!((manifest.num_jobs, manifest.success, manifest.failure), (3, 2, 1));
        let failed: Vec<_> = manifest.failed().map(|job| job.scenario_id.as_str()).collect();
        assert_eq!(failed, vec!["drought"]);
        assert_eq!(manifest.scenario("greening").map(|job| job.grids), Some(3));
        assert!(manifest.scenario("missing").is_none());
    }

    #[test]
    fn written_manifest_loads_with_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("batch_manifest.json");
        BatchManifest::from_records(vec![record("drought", JobStatus::Error)])
            .write(&path)
            .unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"status\": \"error\""), "{raw}");

        let loaded = BatchManifest::load(&path).unwrap();
        let drought = loaded.scenario("drought").unwrap();
        assert!(drought.error.as_deref().unwrap().contains("at least one grid id"));
    }

    #[test]
    fn foreign_or_inconsistent_manifests_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch_manifest.json");

        let mut other_task = BatchManifest::from_records(vec![record("a", JobStatus::Ok)]);
        other_task.task = "grid-sweep".into();
        other_task.write(&path).unwrap();
        let err = BatchManifest::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("task 'grid-sweep'"));

        let mut tampered = BatchManifest::from_records(vec![
            record("a", JobStatus::Ok),
            record("b", JobStatus::Error),
        ]);
        tampered.success = 2;
        tampered.failure = 0;
        tampered.write(&path).unwrap();
        let err = BatchManifest::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("does not match its 2 job records"));
    }
}
