use crate::job::{BatchJob, BatchJobRecord, JobStatus};
use crate::manifest::BatchManifest;
use anyhow::{anyhow, Context, Result};
use biota_forecast::{ResourceBundle, RolloutController, RolloutOutput, RolloutSettings};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const FORECAST_FILE: &str = "forecast.json";
pub const MANIFEST_FILE: &str = "batch_manifest.json";

pub struct BatchRunnerConfig {
    pub jobs: Vec<BatchJob>,
    pub output_root: PathBuf,
    pub settings: RolloutSettings,
    /// Worker threads; 0 uses every CPU.
    pub threads: usize,
}

pub struct BatchSummary {
    pub success: usize,
    pub failure: usize,
    pub manifest_path: PathBuf,
    pub jobs: Vec<BatchJobRecord>,
}

/// Run every job against one shared bundle. A failing job is recorded in
/// the manifest and does not stop the others.
pub fn run_batch(bundle: &ResourceBundle, config: &BatchRunnerConfig) -> Result<BatchSummary> {
    fs::create_dir_all(&config.output_root).with_context(|| {
        format!(
            "creating batch output root '{}'",
            config.output_root.display()
        )
    })?;

    let thread_count = if config.threads == 0 {
        num_cpus::get()
    } else {
        config.threads
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(thread_count)
        .build()
        .context("building Rayon thread pool for batch runs")?;
    info!(
        jobs = config.jobs.len(),
        threads = thread_count,
        "starting scenario batch"
    );

    let outputs = plan_outputs(&config.output_root, &config.jobs);
    let job_records: Vec<BatchJobRecord> = pool.install(|| {
        config
            .jobs
            .par_iter()
            .zip(outputs.par_iter())
            .map(|(job, output)| run_job(bundle, job, output, &config.settings))
            .collect()
    });

    let manifest = BatchManifest::from_records(job_records);
    let manifest_path = config.output_root.join(MANIFEST_FILE);
    manifest.write(&manifest_path)?;
    let (success, failure) = (manifest.success, manifest.failure);
    info!(success, failure, "scenario batch finished");
    Ok(BatchSummary {
        success,
        failure,
        manifest_path,
        jobs: manifest.jobs,
    })
}

fn run_job(
    bundle: &ResourceBundle,
    job: &BatchJob,
    output: &std::result::Result<PathBuf, String>,
    settings: &RolloutSettings,
) -> BatchJobRecord {
    let runner = || -> Result<usize> {
        let output_file = output.as_ref().map_err(|reason| anyhow!("{reason}"))?;
        let forecast = RolloutController::new(bundle, settings)
            .run_scenario(&job.grid_ids, &job.target_months, &job.modifications)
            .with_context(|| format!("running scenario '{}'", job.scenario_id))?;
        write_forecast(output_file, &forecast)?;
        Ok(forecast.len())
    };
    let (status, error, grids) = match runner() {
        Ok(grids) => (JobStatus::Ok, None, grids),
        Err(err) => {
            warn!(job = %job.job_id, "batch job failed: {err:#}");
            (JobStatus::Error, Some(format!("{err:#}")), 0)
        }
    };
    BatchJobRecord {
        job_id: job.job_id.clone(),
        scenario_id: job.scenario_id.clone(),
        target_months: job.target_months.iter().map(|m| m.to_string()).collect(),
        status,
        error,
        grids,
        output: output
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default(),
    }
}

/// Forecast path per job. Scenario ids that sanitize to the same directory
/// are all refused instead of overwriting each other.
fn plan_outputs(root: &Path, jobs: &[BatchJob]) -> Vec<std::result::Result<PathBuf, String>> {
    let names: Vec<String> = jobs
        .iter()
        .map(|job| sanitize_name(&job.scenario_id))
        .collect();
    let mut owners: HashMap<&str, Vec<&str>> = HashMap::new();
    for (name, job) in names.iter().zip(jobs) {
        owners
            .entry(name.as_str())
            .or_default()
            .push(job.scenario_id.as_str());
    }
    names
        .iter()
        .map(|name| match owners[name.as_str()].as_slice() {
            [_] => Ok(root.join(name).join(FORECAST_FILE)),
            ids => Err(format!(
                "scenario ids {} share the output directory '{name}'",
                ids.iter()
                    .map(|id| format!("'{id}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        })
        .collect()
}

/// Write a rollout result as pretty JSON keyed by `Grid_ID`.
pub fn write_forecast(path: &Path, output: &RolloutOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory '{}'", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(output).context("serializing forecast to JSON")?;
    fs::write(path, json).with_context(|| format!("writing forecast '{}'", path.display()))?;
    Ok(())
}

/// A single path component: separators become `_`, and names made only of
/// dots are prefixed so they cannot climb out of the output root.
fn sanitize_name(value: &str) -> String {
    let filtered: String = value
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    if filtered.is_empty() {
        "scenario".to_string()
    } else if filtered.chars().all(|c| c == '.') {
        format!("_{filtered}")
    } else {
        filtered
    }
}
