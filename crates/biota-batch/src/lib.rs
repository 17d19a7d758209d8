pub mod job;
pub mod manifest;
pub mod runner;

pub use job::{jobs_from_scenarios, BatchJob, BatchJobRecord, JobStatus};
pub use manifest::{BatchManifest, SCENARIO_ROLLOUT_TASK};
pub use runner::{
    run_batch, write_forecast, BatchRunnerConfig, BatchSummary, FORECAST_FILE, MANIFEST_FILE,
};
