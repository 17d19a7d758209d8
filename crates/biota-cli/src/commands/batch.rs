use std::time::Instant;

use anyhow::{bail, Context, Result};
use biota_batch::{jobs_from_scenarios, run_batch, BatchRunnerConfig, MANIFEST_FILE};
use biota_cli::cli::BatchArgs;
use biota_cli::config::BiotaConfig;
use biota_scenarios::{load_spec_from_path, resolve_scenarios};

use crate::commands::forecast::load_bundle;
use crate::commands::telemetry::record_run_timed;

pub fn handle(args: &BatchArgs, config: &BiotaConfig) -> Result<()> {
    let out_dir = config.results_dir(args.out_dir.as_deref())?;
    let start = Instant::now();
    let result = (|| -> Result<()> {
        let set = load_spec_from_path(&args.spec)?;
        let scenarios = resolve_scenarios(&set)
            .with_context(|| format!("resolving scenario spec '{}'", args.spec.display()))?;
        let bundle = load_bundle(config, args.panel.as_deref(), args.models.as_deref())?;
        let runner = BatchRunnerConfig {
            jobs: jobs_from_scenarios(&scenarios),
            output_root: out_dir.clone(),
            settings: config.rollout_settings(),
            threads: args.threads,
        };
        let summary = run_batch(&bundle, &runner)?;
        println!(
            "Batch finished: {} ok, {} failed (manifest {})",
            summary.success,
            summary.failure,
            summary.manifest_path.display()
        );
        if summary.failure > 0 {
            bail!("{} of {} scenarios failed", summary.failure, summary.jobs.len());
        }
        Ok(())
    })();
    let spec = args.spec.display().to_string();
    let threads = args.threads.to_string();
    record_run_timed(
        &out_dir.join(MANIFEST_FILE),
        "batch",
        &[("spec", spec.as_str()), ("threads", threads.as_str())],
        start,
        &result,
    );
    result
}
