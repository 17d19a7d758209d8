use biota_cli::manifest::{record_manifest, ManifestTelemetry, Param};
use std::{env, path::Path, time::Instant};

const TELEMETRY_ENV_KEYS: &[&str] = &[
    "BIOTA_ENV",
    "BIOTA_RELEASE_VERSION",
    "GITHUB_RUN_ID",
    "GITHUB_WORKFLOW",
    "GITHUB_SHA",
];

fn collect_telemetry_env() -> Vec<Param> {
    TELEMETRY_ENV_KEYS
        .iter()
        .filter_map(|key| {
            env::var(key).ok().map(|value| Param {
                name: key.to_string(),
                value,
            })
        })
        .collect()
}

fn correlation_id() -> Option<String> {
    env::var("BIOTA_CORRELATION_ID")
        .or_else(|_| env::var("GITHUB_RUN_ID"))
        .ok()
}

/// Record a run manifest with its outcome and wall time. Manifest failures
/// are reported but never change the command's result.
pub fn record_run_timed(
    out: &Path,
    command: &str,
    params: &[(&str, &str)],
    start: Instant,
    result: &anyhow::Result<()>,
) {
    let status = if result.is_ok() { "success" } else { "failure" };
    let telemetry = ManifestTelemetry {
        status: status.to_string(),
        duration_ms: Some(start.elapsed().as_millis()),
        env: collect_telemetry_env(),
        correlation_id: correlation_id(),
    };
    if let Err(err) = record_manifest(out, command, params, telemetry) {
        eprintln!("Failed to record run manifest: {err}");
    }
}
