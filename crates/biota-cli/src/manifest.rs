use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize)]
pub struct ManifestEntry {
    pub run_id: String,
    pub command: String,
    pub version: String,
    pub timestamp: String,
    pub outputs: Vec<String>,
    pub params: Vec<Param>,
    #[serde(default)]
    pub telemetry: Option<ManifestTelemetry>,
}

#[derive(Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

#[derive(Serialize, Deserialize)]
pub struct ManifestTelemetry {
    pub status: String,
    pub duration_ms: Option<u128>,
    #[serde(default)]
    pub env: Vec<Param>,
    pub correlation_id: Option<String>,
}

/// Write `run-<uuid>.json` next to `output` and return its path.
pub fn record_manifest(
    output: &Path,
    command: &str,
    params: &[(&str, &str)],
    telemetry: ManifestTelemetry,
) -> Result<std::path::PathBuf> {
    let run_id = Uuid::new_v4().to_string();
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    fs::create_dir_all(&dir)?;
    let manifest = ManifestEntry {
        run_id: run_id.clone(),
        command: command.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        outputs: vec![output.display().to_string()],
        params: params
            .iter()
            .map(|(k, v)| Param {
                name: k.to_string(),
                value: v.to_string(),
            })
            .collect(),
        telemetry: Some(telemetry),
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    let path = dir.join(format!("run-{}.json", run_id));
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    println!("Recorded run manifest {}", path.display());
    Ok(path)
}

pub fn read_manifest(path: &Path) -> Result<ManifestEntry> {
    let json = fs::read_to_string(path)?;
    let manifest = serde_json::from_str(&json)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lands_next_to_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("forecast.json");
        let telemetry = ManifestTelemetry {
            status: "success".into(),
            duration_ms: Some(12),
            env: Vec::new(),
            correlation_id: None,
        };
        let path =
            record_manifest(&output, "forecast rollout", &[("months", "2024-06")], telemetry)
                .unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        let entry = read_manifest(&path).unwrap();
        assert_eq!(entry.command, "forecast rollout");
        assert_eq!(entry.outputs, vec![output.display().to_string()]);
        assert_eq!(entry.params[0].value, "2024-06");
        assert_eq!(entry.telemetry.unwrap().status, "success");
    }
}
