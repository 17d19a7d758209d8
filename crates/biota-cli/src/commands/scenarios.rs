use std::io::stdout;
use std::path::Path;

use anyhow::{Context, Result};
use biota_cli::cli::{ListFormat, ScenariosCommands};
use biota_scenarios::{load_spec_from_path, resolve_scenarios};

pub fn handle(command: &ScenariosCommands) -> Result<()> {
    match command {
        ScenariosCommands::Validate { spec } => validate(spec),
        ScenariosCommands::List { spec, format } => list(spec, *format),
    }
}

fn validate(spec: &Path) -> Result<()> {
    let set = load_spec_from_path(spec)?;
    let resolved = resolve_scenarios(&set)
        .with_context(|| format!("validating scenario spec '{}'", spec.display()))?;
    println!(
        "Scenario spec '{}' is valid ({} scenarios)",
        spec.display(),
        resolved.len()
    );
    Ok(())
}

fn list(spec: &Path, format: ListFormat) -> Result<()> {
    let set = load_spec_from_path(spec)?;
    let resolved = resolve_scenarios(&set)?;

    match format {
        ListFormat::Table => {
            println!(
                "{:<30} {:<8} {:<8} {}",
                "scenario_id", "grids", "months", "modifications"
            );
            for scenario in &resolved {
                let modifications = scenario
                    .modifications
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join(",");
                println!(
                    "{:<30} {:<8} {:<8} {}",
                    scenario.scenario_id,
                    scenario.grid_ids.len(),
                    scenario.target_months.len(),
                    modifications
                );
            }
        }
        ListFormat::Json => {
            serde_json::to_writer_pretty(stdout(), &resolved)
                .context("serializing scenarios to JSON")?;
            println!();
        }
    }
    Ok(())
}
