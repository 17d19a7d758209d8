use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use biota_batch::write_forecast;
use biota_cli::cli::ForecastCommands;
use biota_cli::config::BiotaConfig;
use biota_core::GRID_ID_COLUMN;
use biota_forecast::{PredictionResult, ResourceBundle, RolloutController, RolloutOutput};
use biota_ts::write_frame_staged;
use polars::prelude::*;
use tracing::info;

use crate::commands::telemetry::record_run_timed;
use crate::commands::util::{parse_assignments, parse_grid_ids, parse_months};

pub fn handle(command: &ForecastCommands, config: &BiotaConfig) -> Result<()> {
    match command {
        ForecastCommands::Rollout {
            panel,
            models,
            months,
            out,
        } => {
            let start = Instant::now();
            let result = (|| -> Result<()> {
                let months = parse_months(months)?;
                let bundle = load_bundle(config, panel.as_deref(), models.as_deref())?;
                let settings = config.rollout_settings();
                let output = RolloutController::new(&bundle, &settings).run(&months)?;
                write_output(out, &output)
            })();
            record_run_timed(
                out,
                "forecast rollout",
                &[("months", months.as_str())],
                start,
                &result,
            );
            result
        }
        ForecastCommands::Scenario {
            panel,
            models,
            grid_ids,
            months,
            set,
            out,
        } => {
            let start = Instant::now();
            let result = (|| -> Result<()> {
                let months = parse_months(months)?;
                let grids = parse_grid_ids(grid_ids)?;
                let modifications = parse_assignments(set)?;
                let bundle = load_bundle(config, panel.as_deref(), models.as_deref())?;
                let settings = config.rollout_settings();
                let output = RolloutController::new(&bundle, &settings)
                    .run_scenario(&grids, &months, &modifications)?;
                write_output(out, &output)
            })();
            let overrides = set.join(",");
            record_run_timed(
                out,
                "forecast scenario",
                &[
                    ("grid_ids", grid_ids.as_str()),
                    ("months", months.as_str()),
                    ("set", overrides.as_str()),
                ],
                start,
                &result,
            );
            result
        }
    }
}

pub fn load_bundle(
    config: &BiotaConfig,
    panel: Option<&Path>,
    models: Option<&Path>,
) -> Result<ResourceBundle> {
    let panel_path = config.panel_path(panel)?;
    let models_dir = config.models_dir(models)?;
    ResourceBundle::load(&panel_path, &models_dir).with_context(|| {
        format!(
            "loading panel '{}' and models from '{}'",
            panel_path.display(),
            models_dir.display()
        )
    })
}

/// `.json` keeps the nested per-grid layout; `.csv` and `.parquet` get one
/// row per grid and month.
fn write_output(out: &Path, output: &RolloutOutput) -> Result<()> {
    let extension = out
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "json" => write_forecast(out, output)?,
        "csv" | "parquet" => {
            let mut df = predictions_to_frame(output)?;
            write_frame_staged(&mut df, out, "forecast", &[])?;
        }
        _ => {
            return Err(anyhow!(
                "unsupported output extension '{}'; use .json, .csv or .parquet",
                extension
            ))
        }
    }
    let predictions: usize = output.values().map(Vec::len).sum();
    info!(
        grids = output.len(),
        predictions,
        "wrote forecast to {}",
        out.display()
    );
    println!(
        "Forecast for {} grids ({} grid-months) -> {}",
        output.len(),
        predictions,
        out.display()
    );
    Ok(())
}

fn predictions_to_frame(output: &RolloutOutput) -> Result<DataFrame> {
    let records: Vec<(i64, &PredictionResult)> = output
        .iter()
        .flat_map(|(grid, results)| results.iter().map(move |result| (grid.value(), result)))
        .collect();
    let float = |name: &str, get: fn(&PredictionResult) -> f64| {
        Series::new(name, records.iter().map(|(_, r)| get(r)).collect::<Vec<_>>())
    };
    let optional = |name: &str, get: fn(&PredictionResult) -> Option<f64>| {
        Series::new(name, records.iter().map(|(_, r)| get(r)).collect::<Vec<_>>())
    };
    let columns = vec![
        Series::new(
            GRID_ID_COLUMN,
            records.iter().map(|(grid, _)| *grid).collect::<Vec<_>>(),
        ),
        Series::new(
            "date",
            records
                .iter()
                .map(|(_, r)| r.date.format("%Y-%m-%d").to_string())
                .collect::<Vec<_>>(),
        ),
        float("richness", |r| r.predictions.richness),
        float("abundance", |r| r.predictions.abundance),
        float("shannon", |r| r.predictions.shannon),
        float("composite_index", |r| r.predictions.composite_index),
        Series::new(
            "has_richness",
            records
                .iter()
                .map(|(_, r)| r.has_richness)
                .collect::<Vec<_>>(),
        ),
        float("presence_prob", |r| r.presence_probability),
        optional("avg_pm25", |r| r.context_features.avg_pm25),
        optional("temp_c", |r| r.context_features.temp_c),
        optional("precip_mm", |r| r.context_features.precip_mm),
        optional("evi", |r| r.context_features.evi),
        optional("Water_Pct", |r| r.context_features.water_pct),
        optional("Tree_Pct", |r| r.context_features.tree_pct),
        optional("Crop_Pct", |r| r.context_features.crop_pct),
        optional("BuiltArea_", |r| r.context_features.built_area_pct),
    ];
    DataFrame::new(columns).context("assembling prediction frame")
}
