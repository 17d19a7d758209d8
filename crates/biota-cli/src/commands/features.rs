use std::time::Instant;

use anyhow::Result;
use biota_cli::cli::{FeaturesArgs, LagModeArg};
use biota_cli::config::BiotaConfig;
use biota_ts::{compute_features, features_to_frame, load_panel, write_frame_staged, LagMode};
use tracing::info;

use crate::commands::telemetry::record_run_timed;
use crate::commands::util::parse_partitions;

pub fn handle(args: &FeaturesArgs, config: &BiotaConfig) -> Result<()> {
    let start = Instant::now();
    let result = run(args, config);
    let panel = args.panel.display().to_string();
    let partitions = args.out_partitions.clone().unwrap_or_default();
    record_run_timed(
        &args.out,
        "features",
        &[
            ("panel", panel.as_str()),
            ("out_partitions", partitions.as_str()),
        ],
        start,
        &result,
    );
    result
}

fn run(args: &FeaturesArgs, config: &BiotaConfig) -> Result<()> {
    let mut features = config.features.clone();
    if let Some(mode) = args.lag_mode {
        features.lag_mode = match mode {
            LagModeArg::RowPosition => LagMode::RowPosition,
            LagModeArg::Calendar => LagMode::Calendar,
        };
    }
    features.validate()?;

    let load = load_panel(&args.panel)?;
    let rows = compute_features(load.panel.rows(), &features);
    let mut df = features_to_frame(&rows, &features)?;
    let partitions = parse_partitions(args.out_partitions.as_ref());
    write_frame_staged(&mut df, &args.out, "features", &partitions)?;
    info!(
        rows = rows.len(),
        "wrote temporal features to {}",
        args.out.display()
    );
    println!(
        "Features for {} rows -> {}",
        rows.len(),
        args.out.display()
    );
    Ok(())
}
