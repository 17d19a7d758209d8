use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "biota", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level (defaults to the config file, then info)
    #[arg(long, global = true)]
    pub log_level: Option<tracing::Level>,

    /// Configuration file (defaults to ~/.biota/config/biota.toml)
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Historical panel utilities
    Panel {
        #[command(subcommand)]
        command: PanelCommands,
    },
    /// Recompute temporal features over a panel
    Features(FeaturesArgs),
    /// Monthly biodiversity forecasts
    Forecast {
        #[command(subcommand)]
        command: ForecastCommands,
    },
    /// Scenario spec utilities
    Scenarios {
        #[command(subcommand)]
        command: ScenariosCommands,
    },
    /// Run every scenario of a spec in parallel
    Batch(BatchArgs),
}

#[derive(Subcommand, Debug)]
pub enum PanelCommands {
    /// Summarize a panel file
    Inspect {
        /// Panel file (CSV or Parquet)
        #[arg(value_hint = ValueHint::FilePath)]
        panel: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct FeaturesArgs {
    /// Panel file (CSV or Parquet)
    #[arg(value_hint = ValueHint::FilePath)]
    pub panel: PathBuf,
    /// Output file (.csv or .parquet)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub out: PathBuf,
    /// Override how lags reach back in time
    #[arg(long, value_enum)]
    pub lag_mode: Option<LagModeArg>,
    /// Comma-separated columns to partition the output by
    #[arg(long)]
    pub out_partitions: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LagModeArg {
    /// N rows back in the grid's history
    RowPosition,
    /// Exactly N calendar months back
    Calendar,
}

#[derive(Subcommand, Debug)]
pub enum ForecastCommands {
    /// Forecast every grid of the panel
    Rollout {
        /// Panel file (defaults to [data].panel)
        #[arg(long, value_hint = ValueHint::FilePath)]
        panel: Option<PathBuf>,
        /// Directory of model artifacts (defaults to [data].models_dir)
        #[arg(long, value_hint = ValueHint::DirPath)]
        models: Option<PathBuf>,
        /// Comma-separated target months (YYYY-MM or YYYY-MM-DD)
        #[arg(long)]
        months: String,
        /// Output file (.json, .csv or .parquet)
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: PathBuf,
    },
    /// Forecast selected grids with feature overrides
    Scenario {
        #[arg(long, value_hint = ValueHint::FilePath)]
        panel: Option<PathBuf>,
        #[arg(long, value_hint = ValueHint::DirPath)]
        models: Option<PathBuf>,
        /// Comma-separated grid ids
        #[arg(long)]
        grid_ids: String,
        #[arg(long)]
        months: String,
        /// Feature override, repeatable (e.g. --set Tree_Pct=0.6)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScenariosCommands {
    /// Validate a scenario spec
    Validate {
        #[arg(value_hint = ValueHint::FilePath)]
        spec: PathBuf,
    },
    /// List the resolved scenarios of a spec
    List {
        #[arg(value_hint = ValueHint::FilePath)]
        spec: PathBuf,
        #[arg(long, value_enum, default_value_t = ListFormat::Table)]
        format: ListFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListFormat {
    #[default]
    Table,
    Json,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Scenario spec (YAML or JSON)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub spec: PathBuf,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub panel: Option<PathBuf>,
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub models: Option<PathBuf>,
    /// Output directory (defaults to [data].results_dir)
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub out_dir: Option<PathBuf>,
    /// Worker threads; 0 uses every CPU
    #[arg(long, default_value_t = 0)]
    pub threads: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_scenario_overrides() {
        let cli = Cli::try_parse_from([
            "biota",
            "--log-level",
            "debug",
            "forecast",
            "scenario",
            "--grid-ids",
            "42,43",
            "--months",
            "2024-06",
            "--set",
            "Tree_Pct=0.6",
            "--set",
            "temp_c=31",
            "-o",
            "out.json",
        ])
        .unwrap();
        assert_eq!(cli.log_level, Some(tracing::Level::DEBUG));
        match cli.command {
            Commands::Forecast {
                command: ForecastCommands::Scenario { set, grid_ids, .. },
            } => {
                assert_eq!(set, vec!["Tree_Pct=0.6", "temp_c=31"]);
                assert_eq!(grid_ids, "42,43");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
