use std::process;

use anyhow::Result;
use biota_cli::cli::{Cli, Commands};
use biota_cli::config::load_config;
use clap::Parser;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() {
    let cli = Cli::parse();
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(2);
        }
    };
    let level = match cli.log_level.map_or_else(|| config.log_level(), Ok) {
        Ok(level) => level,
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(2);
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let result: Result<()> = match &cli.command {
        Commands::Panel { command } => commands::panel::handle(command),
        Commands::Features(args) => commands::features::handle(args, &config),
        Commands::Forecast { command } => commands::forecast::handle(command, &config),
        Commands::Scenarios { command } => commands::scenarios::handle(command),
        Commands::Batch(args) => commands::batch::handle(args, &config),
    };

    if let Err(err) = result {
        error!("{err:#}");
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}
