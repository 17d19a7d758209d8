pub mod cli;
pub mod config;
pub mod manifest;

pub use cli::{
    BatchArgs, Cli, Commands, FeaturesArgs, ForecastCommands, LagModeArg, ListFormat,
    PanelCommands, ScenariosCommands,
};
pub use config::{load_config, BiotaConfig};
