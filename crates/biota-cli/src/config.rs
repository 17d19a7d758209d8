//! Configuration management for the biota CLI
//! All configuration is centralized in ~/.biota/config/

use anyhow::{anyhow, Context, Result};
use biota_forecast::{CompositeWeights, DynamicBaselinePolicy, RolloutSettings};
use biota_ts::FeatureConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main biota configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BiotaConfig {
    /// Data locations
    #[serde(default)]
    pub data: DataConfig,
    /// Temporal feature definitions
    #[serde(default)]
    pub features: FeatureConfig,
    /// Rollout behavior
    #[serde(default)]
    pub rollout: RolloutConfig,
    /// Composite index weights
    #[serde(default)]
    pub composite: CompositeWeights,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Data directory paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Historical panel used when a command is not given `--panel`
    #[serde(default)]
    pub panel: Option<String>,
    /// Directory holding the four model artifacts
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    /// Store batch results here
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            panel: None,
            models_dir: default_models_dir(),
            results_dir: default_results_dir(),
        }
    }
}

fn default_models_dir() -> String {
    "~/.biota/models".to_string()
}

fn default_results_dir() -> String {
    "~/.biota/cache/results".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolloutConfig {
    /// Months of history kept per grid when recomputing features
    #[serde(default = "default_trailing_window")]
    pub trailing_window: usize,
    #[serde(default)]
    pub baseline_policy: DynamicBaselinePolicy,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            trailing_window: default_trailing_window(),
            baseline_policy: DynamicBaselinePolicy::default(),
        }
    }
}

fn default_trailing_window() -> usize {
    12
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl BiotaConfig {
    pub fn rollout_settings(&self) -> RolloutSettings {
        RolloutSettings {
            features: self.features.clone(),
            baseline_policy: self.rollout.baseline_policy,
            composite: self.composite,
            trailing_window: self.rollout.trailing_window,
        }
    }

    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .parse()
            .map_err(|_| anyhow!("invalid log level '{}' in config", self.logging.level))
    }

    /// `explicit`, falling back to `[data].panel`.
    pub fn panel_path(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        match (explicit, self.data.panel.as_deref()) {
            (Some(path), _) => Ok(path.to_path_buf()),
            (None, Some(configured)) => expand_home(configured),
            (None, None) => Err(anyhow!(
                "no panel given; pass --panel or set [data].panel in the config"
            )),
        }
    }

    pub fn models_dir(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => expand_home(&self.data.models_dir),
        }
    }

    pub fn results_dir(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => Ok(path.to_path_buf()),
            None => expand_home(&self.data.results_dir),
        }
    }
}

/// Root of the biota home directory (~/.biota)
pub fn biota_home() -> Result<PathBuf> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".biota"))
}

/// Location: ~/.biota/config/biota.toml
pub fn biota_config_path() -> Result<PathBuf> {
    Ok(biota_home()?.join("config").join("biota.toml"))
}

/// Load the configuration from `path`, or from ~/.biota/config/biota.toml.
/// A missing default file yields the defaults; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<BiotaConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let default_path = biota_config_path()?;
            if !default_path.exists() {
                return Ok(BiotaConfig::default());
            }
            default_path
        }
    };
    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("reading config '{}'", config_path.display()))?;
    let config: BiotaConfig = toml::from_str(&contents)
        .with_context(|| format!("parsing config '{}'", config_path.display()))?;
    config
        .rollout_settings()
        .validate()
        .with_context(|| format!("validating config '{}'", config_path.display()))?;
    config
        .log_level()
        .with_context(|| format!("validating config '{}'", config_path.display()))?;
    Ok(config)
}

fn expand_home(value: &str) -> Result<PathBuf> {
    match value.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir().context("could not determine home directory")?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biota_ts::LagMode;

    #[test]
    fn empty_file_yields_defaults() {
        let config: BiotaConfig = toml::from_str("").unwrap();
        assert_eq!(config.rollout.trailing_window, 12);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.composite, CompositeWeights::default());
        assert_eq!(config.rollout_settings(), RolloutSettings::default());
    }

    #[test]
    fn sections_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("biota.toml");
        std::fs::write(
            &path,
            r#"
[data]
panel = "/data/panel.parquet"

[features]
lag_mode = "calendar"

[rollout]
trailing_window = 24
baseline_policy = "prefer_last_year"

[composite]
abundance = 0.1

[logging]
level = "debug"
"#,
        )
        .unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(
            config.panel_path(None).unwrap(),
            PathBuf::from("/data/panel.parquet")
        );
        let settings = config.rollout_settings();
        assert_eq!(settings.features.lag_mode, LagMode::Calendar);
        assert_eq!(settings.trailing_window, 24);
        assert_eq!(
            settings.baseline_policy,
            DynamicBaselinePolicy::PreferLastYear
        );
        assert_eq!(settings.composite.abundance, 0.1);
        assert_eq!(settings.composite.shannon, 0.8);
        assert_eq!(config.log_level().unwrap(), tracing::Level::DEBUG);
    }

    #[test]
    fn zero_trailing_window_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("biota.toml");
        std::fs::write(&path, "[rollout]\ntrailing_window = 0\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("biota.toml");
        std::fs::write(&path, "[logging]\nlevel = \"chatty\"\n").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("invalid log level 'chatty'"));
    }

    #[test]
    fn explicit_paths_win_over_config() {
        let config = BiotaConfig::default();
        assert!(config.panel_path(None).is_err());
        assert_eq!(
            config.panel_path(Some(Path::new("p.csv"))).unwrap(),
            PathBuf::from("p.csv")
        );
        assert_eq!(
            config.models_dir(Some(Path::new("models"))).unwrap(),
            PathBuf::from("models")
        );
    }
}
