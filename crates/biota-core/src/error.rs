//! Unified error types for the biota workspace
//!
//! [`BiotaError`] is the error returned by every domain operation (panel
//! handling, model inference, scenario validation, rollouts). Crates that sit
//! at the edges (file I/O, batch runs, the CLI) keep using `anyhow` and convert
//! at the boundary.
//!
//! # Example
//!
//! ```ignore
//! use biota_core::{BiotaError, BiotaResult};
//!
//! fn forecast(months: &[NaiveDate]) -> BiotaResult<()> {
//!     let bundle = service.bundle()?;
//!     RolloutController::new(&bundle, &settings).run(months)?;
//!     Ok(())
//! }
//! ```

use chrono::NaiveDate;
use thiserror::Error;

/// Unified error type for all biota operations.
#[derive(Error, Debug)]
pub enum BiotaError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Historical panel or models have not finished loading
    #[error("Service initializing: {0}")]
    NotReady(String),

    /// Malformed caller input
    #[error("Validation error: {0}")]
    Validation(String),

    /// One of the required pre-trained models is absent
    #[error("Missing model: {0}")]
    MissingModel(String),

    /// A model declares a feature column the feature rows do not carry
    #[error("Model '{model}' expects feature column '{column}', which is absent from the feature rows")]
    ModelFeatureMismatch { model: String, column: String },

    /// Model evaluation or artifact errors
    #[error("Model error: {0}")]
    Model(String),

    /// Panel content errors (empty panel, malformed rows)
    #[error("Data error: {0}")]
    Data(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rollout month failed; the whole invocation is aborted
    #[error("Rollout failed for {month} during {stage}: {source}")]
    Rollout {
        month: NaiveDate,
        stage: &'static str,
        #[source]
        source: Box<BiotaError>,
    },

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl BiotaError {
    /// Only an uninitialized service is worth retrying; everything else is
    /// deterministic for the same input.
    pub fn is_retryable(&self) -> bool {
        match self {
            BiotaError::NotReady(_) => true,
            BiotaError::Rollout { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Convenience type alias for Results using BiotaError.
pub type BiotaResult<T> = Result<T, BiotaError>;

impl From<anyhow::Error> for BiotaError {
    fn from(err: anyhow::Error) -> Self {
        BiotaError::Other(format!("{err:#}"))
    }
}

impl From<String> for BiotaError {
    fn from(s: String) -> Self {
        BiotaError::Other(s)
    }
}

impl From<&str> for BiotaError {
    fn from(s: &str) -> Self {
        BiotaError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for BiotaError {
    fn from(err: serde_json::Error) -> Self {
        BiotaError::Parse(err.to_string())
    }
}
