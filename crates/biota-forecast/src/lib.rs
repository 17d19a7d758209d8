//! Baseline synthesis, rollout control and the forecast service.
//!
//! A [`ForecastService`] owns one immutable [`ResourceBundle`] (historical
//! panel plus models). Each request builds a [`RolloutController`] over it
//! and folds the requested months into a [`RolloutOutput`].

pub mod baseline;
pub mod bundle;
pub mod composite;
pub mod result;
pub mod rollout;
pub mod service;
pub mod test_utils;

pub use baseline::{BaselineSynthesizer, DynamicBaselinePolicy};
pub use bundle::ResourceBundle;
pub use composite::{composite_index, CompositeWeights};
pub use result::{ContextFeatures, PredictedMetrics, PredictionResult, RolloutOutput};
pub use rollout::{stage, GridScope, RolloutController, RolloutSettings, RolloutState};
pub use service::ForecastService;
