//! Temporal feature engine and panel I/O.
//!
//! - [`features`] recomputes lag / rolling / cyclical features over a panel slice
//! - [`io`] loads the historical panel and writes feature or result frames

pub mod features;
pub mod io;

pub use features::{
    compute_features, cyclical_month, FeatureConfig, FeatureRow, Interaction, LagMode,
    MAX_LOOKBACK_MONTHS,
};
pub use io::{
    features_to_frame, load_panel, panel_from_frame, read_frame, staged_output_path,
    write_frame_staged, write_partitioned, PanelLoad,
};
