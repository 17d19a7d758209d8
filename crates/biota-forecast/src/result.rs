//! Rollout output records.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use biota_core::{GridId, ObservationRow};

/// Per-grid prediction history, ascending by month. Grids without any
/// result are absent.
pub type RolloutOutput = BTreeMap<GridId, Vec<PredictionResult>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub date: NaiveDate,
    pub predictions: PredictedMetrics,
    pub has_richness: bool,
    pub presence_probability: f64,
    pub context_features: ContextFeatures,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictedMetrics {
    pub richness: f64,
    pub abundance: f64,
    pub shannon: f64,
    pub composite_index: f64,
}

/// Inputs the prediction was made from, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFeatures {
    pub presence_prob: f64,
    pub avg_pm25: Option<f64>,
    pub temp_c: Option<f64>,
    pub precip_mm: Option<f64>,
    pub evi: Option<f64>,
    #[serde(rename = "Water_Pct")]
    pub water_pct: Option<f64>,
    #[serde(rename = "Tree_Pct")]
    pub tree_pct: Option<f64>,
    #[serde(rename = "Crop_Pct")]
    pub crop_pct: Option<f64>,
    #[serde(rename = "BuiltArea_")]
    pub built_area_pct: Option<f64>,
}

impl ContextFeatures {
    pub fn from_row(row: &ObservationRow, presence_prob: f64) -> Self {
        Self {
            presence_prob,
            avg_pm25: row.dynamic.avg_pm25,
            temp_c: row.dynamic.temp_c,
            precip_mm: row.dynamic.precip_mm,
            evi: row.dynamic.evi,
            water_pct: row.statics.water_pct,
            tree_pct: row.statics.tree_pct,
            crop_pct: row.statics.crop_pct,
            built_area_pct: row.statics.built_area_pct,
        }
    }
}
