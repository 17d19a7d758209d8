//! Synthetic panels and small linear models for tests across the workspace.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use biota_core::{
    end_of_month, shift_months, BiotaError, BiotaResult, GridId, ObservationRow, Panel,
};
use biota_models::{LinearModel, Link, ModelArtifact, ModelRole, ModelSet};

use crate::bundle::ResourceBundle;

pub fn month_end(year: i32, month: u32) -> BiotaResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(end_of_month)
        .ok_or_else(|| BiotaError::Validation(format!("invalid month {year}-{month}")))
}

/// Deterministic observation for grid `grid` at month index `i`.
pub fn synthetic_row(grid: i64, date: NaiveDate, i: usize) -> ObservationRow {
    let step = i as f64;
    let season = (i % 12) as f64;
    let mut row = ObservationRow::new(GridId(grid), date);
    row.biodiversity.richness = Some(10.0 + step);
    row.biodiversity.abundance = Some(20.0 + 2.0 * step);
    row.biodiversity.shannon = Some(1.0 + 0.05 * step);
    row.has_richness = Some(true);
    row.dynamic.avg_pm25 = Some(30.0 + grid as f64);
    row.dynamic.temp_c = Some(10.0 + season);
    row.dynamic.precip_mm = Some(50.0 + step);
    row.dynamic.evi = Some(0.3 + 0.01 * season);
    row.statics.avg_height = Some(40.0);
    row.statics.avg_slope = Some(2.5);
    row.statics.avg_aspect = Some(180.0);
    row.statics.avg_relief = Some(12.0);
    row.statics.water_pct = Some(0.05);
    row.statics.tree_pct = Some(0.1 + 0.01 * (grid % 50) as f64);
    row.statics.crop_pct = Some(0.1);
    row.statics.built_area_pct = Some(0.3);
    row
}

/// `months` consecutive monthly rows per grid starting at `start`.
pub fn synthetic_panel(grids: &[i64], start: NaiveDate, months: usize) -> Panel {
    let rows = grids
        .iter()
        .flat_map(|&grid| {
            (0..months).map(move |i| synthetic_row(grid, shift_months(start, i as i32), i))
        })
        .collect();
    Panel::from_rows(rows, Vec::new()).0
}

pub fn linear_artifact(terms: &[(&str, f64)], intercept: f64, link: Link) -> ModelArtifact {
    ModelArtifact::Linear(LinearModel::new(
        terms.iter().map(|(name, _)| name.to_string()).collect(),
        terms.iter().map(|(_, coef)| *coef).collect(),
        intercept,
        link,
    ))
}

/// Four models exercising lags, rolling windows, interactions and the
/// presence probability. Richness is `richness_lag1 + 1`.
pub fn demo_artifacts() -> Vec<(ModelRole, ModelArtifact)> {
    vec![
        (
            ModelRole::PresenceClassifier,
            linear_artifact(&[("evi", 4.0), ("Tree_Pct", 1.0)], -1.0, Link::Logistic),
        ),
        (
            ModelRole::RichnessRegressor,
            linear_artifact(&[("richness_lag1", 1.0)], 1.0, Link::Identity),
        ),
        (
            ModelRole::AbundanceRegressor,
            linear_artifact(
                &[
                    ("abundance_lag1", 0.5),
                    ("temp_c_mean_3mo", 0.2),
                    ("presence_prob", 2.0),
                ],
                0.0,
                Link::Identity,
            ),
        ),
        (
            ModelRole::ShannonRegressor,
            linear_artifact(
                &[
                    ("shannon_lag1", 0.9),
                    ("Tree_Pct", 0.5),
                    ("inter_Tree_Pct_x_precip_mm", 0.001),
                    ("month_sin", 0.05),
                ],
                0.0,
                Link::Identity,
            ),
        ),
    ]
}

pub fn model_set(artifacts: Vec<(ModelRole, ModelArtifact)>) -> BiotaResult<ModelSet> {
    ModelSet::from_models(
        artifacts
            .into_iter()
            .map(|(role, artifact)| (role, artifact.into_model()))
            .collect(),
    )
}

/// Write `<role>.json` for each artifact into `dir`.
pub fn write_artifacts(dir: &Path, artifacts: &[(ModelRole, ModelArtifact)]) -> BiotaResult<()> {
    for (role, artifact) in artifacts {
        let json = serde_json::to_string_pretty(artifact)?;
        fs::write(dir.join(role.file_name()), json)?;
    }
    Ok(())
}

pub fn demo_bundle(grids: &[i64], start: NaiveDate, months: usize) -> BiotaResult<ResourceBundle> {
    ResourceBundle::new(
        synthetic_panel(grids, start, months),
        model_set(demo_artifacts())?,
    )
}
