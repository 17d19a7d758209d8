//! Temporal feature engine.
//!
//! Recomputes lag, rolling-window, cyclical and interaction features over a
//! panel slice. The computation is a pure function of the slice: rows are
//! normalized (sorted, de-duplicated keep-first), grouped per `Grid_ID`, and
//! each group is walked chronologically.
//!
//! In [`LagMode::RowPosition`] (the default) `var_lagN` is the value `N` rows
//! earlier in the grid's history, so a skipped month shifts what `lagN`
//! refers to. [`LagMode::Calendar`] looks up the row exactly `N` calendar
//! months back instead and yields a missing value when that month is absent.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use biota_core::{
    month::shift_months, normalize_rows, BiotaError, BiotaResult, ObservationRow, Variable,
    PRESENCE_PROB_COLUMN,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How lag and rolling windows reach back in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LagMode {
    /// N rows back within the grid's sorted history.
    #[default]
    RowPosition,
    /// Exactly N calendar months back.
    Calendar,
}

/// Product of two row-local variables, e.g. `inter_Tree_Pct_x_precip_mm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub left: Variable,
    pub right: Variable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub lag_variables: Vec<Variable>,
    pub lags: Vec<usize>,
    /// Variables that get trailing mean and standard deviation.
    pub rolling_variables: Vec<Variable>,
    /// Variables that get a trailing sum.
    pub sum_variables: Vec<Variable>,
    pub windows: Vec<usize>,
    pub lag_mode: LagMode,
    pub interactions: Vec<Interaction>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lag_variables: vec![
                Variable::Richness,
                Variable::Abundance,
                Variable::Shannon,
                Variable::AvgPm25,
                Variable::TempC,
                Variable::Evi,
                Variable::TreePct,
                Variable::WaterPct,
            ],
            lags: vec![1, 3, 6, 12],
            rolling_variables: vec![Variable::AvgPm25, Variable::TempC],
            sum_variables: vec![Variable::PrecipMm],
            windows: vec![3, 6],
            lag_mode: LagMode::RowPosition,
            interactions: vec![
                Interaction {
                    left: Variable::TreePct,
                    right: Variable::PrecipMm,
                },
                Interaction {
                    left: Variable::BuiltArea,
                    right: Variable::AvgPm25,
                },
            ],
        }
    }
}

/// Upper bound for lags and rolling windows (a century of monthly history).
pub const MAX_LOOKBACK_MONTHS: usize = 1200;

impl FeatureConfig {
    pub fn validate(&self) -> BiotaResult<()> {
        if self.lags.iter().any(|&lag| lag == 0) {
            return Err(BiotaError::Config("lags must be at least 1".into()));
        }
        if self.windows.iter().any(|&window| window == 0) {
            return Err(BiotaError::Config("rolling windows must be at least 1".into()));
        }
        if let Some(lag) = self.lags.iter().find(|&&lag| lag > MAX_LOOKBACK_MONTHS) {
            return Err(BiotaError::Config(format!(
                "lag {lag} exceeds the maximum of {MAX_LOOKBACK_MONTHS} months"
            )));
        }
        if let Some(window) = self.windows.iter().find(|&&w| w > MAX_LOOKBACK_MONTHS) {
            return Err(BiotaError::Config(format!(
                "rolling window {window} exceeds the maximum of {MAX_LOOKBACK_MONTHS} months"
            )));
        }
        Ok(())
    }

    /// Rows of history a target row needs for every feature to be defined.
    pub fn max_lookback(&self) -> usize {
        let lag = self.lags.iter().copied().max().unwrap_or(0);
        let window = self.windows.iter().copied().max().unwrap_or(1);
        lag.max(window.saturating_sub(1))
    }

    /// Names of every derived column, in export order.
    pub fn derived_columns(&self) -> Vec<String> {
        let mut names = Vec::new();
        for variable in &self.lag_variables {
            for &lag in &self.lags {
                names.push(lag_column(*variable, lag));
            }
        }
        for &window in &self.windows {
            for variable in &self.rolling_variables {
                names.push(mean_column(*variable, window));
                names.push(std_column(*variable, window));
            }
            for variable in &self.sum_variables {
                names.push(sum_column(*variable, window));
            }
        }
        for interaction in &self.interactions {
            names.push(interaction_column(interaction));
        }
        names
    }
}

pub fn lag_column(variable: Variable, lag: usize) -> String {
    format!("{}_lag{lag}", variable.name())
}

pub fn mean_column(variable: Variable, window: usize) -> String {
    format!("{}_mean_{window}mo", variable.name())
}

pub fn std_column(variable: Variable, window: usize) -> String {
    format!("{}_std_{window}mo", variable.name())
}

pub fn sum_column(variable: Variable, window: usize) -> String {
    format!("{}_sum_{window}mo", variable.name())
}

pub fn interaction_column(interaction: &Interaction) -> String {
    format!(
        "inter_{}_x_{}",
        interaction.left.name(),
        interaction.right.name()
    )
}

/// `(month_sin, month_cos)` for the calendar month of `date`.
pub fn cyclical_month(date: NaiveDate) -> (f64, f64) {
    let angle = 2.0 * PI * date.month0() as f64 / 12.0;
    (angle.sin(), angle.cos())
}

/// A panel row with its recomputed features attached.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Source row; `has_richness` is always cleared.
    pub observation: ObservationRow,
    pub month_sin: f64,
    pub month_cos: f64,
    pub derived: BTreeMap<String, Option<f64>>,
    /// Filled in by the presence classifier before the regressors run.
    pub presence_prob: Option<f64>,
}

impl FeatureRow {
    pub fn timestamp(&self) -> NaiveDate {
        self.observation.timestamp
    }

    /// Look up a model input column by name.
    ///
    /// Returns `None` when the column does not exist for this row and
    /// `Some(None)` when it exists but the value is missing.
    pub fn column(&self, name: &str) -> Option<Option<f64>> {
        match name {
            "month_sin" => return Some(Some(self.month_sin)),
            "month_cos" => return Some(Some(self.month_cos)),
            PRESENCE_PROB_COLUMN => return self.presence_prob.map(Some),
            _ => {}
        }
        if let Some(value) = self.derived.get(name) {
            return Some(*value);
        }
        self.observation.column(name)
    }

    /// True when every variable, extra and derived value is missing.
    pub fn is_entirely_null(&self) -> bool {
        Variable::ALL
            .iter()
            .all(|variable| self.observation.get(*variable).is_none())
            && self.observation.extras.values().all(Option::is_none)
            && self.derived.values().all(Option::is_none)
    }
}

/// Recompute temporal features for every row of `rows`.
///
/// The output is sorted by `(Grid_ID, timestamp)`; repeated keys are dropped
/// keep-first before anything is computed.
pub fn compute_features(rows: &[ObservationRow], config: &FeatureConfig) -> Vec<FeatureRow> {
    let mut rows = rows.to_vec();
    let report = normalize_rows(&mut rows);
    if report.duplicates_dropped > 0 {
        warn!(
            dropped = report.duplicates_dropped,
            "feature slice contained duplicate (Grid_ID, timestamp) rows"
        );
    }
    for row in &mut rows {
        row.has_richness = None;
    }

    let mut features = Vec::with_capacity(rows.len());
    let mut start = 0;
    while start < rows.len() {
        let grid_id = rows[start].grid_id;
        let len = rows[start..]
            .iter()
            .take_while(|row| row.grid_id == grid_id)
            .count();
        features.extend(compute_group(&rows[start..start + len], config));
        start += len;
    }
    features
}

fn compute_group(group: &[ObservationRow], config: &FeatureConfig) -> Vec<FeatureRow> {
    (0..group.len())
        .map(|idx| {
            let row = &group[idx];
            let mut derived = BTreeMap::new();

            for &variable in &config.lag_variables {
                for &lag in &config.lags {
                    derived.insert(
                        lag_column(variable, lag),
                        lagged_value(group, idx, variable, lag, config.lag_mode),
                    );
                }
            }

            for &window in &config.windows {
                for &variable in &config.rolling_variables {
                    let values = window_values(group, idx, variable, window, config.lag_mode);
                    let (mean, std) = match values {
                        Some(values) => {
                            let (mean, std) = mean_and_std(&values);
                            (Some(mean), Some(std))
                        }
                        None => (None, None),
                    };
                    derived.insert(mean_column(variable, window), mean);
                    derived.insert(std_column(variable, window), std);
                }
                for &variable in &config.sum_variables {
                    let sum = window_values(group, idx, variable, window, config.lag_mode)
                        .map(|values| values.iter().sum());
                    derived.insert(sum_column(variable, window), sum);
                }
            }

            for interaction in &config.interactions {
                let product = row
                    .get(interaction.left)
                    .zip(row.get(interaction.right))
                    .map(|(a, b)| a * b);
                derived.insert(interaction_column(interaction), product);
            }

            let (month_sin, month_cos) = cyclical_month(row.timestamp);
            FeatureRow {
                observation: row.clone(),
                month_sin,
                month_cos,
                derived,
                presence_prob: None,
            }
        })
        .collect()
}

fn lagged_value(
    group: &[ObservationRow],
    idx: usize,
    variable: Variable,
    lag: usize,
    mode: LagMode,
) -> Option<f64> {
    match mode {
        LagMode::RowPosition => idx.checked_sub(lag).and_then(|j| group[j].get(variable)),
        LagMode::Calendar => {
            let target = months_back(group[idx].timestamp, lag)?;
            find_month(&group[..idx], target).and_then(|row| row.get(variable))
        }
    }
}

/// Trailing window ending at `idx` (inclusive). `None` if the window is
/// incomplete or any value inside it is missing.
fn window_values(
    group: &[ObservationRow],
    idx: usize,
    variable: Variable,
    window: usize,
    mode: LagMode,
) -> Option<Vec<f64>> {
    match mode {
        LagMode::RowPosition => {
            let start = (idx + 1).checked_sub(window)?;
            group[start..=idx]
                .iter()
                .map(|row| row.get(variable))
                .collect()
        }
        LagMode::Calendar => (0..window)
            .rev()
            .map(|back| {
                let target = months_back(group[idx].timestamp, back)?;
                find_month(&group[..=idx], target).and_then(|row| row.get(variable))
            })
            .collect(),
    }
}

/// `None` when `months` does not fit the calendar arithmetic.
fn months_back(date: NaiveDate, months: usize) -> Option<NaiveDate> {
    let months = i32::try_from(months).ok()?;
    Some(shift_months(date, months.checked_neg()?))
}

fn find_month(rows: &[ObservationRow], month: NaiveDate) -> Option<&ObservationRow> {
    rows.binary_search_by_key(&month, |row| row.timestamp)
        .ok()
        .map(|idx| &rows[idx])
}

/// Mean and population standard deviation (ddof = 0).
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use biota_core::{end_of_month, GridId};

    fn month(y: i32, m: u32) -> NaiveDate {
        end_of_month(NaiveDate::from_ymd_opt(y, m, 1).unwrap())
    }

    fn series(grid: i64, start: NaiveDate, variable: Variable, values: &[f64]) -> Vec<ObservationRow> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let mut row = ObservationRow::new(GridId(grid), shift_months(start, i as i32));
                row.set(variable, Some(*value));
                row
            })
            .collect()
    }

    #[test]
    fn lag1_is_the_previous_row() {
        let values: Vec<f64> = (10..25).map(f64::from).collect();
        let rows = series(1, month(2020, 1), Variable::Richness, &values);
        let features = compute_features(&rows, &FeatureConfig::default());

        assert_eq!(features.len(), 15);
        assert_eq!(features[0].column("richness_lag1"), Some(None));
        for i in 1..features.len() {
            assert_eq!(features[i].column("richness_lag1"), Some(Some(values[i - 1])));
        }
        assert_eq!(features[12].column("richness_lag12"), Some(Some(10.0)));
        assert_eq!(features[11].column("richness_lag12"), Some(None));
    }

    #[test]
    fn rolling_mean_needs_a_full_window() {
        let rows = series(
            1,
            month(2021, 1),
            Variable::TempC,
            &[10.0, 20.0, 30.0, 40.0, 50.0, 60.0],
        );
        let features = compute_features(&rows, &FeatureConfig::default());

        assert_eq!(features[0].column("temp_c_mean_3mo"), Some(None));
        assert_eq!(features[1].column("temp_c_mean_3mo"), Some(None));
        assert_eq!(features[2].column("temp_c_mean_3mo"), Some(Some(20.0)));
        assert_eq!(features[5].column("temp_c_mean_6mo"), Some(Some(35.0)));

        let std = features[2].column("temp_c_std_3mo").unwrap().unwrap();
        assert!((std - (200.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn precipitation_gets_a_trailing_sum() {
        let rows = series(1, month(2021, 1), Variable::PrecipMm, &[1.0, 2.0, 3.0, 4.0]);
        let features = compute_features(&rows, &FeatureConfig::default());
        assert_eq!(features[3].column("precip_mm_sum_3mo"), Some(Some(9.0)));
        assert_eq!(features[3].column("precip_mm_sum_6mo"), Some(None));
    }

    #[test]
    fn a_missing_value_inside_the_window_blanks_the_statistic() {
        let mut rows = series(1, month(2021, 1), Variable::TempC, &[1.0, 2.0, 3.0, 4.0]);
        rows[1].set(Variable::TempC, None);
        let features = compute_features(&rows, &FeatureConfig::default());
        assert_eq!(features[2].column("temp_c_mean_3mo"), Some(None));
        assert_eq!(features[3].column("temp_c_mean_3mo"), Some(None));
    }

    #[test]
    fn groups_do_not_leak_into_each_other() {
        let mut rows = series(1, month(2021, 1), Variable::Richness, &[1.0, 2.0]);
        rows.extend(series(2, month(2021, 1), Variable::Richness, &[7.0, 8.0]));
        let features = compute_features(&rows, &FeatureConfig::default());
        assert_eq!(features[2].observation.grid_id, GridId(2));
        assert_eq!(features[2].column("richness_lag1"), Some(None));
        assert_eq!(features[3].column("richness_lag1"), Some(Some(7.0)));
    }

    #[test]
    fn row_position_lag_skips_over_gaps_but_calendar_lag_does_not() {
        // January, February, April: March is missing.
        let mut rows = series(1, month(2021, 1), Variable::Evi, &[0.1, 0.2]);
        let mut april = ObservationRow::new(GridId(1), month(2021, 4));
        april.set(Variable::Evi, Some(0.4));
        rows.push(april);

        let positional = compute_features(&rows, &FeatureConfig::default());
        assert_eq!(positional[2].column("evi_lag1"), Some(Some(0.2)));

        let calendar_config = FeatureConfig {
            lag_mode: LagMode::Calendar,
            ..FeatureConfig::default()
        };
        let calendar = compute_features(&rows, &calendar_config);
        assert_eq!(calendar[2].column("evi_lag1"), Some(None));
        assert_eq!(calendar[2].column("evi_lag3"), Some(Some(0.1)));
    }

    #[test]
    fn has_richness_never_reaches_the_features() {
        let mut rows = series(1, month(2021, 1), Variable::Richness, &[3.0]);
        rows[0].has_richness = Some(true);
        let features = compute_features(&rows, &FeatureConfig::default());
        assert_eq!(features[0].observation.has_richness, None);
        assert_eq!(features[0].column("has_richness"), None);
    }

    #[test]
    fn cyclical_encoding_and_interactions() {
        let mut row = ObservationRow::new(GridId(5), month(2021, 4));
        row.set(Variable::TreePct, Some(20.0));
        row.set(Variable::PrecipMm, Some(3.0));
        let features = compute_features(&[row], &FeatureConfig::default());

        let (sin, cos) = cyclical_month(month(2021, 4));
        assert!((sin - 1.0).abs() < 1e-12);
        assert!(cos.abs() < 1e-12);
        assert_eq!(features[0].month_sin, sin);
        assert_eq!(features[0].column("inter_Tree_Pct_x_precip_mm"), Some(Some(60.0)));
        assert_eq!(features[0].column("inter_BuiltArea__x_avg_pm25"), Some(None));

        let (jan_sin, jan_cos) = cyclical_month(month(2021, 1));
        assert_eq!((jan_sin, jan_cos), (0.0, 1.0));
    }

    #[test]
    fn entirely_null_rows_are_detected() {
        let empty = ObservationRow::new(GridId(9), month(2021, 1));
        let features = compute_features(&[empty], &FeatureConfig::default());
        assert!(features[0].is_entirely_null());

        let rows = series(9, month(2021, 1), Variable::Evi, &[0.3]);
        let features = compute_features(&rows, &FeatureConfig::default());
        assert!(!features[0].is_entirely_null());
    }

    #[test]
    fn config_validation_and_columns() {
        let config = FeatureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_lookback(), 12);
        let columns = config.derived_columns();
        assert!(columns.contains(&"Water_Pct_lag12".to_string()));
        assert!(columns.contains(&"avg_pm25_std_6mo".to_string()));
        assert_eq!(columns.len(), 8 * 4 + 2 * (2 * 2 + 1) + 2);

        let bad = FeatureConfig {
            lags: vec![0],
            ..FeatureConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn oversized_lags_and_windows_are_rejected() {
        for lags in [vec![1usize << 31], vec![usize::MAX], vec![MAX_LOOKBACK_MONTHS + 1]] {
            let config = FeatureConfig {
                lags,
                lag_mode: LagMode::Calendar,
                ..FeatureConfig::default()
            };
            assert!(matches!(config.validate(), Err(BiotaError::Config(_))));
        }
        let config = FeatureConfig {
            windows: vec![usize::MAX],
            ..FeatureConfig::default()
        };
        assert!(config.validate().is_err());
        let config = FeatureConfig {
            lags: vec![MAX_LOOKBACK_MONTHS],
            ..FeatureConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn calendar_lag_beyond_i32_never_looks_forward() {
        let rows = series(1, month(2021, 1), Variable::Richness, &[1.0, 2.0, 3.0]);
        assert_eq!(months_back(rows[2].timestamp, usize::MAX), None);
        assert_eq!(months_back(rows[2].timestamp, 1usize << 31), None);
        assert_eq!(lagged_value(&rows, 2, Variable::Richness, usize::MAX, LagMode::Calendar), None);
        assert_eq!(
            lagged_value(&rows, 2, Variable::Richness, 1, LagMode::Calendar),
            Some(2.0)
        );
    }
}
