//! Synthesized input rows for months that have no observation yet.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use biota_core::{end_of_month, shift_months, GridId, ObservationRow, Panel, Variable};

/// How dynamic variables are estimated for a future month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicBaselinePolicy {
    /// Mean over every earlier year's observation of the same calendar month.
    #[default]
    SameMonthAllYears,
    /// Use the same month of the previous year when the grid has it, else
    /// fall back to the all-years mean.
    PreferLastYear,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineSynthesizer {
    policy: DynamicBaselinePolicy,
}

impl BaselineSynthesizer {
    pub fn new(policy: DynamicBaselinePolicy) -> Self {
        Self { policy }
    }

    /// One baseline row per grid of `history` that has a row before `target`.
    pub fn synthesize(&self, history: &Panel, target: NaiveDate) -> Vec<ObservationRow> {
        let target = end_of_month(target);
        history
            .grid_ids()
            .into_iter()
            .filter_map(|grid_id| self.synthesize_grid(history, grid_id, target))
            .collect()
    }

    /// Baseline for one grid, or `None` when the grid has no history before
    /// `target`.
    pub fn synthesize_grid(
        &self,
        history: &Panel,
        grid_id: GridId,
        target: NaiveDate,
    ) -> Option<ObservationRow> {
        let target = end_of_month(target);
        let past = history.grid_rows_before(grid_id, target);
        let latest = past.last()?;

        let mut row = ObservationRow::new(grid_id, target);
        row.statics = latest.statics.clone();
        row.geometry = latest.geometry.clone();
        for column in history.extra_columns() {
            row.extras.insert(column.clone(), None);
        }

        let same_month: Vec<&ObservationRow> = past
            .iter()
            .filter(|r| r.timestamp.month() == target.month())
            .collect();
        let last_year = end_of_month(shift_months(target, -12));
        let source: Vec<&ObservationRow> = match self.policy {
            DynamicBaselinePolicy::PreferLastYear
                if same_month.iter().any(|r| r.timestamp == last_year) =>
            {
                same_month
                    .into_iter()
                    .filter(|r| r.timestamp == last_year)
                    .collect()
            }
            _ => same_month,
        };

        for variable in Variable::DYNAMIC {
            row.set(variable, Some(mean_or_zero(&source, variable)));
        }
        Some(row)
    }
}

fn mean_or_zero(rows: &[&ObservationRow], variable: Variable) -> f64 {
    let values: Vec<f64> = rows.iter().filter_map(|row| row.get(variable)).collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
