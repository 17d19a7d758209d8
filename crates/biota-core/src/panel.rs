//! In-memory grid × month panel.
//!
//! Rows are kept sorted by `(Grid_ID, timestamp)` with at most one row per
//! key, which is what lag and rolling computations rely on. Each grid's rows
//! therefore form one contiguous, chronologically ordered run.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::warn;

use crate::error::{BiotaError, BiotaResult};
use crate::schema::{GridId, ObservationRow};

/// Outcome of normalizing a batch of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub input_rows: usize,
    pub duplicates_dropped: usize,
}

/// Sort rows by `(Grid_ID, timestamp)` and drop repeated keys, keeping the
/// first occurrence in input order.
pub fn normalize_rows(rows: &mut Vec<ObservationRow>) -> DedupReport {
    let input_rows = rows.len();
    // Stable sort: among equal keys the earliest input row stays in front.
    rows.sort_by_key(|row| row.key());
    rows.dedup_by(|later, first| later.key() == first.key());
    DedupReport {
        input_rows,
        duplicates_dropped: input_rows - rows.len(),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    rows: Vec<ObservationRow>,
    extra_columns: Vec<String>,
}

impl Panel {
    /// Build a panel, resolving duplicate keys keep-first.
    ///
    /// `extra_columns` lists the pass-through numeric columns every row is
    /// expected to carry; rows missing one get it as a missing value.
    pub fn from_rows(
        mut rows: Vec<ObservationRow>,
        extra_columns: Vec<String>,
    ) -> (Self, DedupReport) {
        let report = normalize_rows(&mut rows);
        if report.duplicates_dropped > 0 {
            warn!(
                dropped = report.duplicates_dropped,
                "duplicate (Grid_ID, timestamp) rows found; kept the first occurrence"
            );
        }
        for row in &mut rows {
            for column in &extra_columns {
                row.extras.entry(column.clone()).or_insert(None);
            }
        }
        (
            Panel {
                rows,
                extra_columns,
            },
            report,
        )
    }

    pub fn rows(&self) -> &[ObservationRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ObservationRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    pub fn grid_ids(&self) -> BTreeSet<GridId> {
        self.rows.iter().map(|row| row.grid_id).collect()
    }

    /// First and last month in the panel.
    pub fn time_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.rows.iter().map(|row| row.timestamp).min()?;
        let last = self.rows.iter().map(|row| row.timestamp).max()?;
        Some((first, last))
    }

    /// All rows of one grid, oldest first.
    pub fn grid_rows(&self, grid_id: GridId) -> &[ObservationRow] {
        let start = self.rows.partition_point(|row| row.grid_id < grid_id);
        let end = self.rows.partition_point(|row| row.grid_id <= grid_id);
        &self.rows[start..end]
    }

    /// Rows of one grid strictly before `cutoff`, oldest first.
    pub fn grid_rows_before(&self, grid_id: GridId, cutoff: NaiveDate) -> &[ObservationRow] {
        let rows = self.grid_rows(grid_id);
        let end = rows.partition_point(|row| row.timestamp < cutoff);
        &rows[..end]
    }

    /// The most recent `size` rows of a grid strictly before `target`.
    pub fn trailing_window(
        &self,
        grid_id: GridId,
        target: NaiveDate,
        size: usize,
    ) -> &[ObservationRow] {
        let rows = self.grid_rows_before(grid_id, target);
        &rows[rows.len().saturating_sub(size)..]
    }

    /// Latest row of a grid strictly before `cutoff`.
    pub fn latest_before(&self, grid_id: GridId, cutoff: NaiveDate) -> Option<&ObservationRow> {
        self.grid_rows_before(grid_id, cutoff).last()
    }

    /// Copy of the panel holding only rows strictly before `cutoff`.
    pub fn truncated_before(&self, cutoff: NaiveDate) -> Panel {
        Panel {
            rows: self
                .rows
                .iter()
                .filter(|row| row.timestamp < cutoff)
                .cloned()
                .collect(),
            extra_columns: self.extra_columns.clone(),
        }
    }

    /// Copy of the panel restricted to a set of grids and an inclusive month range.
    pub fn slice(
        &self,
        grids: Option<&BTreeSet<GridId>>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Panel {
        let rows = self
            .rows
            .iter()
            .filter(|row| grids.map_or(true, |set| set.contains(&row.grid_id)))
            .filter(|row| from.map_or(true, |from| row.timestamp >= from))
            .filter(|row| to.map_or(true, |to| row.timestamp <= to))
            .cloned()
            .collect();
        Panel {
            rows,
            extra_columns: self.extra_columns.clone(),
        }
    }

    /// Append new rows. Keys already present are an error: the panel never
    /// rewrites history.
    pub fn append(&mut self, rows: Vec<ObservationRow>) -> BiotaResult<()> {
        for row in &rows {
            let existing = self.grid_rows(row.grid_id);
            if existing
                .binary_search_by_key(&row.timestamp, |r| r.timestamp)
                .is_ok()
            {
                return Err(BiotaError::Data(format!(
                    "panel already holds a row for grid {} at {}",
                    row.grid_id, row.timestamp
                )));
            }
        }
        let mut incoming = rows;
        let report = normalize_rows(&mut incoming);
        if report.duplicates_dropped > 0 {
            return Err(BiotaError::Data(format!(
                "{} appended rows repeat a (Grid_ID, timestamp) key",
                report.duplicates_dropped
            )));
        }
        for row in &mut incoming {
            for column in &self.extra_columns {
                row.extras.entry(column.clone()).or_insert(None);
            }
        }

        let existing = std::mem::take(&mut self.rows);
        let mut merged = Vec::with_capacity(existing.len() + incoming.len());
        let mut incoming = incoming.into_iter().peekable();
        for row in existing {
            while let Some(next) = incoming.next_if(|next| next.key() < row.key()) {
                merged.push(next);
            }
            merged.push(row);
        }
        merged.extend(incoming);
        self.rows = merged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Variable;

    fn month(y: i32, m: u32) -> NaiveDate {
        crate::month::end_of_month(NaiveDate::from_ymd_opt(y, m, 1).unwrap())
    }

    fn row(grid: i64, y: i32, m: u32, richness: f64) -> ObservationRow {
        let mut row = ObservationRow::new(GridId(grid), month(y, m));
        row.set(Variable::Richness, Some(richness));
        row
    }

    #[test]
    fn duplicate_keys_keep_first_occurrence() {
        let rows = vec![
            row(1, 2021, 2, 5.0),
            row(1, 2021, 1, 3.0),
            row(1, 2021, 2, 99.0),
        ];
        let (panel, report) = Panel::from_rows(rows, Vec::new());
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(panel.len(), 2);
        assert_eq!(panel.rows()[0].timestamp, month(2021, 1));
        assert_eq!(panel.rows()[1].biodiversity.richness, Some(5.0));
    }

    #[test]
    fn normalizing_twice_is_idempotent() {
        let mut rows = vec![row(2, 2021, 1, 1.0), row(2, 2021, 1, 2.0)];
        normalize_rows(&mut rows);
        let again = normalize_rows(&mut rows);
        assert_eq!(again.duplicates_dropped, 0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].biodiversity.richness, Some(1.0));
    }

    #[test]
    fn trailing_window_is_strictly_before_target() {
        let rows = (1..=12).map(|m| row(3, 2021, m, m as f64)).collect();
        let (panel, _) = Panel::from_rows(rows, Vec::new());
        let window = panel.trailing_window(GridId(3), month(2021, 10), 4);
        let months: Vec<_> = window.iter().map(|r| r.timestamp).collect();
        assert_eq!(
            months,
            vec![month(2021, 6), month(2021, 7), month(2021, 8), month(2021, 9)]
        );
        assert!(panel.trailing_window(GridId(3), month(2021, 1), 12).is_empty());
        assert!(panel.trailing_window(GridId(4), month(2022, 1), 12).is_empty());
    }

    #[test]
    fn grid_rows_are_contiguous_per_grid() {
        let rows = vec![row(2, 2021, 1, 0.0), row(1, 2021, 2, 0.0), row(1, 2021, 1, 0.0)];
        let (panel, _) = Panel::from_rows(rows, Vec::new());
        assert_eq!(panel.grid_rows(GridId(1)).len(), 2);
        assert_eq!(panel.grid_rows(GridId(2)).len(), 1);
        assert_eq!(panel.latest_before(GridId(1), month(2022, 1)).unwrap().timestamp, month(2021, 2));
    }

    #[test]
    fn append_keeps_order_and_rejects_existing_keys() {
        let (mut panel, _) = Panel::from_rows(
            vec![row(1, 2021, 1, 1.0), row(2, 2021, 1, 1.0)],
            vec!["neighbor_evi_mean".into()],
        );
        panel.append(vec![row(1, 2021, 2, 4.0)]).unwrap();
        assert_eq!(panel.rows()[1].key(), (GridId(1), month(2021, 2)));
        assert_eq!(panel.rows()[1].extras.get("neighbor_evi_mean"), Some(&None));

        let err = panel.append(vec![row(2, 2021, 1, 9.0)]).unwrap_err();
        assert!(matches!(err, BiotaError::Data(_)));
    }

    #[test]
    fn truncation_and_slicing() {
        let rows = (1..=6)
            .flat_map(|m| vec![row(1, 2021, m, 0.0), row(2, 2021, m, 0.0)])
            .collect();
        let (panel, _) = Panel::from_rows(rows, Vec::new());
        assert_eq!(panel.truncated_before(month(2021, 4)).len(), 6);
        let only_two: BTreeSet<_> = [GridId(2)].into_iter().collect();
        let sliced = panel.slice(Some(&only_two), Some(month(2021, 2)), Some(month(2021, 3)));
        assert_eq!(sliced.len(), 2);
        assert_eq!(panel.time_range(), Some((month(2021, 1), month(2021, 6))));
    }
}
