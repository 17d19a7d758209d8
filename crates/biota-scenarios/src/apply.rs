use std::collections::{BTreeMap, BTreeSet};

use biota_core::{BiotaError, BiotaResult, GridId, ObservationRow, Variable, VariableKind};
use tracing::{debug, warn};

/// True when `name` is a column of a synthesized baseline row that callers
/// may overwrite: a dynamic or static variable, or a pass-through column.
pub fn is_overridable(name: &str, extra_columns: &[String]) -> bool {
    match Variable::from_name(name) {
        Some(variable) => variable.kind() != VariableKind::Biodiversity,
        None => extra_columns.iter().any(|column| column == name),
    }
}

/// Validated feature overrides for a subset of grid cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOverrides {
    grid_ids: BTreeSet<GridId>,
    modifications: BTreeMap<String, f64>,
    skipped: Vec<String>,
}

impl ScenarioOverrides {
    /// Empty `grid_ids` or `modifications` are rejected. Names that are not
    /// baseline columns are logged and dropped.
    pub fn new(
        grid_ids: &[GridId],
        modifications: &BTreeMap<String, f64>,
        extra_columns: &[String],
    ) -> BiotaResult<Self> {
        if grid_ids.is_empty() {
            return Err(BiotaError::Validation(
                "scenario requires at least one grid id".into(),
            ));
        }
        if modifications.is_empty() {
            return Err(BiotaError::Validation(
                "scenario requires at least one modification".into(),
            ));
        }

        let mut accepted = BTreeMap::new();
        let mut skipped = Vec::new();
        for (name, value) in modifications {
            if is_overridable(name, extra_columns) {
                accepted.insert(name.clone(), *value);
            } else {
                warn!(feature = %name, "scenario modifies unknown baseline feature; ignoring");
                skipped.push(name.clone());
            }
        }

        Ok(Self {
            grid_ids: grid_ids.iter().copied().collect(),
            modifications: accepted,
            skipped,
        })
    }

    pub fn grid_ids(&self) -> &BTreeSet<GridId> {
        &self.grid_ids
    }

    pub fn modifications(&self) -> &BTreeMap<String, f64> {
        &self.modifications
    }

    /// Modification names that were dropped as unknown.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn targets(&self, grid_id: GridId) -> bool {
        self.grid_ids.contains(&grid_id)
    }

    /// Overwrite the modified columns on every targeted row. Returns the
    /// number of rows touched.
    pub fn apply(&self, rows: &mut [ObservationRow]) -> usize {
        let mut touched = 0;
        for row in rows.iter_mut().filter(|row| self.grid_ids.contains(&row.grid_id)) {
            for (name, value) in &self.modifications {
                if !row.set_column(name, Some(*value)) {
                    // pass-through column missing from this row
                    row.extras.insert(name.clone(), Some(*value));
                }
            }
            touched += 1;
        }
        debug!(rows = touched, "applied scenario overrides");
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn baseline(grid: i64) -> ObservationRow {
        let mut row = ObservationRow::new(GridId(grid), NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
        row.statics.tree_pct = Some(0.2);
        row.dynamic.temp_c = Some(25.0);
        row.extras.insert("neigh_evi_mean".into(), None);
        row
    }

    #[test]
    fn overrides_only_targeted_grids() {
        let overrides = ScenarioOverrides::new(
            &[GridId(42)],
            &BTreeMap::from([
                ("Tree_Pct".to_string(), 0.7),
                ("neigh_evi_mean".to_string(), 0.4),
            ]),
            &["neigh_evi_mean".to_string()],
        )
        .unwrap();
        let mut rows = vec![baseline(42), baseline(43)];
        assert_eq!(overrides.apply(&mut rows), 1);
        assert_eq!(rows[0].statics.tree_pct, Some(0.7));
        assert_eq!(rows[0].extras["neigh_evi_mean"], Some(0.4));
        assert_eq!(rows[1], baseline(43));
    }

    #[test]
    fn unknown_features_are_skipped_not_fatal() {
        let overrides = ScenarioOverrides::new(
            &[GridId(1)],
            &BTreeMap::from([
                ("temp_c".to_string(), 30.0),
                ("moon_phase".to_string(), 1.0),
                ("richness".to_string(), 99.0),
            ]),
            &[],
        )
        .unwrap();
        assert_eq!(overrides.skipped(), ["moon_phase".to_string(), "richness".to_string()]);
        assert_eq!(overrides.modifications().len(), 1);
        assert!(overrides.targets(GridId(1)));
    }

    #[test]
    fn empty_inputs_are_validation_errors() {
        let mods = BTreeMap::from([("temp_c".to_string(), 30.0)]);
        assert!(matches!(
            ScenarioOverrides::new(&[], &mods, &[]),
            Err(BiotaError::Validation(_))
        ));
        assert!(matches!(
            ScenarioOverrides::new(&[GridId(1)], &BTreeMap::new(), &[]),
            Err(BiotaError::Validation(_))
        ));
    }

    #[test]
    fn overridable_columns() {
        assert!(is_overridable("avg_pm25", &[]));
        assert!(is_overridable("BuiltArea_", &[]));
        assert!(!is_overridable("shannon", &[]));
        assert!(!is_overridable("custom", &[]));
        assert!(is_overridable("custom", &["custom".to_string()]));
    }
}
