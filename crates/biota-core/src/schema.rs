//! Typed panel records.
//!
//! Rows move through the pipeline as [`ObservationRow`]s: loaded from the
//! historical panel, synthesized as baselines for future months, and finally
//! re-created from predictions so later months can look back at them. Column
//! names follow the upstream ETL output (`Grid_ID`, `Tree_Pct`, `BuiltArea_`,
//! ...), which the trained models were fit against.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const GRID_ID_COLUMN: &str = "Grid_ID";
pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const GEOMETRY_COLUMN: &str = "geometry";
pub const HAS_RICHNESS_COLUMN: &str = "has_richness";
pub const PRESENCE_PROB_COLUMN: &str = "presence_prob";

/// Stable identifier of one analysis grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GridId(pub i64);

impl GridId {
    pub fn new(value: i64) -> Self {
        GridId(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for GridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for GridId {
    fn from(value: i64) -> Self {
        GridId(value)
    }
}

/// Climate and vegetation variables that change month to month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicVars {
    pub avg_pm25: Option<f64>,
    pub temp_c: Option<f64>,
    pub precip_mm: Option<f64>,
    pub evi: Option<f64>,
}

/// Observed (or predicted) biodiversity metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Biodiversity {
    pub richness: Option<f64>,
    pub abundance: Option<f64>,
    pub shannon: Option<f64>,
}

/// Terrain and land-cover attributes treated as time-invariant when forecasting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticAttributes {
    pub avg_height: Option<f64>,
    pub avg_slope: Option<f64>,
    pub avg_aspect: Option<f64>,
    pub avg_relief: Option<f64>,
    pub water_pct: Option<f64>,
    pub tree_pct: Option<f64>,
    pub crop_pct: Option<f64>,
    pub built_area_pct: Option<f64>,
}

/// One panel record: a grid cell in a given month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    pub grid_id: GridId,
    /// Always a month end.
    pub timestamp: NaiveDate,
    pub dynamic: DynamicVars,
    pub biodiversity: Biodiversity,
    /// Derived presence label; never used as a model input.
    pub has_richness: Option<bool>,
    pub statics: StaticAttributes,
    /// Pass-through numeric columns materialized by the upstream ETL.
    #[serde(default)]
    pub extras: BTreeMap<String, Option<f64>>,
    /// Cell polygon (WKT or similar); carried for mapping only.
    #[serde(default)]
    pub geometry: Option<String>,
}

impl ObservationRow {
    pub fn new(grid_id: GridId, timestamp: NaiveDate) -> Self {
        Self {
            grid_id,
            timestamp: crate::month::end_of_month(timestamp),
            dynamic: DynamicVars::default(),
            biodiversity: Biodiversity::default(),
            has_richness: None,
            statics: StaticAttributes::default(),
            extras: BTreeMap::new(),
            geometry: None,
        }
    }

    pub fn key(&self) -> (GridId, NaiveDate) {
        (self.grid_id, self.timestamp)
    }

    pub fn get(&self, variable: Variable) -> Option<f64> {
        variable.get(self)
    }

    pub fn set(&mut self, variable: Variable, value: Option<f64>) {
        variable.set(self, value)
    }

    /// Look up a numeric column by its panel name: core variables first, then extras.
    ///
    /// The outer `Option` is `None` when the row has no such column at all.
    pub fn column(&self, name: &str) -> Option<Option<f64>> {
        match Variable::from_name(name) {
            Some(variable) => Some(variable.get(self)),
            None => self.extras.get(name).copied(),
        }
    }

    /// Overwrite a numeric column by name. Returns `false` for unknown columns.
    pub fn set_column(&mut self, name: &str, value: Option<f64>) -> bool {
        if let Some(variable) = Variable::from_name(name) {
            variable.set(self, value);
            return true;
        }
        match self.extras.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Group a [`Variable`] belongs to in the panel schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Dynamic,
    Biodiversity,
    Static,
}

/// Named numeric columns of the panel schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variable {
    #[serde(rename = "avg_pm25")]
    AvgPm25,
    #[serde(rename = "temp_c")]
    TempC,
    #[serde(rename = "precip_mm")]
    PrecipMm,
    #[serde(rename = "evi")]
    Evi,
    #[serde(rename = "richness")]
    Richness,
    #[serde(rename = "abundance")]
    Abundance,
    #[serde(rename = "shannon")]
    Shannon,
    #[serde(rename = "Avg_Height")]
    AvgHeight,
    #[serde(rename = "Avg_Slope")]
    AvgSlope,
    #[serde(rename = "Avg_Aspect")]
    AvgAspect,
    #[serde(rename = "Avg_Relief")]
    AvgRelief,
    #[serde(rename = "Water_Pct")]
    WaterPct,
    #[serde(rename = "Tree_Pct")]
    TreePct,
    #[serde(rename = "Crop_Pct")]
    CropPct,
    #[serde(rename = "BuiltArea_")]
    BuiltArea,
}

impl Variable {
    pub const ALL: [Variable; 15] = [
        Variable::AvgPm25,
        Variable::TempC,
        Variable::PrecipMm,
        Variable::Evi,
        Variable::Richness,
        Variable::Abundance,
        Variable::Shannon,
        Variable::AvgHeight,
        Variable::AvgSlope,
        Variable::AvgAspect,
        Variable::AvgRelief,
        Variable::WaterPct,
        Variable::TreePct,
        Variable::CropPct,
        Variable::BuiltArea,
    ];

    pub const DYNAMIC: [Variable; 4] = [
        Variable::AvgPm25,
        Variable::TempC,
        Variable::PrecipMm,
        Variable::Evi,
    ];

    pub const BIODIVERSITY: [Variable; 3] =
        [Variable::Richness, Variable::Abundance, Variable::Shannon];

    pub const STATIC: [Variable; 8] = [
        Variable::AvgHeight,
        Variable::AvgSlope,
        Variable::AvgAspect,
        Variable::AvgRelief,
        Variable::WaterPct,
        Variable::TreePct,
        Variable::CropPct,
        Variable::BuiltArea,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variable::AvgPm25 => "avg_pm25",
            Variable::TempC => "temp_c",
            Variable::PrecipMm => "precip_mm",
            Variable::Evi => "evi",
            Variable::Richness => "richness",
            Variable::Abundance => "abundance",
            Variable::Shannon => "shannon",
            Variable::AvgHeight => "Avg_Height",
            Variable::AvgSlope => "Avg_Slope",
            Variable::AvgAspect => "Avg_Aspect",
            Variable::AvgRelief => "Avg_Relief",
            Variable::WaterPct => "Water_Pct",
            Variable::TreePct => "Tree_Pct",
            Variable::CropPct => "Crop_Pct",
            Variable::BuiltArea => "BuiltArea_",
        }
    }

    pub fn from_name(name: &str) -> Option<Variable> {
        Variable::ALL.into_iter().find(|v| v.name() == name)
    }

    pub fn kind(self) -> VariableKind {
        match self {
            Variable::AvgPm25 | Variable::TempC | Variable::PrecipMm | Variable::Evi => {
                VariableKind::Dynamic
            }
            Variable::Richness | Variable::Abundance | Variable::Shannon => {
                VariableKind::Biodiversity
            }
            _ => VariableKind::Static,
        }
    }

    pub fn get(self, row: &ObservationRow) -> Option<f64> {
        match self {
            Variable::AvgPm25 => row.dynamic.avg_pm25,
            Variable::TempC => row.dynamic.temp_c,
            Variable::PrecipMm => row.dynamic.precip_mm,
            Variable::Evi => row.dynamic.evi,
            Variable::Richness => row.biodiversity.richness,
            Variable::Abundance => row.biodiversity.abundance,
            Variable::Shannon => row.biodiversity.shannon,
            Variable::AvgHeight => row.statics.avg_height,
            Variable::AvgSlope => row.statics.avg_slope,
            Variable::AvgAspect => row.statics.avg_aspect,
            Variable::AvgRelief => row.statics.avg_relief,
            Variable::WaterPct => row.statics.water_pct,
            Variable::TreePct => row.statics.tree_pct,
            Variable::CropPct => row.statics.crop_pct,
            Variable::BuiltArea => row.statics.built_area_pct,
        }
    }

    pub fn set(self, row: &mut ObservationRow, value: Option<f64>) {
        let slot = match self {
            Variable::AvgPm25 => &mut row.dynamic.avg_pm25,
            Variable::TempC => &mut row.dynamic.temp_c,
            Variable::PrecipMm => &mut row.dynamic.precip_mm,
            Variable::Evi => &mut row.dynamic.evi,
            Variable::Richness => &mut row.biodiversity.richness,
            Variable::Abundance => &mut row.biodiversity.abundance,
            Variable::Shannon => &mut row.biodiversity.shannon,
            Variable::AvgHeight => &mut row.statics.avg_height,
            Variable::AvgSlope => &mut row.statics.avg_slope,
            Variable::AvgAspect => &mut row.statics.avg_aspect,
            Variable::AvgRelief => &mut row.statics.avg_relief,
            Variable::WaterPct => &mut row.statics.water_pct,
            Variable::TreePct => &mut row.statics.tree_pct,
            Variable::CropPct => &mut row.statics.crop_pct,
            Variable::BuiltArea => &mut row.statics.built_area_pct,
        };
        *slot = value;
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_names_round_trip() {
        for variable in Variable::ALL {
            assert_eq!(Variable::from_name(variable.name()), Some(variable));
        }
        assert_eq!(Variable::from_name("BuiltArea_"), Some(Variable::BuiltArea));
        assert_eq!(Variable::from_name("built_area"), None);
    }

    #[test]
    fn column_lookup_distinguishes_absent_from_missing() {
        let mut row = ObservationRow::new(GridId(7), NaiveDate::from_ymd_opt(2022, 5, 3).unwrap());
        row.extras.insert("neighbor_evi_mean".into(), None);
        row.set(Variable::TreePct, Some(41.0));

        assert_eq!(row.timestamp, NaiveDate::from_ymd_opt(2022, 5, 31).unwrap());
        assert_eq!(row.column("Tree_Pct"), Some(Some(41.0)));
        assert_eq!(row.column("temp_c"), Some(None));
        assert_eq!(row.column("neighbor_evi_mean"), Some(None));
        assert_eq!(row.column("FloodedVeg"), None);
    }

    #[test]
    fn set_column_rejects_unknown_names() {
        let mut row = ObservationRow::new(GridId(1), NaiveDate::from_ymd_opt(2022, 1, 31).unwrap());
        assert!(row.set_column("avg_pm25", Some(35.0)));
        assert!(!row.set_column("not_a_column", Some(1.0)));
        assert_eq!(row.dynamic.avg_pm25, Some(35.0));
    }

    #[test]
    fn grid_id_serializes_as_plain_integer() {
        let json = serde_json::to_string(&GridId(42)).unwrap();
        assert_eq!(json, "42");
    }
}
