use biota_core::{normalize_months, BiotaError, BiotaResult, GridId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub version: Option<u32>,
    /// Panel the scenarios were written against; informational.
    pub panel_file: Option<String>,
    #[serde(default)]
    pub defaults: ScenarioDefaults,
    #[serde(default)]
    pub scenarios: Vec<ScenarioSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioDefaults {
    #[serde(default)]
    pub target_months: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub scenario_id: String,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub grid_ids: Vec<i64>,
    #[serde(default)]
    pub target_months: Option<Vec<String>>,
    /// Absolute replacement values for baseline columns.
    #[serde(default)]
    pub modifications: BTreeMap<String, f64>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedScenario {
    pub scenario_id: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub grid_ids: Vec<GridId>,
    pub target_months: Vec<NaiveDate>,
    pub modifications: BTreeMap<String, f64>,
    pub metadata: BTreeMap<String, String>,
}

pub fn load_spec_from_path(path: &Path) -> BiotaResult<ScenarioSet> {
    let data = fs::read_to_string(path).map_err(|err| {
        BiotaError::Io(std::io::Error::new(
            err.kind(),
            format!("reading scenario spec '{}': {err}", path.display()),
        ))
    })?;
    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml::from_str(&data).map_err(|err| err.to_string())
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(&data).map_err(|err| err.to_string())
        }
        _ => serde_yaml::from_str(&data)
            .or_else(|_| serde_json::from_str(&data))
            .map_err(|err| err.to_string()),
    };
    parsed.map_err(|msg| {
        BiotaError::Parse(format!("parsing scenario spec '{}': {msg}", path.display()))
    })
}

pub fn resolve_scenarios(set: &ScenarioSet) -> BiotaResult<Vec<ResolvedScenario>> {
    if set.scenarios.is_empty() {
        return Err(BiotaError::Validation(
            "scenario set contains no scenarios".into(),
        ));
    }
    let defaults = &set.defaults;
    let mut seen = HashSet::new();
    let mut resolved = Vec::with_capacity(set.scenarios.len());
    for scenario in &set.scenarios {
        let id = scenario.scenario_id.trim();
        if id.is_empty() {
            return Err(BiotaError::Validation("scenario_id cannot be empty".into()));
        }
        // ids name batch output directories
        if id.contains(['/', '\\']) || id.chars().all(|c| c == '.') {
            return Err(BiotaError::Validation(format!(
                "scenario_id '{id}' must not contain path separators or consist only of dots"
            )));
        }
        if !seen.insert(id.to_string()) {
            return Err(BiotaError::Validation(format!(
                "duplicate scenario_id '{id}' in spec"
            )));
        }
        if scenario.grid_ids.is_empty() {
            return Err(BiotaError::Validation(format!(
                "scenario '{id}' must list at least one grid id"
            )));
        }
        if scenario.modifications.is_empty() {
            return Err(BiotaError::Validation(format!(
                "scenario '{id}' must declare at least one modification"
            )));
        }
        if let Some((name, value)) = scenario
            .modifications
            .iter()
            .find(|(_, value)| !value.is_finite())
        {
            return Err(BiotaError::Validation(format!(
                "scenario '{id}' sets '{name}' to non-finite value {value}"
            )));
        }
        let month_strings = scenario
            .target_months
            .as_deref()
            .unwrap_or(defaults.target_months.as_slice());
        if month_strings.is_empty() {
            return Err(BiotaError::Validation(format!(
                "scenario '{id}' must declare at least one target month"
            )));
        }
        let target_months = normalize_months(month_strings).map_err(|err| {
            BiotaError::Validation(format!("parsing target months for scenario '{id}': {err}"))
        })?;
        let mut grid_ids: Vec<GridId> = scenario.grid_ids.iter().copied().map(GridId).collect();
        grid_ids.sort();
        grid_ids.dedup();

        resolved.push(ResolvedScenario {
            scenario_id: id.to_string(),
            description: scenario.description.clone(),
            tags: scenario
                .tags
                .clone()
                .unwrap_or_else(|| defaults.tags.clone()),
            grid_ids,
            target_months,
            modifications: scenario.modifications.clone(),
            metadata: scenario
                .metadata
                .clone()
                .unwrap_or_else(|| defaults.metadata.clone()),
        });
    }
    Ok(resolved)
}

pub fn validate(set: &ScenarioSet) -> BiotaResult<()> {
    resolve_scenarios(set).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SPEC: &str = r#"
version: 1
defaults:
  target_months: ["2024-06", "2024-05-31"]
  tags: [urban]
scenarios:
  - scenario_id: greening
    description: more trees in the core
    grid_ids: [43, 42, 42]
    modifications:
      Tree_Pct: 0.6
  - scenario_id: smog
    grid_ids: [7]
    target_months: ["2024-12"]
    tags: []
    modifications:
      avg_pm25: 80.0
"#;

    fn yaml_file(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn resolves_defaults_and_normalizes() {
        let file = yaml_file(SPEC);
        let set = load_spec_from_path(file.path()).unwrap();
        let resolved = resolve_scenarios(&set).unwrap();
        assert_eq!(resolved.len(), 2);

        let greening = &resolved[0];
        assert_eq!(greening.grid_ids, vec![GridId(42), GridId(43)]);
        assert_eq!(
            greening.target_months,
            vec![
                NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            ]
        );
        assert_eq!(greening.tags, vec!["urban".to_string()]);

        let smog = &resolved[1];
        assert_eq!(
            smog.target_months,
            vec![NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()]
        );
        assert!(smog.tags.is_empty());
    }

    #[test]
    fn json_specs_are_accepted() {
        let json = r#"{"scenarios": [{"scenario_id": "a", "grid_ids": [1],
            "target_months": ["2024-01"], "modifications": {"temp_c": 30.0}}]}"#;
        let set: ScenarioSet = serde_json::from_str(json).unwrap();
        validate(&set).unwrap();
    }

    #[test]
    fn rejects_empty_inputs() {
        let base = ScenarioSpec {
            scenario_id: "a".into(),
            description: None,
            tags: None,
            grid_ids: vec![1],
            target_months: Some(vec!["2024-01".into()]),
            modifications: BTreeMap::from([("temp_c".to_string(), 1.0)]),
            metadata: None,
        };
        let set_with = |spec: ScenarioSpec| ScenarioSet {
            version: None,
            panel_file: None,
            defaults: ScenarioDefaults::default(),
            scenarios: vec![spec],
        };

        assert!(validate(&set_with(base.clone())).is_ok());

        let mut no_grids = base.clone();
        no_grids.grid_ids.clear();
        assert!(matches!(
            validate(&set_with(no_grids)),
            Err(BiotaError::Validation(_))
        ));

        let mut no_mods = base.clone();
        no_mods.modifications.clear();
        assert!(validate(&set_with(no_mods)).is_err());

        let mut no_months = base.clone();
        no_months.target_months = None;
        assert!(validate(&set_with(no_months)).is_err());

        let mut bad_month = base.clone();
        bad_month.target_months = Some(vec!["someday".into()]);
        assert!(validate(&set_with(bad_month)).is_err());

        let empty = ScenarioSet {
            scenarios: Vec::new(),
            ..set_with(base.clone())
        };
        assert!(validate(&empty).is_err());

        let duplicate = ScenarioSet {
            scenarios: vec![base.clone(), base],
            ..empty
        };
        assert!(validate(&duplicate)
            .unwrap_err()
            .to_string()
            .contains("duplicate"));
    }

    #[test]
    fn rejects_ids_that_are_not_single_path_components() {
        let spec = |id: &str| ScenarioSet {
            version: None,
            panel_file: None,
            defaults: ScenarioDefaults::default(),
            scenarios: vec![ScenarioSpec {
                scenario_id: id.into(),
                description: None,
                tags: None,
                grid_ids: vec![1],
                target_months: Some(vec!["2024-01".into()]),
                modifications: BTreeMap::from([("temp_c".to_string(), 1.0)]),
                metadata: None,
            }],
        };
        for id in ["a/b", r"a\b", ".", ".."] {
            assert!(
                matches!(validate(&spec(id)), Err(BiotaError::Validation(_))),
                "{id} accepted"
            );
        }
        assert!(validate(&spec("a_b")).is_ok());
        assert!(validate(&spec("heat.v2")).is_ok());
    }

    #[test]
    fn unreadable_spec_reports_path() {
        let file = yaml_file("scenarios: [not: {valid");
        let err = load_spec_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("parsing scenario spec"));
    }
}
