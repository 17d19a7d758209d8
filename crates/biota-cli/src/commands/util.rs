use anyhow::{anyhow, bail, Context, Result};
use biota_core::{normalize_months, GridId};
use chrono::NaiveDate;
use std::collections::BTreeMap;

fn split_list(spec: &str) -> impl Iterator<Item = &str> {
    spec.split(',').map(str::trim).filter(|s| !s.is_empty())
}

pub fn parse_partitions(spec: Option<&String>) -> Vec<String> {
    split_list(spec.map_or("", String::as_str))
        .map(String::from)
        .collect()
}

/// Comma-separated months, normalized to month ends, sorted and deduplicated.
pub fn parse_months(spec: &str) -> Result<Vec<NaiveDate>> {
    let values: Vec<&str> = split_list(spec).collect();
    if values.is_empty() {
        bail!("--months needs at least one month");
    }
    Ok(normalize_months(&values)?)
}

pub fn parse_grid_ids(spec: &str) -> Result<Vec<GridId>> {
    let ids = split_list(spec)
        .map(|value| {
            value
                .parse::<i64>()
                .map(GridId::new)
                .with_context(|| format!("invalid grid id '{value}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    if ids.is_empty() {
        bail!("--grid-ids needs at least one grid id");
    }
    Ok(ids)
}

/// `name=value` pairs; a repeated name keeps the last value.
pub fn parse_assignments(values: &[String]) -> Result<BTreeMap<String, f64>> {
    let mut modifications = BTreeMap::new();
    for raw in values {
        let (name, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("override '{raw}' must look like NAME=VALUE"))?;
        let name = name.trim();
        if name.is_empty() {
            bail!("override '{raw}' is missing a feature name");
        }
        let value: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("override '{raw}' has a non-numeric value"))?;
        modifications.insert(name.to_string(), value);
    }
    Ok(modifications)
}
