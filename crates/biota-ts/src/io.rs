use std::{
    collections::BTreeSet,
    ffi::OsStr,
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use biota_core::{
    month::{from_epoch_millis, parse_month},
    DedupReport, GridId, ObservationRow, Panel, Variable, GEOMETRY_COLUMN, GRID_ID_COLUMN,
    HAS_RICHNESS_COLUMN, TIMESTAMP_COLUMN,
};
use chrono::NaiveDate;
use polars::datatypes::IdxSize;
use polars::frame::group_by::GroupsIndicator;
use polars::prelude::*;
#[cfg(feature = "parquet")]
use polars::prelude::{ParquetReader, ParquetWriter};
use tracing::{info, warn};

use crate::features::{FeatureConfig, FeatureRow};

/// Panel plus what happened while loading it.
#[derive(Debug, Clone)]
pub struct PanelLoad {
    pub panel: Panel,
    pub dedup: DedupReport,
    /// Rows without a usable `Grid_ID` or timestamp.
    pub skipped_rows: usize,
}

/// Load the pre-built historical panel from CSV or Parquet.
pub fn load_panel(path: &Path) -> Result<PanelLoad> {
    let df = read_frame(path)?;
    let load = panel_from_frame(&df)
        .with_context(|| format!("building panel from {}", path.display()))?;
    info!(
        rows = load.panel.len(),
        grids = load.panel.grid_ids().len(),
        duplicates = load.dedup.duplicates_dropped,
        skipped = load.skipped_rows,
        "loaded historical panel from {}",
        path.display()
    );
    Ok(load)
}

pub fn panel_from_frame(df: &DataFrame) -> Result<PanelLoad> {
    let height = df.height();
    let grid_ids = column_i64(df, GRID_ID_COLUMN)?;
    let timestamps = column_months(df, TIMESTAMP_COLUMN)?;
    let geometry = column_utf8(df, GEOMETRY_COLUMN)?;

    let mut variables = Vec::new();
    for variable in Variable::ALL {
        if let Some(values) = column_f64(df, variable.name())? {
            variables.push((variable, values));
        }
    }

    let known: BTreeSet<&str> = Variable::ALL.iter().map(|v| v.name()).collect();
    let mut extra_names = Vec::new();
    let mut extras = Vec::new();
    for name in df.get_column_names() {
        if known.contains(name)
            || [GRID_ID_COLUMN, TIMESTAMP_COLUMN, GEOMETRY_COLUMN, HAS_RICHNESS_COLUMN]
                .contains(&name)
            || is_recomputed_column(name)
        {
            continue;
        }
        let series = df.column(name)?;
        if !series.dtype().is_numeric() {
            continue;
        }
        if let Some(values) = column_f64(df, name)? {
            extra_names.push(name.to_string());
            extras.push(values);
        }
    }

    let mut rows = Vec::with_capacity(height);
    let mut skipped_rows = 0;
    for idx in 0..height {
        let (Some(grid_id), Some(timestamp)) = (grid_ids[idx], timestamps[idx]) else {
            skipped_rows += 1;
            continue;
        };
        let mut row = ObservationRow::new(GridId(grid_id), timestamp);
        for (variable, values) in &variables {
            row.set(*variable, values[idx]);
        }
        for (name, values) in extra_names.iter().zip(&extras) {
            row.extras.insert(name.clone(), values[idx]);
        }
        row.has_richness = row.biodiversity.richness.map(|r| r > 0.0);
        row.geometry = geometry[idx].clone();
        rows.push(row);
    }
    if skipped_rows > 0 {
        warn!(skipped_rows, "panel rows without Grid_ID or timestamp were skipped");
    }

    let (panel, dedup) = Panel::from_rows(rows, extra_names);
    Ok(PanelLoad {
        panel,
        dedup,
        skipped_rows,
    })
}

/// Columns the feature engine derives itself; stale copies in the input are ignored.
fn is_recomputed_column(name: &str) -> bool {
    if name == "month_sin" || name == "month_cos" || name == "month_id" || name.starts_with("inter_")
    {
        return true;
    }
    if let Some((_, suffix)) = name.rsplit_once("_lag") {
        if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    ["_mean_", "_std_", "_sum_"].iter().any(|marker| {
        name.rsplit_once(marker).map_or(false, |(_, rest)| {
            rest.strip_suffix("mo")
                .map_or(false, |digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
        })
    })
}

fn column_i64(df: &DataFrame, column: &str) -> Result<Vec<Option<i64>>> {
    let series = df
        .column(column)
        .with_context(|| format!("panel is missing required column '{column}'"))?
        .cast(&DataType::Int64)
        .with_context(|| format!("casting column '{column}' to Int64"))?;
    Ok(series.i64()?.into_iter().collect())
}

fn column_f64(df: &DataFrame, column: &str) -> Result<Option<Vec<Option<f64>>>> {
    let Ok(series) = df.column(column) else {
        return Ok(None);
    };
    let series = series
        .cast(&DataType::Float64)
        .with_context(|| format!("column '{column}' must be numeric"))?;
    Ok(Some(series.f64()?.into_iter().collect()))
}

fn column_utf8(df: &DataFrame, column: &str) -> Result<Vec<Option<String>>> {
    if let Ok(series) = df.column(column) {
        let series = series
            .cast(&DataType::Utf8)
            .with_context(|| format!("column '{column}' must be text"))?;
        Ok(series
            .utf8()?
            .into_iter()
            .map(|opt| opt.map(|value| value.to_string()))
            .collect())
    } else {
        Ok(vec![None; df.height()])
    }
}

fn column_months(df: &DataFrame, column: &str) -> Result<Vec<Option<NaiveDate>>> {
    let series = df
        .column(column)
        .with_context(|| format!("panel is missing required column '{column}'"))?;
    match series.dtype() {
        DataType::Int64 | DataType::Int32 | DataType::UInt64 | DataType::UInt32 => {
            let millis = series.cast(&DataType::Int64)?;
            millis
                .i64()?
                .into_iter()
                .map(|opt| opt.map(from_epoch_millis).transpose())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|err| anyhow!("column '{column}': {err}"))
        }
        _ => {
            let text = series
                .cast(&DataType::Utf8)
                .with_context(|| format!("casting column '{column}' to text"))?;
            text.utf8()?
                .into_iter()
                .map(|opt| opt.map(parse_month).transpose())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|err| anyhow!("column '{column}': {err}"))
        }
    }
}

/// Flatten feature rows into a frame: keys, base variables, extras, cyclical
/// encodings and every derived column of `config`.
pub fn features_to_frame(rows: &[FeatureRow], config: &FeatureConfig) -> Result<DataFrame> {
    let mut columns = vec![
        Series::new(
            GRID_ID_COLUMN,
            rows.iter()
                .map(|row| row.observation.grid_id.value())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            TIMESTAMP_COLUMN,
            rows.iter()
                .map(|row| row.timestamp().format("%Y-%m-%d").to_string())
                .collect::<Vec<_>>(),
        ),
    ];
    for variable in Variable::ALL {
        columns.push(Series::new(
            variable.name(),
            rows.iter()
                .map(|row| row.observation.get(variable))
                .collect::<Vec<_>>(),
        ));
    }
    let extra_names: BTreeSet<&String> = rows
        .iter()
        .flat_map(|row| row.observation.extras.keys())
        .collect();
    for name in extra_names {
        columns.push(Series::new(
            name,
            rows.iter()
                .map(|row| row.observation.extras.get(name).copied().flatten())
                .collect::<Vec<_>>(),
        ));
    }
    columns.push(Series::new(
        "month_sin",
        rows.iter().map(|row| row.month_sin).collect::<Vec<_>>(),
    ));
    columns.push(Series::new(
        "month_cos",
        rows.iter().map(|row| row.month_cos).collect::<Vec<_>>(),
    ));
    for name in config.derived_columns() {
        columns.push(Series::new(
            &name,
            rows.iter()
                .map(|row| row.derived.get(&name).copied().flatten())
                .collect::<Vec<_>>(),
        ));
    }
    DataFrame::new(columns).context("assembling feature frame")
}

pub fn read_frame(path: &Path) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;

    match extension.as_str() {
        #[cfg(feature = "parquet")]
        "parquet" => {
            let reader = ParquetReader::new(&mut file);
            reader.finish().context("reading Parquet file")
        }
        #[cfg(not(feature = "parquet"))]
        "parquet" => Err(anyhow!(
            "parquet support is disabled; rebuild with the 'parquet' feature"
        )),
        "csv" => {
            let reader = CsvReader::new(&mut file);
            reader.has_header(true).finish().context("reading CSV file")
        }
        _ => Err(anyhow!(
            "unsupported file extension '{}'; use .csv or .parquet",
            extension
        )),
    }
}

/// Write `df` under `<parent>/<stage>/<file>` and copy it to `path`. With
/// `partitions`, `path` becomes a directory of hive-style Parquet partitions.
pub fn write_frame_staged(
    df: &mut DataFrame,
    path: &Path,
    stage: &str,
    partitions: &[String],
) -> Result<()> {
    let staged = staged_output_path(path, stage);
    if !partitions.is_empty() && !cfg!(feature = "parquet") {
        bail!("partitioned output requires parquet support; rebuild with the 'parquet' feature");
    }

    if partitions.is_empty() {
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file =
            File::create(&staged).with_context(|| format!("creating {}", staged.display()))?;
        let write_result = match staged
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|s| s.to_lowercase())
        {
            #[cfg(feature = "parquet")]
            Some(ext) if ext == "parquet" => ParquetWriter::new(&mut file)
                .finish(df)
                .map(|_| ())
                .context("writing Parquet file"),
            #[cfg(not(feature = "parquet"))]
            Some(ext) if ext == "parquet" => Err(anyhow!(
                "parquet support is disabled; rebuild with the 'parquet' feature"
            )),
            Some(ext) if ext == "csv" => CsvWriter::new(&mut file)
                .finish(df)
                .context("writing CSV file"),
            _ => Err(anyhow!(
                "unsupported output extension for {}; use .csv or .parquet",
                staged.display()
            )),
        };
        write_result?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&staged, path)
            .with_context(|| format!("copying {} to {}", staged.display(), path.display()))?;
        Ok(())
    } else {
        write_partitioned(df, path, partitions).map(|_| ())
    }
}

pub fn staged_output_path(output: &Path, stage: &str) -> PathBuf {
    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    let file_name = output.file_name().unwrap_or_else(|| OsStr::new("output"));
    parent.join(stage).join(file_name)
}

/// Write one Parquet file per distinct combination of `partitions` values into
/// hive-style directories under `root` (`<root>/Grid_ID=42/part-0000.parquet`).
/// Returns the written files, sorted.
pub fn write_partitioned(
    df: &DataFrame,
    root: &Path,
    partitions: &[String],
) -> Result<Vec<PathBuf>> {
    for key in partitions {
        df.column(key)
            .with_context(|| format!("partition column '{key}' is not in the output"))?;
    }
    let group_by = df.group_by(partitions)?;
    let mut written = Vec::new();
    for group in group_by.get_groups().iter() {
        let (first, mut part) = match group {
            GroupsIndicator::Idx((first, indices)) => {
                let idx_ca = IdxCa::new("row_idx", indices.as_slice());
                (first, df.take(&idx_ca)?)
            }
            GroupsIndicator::Slice([first, len]) => (first, df.slice(first as i64, len as usize)),
        };
        let dir = partition_dir(df, root, partitions, first)?;
        written.push(write_partition_file(&mut part, &dir)?);
    }
    written.sort();
    info!(files = written.len(), "wrote partitioned output to {}", root.display());
    Ok(written)
}

fn partition_dir(
    df: &DataFrame,
    root: &Path,
    partitions: &[String],
    row: IdxSize,
) -> Result<PathBuf> {
    partitions.iter().try_fold(root.to_path_buf(), |dir, key| -> Result<PathBuf> {
        let value = df.column(key)?.get(row as usize)?;
        Ok(dir.join(format!("{key}={}", partition_value(&value))))
    })
}

/// A partition value usable as a single path component.
fn partition_value(value: &AnyValue<'_>) -> String {
    let text = match value {
        AnyValue::Null => return "__null__".to_string(),
        AnyValue::Utf8(text) => text.to_string(),
        other => other.to_string(),
    };
    let text: String = text
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    if text.is_empty() || text.chars().all(|c| c == '.') {
        format!("_{text}")
    } else {
        text
    }
}

#[cfg(feature = "parquet")]
fn write_partition_file(df: &mut DataFrame, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let file_path = dir.join("part-0000.parquet");
    let mut file =
        File::create(&file_path).with_context(|| format!("creating {}", file_path.display()))?;
    ParquetWriter::new(&mut file)
        .finish(df)
        .with_context(|| format!("writing partition {}", file_path.display()))?;
    Ok(file_path)
}

#[cfg(not(feature = "parquet"))]
fn write_partition_file(_df: &mut DataFrame, _dir: &Path) -> Result<PathBuf> {
    bail!("parquet support is disabled; rebuild with the 'parquet' feature to write partitions")
}
