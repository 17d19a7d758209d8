use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use biota_cli::cli::PanelCommands;
use biota_core::Variable;
use biota_ts::load_panel;
use tabwriter::TabWriter;

pub fn handle(command: &PanelCommands) -> Result<()> {
    match command {
        PanelCommands::Inspect { panel } => inspect(panel),
    }
}

fn inspect(path: &Path) -> Result<()> {
    let load = load_panel(path)?;
    let panel = &load.panel;
    let mut writer = TabWriter::new(io::stdout()).padding(2);
    writeln!(writer, "PANEL\t{}", path.display())?;
    writeln!(writer, "ROWS\t{}", panel.len())?;
    writeln!(writer, "GRIDS\t{}", panel.grid_ids().len())?;
    match panel.time_range() {
        Some((first, last)) => writeln!(writer, "MONTHS\t{first} .. {last}")?,
        None => writeln!(writer, "MONTHS\t-")?,
    }
    writeln!(writer, "DUPLICATES DROPPED\t{}", load.dedup.duplicates_dropped)?;
    writeln!(writer, "ROWS SKIPPED\t{}", load.skipped_rows)?;
    let extras = panel.extra_columns();
    writeln!(
        writer,
        "EXTRA COLUMNS\t{}",
        if extras.is_empty() {
            "-".to_string()
        } else {
            extras.join(", ")
        }
    )?;
    writeln!(writer)?;
    writeln!(writer, "VARIABLE\tKIND\tMISSING")?;
    for variable in Variable::ALL {
        let missing = panel
            .rows()
            .iter()
            .filter(|row| row.get(variable).is_none())
            .count();
        writeln!(
            writer,
            "{}\t{:?}\t{}",
            variable.name(),
            variable.kind(),
            missing
        )?;
    }
    writer.flush()?;
    Ok(())
}
