use std::path::Path;

use tracing::info;

use biota_core::{BiotaError, BiotaResult, Panel};
use biota_models::ModelSet;

/// Historical panel plus the loaded models. Immutable once built and shared
/// by every rollout.
#[derive(Debug)]
pub struct ResourceBundle {
    panel: Panel,
    models: ModelSet,
}

impl ResourceBundle {
    pub fn new(panel: Panel, models: ModelSet) -> BiotaResult<Self> {
        if panel.is_empty() {
            return Err(BiotaError::Data("historical panel is empty".into()));
        }
        Ok(Self { panel, models })
    }

    /// Load the panel file and every model artifact in `models_dir`.
    pub fn load(panel_path: &Path, models_dir: &Path) -> BiotaResult<Self> {
        let loaded = biota_ts::load_panel(panel_path)?;
        let models = ModelSet::load_dir(models_dir)?;
        info!(
            rows = loaded.panel.len(),
            grids = loaded.panel.grid_ids().len(),
            "resource bundle ready"
        );
        Self::new(loaded.panel, models)
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    pub fn models(&self) -> &ModelSet {
        &self.models
    }
}
