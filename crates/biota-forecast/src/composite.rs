use serde::{Deserialize, Serialize};

/// Linear blend of the three predicted biodiversity metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub shannon: f64,
    pub richness: f64,
    pub abundance: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            shannon: 0.8,
            richness: 0.2,
            abundance: 0.0,
        }
    }
}

impl CompositeWeights {
    pub fn index(&self, richness: f64, abundance: f64, shannon: f64) -> f64 {
        let mut index = self.shannon * shannon + self.richness * richness;
        // a zero weight must not let a non-finite abundance poison the index
        if self.abundance != 0.0 {
            index += self.abundance * abundance;
        }
        index
    }
}

/// `0.8 * shannon + 0.2 * richness`. Abundance is accepted but unused.
pub fn composite_index(richness: f64, abundance: f64, shannon: f64) -> f64 {
    CompositeWeights::default().index(richness, abundance, shannon)
}
