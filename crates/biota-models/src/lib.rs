//! Pre-trained model artifacts and the ensemble runner.
//!
//! Every model implements [`Model`]. Artifacts are loaded from JSON
//! ([`ModelArtifact`]) into a [`ModelSet`] holding the presence classifier and
//! the richness / abundance / shannon regressors, which [`EnsembleRunner`]
//! applies in that order.

pub mod artifact;
pub mod ensemble;
pub mod linear;
pub mod model;
pub mod registry;
pub mod tree;

pub use artifact::ModelArtifact;
pub use ensemble::{clamp_non_negative, EnsemblePrediction, EnsembleRunner};
pub use linear::{LinearModel, Link};
pub use model::{project, FeatureMatrix, Model, ModelRole};
pub use registry::ModelSet;
pub use tree::{Objective, Tree, TreeEnsemble, TreeNode};
