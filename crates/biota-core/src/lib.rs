//! # biota-core: panel records and shared error types
//!
//! The forecasting workspace operates on a grid × month panel of environmental
//! and biodiversity observations. This crate holds the pieces every other
//! crate shares:
//!
//! - [`ObservationRow`] / [`Variable`] - typed panel records and their column names
//! - [`Panel`] - the sorted, de-duplicated in-memory panel store
//! - [`month`] - month-end normalization helpers for the monthly key
//! - [`BiotaError`] - the domain error taxonomy

pub mod error;
pub mod month;
pub mod panel;
pub mod schema;

pub use error::{BiotaError, BiotaResult};
pub use month::{end_of_month, normalize_months, parse_month, shift_months};
pub use panel::{normalize_rows, DedupReport, Panel};
pub use schema::{
    Biodiversity, DynamicVars, GridId, ObservationRow, StaticAttributes, Variable, VariableKind,
    GEOMETRY_COLUMN, GRID_ID_COLUMN, HAS_RICHNESS_COLUMN, PRESENCE_PROB_COLUMN, TIMESTAMP_COLUMN,
};
