pub mod apply;
pub mod spec;

pub use apply::{is_overridable, ScenarioOverrides};
pub use spec::{
    load_spec_from_path, resolve_scenarios, validate, ResolvedScenario, ScenarioDefaults,
    ScenarioSet, ScenarioSpec,
};
