pub mod batch;
pub mod features;
pub mod forecast;
pub mod panel;
pub mod scenarios;
pub mod telemetry;
pub mod util;
