//! Scenario assembly: parameters, calibrated constants and world building.

mod build;
mod params;

pub use build::build_scenario;
pub use params::{ModeConfig, ScenarioParams, SimConstants, SimMode, SimRng, TurnRule};
