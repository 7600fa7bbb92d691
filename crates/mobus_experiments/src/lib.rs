//! Parallel experimentation framework for dispatch-plan sweeps.
//!
//! This crate runs many simulations in parallel with varying hourly
//! dispatch plans, collects per-run statistics and exports the results:
//! the unit of work an outer-loop plan optimizer builds on.
//!
//! # Quick Start
//!
//! ```no_run
//! use mobus_experiments::{run_parallel_experiments, PlanSpace, ScenarioBase};
//!
//! # fn scenario_base() -> ScenarioBase { unimplemented!() }
//! let base = scenario_base();
//!
//! // grid over headway scalings and cab counts
//! let plans = PlanSpace::grid()
//!     .headway_scales(vec![0.8, 1.0, 1.2])
//!     .cab_counts(vec![1, 2, 3])
//!     .seeds(vec![42])
//!     .generate(&base);
//!
//! let results = run_parallel_experiments(&base, &plans, true);
//! let best = mobus_experiments::find_best_result_index(&results);
//! ```
//!
//! # Architecture
//!
//! - [`parameters`]: plan grid generation
//! - [`runner`]: parallel share-nothing execution using rayon
//! - [`metrics`]: one flat row per run
//! - [`export`]: CSV/JSON export and feasible-minimum ranking

pub mod export;
pub mod metrics;
pub mod parameters;
pub mod runner;

pub use export::{export_to_csv, export_to_json, find_best_result_index};
pub use metrics::SimulationRow;
pub use parameters::{PlanSet, PlanSpace, ScenarioBase};
pub use runner::{run_parallel_experiments, run_single_simulation};
