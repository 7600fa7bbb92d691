//! # Modular-Bus Transit Simulation Core
//!
//! A fixed-step simulation engine for evaluating modular-bus operating
//! regimes on a single transit line.
//!
//! ## Overview
//!
//! This crate provides the core simulation engine, including:
//!
//! - **Fixed-Step Clock**: second-precision tick advance with soft and hard
//!   end times
//! - **ECS Framework**: Entity Component System holding the fleet of consists
//! - **Routing Policies**: per-stop group decisions for the baseline, single
//!   modular and side-branch (multi) operating regimes
//! - **Reorganization**: post-departure split/merge decisions for modular
//!   consists
//! - **Statistics**: passenger and fleet aggregates per run, parquet export
//!
//! ## Key Concepts
//!
//! - **Consist**: an ordered sequence of 1..=3 cabs routed as one vehicle;
//!   consists can split into two or merge with a neighbour between stops
//! - **Deterministic**: one seeded RNG drives all jitter and tie-breaks, so
//!   identical inputs reproduce identical statistics
//! - **Share-nothing runs**: a simulation is one `World`; callers may run
//!   many worlds in parallel
//!
//! ## Example
//!
//! ```rust,no_run
//! use bevy_ecs::prelude::World;
//! use mobus_core::scenario::{build_scenario, ScenarioParams, SimMode};
//! use mobus_core::runner::{run_to_completion, simulation_schedule};
//! use mobus_core::stats::get_statistics;
//!
//! # fn scenario_params() -> ScenarioParams { unimplemented!() }
//! let mut world = World::new();
//! build_scenario(&mut world, scenario_params().with_mode(SimMode::Single)).unwrap();
//!
//! let mut schedule = simulation_schedule();
//! let ticks = run_to_completion(&mut world, &mut schedule);
//! let stats = get_statistics(&mut world);
//! ```

pub mod clock;
pub mod demand;
pub mod dispatch;
pub mod ecs;
pub mod error;
pub mod ledger;
pub mod line;
pub mod location;
pub mod passenger;
pub mod reorg;
pub mod routing;
pub mod runner;
pub mod scenario;
pub mod stats;
pub mod systems;
pub mod telemetry_export;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
