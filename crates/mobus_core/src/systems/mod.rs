//! Per-tick systems, one file per phase of the tick pipeline.
//!
//! The runner chains them in a fixed order: dispatch, passenger arrivals,
//! routing decisions, consist stepping, reorganization. Routing completes
//! before any consist steps so group decisions observe a consistent
//! snapshot; reorganization runs after stepping so `to_dec_trans` reflects
//! the departure just executed.

pub mod arrivals;
pub mod dispatch;
pub mod reorg;
pub mod routing;
pub mod stepping;

pub use arrivals::passenger_arrival_system;
pub use dispatch::dispatch_system;
pub use reorg::reorg_decision_system;
pub use routing::routing_decision_system;
pub use stepping::step_consists_system;
