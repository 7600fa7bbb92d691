//! Construction-time validation errors.
//!
//! A scenario with inconsistent inputs never produces a partial run: every
//! mismatch is reported from [`crate::scenario::build_scenario`] before any
//! engine state is created. Runtime invariant violations are bugs and abort
//! the run via assertions instead.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScenarioError {
    #[error("line needs at least 2 stations, got {0}")]
    TooFewStations(usize),

    #[error("expected {expected} inter-station distances, got {got}")]
    DistanceLengthMismatch { expected: usize, got: usize },

    #[error("expected {expected} section speeds, got {got}")]
    SpeedLengthMismatch { expected: usize, got: usize },

    #[error("section speed at index {0} must be positive")]
    NonPositiveSpeed(usize),

    #[error("section distance at index {0} must be positive")]
    NonPositiveDistance(usize),

    #[error("dispatch table `{name}` covers {got} hours, need at least {need}")]
    DispatchTableTooShort {
        name: &'static str,
        got: usize,
        need: usize,
    },

    #[error("side branch anchored at unknown station id {0}")]
    UnknownBranchAnchor(u32),

    #[error("side branch ({anchor}, {branch}) appears twice")]
    DuplicateBranch { anchor: u32, branch: u8 },

    #[error("side branch id must be 1 or 2, got {0}")]
    BadBranchId(u8),

    #[error("side branch segmentation must be at least 2, got {0}")]
    BadSegmentCount(u8),

    #[error("tick length must be positive")]
    ZeroTick,
}
