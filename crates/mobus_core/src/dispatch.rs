//! Dispatch policy: when a new consist leaves the depot and with how many
//! cabs.
//!
//! Baseline dispatches one large cab at a fixed headway. The modular modes
//! consult two hour-indexed tables: a dispatch is permitted when the hour's
//! minimum headway has elapsed since the last departure and the last-bus
//! time has not passed; the hour's cab count (clamped to 1..=3) rides out.
//! A first dispatch is forced at simulation start regardless of tables.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::clock::ONE_HOUR_S;
use crate::error::ScenarioError;
use crate::scenario::{SimConstants, SimMode};

/// Hour-indexed dispatch plan (modular modes).
#[derive(Debug, Clone, Resource, Serialize, Deserialize)]
pub struct DispatchTables {
    pub headway_s: Vec<u64>,
    pub cab_count: Vec<u8>,
}

impl DispatchTables {
    /// Tables must cover a full service day.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.headway_s.len() < 24 {
            return Err(ScenarioError::DispatchTableTooShort {
                name: "dep_duration",
                got: self.headway_s.len(),
                need: 24,
            });
        }
        if self.cab_count.len() < 24 {
            return Err(ScenarioError::DispatchTableTooShort {
                name: "dep_num",
                got: self.cab_count.len(),
                need: 24,
            });
        }
        Ok(())
    }
}

/// Time of the most recent dispatch, if any.
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct DispatchState {
    pub last_departure: Option<u64>,
}

/// What to dispatch: how many cabs, each of which capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOrder {
    pub cab_count: u8,
    pub cab_capacity: u16,
}

/// Is a dispatch permitted at `now`?
pub fn can_depart(
    mode: SimMode,
    tables: &DispatchTables,
    state: &DispatchState,
    constants: &SimConstants,
    now: u64,
) -> bool {
    if now > constants.last_bus_t {
        return false;
    }
    let Some(last) = state.last_departure else {
        // forced first dispatch
        return true;
    };
    if mode.is_modular() {
        let hour = (now / ONE_HOUR_S) as usize;
        if hour >= tables.headway_s.len() {
            return false;
        }
        let headway = tables.headway_s[hour];
        // zero entries mean no service this hour
        headway > 0 && tables.cab_count[hour] > 0 && now - last >= headway
    } else {
        now - last >= constants.baseline_headway_s
    }
}

/// The dispatch composition at `now`.
pub fn decide(
    mode: SimMode,
    tables: &DispatchTables,
    constants: &SimConstants,
    now: u64,
) -> DispatchOrder {
    if mode.is_modular() {
        let hour = ((now / ONE_HOUR_S) as usize).min(tables.cab_count.len().saturating_sub(1));
        DispatchOrder {
            cab_count: tables.cab_count[hour].clamp(1, 3),
            cab_capacity: constants.small_cab_capacity,
        }
    } else {
        DispatchOrder {
            cab_count: 1,
            cab_capacity: constants.large_cab_capacity,
        }
    }
}
