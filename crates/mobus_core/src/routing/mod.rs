//! Per-stop routing policies.
//!
//! All decisions are taken the instant a consist reaches a stop, before the
//! dwell begins, and jointly per group of co-located consists: the systems
//! layer snapshots every member's capacity and demand, the policy functions
//! here decide against the snapshot, and the results are applied in bulk.
//! That keeps the policies pure and the capacity/fairness constraints free
//! of ordering artefacts.

pub mod baseline;
pub mod multi;
pub mod single;

use log::warn;

use crate::ecs::ConsistId;

/// Per-consist routing outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopDecision {
    pub stop: bool,
    /// 0 = stay on the trunk, 1/2 = divert to that branch on departure.
    pub turn: u8,
    pub can_return_stop: bool,
}

impl StopDecision {
    /// A trunk-only stop/skip with the member's return flag untouched.
    pub fn straight(stop: bool, can_return_stop: bool) -> Self {
        Self {
            stop,
            turn: 0,
            can_return_stop,
        }
    }
}

/// Snapshot of one co-located consist, taken before any decision applies.
#[derive(Debug, Clone)]
pub struct GroupMember {
    pub id: ConsistId,
    pub is_waiting: bool,
    pub is_returning: bool,
    pub can_return_stop: bool,
    pub to_turn: u8,
    pub occupancy: u16,
    pub capacity: u16,
    /// Aboard passengers alighting exactly at the decision stop.
    pub alight_here: u16,
    /// Remaining-station total of aboard passengers ("less committed
    /// first" ordering key).
    pub sum_stations_to_go: i64,
    /// Aboard passengers destined for branch 1 / branch 2 of this station.
    pub side_drops: (u16, u16),
}

impl GroupMember {
    pub fn is_full(&self) -> bool {
        self.occupancy >= self.capacity
    }

    pub fn residual_capacity(&self) -> u16 {
        self.capacity - self.occupancy
    }
}

/// State of one side branch as seen from its anchor.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchView {
    /// Able consists currently anywhere on the branch.
    pub present: usize,
    /// Waiting passengers over all branch stops.
    pub waiting: usize,
    /// Earliest stop-arrival among them.
    pub earliest_arrival: Option<u64>,
}

/// Decision context at a trunk station.
#[derive(Debug, Clone, Copy)]
pub struct TrunkView {
    pub station: u16,
    pub pool_len: usize,
    /// Branch 1 and branch 2 state; zeroed when the branch does not exist.
    pub branches: [BranchView; 2],
}

/// Decision context at a side stop.
#[derive(Debug, Clone, Copy)]
pub struct SideView {
    pub anchor: u16,
    pub branch: u8,
    pub order: u8,
    pub is_terminal: bool,
    pub pool_len: usize,
}

/// Shared alternate-stop resolution: estimate whether the already-stopping
/// consists absorb the waiting demand; if not, promote alternates in
/// ascending order of their remaining-station total until the residual
/// demand is covered or capacity runs out.
pub(crate) fn resolve_alternate_pool(
    must_stop: &[GroupMember],
    alternates: &[GroupMember],
    pool_len: usize,
    rate_max_stop: f64,
    station: u16,
) -> Vec<(ConsistId, bool)> {
    if pool_len == 0 {
        return alternates.iter().map(|m| (m.id, false)).collect();
    }

    let mut ordered: Vec<&GroupMember> = alternates.iter().collect();
    ordered.sort_by_key(|m| m.sum_stations_to_go);

    let mut residual = if must_stop.is_empty() {
        pool_len as f64
    } else {
        let max_num: f64 = must_stop.iter().map(|m| m.capacity as f64).sum();
        let occupancy: f64 = must_stop.iter().map(|m| m.occupancy as f64).sum();
        let alighting: f64 = must_stop.iter().map(|m| m.alight_here as f64).sum();
        let estimated = occupancy - alighting + pool_len as f64;
        if estimated < max_num * rate_max_stop {
            return alternates.iter().map(|m| (m.id, false)).collect();
        }
        warn!(
            "station {station}: stopping capacity short for {pool_len} waiting, promoting alternates"
        );
        pool_len as f64 - (max_num * rate_max_stop - occupancy + alighting)
    };

    let mut decisions = Vec::with_capacity(alternates.len());
    let mut covered = false;
    for member in ordered {
        if member.is_full() || covered {
            decisions.push((member.id, false));
        } else {
            decisions.push((member.id, true));
            residual -= member.residual_capacity() as f64;
            if residual <= 0.0 {
                covered = true;
            }
        }
    }
    decisions
}
