//! Entity Component System: components and state enums for consists.
//!
//! A consist is an entity carrying components split by concern:
//!
//! - [`Consist`]: cab roster, per-cab capacities and occupant lists
//! - [`Progress`]: location, heading and the section countdown
//! - [`DwellState`]: stop decision and dwell countdown
//! - [`Excursion`]: side-branch turn/return flags
//! - [`Reorg`]: split/merge requests and the armed manoeuvre
//! - [`Lifecycle`]: active/ended phase, scheduling eligibility, successors
//!
//! Passengers are referenced by [`PassengerId`] into the central registry;
//! merge partners by [`ConsistId`], resolved through [`ConsistIndex`].

use std::collections::BTreeMap;

use bevy_ecs::prelude::{Bundle, Component, Entity, Resource};
use serde::Serialize;

use crate::location::{Location, Stop};
use crate::passenger::{PassengerId, PassengerRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ConsistId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CabId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Ended,
}

/// Which end of the merged consist this partner forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSide {
    Front,
    Rear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePlan {
    pub partner: ConsistId,
    pub side: MergeSide,
}

/// An in-flight reorganization, realised when the section timer expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manoeuvre {
    /// Detach this many trailing cabs at the next station.
    Split(u8),
    /// Fuse with the partner at the next station.
    Merge(MergePlan),
}

/// Cab roster and passengers of one consist. The per-cab occupant lists are
/// the source of truth for who is aboard; their union is the on-board set.
#[derive(Debug, Clone, Component)]
pub struct Consist {
    pub id: ConsistId,
    pub cabs: Vec<CabId>,
    pub capacities: Vec<u16>,
    pub occupants: Vec<Vec<PassengerId>>,
}

impl Consist {
    pub fn new(id: ConsistId, cabs: Vec<CabId>, capacities: Vec<u16>) -> Self {
        debug_assert_eq!(cabs.len(), capacities.len());
        debug_assert!((1..=3).contains(&cabs.len()));
        let occupants = vec![Vec::new(); cabs.len()];
        Self {
            id,
            cabs,
            capacities,
            occupants,
        }
    }

    pub fn cab_count(&self) -> usize {
        self.cabs.len()
    }

    /// Total passenger capacity.
    pub fn capacity(&self) -> u16 {
        self.capacities.iter().sum()
    }

    /// Passengers currently aboard.
    pub fn occupancy(&self) -> u16 {
        self.occupants.iter().map(|c| c.len() as u16).sum()
    }

    pub fn remaining_capacity(&self) -> u16 {
        self.capacity() - self.occupancy()
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() >= self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    pub fn aboard(&self) -> impl Iterator<Item = PassengerId> + '_ {
        self.occupants.iter().flatten().copied()
    }

    /// Number of aboard passengers destined exactly for `stop`.
    pub fn alight_count_at(&self, stop: Stop, registry: &PassengerRegistry) -> u16 {
        self.aboard()
            .filter(|&p| registry.get(p).alight_stop == stop)
            .count() as u16
    }

    pub fn has_alighter_at(&self, stop: Stop, registry: &PassengerRegistry) -> bool {
        self.aboard().any(|p| registry.get(p).alight_stop == stop)
    }

    /// Aboard passengers destined for either branch of `anchor`:
    /// (branch 1 count, branch 2 count).
    pub fn side_drop_counts(&self, anchor: u16, registry: &PassengerRegistry) -> (u16, u16) {
        let mut counts = (0u16, 0u16);
        for p in self.aboard() {
            if let Some((a, b, _)) = registry.get(p).alight_stop.side_parts() {
                if a == anchor {
                    if b == 1 {
                        counts.0 += 1;
                    } else {
                        counts.1 += 1;
                    }
                }
            }
        }
        counts
    }

    /// Aboard passengers whose destination's main station lies in
    /// `from..to` (side destinations counted at their anchor).
    pub fn drops_between(&self, from: u16, to: u16, registry: &PassengerRegistry) -> u16 {
        self.aboard()
            .filter(|&p| {
                let m = registry.get(p).alight_stop.main_station();
                from <= m && m < to
            })
            .count() as u16
    }

    /// Sum over aboard passengers of remaining trunk stations from
    /// `station`; the "less committed first" key of the group decisions.
    pub fn sum_stations_to_go(&self, station: u16, registry: &PassengerRegistry) -> i64 {
        self.aboard()
            .map(|p| registry.get(p).alight_stop.main_station() as i64 - station as i64)
            .sum()
    }

    /// Board one passenger into the first cab with space. Returns `false`
    /// when the consist is full; callers treat that as a decision bug.
    pub fn board(&mut self, passenger: PassengerId) -> bool {
        for (cab, cap) in self.occupants.iter_mut().zip(&self.capacities) {
            if (cab.len() as u16) < *cap {
                cab.push(passenger);
                return true;
            }
        }
        false
    }

    pub fn remove(&mut self, passenger: PassengerId) -> bool {
        for cab in &mut self.occupants {
            if let Some(pos) = cab.iter().position(|&p| p == passenger) {
                cab.remove(pos);
                return true;
            }
        }
        false
    }

    /// Re-index passengers so long-haul riders sit in the front cabs and
    /// passengers alighting within `num_behind` stations concentrate in the
    /// tail cab. Stable with respect to the current aboard order, hence
    /// idempotent; per-cab capacities are always respected, with an
    /// oversized short-haul bucket spilling into the forward cabs.
    pub fn sort_passengers(&mut self, station: u16, registry: &PassengerRegistry, num_behind: i64) {
        if self.cab_count() == 1 || self.is_empty() {
            return;
        }
        let mut keyed: Vec<(i64, PassengerId)> = self
            .aboard()
            .map(|p| {
                (
                    registry.get(p).alight_stop.main_station() as i64 - station as i64,
                    p,
                )
            })
            .collect();
        keyed.sort_by_key(|&(remaining, _)| std::cmp::Reverse(remaining));

        let cut = keyed
            .iter()
            .position(|&(remaining, _)| remaining <= num_behind)
            .unwrap_or(keyed.len());
        let (long_haul, short_haul) = keyed.split_at(cut);

        let cab_count = self.cab_count();
        let mut cabs: Vec<Vec<PassengerId>> = vec![Vec::new(); cab_count];
        let mut long_iter = long_haul.iter().map(|&(_, p)| p);
        'fill: for cab in 0..cab_count - 1 {
            while (cabs[cab].len() as u16) < self.capacities[cab] {
                match long_iter.next() {
                    Some(p) => cabs[cab].push(p),
                    None => break 'fill,
                }
            }
        }

        let mut rest: Vec<PassengerId> = long_iter.chain(short_haul.iter().map(|&(_, p)| p)).collect();
        let tail_cap = self.capacities[cab_count - 1] as usize;
        let spill = rest.len().saturating_sub(tail_cap);
        for p in rest.drain(..spill) {
            let cab = (0..cab_count - 1)
                .find(|&c| cabs[c].len() < self.capacities[c] as usize)
                .expect("occupancy exceeds total capacity");
            cabs[cab].push(p);
        }
        cabs[cab_count - 1] = rest;

        debug_assert!(cabs
            .iter()
            .zip(&self.capacities)
            .all(|(cab, &cap)| cab.len() <= cap as usize));
        debug_assert_eq!(
            cabs.iter().map(Vec::len).sum::<usize>(),
            self.occupancy() as usize
        );
        self.occupants = cabs;
    }
}

/// Location, heading and the countdown across the current section.
#[derive(Debug, Clone, Copy, Component)]
pub struct Progress {
    pub location: Location,
    pub next: Location,
    pub running: bool,
    /// Seconds left in the current section (while `!location.at_station`).
    pub time_count: i64,
}

/// Dwell decision state at the current stop.
#[derive(Debug, Clone, Copy, Default, Component)]
pub struct DwellState {
    pub to_stop: bool,
    pub is_waiting: bool,
    /// Seconds of dwell remaining.
    pub stop_count: i64,
}

/// Side-branch excursion state.
#[derive(Debug, Clone, Copy, Default, Component)]
pub struct Excursion {
    /// 0 = stay on trunk, 1/2 = divert onto that branch when departing.
    pub to_turn: u8,
    pub is_returning: bool,
    /// Decided on the outbound turn: may contend for a trunk stop on return.
    pub can_return_stop: bool,
}

/// Reorganization decisions and the armed manoeuvre.
#[derive(Debug, Clone, Copy, Default, Component)]
pub struct Reorg {
    /// Raised on trunk departure; cleared once split/merge was evaluated.
    pub to_dec_trans: bool,
    pub split_request: Option<u8>,
    pub merge_request: Option<MergePlan>,
    pub armed: Option<Manoeuvre>,
}

/// Scheduling eligibility and lineage.
#[derive(Debug, Clone, Component)]
pub struct Lifecycle {
    pub phase: Phase,
    /// Participates in scheduling; parents of a realised split/merge stay
    /// registered but drop out with `able = false`.
    pub able: bool,
    pub successors: Vec<ConsistId>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            phase: Phase::Active,
            able: true,
            successors: Vec::new(),
        }
    }
}

#[derive(Bundle)]
pub struct ConsistBundle {
    pub consist: Consist,
    pub progress: Progress,
    pub dwell: DwellState,
    pub excursion: Excursion,
    pub reorg: Reorg,
    pub lifecycle: Lifecycle,
}

impl ConsistBundle {
    /// A freshly dispatched consist, arrived at station 1 and awaiting its
    /// first routing decision.
    pub fn dispatched(id: ConsistId, cabs: Vec<CabId>, capacities: Vec<u16>) -> Self {
        Self {
            consist: Consist::new(id, cabs, capacities),
            progress: Progress {
                location: Location::at(Stop::Trunk(1)),
                next: Location::beyond(Stop::Trunk(1)),
                running: false,
                time_count: 0,
            },
            dwell: DwellState::default(),
            excursion: Excursion::default(),
            reorg: Reorg::default(),
            lifecycle: Lifecycle::default(),
        }
    }

    /// A split/merge successor, instantiated at a station arrival with its
    /// partitioned passenger lists.
    pub fn successor(
        id: ConsistId,
        cabs: Vec<CabId>,
        capacities: Vec<u16>,
        occupants: Vec<Vec<PassengerId>>,
        at: Location,
    ) -> Self {
        debug_assert!(at.at_station);
        debug_assert_eq!(cabs.len(), occupants.len());
        let mut consist = Consist::new(id, cabs, capacities);
        consist.occupants = occupants;
        Self {
            consist,
            progress: Progress {
                location: at,
                next: Location::beyond(at.stop),
                running: true,
                time_count: 0,
            },
            dwell: DwellState::default(),
            excursion: Excursion::default(),
            reorg: Reorg::default(),
            lifecycle: Lifecycle::default(),
        }
    }
}

/// Registry mapping stable consist ids to their entities.
#[derive(Debug, Default, Resource)]
pub struct ConsistIndex {
    pub by_id: BTreeMap<ConsistId, Entity>,
}

impl ConsistIndex {
    pub fn entity(&self, id: ConsistId) -> Entity {
        *self
            .by_id
            .get(&id)
            .unwrap_or_else(|| panic!("unknown consist id {id:?}"))
    }
}

/// Monotonic id sources for consists and cabs.
#[derive(Debug, Default, Resource)]
pub struct FleetCounters {
    pub next_consist: u32,
    pub next_cab: u32,
}

impl FleetCounters {
    pub fn next_consist_id(&mut self) -> ConsistId {
        let id = ConsistId(self.next_consist);
        self.next_consist += 1;
        id
    }

    pub fn next_cab_ids(&mut self, count: usize) -> Vec<CabId> {
        let ids = (self.next_cab..self.next_cab + count as u32)
            .map(CabId)
            .collect();
        self.next_cab += count as u32;
        ids
    }
}
