//! Cab ledger: per-cab lifetime record feeding energy and occupancy stats.
//!
//! A cab is the physical unit; it survives splits and merges, so distance
//! and departure telemetry accumulate here rather than on consists.

use std::collections::BTreeMap;

use bevy_ecs::prelude::Resource;
use serde::Serialize;

use crate::ecs::CabId;

/// One stop departure: when it left and how many passengers rode this cab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Departure {
    pub at: u64,
    pub occupants: u16,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CabRecord {
    pub distance_m: f64,
    pub dispatched_at: u64,
    pub ended_at: Option<u64>,
    pub departures: Vec<Departure>,
}

impl CabRecord {
    /// Mean occupants over all recorded departures.
    pub fn mean_occupants(&self) -> Option<f64> {
        if self.departures.is_empty() {
            return None;
        }
        let sum: u64 = self.departures.iter().map(|d| d.occupants as u64).sum();
        Some(sum as f64 / self.departures.len() as f64)
    }

    pub fn peak_occupants(&self) -> u16 {
        self.departures.iter().map(|d| d.occupants).max().unwrap_or(0)
    }

    pub fn first_departure_at(&self) -> Option<u64> {
        self.departures.first().map(|d| d.at)
    }
}

/// Ledger over every physical cab ever dispatched.
#[derive(Debug, Default, Resource)]
pub struct CabLedger {
    cabs: BTreeMap<CabId, CabRecord>,
}

impl CabLedger {
    pub fn open(&mut self, cab: CabId, dispatched_at: u64) {
        let prior = self.cabs.insert(
            cab,
            CabRecord {
                distance_m: 0.0,
                dispatched_at,
                ended_at: None,
                departures: Vec::new(),
            },
        );
        debug_assert!(prior.is_none(), "cab id dispatched twice");
    }

    pub fn add_distance(&mut self, cabs: &[CabId], meters: f64) {
        for cab in cabs {
            self.cabs
                .get_mut(cab)
                .expect("distance for unknown cab")
                .distance_m += meters;
        }
    }

    pub fn record_departure(&mut self, cab: CabId, at: u64, occupants: u16) {
        self.cabs
            .get_mut(&cab)
            .expect("departure for unknown cab")
            .departures
            .push(Departure { at, occupants });
    }

    pub fn close(&mut self, cabs: &[CabId], at: u64) {
        for cab in cabs {
            self.cabs.get_mut(cab).expect("closing unknown cab").ended_at = Some(at);
        }
    }

    pub fn get(&self, cab: CabId) -> &CabRecord {
        &self.cabs[&cab]
    }

    pub fn iter(&self) -> impl Iterator<Item = (CabId, &CabRecord)> {
        self.cabs.iter().map(|(&id, rec)| (id, rec))
    }

    pub fn len(&self) -> usize {
        self.cabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cabs.is_empty()
    }

    pub fn total_distance_m(&self) -> f64 {
        self.cabs.values().map(|c| c.distance_m).sum()
    }
}
