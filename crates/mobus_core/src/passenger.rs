//! Passenger records and the central passenger registry.
//!
//! Passengers are plain data addressed by [`PassengerId`]; consists hold ids
//! rather than references, so the step function stays a transformation over
//! the registry. A record is materialised when the demand stream delivers
//! the passenger to a waiting pool and is only mutated by board/alight
//! events and dwell-wait billing.

use bevy_ecs::prelude::Resource;
use serde::Serialize;

use crate::ecs::ConsistId;
use crate::line::Line;
use crate::location::Stop;

/// Latitude half-width of the coordinate jitter box, ≈ 500 m.
pub const LAT_JITTER_BOX: f64 = 0.005_849_09;
/// Longitude half-width of the coordinate jitter box, ≈ 1000 m.
pub const LON_JITTER_BOX: f64 = 0.008_983_11;

/// Walking distance in meters between two (lat, lon) points, using the
/// line's calibrated per-degree scale on each axis.
pub fn walk_distance_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let lat_m = (from.0 - to.0).abs() / LAT_JITTER_BOX * 500.0;
    let lon_m = (from.1 - to.1).abs() / LON_JITTER_BOX * 1000.0;
    lat_m + lon_m
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PassengerId(pub u32);

/// One passenger trip: immutable demand plus the mutable record slots the
/// engine fills in as the trip progresses.
#[derive(Debug, Clone, Serialize)]
pub struct Passenger {
    pub id: PassengerId,
    /// Jittered origin coordinate (lat, lon).
    pub origin: (f64, f64),
    /// Jittered destination coordinate (lat, lon).
    pub destination: (f64, f64),
    /// Stop the passenger walks to and boards at.
    pub board_stop: Stop,
    /// Stop the passenger wants to alight at.
    pub alight_stop: Stop,
    /// Trip was routed to a side-branch variant by the loader.
    pub side_trip: bool,
    /// Instant the passenger reaches `board_stop`.
    pub arrived_at: u64,

    pub boarded_at: Option<u64>,
    pub alighted_at: Option<u64>,
    /// Where the passenger actually got off (the anchor station when a
    /// side-destined trip is dropped on the trunk instead).
    pub actual_alight: Option<Stop>,
    /// Consist currently carrying the passenger.
    pub aboard: Option<ConsistId>,
    /// Seconds spent held aboard during intermediate dwells.
    pub dwell_wait_s: u64,
}

impl Passenger {
    pub fn is_alighted(&self) -> bool {
        self.alighted_at.is_some()
    }

    /// Bill a dwell the passenger sat through without alighting.
    pub fn add_dwell_wait(&mut self, seconds: u64) {
        self.dwell_wait_s += seconds;
    }

    /// Derived per-trip timings; `None` until the passenger has alighted.
    pub fn journey_stats(&self, line: &Line, walk_speed_ms: f64) -> Option<JourneyStats> {
        let boarded_at = self.boarded_at?;
        let alighted_at = self.alighted_at?;
        debug_assert!(self.arrived_at <= boarded_at && boarded_at <= alighted_at);

        let walk_on_m = walk_distance_m(self.origin, line.stop_coords(self.board_stop));
        let off_stop = self.actual_alight.unwrap_or(self.alight_stop);
        let walk_off_m = walk_distance_m(self.destination, line.stop_coords(off_stop));
        let walk_on_s = (walk_on_m / walk_speed_ms) as u64;
        let walk_off_s = (walk_off_m / walk_speed_ms) as u64;

        Some(JourneyStats {
            walk_on_m,
            walk_off_m,
            walk_on_s,
            walk_off_s,
            in_vehicle_s: alighted_at - boarded_at,
            station_wait_s: boarded_at - self.arrived_at,
            dwell_wait_s: self.dwell_wait_s,
            full_journey_s: (alighted_at + walk_off_s) - (self.arrived_at - walk_on_s.min(self.arrived_at)),
        })
    }
}

/// Derived statistics for one completed trip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JourneyStats {
    pub walk_on_m: f64,
    pub walk_off_m: f64,
    pub walk_on_s: u64,
    pub walk_off_s: u64,
    pub in_vehicle_s: u64,
    pub station_wait_s: u64,
    pub dwell_wait_s: u64,
    pub full_journey_s: u64,
}

/// Central registry: `PassengerId` is the index of the record.
#[derive(Debug, Default, Resource)]
pub struct PassengerRegistry {
    passengers: Vec<Passenger>,
}

impl PassengerRegistry {
    /// Register a new passenger; the caller fills only demand fields.
    pub fn materialize(
        &mut self,
        origin: (f64, f64),
        destination: (f64, f64),
        board_stop: Stop,
        alight_stop: Stop,
        side_trip: bool,
        arrived_at: u64,
    ) -> PassengerId {
        let id = PassengerId(self.passengers.len() as u32);
        self.passengers.push(Passenger {
            id,
            origin,
            destination,
            board_stop,
            alight_stop,
            side_trip,
            arrived_at,
            boarded_at: None,
            alighted_at: None,
            actual_alight: None,
            aboard: None,
            dwell_wait_s: 0,
        });
        id
    }

    pub fn get(&self, id: PassengerId) -> &Passenger {
        &self.passengers[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: PassengerId) -> &mut Passenger {
        &mut self.passengers[id.0 as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Passenger> {
        self.passengers.iter()
    }

    pub fn len(&self) -> usize {
        self.passengers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passengers.is_empty()
    }

    /// True when every materialised passenger has an alight time.
    pub fn all_alighted(&self) -> bool {
        self.passengers.iter().all(Passenger::is_alighted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_metric_matches_calibration() {
        let a = (31.0, 121.0);
        let b = (31.0 + LAT_JITTER_BOX, 121.0);
        assert!((walk_distance_m(a, b) - 500.0).abs() < 1e-6);
        let c = (31.0, 121.0 + LON_JITTER_BOX);
        assert!((walk_distance_m(a, c) - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn registry_assigns_sequential_ids() {
        let mut reg = PassengerRegistry::default();
        let a = reg.materialize((0.0, 0.0), (0.0, 0.0), Stop::Trunk(1), Stop::Trunk(2), false, 100);
        let b = reg.materialize((0.0, 0.0), (0.0, 0.0), Stop::Trunk(1), Stop::Trunk(3), false, 120);
        assert_eq!(a, PassengerId(0));
        assert_eq!(b, PassengerId(1));
        assert!(!reg.all_alighted());

        reg.get_mut(a).boarded_at = Some(150);
        reg.get_mut(a).alighted_at = Some(300);
        reg.get_mut(b).boarded_at = Some(150);
        reg.get_mut(b).alighted_at = Some(400);
        assert!(reg.all_alighted());
    }
}
