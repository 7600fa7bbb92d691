//! Test helpers: line, trip and scenario builders shared across test files.

use crate::line::StationSpec;
use crate::demand::TripRecord;
use crate::scenario::{ScenarioParams, SimConstants};

/// Evenly spaced trunk stations with ids 1..=n.
pub fn stations_along(n: usize) -> Vec<StationSpec> {
    (0..n)
        .map(|i| StationSpec {
            id: i as u32 + 1,
            lat: 31.0,
            lon: 121.0 + 0.05 * i as f64,
        })
        .collect()
}

/// A trip record boarding at the centroid of `up` and alighting at the
/// centroid of `down` (station ids), with an HHMMSS departure time.
pub fn trip(stations: &[StationSpec], hms: u64, up: u32, down: u32) -> TripRecord {
    let find = |id: u32| {
        stations
            .iter()
            .find(|s| s.id == id)
            .unwrap_or_else(|| panic!("test trip references unknown station {id}"))
    };
    let (up_station, down_station) = (find(up), find(down));
    TripRecord {
        depart_time: 20191015_000000 + hms,
        direction: 0,
        up_station: up,
        down_station: down,
        up_lat: up_station.lat,
        up_lon: up_station.lon,
        down_lat: down_station.lat,
        down_lon: down_station.lon,
    }
}

/// Constants trimmed for focused engine tests: deterministic arrivals (no
/// jitter), a single forced dispatch window and an immediate soft end.
pub fn single_dispatch_constants() -> SimConstants {
    let mut constants = SimConstants::default();
    constants.max_station_wait_s = 0;
    constants.last_bus_t = constants.sim_start_t;
    constants.sim_end_t = constants.sim_start_t + 2;
    constants
}

/// A baseline scenario over `n` stations with uniform 1 km sections at
/// 10 m/s.
pub fn uniform_line_params(n: usize, trips: Vec<TripRecord>) -> ScenarioParams {
    ScenarioParams::new(
        stations_along(n),
        vec![1000.0; n - 1],
        vec![10.0; n - 1],
        trips,
    )
}

/// Hour-indexed dispatch tables with a constant headway and cab count.
pub fn flat_tables(headway_s: u64, cabs: u8) -> (Vec<u64>, Vec<u8>) {
    (vec![headway_s; 24], vec![cabs; 24])
}
