//! Line model: trunk stations, side branches and their waiting pools.
//!
//! The line owns every insertion-ordered waiting pool; boarding consumes
//! from the head. Side branches are anchored at a trunk station and carry
//! K-1 uniform segments, interpolated between the branch start and end
//! coordinates, each travelled at the anchor's section speed.

use std::collections::{BTreeMap, VecDeque};

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;
use crate::location::Stop;
use crate::passenger::{walk_distance_m, PassengerId, PassengerRegistry};

/// One trunk station as supplied by the station table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationSpec {
    /// External station identifier (as used by trip records).
    pub id: u32,
    pub lat: f64,
    pub lon: f64,
}

/// One side branch as supplied by the branch table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideBranchSpec {
    /// External id of the anchoring trunk station.
    pub anchor_station: u32,
    /// Branch orientation, 1 or 2.
    pub branch: u8,
    pub start: (f64, f64),
    pub end: (f64, f64),
}

/// A side-branch stop with its waiting pool.
#[derive(Debug, Clone, Default)]
pub struct SideStop {
    pub lat: f64,
    pub lon: f64,
    pub pool: VecDeque<PassengerId>,
}

/// A side branch: K-1 stops at uniform spacing beyond the anchor.
#[derive(Debug, Clone)]
pub struct SideBranch {
    pub anchor: u16,
    pub branch: u8,
    pub segment_len_m: f64,
    pub segment_time_s: i64,
    /// Stops in order 1..=K-1 (index 0 is order 1).
    stops: Vec<SideStop>,
}

impl SideBranch {
    /// Highest stop order on this branch (K-1).
    pub fn last_order(&self) -> u8 {
        self.stops.len() as u8
    }

    pub fn stop(&self, order: u8) -> &SideStop {
        &self.stops[order as usize - 1]
    }

    pub fn stop_mut(&mut self, order: u8) -> &mut SideStop {
        &mut self.stops[order as usize - 1]
    }

    pub fn stops(&self) -> impl Iterator<Item = (u8, &SideStop)> {
        self.stops
            .iter()
            .enumerate()
            .map(|(i, s)| (i as u8 + 1, s))
    }

    /// Total passengers waiting anywhere on the branch.
    pub fn waiting_total(&self) -> usize {
        self.stops.iter().map(|s| s.pool.len()).sum()
    }

    /// Earliest stop-arrival time among waiting passengers, if any.
    pub fn earliest_waiting_arrival(&self, registry: &PassengerRegistry) -> Option<u64> {
        self.stops
            .iter()
            .flat_map(|s| s.pool.iter())
            .map(|&p| registry.get(p).arrived_at)
            .min()
    }

    /// Any passenger waiting strictly beyond `order`?
    pub fn waiting_beyond(&self, order: u8) -> bool {
        self.stops[order as usize..].iter().any(|s| !s.pool.is_empty())
    }
}

/// The transit line for one direction.
#[derive(Debug, Resource)]
pub struct Line {
    stations: Vec<StationSpec>,
    dist_m: Vec<f64>,
    speed_ms: Vec<f64>,
    pools: Vec<VecDeque<PassengerId>>,
    branches: BTreeMap<(u16, u8), SideBranch>,
}

impl Line {
    pub fn new(
        stations: Vec<StationSpec>,
        dist_m: Vec<f64>,
        speed_ms: Vec<f64>,
        branch_specs: &[SideBranchSpec],
        segments_k: u8,
    ) -> Result<Self, ScenarioError> {
        if stations.len() < 2 {
            return Err(ScenarioError::TooFewStations(stations.len()));
        }
        let sections = stations.len() - 1;
        if dist_m.len() != sections {
            return Err(ScenarioError::DistanceLengthMismatch {
                expected: sections,
                got: dist_m.len(),
            });
        }
        if speed_ms.len() != sections {
            return Err(ScenarioError::SpeedLengthMismatch {
                expected: sections,
                got: speed_ms.len(),
            });
        }
        for (i, &d) in dist_m.iter().enumerate() {
            if d <= 0.0 {
                return Err(ScenarioError::NonPositiveDistance(i));
            }
        }
        for (i, &v) in speed_ms.iter().enumerate() {
            if v <= 0.0 {
                return Err(ScenarioError::NonPositiveSpeed(i));
            }
        }
        if !branch_specs.is_empty() && segments_k < 2 {
            return Err(ScenarioError::BadSegmentCount(segments_k));
        }

        let pools = vec![VecDeque::new(); stations.len()];
        let mut line = Self {
            stations,
            dist_m,
            speed_ms,
            pools,
            branches: BTreeMap::new(),
        };
        for spec in branch_specs {
            line.attach_branch(spec, segments_k)?;
        }
        Ok(line)
    }

    fn attach_branch(&mut self, spec: &SideBranchSpec, segments_k: u8) -> Result<(), ScenarioError> {
        if !(1..=2).contains(&spec.branch) {
            return Err(ScenarioError::BadBranchId(spec.branch));
        }
        let anchor = self
            .stations
            .iter()
            .position(|s| s.id == spec.anchor_station)
            .map(|i| i as u16 + 1)
            .ok_or(ScenarioError::UnknownBranchAnchor(spec.anchor_station))?;
        if self.branches.contains_key(&(anchor, spec.branch)) {
            return Err(ScenarioError::DuplicateBranch {
                anchor: spec.anchor_station,
                branch: spec.branch,
            });
        }

        let stop_count = segments_k as usize - 1;
        let (lat0, lon0) = spec.start;
        let (lat1, lon1) = spec.end;
        let stops = (1..=stop_count)
            .map(|i| {
                let f = i as f64 / stop_count as f64;
                SideStop {
                    lat: lat0 + (lat1 - lat0) * f,
                    lon: lon0 + (lon1 - lon0) * f,
                    pool: VecDeque::new(),
                }
            })
            .collect();
        let segment_len_m = walk_distance_m(spec.start, spec.end) / stop_count as f64;
        let speed = self.anchor_speed_ms(anchor);
        let segment_time_s = ((segment_len_m / speed) as i64).max(1);

        self.branches.insert(
            (anchor, spec.branch),
            SideBranch {
                anchor,
                branch: spec.branch,
                segment_len_m,
                segment_time_s,
                stops,
            },
        );
        Ok(())
    }

    pub fn station_count(&self) -> u16 {
        self.stations.len() as u16
    }

    pub fn last_station(&self) -> u16 {
        self.station_count()
    }

    pub fn station(&self, station: u16) -> &StationSpec {
        &self.stations[station as usize - 1]
    }

    pub fn stations(&self) -> &[StationSpec] {
        &self.stations
    }

    /// 1-based position of a station by its external id.
    pub fn station_by_id(&self, id: u32) -> Option<u16> {
        self.stations
            .iter()
            .position(|s| s.id == id)
            .map(|i| i as u16 + 1)
    }

    /// Nearest trunk station to a coordinate, by the walking metric.
    pub fn nearest_station(&self, pos: (f64, f64)) -> u16 {
        let mut best = (1u16, f64::INFINITY);
        for (i, s) in self.stations.iter().enumerate() {
            let d = walk_distance_m(pos, (s.lat, s.lon));
            if d < best.1 {
                best = (i as u16 + 1, d);
            }
        }
        best.0
    }

    /// Length in meters of the section leaving `from` (towards `from + 1`).
    pub fn section_distance_m(&self, from: u16) -> f64 {
        self.dist_m[from as usize - 1]
    }

    /// Speed in m/s of the section leaving `from`.
    pub fn section_speed_ms(&self, from: u16) -> f64 {
        self.speed_ms[from as usize - 1]
    }

    /// Speed governing a station's side branches: the outgoing section's
    /// speed, or the inbound one at the terminus.
    pub fn anchor_speed_ms(&self, anchor: u16) -> f64 {
        let idx = (anchor as usize - 1).min(self.speed_ms.len() - 1);
        self.speed_ms[idx]
    }

    pub fn pool(&self, station: u16) -> &VecDeque<PassengerId> {
        &self.pools[station as usize - 1]
    }

    pub fn pool_mut(&mut self, station: u16) -> &mut VecDeque<PassengerId> {
        &mut self.pools[station as usize - 1]
    }

    pub fn branch(&self, anchor: u16, branch: u8) -> Option<&SideBranch> {
        self.branches.get(&(anchor, branch))
    }

    pub fn branch_mut(&mut self, anchor: u16, branch: u8) -> Option<&mut SideBranch> {
        self.branches.get_mut(&(anchor, branch))
    }

    pub fn branches(&self) -> impl Iterator<Item = &SideBranch> {
        self.branches.values()
    }

    pub fn has_branches(&self) -> bool {
        !self.branches.is_empty()
    }

    /// Waiting pool at any stop.
    pub fn pool_at(&self, stop: Stop) -> &VecDeque<PassengerId> {
        match stop {
            Stop::Trunk(s) => self.pool(s),
            Stop::Side {
                anchor,
                branch,
                order,
            } => {
                &self
                    .branch(anchor, branch)
                    .expect("side stop on unknown branch")
                    .stop(order)
                    .pool
            }
        }
    }

    pub fn pool_at_mut(&mut self, stop: Stop) -> &mut VecDeque<PassengerId> {
        match stop {
            Stop::Trunk(s) => self.pool_mut(s),
            Stop::Side {
                anchor,
                branch,
                order,
            } => {
                &mut self
                    .branches
                    .get_mut(&(anchor, branch))
                    .expect("side stop on unknown branch")
                    .stop_mut(order)
                    .pool
            }
        }
    }

    /// Coordinates of any stop.
    pub fn stop_coords(&self, stop: Stop) -> (f64, f64) {
        match stop {
            Stop::Trunk(s) => {
                let st = self.station(s);
                (st.lat, st.lon)
            }
            Stop::Side {
                anchor,
                branch,
                order,
            } => {
                let st = self
                    .branch(anchor, branch)
                    .expect("side stop on unknown branch")
                    .stop(order);
                (st.lat, st.lon)
            }
        }
    }

    /// Free-running time between two trunk stations, the per-passenger
    /// theoretical optimum used for benchmarking.
    pub fn free_run_time_s(&self, from: u16, to: u16) -> u64 {
        (from..to)
            .map(|s| (self.section_distance_m(s) / self.section_speed_ms(s)) as u64 + 1)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_stations(n: usize) -> Vec<StationSpec> {
        (0..n)
            .map(|i| StationSpec {
                id: 100 + i as u32,
                lat: 31.0,
                lon: 121.0 + i as f64 * 0.01,
            })
            .collect()
    }

    #[test]
    fn validates_table_lengths() {
        let err = Line::new(straight_stations(3), vec![500.0], vec![10.0, 10.0], &[], 5);
        assert_eq!(
            err.err(),
            Some(ScenarioError::DistanceLengthMismatch {
                expected: 2,
                got: 1
            })
        );
        let err = Line::new(
            straight_stations(3),
            vec![500.0, 500.0],
            vec![10.0, 0.0],
            &[],
            5,
        );
        assert_eq!(err.err(), Some(ScenarioError::NonPositiveSpeed(1)));
    }

    #[test]
    fn branch_stops_interpolate_uniformly() {
        let stations = straight_stations(4);
        let anchor_id = stations[2].id;
        let spec = SideBranchSpec {
            anchor_station: anchor_id,
            branch: 1,
            start: (31.0, 121.02),
            end: (31.0 + 4.0 * LAT_STEP, 121.02),
        };
        let line = Line::new(
            stations,
            vec![800.0, 800.0, 800.0],
            vec![10.0, 10.0, 10.0],
            &[spec],
            5,
        )
        .unwrap();
        let branch = line.branch(3, 1).unwrap();
        assert_eq!(branch.last_order(), 4);
        assert!((branch.stop(4).lat - (31.0 + 4.0 * LAT_STEP)).abs() < 1e-9);
        // four uniform segments of ~500 m each
        assert!((branch.segment_len_m - 500.0).abs() < 1.0);
        assert_eq!(branch.segment_time_s, 50);
    }

    const LAT_STEP: f64 = crate::passenger::LAT_JITTER_BOX;

    #[test]
    fn unknown_anchor_is_rejected() {
        let spec = SideBranchSpec {
            anchor_station: 999,
            branch: 1,
            start: (0.0, 0.0),
            end: (1.0, 1.0),
        };
        let err = Line::new(
            straight_stations(3),
            vec![500.0, 500.0],
            vec![10.0, 10.0],
            &[spec],
            5,
        );
        assert_eq!(err.err(), Some(ScenarioError::UnknownBranchAnchor(999)));
    }
}
