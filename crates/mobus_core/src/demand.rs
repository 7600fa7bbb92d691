//! Demand stream builder: turns raw trip records into a time-sorted arrival
//! stream.
//!
//! Each record's timestamp yields a raw arrival instant, pulled earlier by a
//! uniform jitter in [0, max_station_wait); origin and destination
//! coordinates are jittered uniformly in a bounded box around the station
//! centroid. In the multi modes, trips are re-anchored to the nearest of the
//! station and its side-branch stops, shifting the arrival instant by the
//! walking-time differential. `multi_order` additionally gates the
//! reassignment behind a per-interval crowding mark.

use bevy_ecs::prelude::Resource;
use log::info;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::line::Line;
use crate::location::Stop;
use crate::passenger::{walk_distance_m, LAT_JITTER_BOX, LON_JITTER_BOX};
use crate::scenario::{SimConstants, SimMode};

/// One raw trip as parsed from the source table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    /// Raw boarding timestamp; the trailing six decimal digits are HHMMSS.
    pub depart_time: u64,
    pub direction: u8,
    /// External id of the boarding station.
    pub up_station: u32,
    /// External id of the alighting station.
    pub down_station: u32,
    pub up_lat: f64,
    pub up_lon: f64,
    pub down_lat: f64,
    pub down_lon: f64,
}

impl TripRecord {
    /// Seconds after midnight encoded in the timestamp.
    pub fn depart_secs(&self) -> u64 {
        let hms = self.depart_time % 1_000_000;
        let (h, m, s) = (hms / 10_000, (hms % 10_000) / 100, hms % 100);
        h * 3600 + m * 60 + s
    }
}

/// One materialisable passenger arrival.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandEntry {
    pub arrive_t: u64,
    pub origin: (f64, f64),
    pub destination: (f64, f64),
    pub board_stop: Stop,
    pub alight_stop: Stop,
    pub side_trip: bool,
}

/// The sorted arrival stream with the engine's read cursor.
#[derive(Debug, Default, Resource)]
pub struct DemandStream {
    pub entries: Vec<DemandEntry>,
    pub cursor: usize,
}

impl DemandStream {
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.entries.len()
    }

    pub fn remaining(&self) -> usize {
        self.entries.len() - self.cursor
    }
}

/// Build the demand stream for one run. Draws all of its randomness from
/// `rng` in record order, so a fixed seed reproduces the stream exactly.
pub fn build_demand(
    records: &[TripRecord],
    line: &Line,
    mode: SimMode,
    constants: &SimConstants,
    direction: u8,
    rng: &mut StdRng,
) -> DemandStream {
    let mut raw: Vec<DemandEntry> = Vec::new();
    for record in records.iter().filter(|r| r.direction == direction) {
        let jitter = if constants.max_station_wait_s > 0 {
            rng.gen_range(0..constants.max_station_wait_s)
        } else {
            0
        };
        let arrive_t = record.depart_secs().saturating_sub(jitter);
        let origin = jitter_position(rng, (record.up_lat, record.up_lon));
        let destination = jitter_position(rng, (record.down_lat, record.down_lon));

        let board = resolve_station(line, record.up_station, (record.up_lat, record.up_lon));
        let alight = resolve_station(line, record.down_station, (record.down_lat, record.down_lon));

        raw.push(DemandEntry {
            arrive_t,
            origin,
            destination,
            board_stop: Stop::Trunk(board),
            alight_stop: Stop::Trunk(alight),
            side_trip: false,
        });
    }

    if mode.has_branches() && line.has_branches() {
        let marked = match mode {
            SimMode::MultiOrder => crowding_marks(&raw, constants),
            _ => vec![true; raw.len()],
        };
        for (entry, marked) in raw.iter_mut().zip(marked) {
            if marked {
                reassign_to_side(entry, line, constants);
            }
        }
    }

    raw.sort_by_key(|e| e.arrive_t);
    DemandStream {
        entries: raw,
        cursor: 0,
    }
}

fn jitter_position(rng: &mut StdRng, center: (f64, f64)) -> (f64, f64) {
    (
        center.0 + rng.gen_range(-1.0..1.0) * LAT_JITTER_BOX,
        center.1 + rng.gen_range(-1.0..1.0) * LON_JITTER_BOX,
    )
}

/// Match a record's station id against the table, falling back to the
/// nearest station by coordinates for anomalous records.
fn resolve_station(line: &Line, station_id: u32, pos: (f64, f64)) -> u16 {
    match line.station_by_id(station_id) {
        Some(s) => s,
        None => {
            let nearest = line.nearest_station(pos);
            info!("station id {station_id} not on the line, using nearest station {nearest}");
            nearest
        }
    }
}

/// Per-interval crowding mark: a boarder is side-bound when its origin
/// station's window holds a boarder count in [lb, ub) and the boarding time
/// is outside the rush windows (unless peak turns are enabled).
fn crowding_marks(entries: &[DemandEntry], constants: &SimConstants) -> Vec<bool> {
    let interval = constants.crowding_interval_s.max(1);
    let mut window_counts: HashMap<(u16, u64), usize> = HashMap::new();
    for entry in entries {
        let key = (entry.board_stop.main_station(), entry.arrive_t / interval);
        *window_counts.entry(key).or_insert(0) += 1;
    }
    entries
        .iter()
        .map(|entry| {
            let key = (entry.board_stop.main_station(), entry.arrive_t / interval);
            let count = window_counts[&key];
            let crowded =
                count >= constants.crowding_num_lb && count < constants.crowding_num_ub;
            let peak_ok = constants.can_turn_at_peak || !constants.is_high_peak(entry.arrive_t);
            crowded && peak_ok
        })
        .collect()
}

/// Re-anchor a trip end to the nearest candidate among the trunk station
/// and its side-branch stops. A closer boarding stop pulls the arrival
/// instant earlier by the walking-time differential.
fn reassign_to_side(entry: &mut DemandEntry, line: &Line, constants: &SimConstants) {
    if let Some((stop, saved_m)) = nearest_side_stop(line, entry.board_stop, entry.origin) {
        let saved_s = (saved_m / constants.passenger_speed_ms) as u64;
        entry.arrive_t = entry.arrive_t.saturating_sub(saved_s);
        entry.board_stop = stop;
        entry.side_trip = true;
    }
    if let Some((stop, _)) = nearest_side_stop(line, entry.alight_stop, entry.destination) {
        entry.alight_stop = stop;
        entry.side_trip = true;
    }
}

/// Closest side stop of `trunk`'s branches that beats the trunk station
/// itself; returns the stop and the walking meters saved.
fn nearest_side_stop(line: &Line, trunk: Stop, pos: (f64, f64)) -> Option<(Stop, f64)> {
    let station = trunk.main_station();
    let trunk_dist = walk_distance_m(pos, line.stop_coords(trunk));
    let mut best: Option<(Stop, f64)> = None;
    for branch in [1u8, 2] {
        let Some(side) = line.branch(station, branch) else {
            continue;
        };
        for (order, stop) in side.stops() {
            let d = walk_distance_m(pos, (stop.lat, stop.lon));
            if d < trunk_dist && best.as_ref().map_or(true, |&(_, bd)| d < trunk_dist - bd) {
                best = Some((
                    Stop::Side {
                        anchor: station,
                        branch,
                        order,
                    },
                    trunk_dist - d,
                ));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::{SideBranchSpec, StationSpec};
    use rand::SeedableRng;

    fn test_line(branches: &[SideBranchSpec]) -> Line {
        let stations = (0..6)
            .map(|i| StationSpec {
                id: 200 + i as u32,
                lat: 31.0,
                lon: 121.0 + i as f64 * 0.05,
            })
            .collect();
        Line::new(
            stations,
            vec![1000.0; 5],
            vec![10.0; 5],
            branches,
            5,
        )
        .unwrap()
    }

    fn record_at(hms: u64, up: u32, down: u32, line: &Line) -> TripRecord {
        let up_pos = line.stop_coords(Stop::Trunk(line.station_by_id(up).unwrap()));
        let down_pos = line.stop_coords(Stop::Trunk(line.station_by_id(down).unwrap()));
        TripRecord {
            depart_time: 20191015000000 + hms,
            direction: 0,
            up_station: up,
            down_station: down,
            up_lat: up_pos.0,
            up_lon: up_pos.1,
            down_lat: down_pos.0,
            down_lon: down_pos.1,
        }
    }

    #[test]
    fn timestamp_decodes_to_seconds() {
        let line = test_line(&[]);
        let r = record_at(73_055, 200, 203, &line);
        assert_eq!(r.depart_secs(), 7 * 3600 + 30 * 60 + 55);
    }

    #[test]
    fn stream_is_sorted_and_jitter_bounded() {
        let line = test_line(&[]);
        let constants = SimConstants::default();
        let records: Vec<TripRecord> = (0..20)
            .map(|i| record_at(80_000 + (i % 7) * 100, 200, 204, &line))
            .collect();
        let mut rng = StdRng::seed_from_u64(7);
        let stream = build_demand(&records, &line, SimMode::Baseline, &constants, 0, &mut rng);

        assert_eq!(stream.entries.len(), 20);
        assert!(stream
            .entries
            .windows(2)
            .all(|w| w[0].arrive_t <= w[1].arrive_t));
        // arrival precedes the recorded boarding by at most the jitter
        for entry in &stream.entries {
            assert!(entry.arrive_t >= 8 * 3600 - 600);
            assert!(entry.arrive_t <= 8 * 3600 + 660);
        }
    }

    #[test]
    fn same_seed_reproduces_the_stream() {
        let line = test_line(&[]);
        let constants = SimConstants::default();
        let records: Vec<TripRecord> = (0..10)
            .map(|i| record_at(90_000 + i * 33, 201, 205, &line))
            .collect();
        let mut a = StdRng::seed_from_u64(11);
        let mut b = StdRng::seed_from_u64(11);
        let s1 = build_demand(&records, &line, SimMode::Baseline, &constants, 0, &mut a);
        let s2 = build_demand(&records, &line, SimMode::Baseline, &constants, 0, &mut b);
        assert_eq!(s1.entries, s2.entries);
    }

    #[test]
    fn multi_mode_reassigns_destination_to_nearer_side_stop() {
        // branch 1 off station 4 (id 203) reaching far north
        let branch = SideBranchSpec {
            anchor_station: 203,
            branch: 1,
            start: (31.0, 121.15),
            end: (31.0 + 40.0 * LAT_JITTER_BOX, 121.15),
        };
        let line = test_line(&[branch]);
        let constants = SimConstants::default();

        // destination coordinates sit on side stop 2
        let stop2 = line.stop_coords(Stop::Side {
            anchor: 4,
            branch: 1,
            order: 2,
        });
        let mut record = record_at(100_000, 200, 203, &line);
        record.down_lat = stop2.0;
        record.down_lon = stop2.1;

        let mut rng = StdRng::seed_from_u64(3);
        let stream = build_demand(
            &[record],
            &line,
            SimMode::Multi,
            &constants,
            0,
            &mut rng,
        );
        let entry = &stream.entries[0];
        assert!(entry.side_trip);
        assert_eq!(
            entry.alight_stop,
            Stop::Side {
                anchor: 4,
                branch: 1,
                order: 2
            }
        );
        assert_eq!(entry.board_stop, Stop::Trunk(1));
    }

    #[test]
    fn crowding_mark_requires_window_in_range() {
        let mut constants = SimConstants::default();
        constants.crowding_num_lb = 3;
        constants.crowding_num_ub = 5;

        // 3 boarders at 10:00 (in range), 6 at 11:00 (over), 1 at 12:00 (under)
        let mut entries = Vec::new();
        for (count, hour) in [(3u64, 10u64), (6, 11), (1, 12)] {
            for i in 0..count {
                entries.push(DemandEntry {
                    arrive_t: hour * 3600 + i,
                    origin: (0.0, 0.0),
                    destination: (0.0, 0.0),
                    board_stop: Stop::Trunk(2),
                    alight_stop: Stop::Trunk(5),
                    side_trip: false,
                });
            }
        }
        let marks = crowding_marks(&entries, &constants);
        assert_eq!(&marks[..3], &[true, true, true]);
        assert!(marks[3..9].iter().all(|&m| !m));
        assert!(!marks[9]);
    }
}
