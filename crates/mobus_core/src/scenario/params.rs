//! Scenario parameters and the calibrated operating constants.

use bevy_ecs::prelude::Resource;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::clock::ONE_HOUR_S;
use crate::demand::TripRecord;
use crate::line::{SideBranchSpec, StationSpec};

/// Operating regime under evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimMode {
    /// Conventional fixed-capacity service: one large cab per dispatch at a
    /// fixed headway.
    Baseline,
    /// Modular service on the trunk only: consists may split and merge.
    Single,
    /// Modular service with side-branch diversions; every trip is routed
    /// through the nearest-stop rule.
    Multi,
    /// Like [`SimMode::Multi`], but only crowding-marked boarders are routed
    /// to side-branch variants.
    MultiOrder,
}

impl SimMode {
    /// Small-cab consists with split/merge enabled.
    pub fn is_modular(&self) -> bool {
        !matches!(self, SimMode::Baseline)
    }

    /// Side branches are part of the network.
    pub fn has_branches(&self) -> bool {
        matches!(self, SimMode::Multi | SimMode::MultiOrder)
    }
}

/// Trunk-station decision rule for the multi modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnRule {
    /// Prioritise delivering aboard side-destined passengers.
    DownFirst,
    /// Prioritise lifting waiting side-branch passengers.
    UpFirst,
}

/// Mode selection, inserted as a resource at build time.
#[derive(Debug, Clone, Copy, Resource)]
pub struct ModeConfig {
    pub mode: SimMode,
    pub turn_rule: TurnRule,
}

/// The single seeded RNG every random draw goes through.
#[derive(Debug, Resource)]
pub struct SimRng(pub StdRng);

/// Operating constants. All externally configurable; defaults are the
/// calibrated values for the reference line.
#[derive(Debug, Clone, Copy, Resource, Serialize, Deserialize)]
pub struct SimConstants {
    /// Tick length in seconds.
    pub min_step_s: u64,
    /// First dispatch instant.
    pub sim_start_t: u64,
    /// Soft end: the run continues past this only to drain the system.
    pub sim_end_t: u64,
    /// No dispatch after this instant.
    pub last_bus_t: u64,
    /// Hard cap on the clock.
    pub end_t: u64,

    /// Pedestrian walking speed, m/s.
    pub passenger_speed_ms: f64,
    /// Upper bound of the uniform arrival jitter, seconds.
    pub max_station_wait_s: u64,

    pub large_cab_capacity: u16,
    pub small_cab_capacity: u16,

    /// Dwell durations by cab class and peak state, seconds.
    pub large_stop_t_norm_s: i64,
    pub large_stop_t_high_s: i64,
    pub small_stop_t_norm_s: i64,
    pub small_stop_t_high_s: i64,

    /// Baseline dispatch headway, seconds.
    pub baseline_headway_s: u64,
    /// Acceleration/deceleration allowance subtracted from each trunk
    /// section, meters.
    pub dis_fix_m: f64,

    /// Group stop rule: fraction of must-stop capacity considered enough.
    pub rate_max_stop: f64,

    /// Split: minimum next-station alighters (strict lower bound).
    pub min_sep_pass_num: u16,
    pub sep_duration_s: i64,
    pub sep_dist_m: f64,

    /// Merge: manoeuvre cost and feasibility envelope.
    pub comb_duration_s: i64,
    pub comb_dist_m: f64,
    pub rate_comb_route: f64,
    pub rate_front_pass: f64,
    pub rate_rear_pass: f64,
    pub comb_fore_stations: u16,

    /// Multi down-first: alighter count/share needed to stop *and* divert.
    pub stop_turn_threshold: u16,
    pub stop_turn_rate: f64,
    /// Multi up-first: a consist heavier than this never diverts.
    pub turn_max_pass_num: u16,
    /// Trunk fallback: max consists already stopped before cruising past.
    pub only_main_line_stop_threshold: usize,

    /// Crowding-mark window length, seconds.
    pub crowding_interval_s: u64,
    /// Boarder count range [lb, ub) that marks a window as side-bound.
    pub crowding_num_lb: usize,
    pub crowding_num_ub: usize,
    pub can_turn_at_peak: bool,

    /// Side-branch segmentation: K segments give K-1 stops.
    pub side_segments_k: u8,

    /// Energy per meter per cab, kWh (equal-speed and condition-based).
    pub consumption_speed_large: f64,
    pub consumption_speed_small: f64,
    pub consumption_condition_large: f64,
    pub consumption_condition_small: f64,

    /// Annual driver wage by cab class, RMB.
    pub driver_wage_large: f64,
    pub driver_wage_small: f64,
}

impl Default for SimConstants {
    fn default() -> Self {
        Self {
            min_step_s: 2,
            sim_start_t: 6 * ONE_HOUR_S,
            sim_end_t: 21 * ONE_HOUR_S + ONE_HOUR_S / 2,
            last_bus_t: 22 * ONE_HOUR_S,
            end_t: 26 * ONE_HOUR_S,

            passenger_speed_ms: 1.4,
            max_station_wait_s: 10 * 60,

            large_cab_capacity: 90,
            small_cab_capacity: 20,

            large_stop_t_norm_s: 9 + 15 + 9,
            large_stop_t_high_s: 10 + 30 + 10,
            small_stop_t_norm_s: 8 + 10 + 8,
            small_stop_t_high_s: 9 + 20 + 9,

            baseline_headway_s: 10 * 60,
            dis_fix_m: 50.0,

            rate_max_stop: 1.0,

            min_sep_pass_num: 0,
            sep_duration_s: 14,
            sep_dist_m: 155.0,

            comb_duration_s: 22,
            comb_dist_m: 183.0,
            rate_comb_route: 0.5,
            rate_front_pass: 0.3,
            rate_rear_pass: 0.5,
            comb_fore_stations: 2,

            stop_turn_threshold: 2,
            stop_turn_rate: 0.2,
            turn_max_pass_num: 9,
            only_main_line_stop_threshold: 0,

            crowding_interval_s: 10 * 60,
            crowding_num_lb: 8,
            crowding_num_ub: 100,
            can_turn_at_peak: false,

            side_segments_k: 5,

            consumption_speed_large: 52.5 / 100_000.0,
            consumption_speed_small: 25.6 / 100_000.0,
            consumption_condition_large: 98.4 / 100_000.0,
            consumption_condition_small: 39.0 / 100_000.0,

            driver_wage_large: 120_000.0,
            driver_wage_small: 100_000.0,
        }
    }
}

impl SimConstants {
    /// Morning/evening rush windows where the longer dwell applies.
    pub fn is_high_peak(&self, t: u64) -> bool {
        (7 * ONE_HOUR_S..9 * ONE_HOUR_S).contains(&t)
            || (17 * ONE_HOUR_S..19 * ONE_HOUR_S).contains(&t)
    }

    /// Dwell duration for a stop decided at instant `t`.
    pub fn stop_time_s(&self, mode: SimMode, t: u64) -> i64 {
        match (mode.is_modular(), self.is_high_peak(t)) {
            (false, false) => self.large_stop_t_norm_s,
            (false, true) => self.large_stop_t_high_s,
            (true, false) => self.small_stop_t_norm_s,
            (true, true) => self.small_stop_t_high_s,
        }
    }

    /// Per-cab capacity of a fresh dispatch in this mode.
    pub fn cab_capacity(&self, mode: SimMode) -> u16 {
        if mode.is_modular() {
            self.small_cab_capacity
        } else {
            self.large_cab_capacity
        }
    }
}

/// Everything needed to build one simulation world.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    pub mode: SimMode,
    pub turn_rule: TurnRule,
    /// Travel direction trip records are filtered by.
    pub direction: u8,
    pub seed: u64,

    pub stations: Vec<StationSpec>,
    /// Inter-station distances, meters, length N-1.
    pub section_dist_m: Vec<f64>,
    /// Section speeds, m/s, length N-1.
    pub section_speed_ms: Vec<f64>,
    pub side_branches: Vec<SideBranchSpec>,
    pub trips: Vec<TripRecord>,

    /// Hour-indexed minimum headways, seconds (modular modes).
    pub dep_headway_s: Vec<u64>,
    /// Hour-indexed cabs per dispatch (modular modes).
    pub dep_cab_count: Vec<u8>,

    pub constants: SimConstants,
}

impl ScenarioParams {
    pub fn new(
        stations: Vec<StationSpec>,
        section_dist_m: Vec<f64>,
        section_speed_ms: Vec<f64>,
        trips: Vec<TripRecord>,
    ) -> Self {
        Self {
            mode: SimMode::Baseline,
            turn_rule: TurnRule::DownFirst,
            direction: 0,
            seed: 42,
            stations,
            section_dist_m,
            section_speed_ms,
            side_branches: Vec::new(),
            trips,
            dep_headway_s: vec![0; 24],
            dep_cab_count: vec![0; 24],
            constants: SimConstants::default(),
        }
    }

    pub fn with_mode(mut self, mode: SimMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_turn_rule(mut self, rule: TurnRule) -> Self {
        self.turn_rule = rule;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_direction(mut self, direction: u8) -> Self {
        self.direction = direction;
        self
    }

    /// Hourly dispatch plan: minimum headways and cabs per dispatch.
    pub fn with_dispatch_tables(mut self, headway_s: Vec<u64>, cab_count: Vec<u8>) -> Self {
        self.dep_headway_s = headway_s;
        self.dep_cab_count = cab_count;
        self
    }

    pub fn with_side_branches(mut self, branches: Vec<SideBranchSpec>) -> Self {
        self.side_branches = branches;
        self
    }

    pub fn with_constants(mut self, constants: SimConstants) -> Self {
        self.constants = constants;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dwell_switches_on_peak_and_cab_class() {
        let c = SimConstants::default();
        assert_eq!(c.stop_time_s(SimMode::Baseline, 6 * ONE_HOUR_S), 33);
        assert_eq!(c.stop_time_s(SimMode::Baseline, 8 * ONE_HOUR_S), 50);
        assert_eq!(c.stop_time_s(SimMode::Single, 12 * ONE_HOUR_S), 26);
        assert_eq!(c.stop_time_s(SimMode::Multi, 18 * ONE_HOUR_S), 38);
    }

    #[test]
    fn peak_window_edges() {
        let c = SimConstants::default();
        assert!(!c.is_high_peak(7 * ONE_HOUR_S - 1));
        assert!(c.is_high_peak(7 * ONE_HOUR_S));
        assert!(!c.is_high_peak(9 * ONE_HOUR_S));
        assert!(c.is_high_peak(17 * ONE_HOUR_S));
    }
}
