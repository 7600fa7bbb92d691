//! Plan variation: grid search over hourly dispatch plans.

use mobus_core::demand::TripRecord;
use mobus_core::line::{SideBranchSpec, StationSpec};
use mobus_core::scenario::{ScenarioParams, SimConstants, SimMode, TurnRule};
use serde::Serialize;

/// Everything a sweep shares between runs: the line and its demand.
#[derive(Debug, Clone)]
pub struct ScenarioBase {
    pub mode: SimMode,
    pub turn_rule: TurnRule,
    pub direction: u8,
    pub stations: Vec<StationSpec>,
    pub section_dist_m: Vec<f64>,
    pub section_speed_ms: Vec<f64>,
    pub side_branches: Vec<SideBranchSpec>,
    pub trips: Vec<TripRecord>,
    pub constants: SimConstants,
    /// Reference hourly headways the scale factors apply to.
    pub base_headway_s: Vec<u64>,
}

/// One concrete dispatch plan to simulate.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSet {
    pub experiment_id: String,
    pub run_id: usize,
    pub seed: u64,
    pub headway_scale: f64,
    pub cabs_per_dispatch: u8,
    #[serde(skip)]
    pub headway_s: Vec<u64>,
    #[serde(skip)]
    pub cab_count: Vec<u8>,
}

impl PlanSet {
    /// Scenario parameters for this plan against the shared base.
    pub fn scenario_params(&self, base: &ScenarioBase) -> ScenarioParams {
        ScenarioParams::new(
            base.stations.clone(),
            base.section_dist_m.clone(),
            base.section_speed_ms.clone(),
            base.trips.clone(),
        )
        .with_mode(base.mode)
        .with_turn_rule(base.turn_rule)
        .with_direction(base.direction)
        .with_side_branches(base.side_branches.clone())
        .with_constants(base.constants)
        .with_dispatch_tables(self.headway_s.clone(), self.cab_count.clone())
        .with_seed(self.seed)
    }
}

/// Grid builder over headway scalings, cab counts and seeds.
#[derive(Debug, Clone)]
pub struct PlanSpace {
    headway_scales: Vec<f64>,
    cab_counts: Vec<u8>,
    seeds: Vec<u64>,
}

impl PlanSpace {
    pub fn grid() -> Self {
        Self {
            headway_scales: vec![1.0],
            cab_counts: vec![2],
            seeds: vec![42],
        }
    }

    pub fn headway_scales(mut self, scales: Vec<f64>) -> Self {
        self.headway_scales = scales;
        self
    }

    pub fn cab_counts(mut self, counts: Vec<u8>) -> Self {
        self.cab_counts = counts;
        self
    }

    pub fn seeds(mut self, seeds: Vec<u64>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Expand the grid into concrete plans over the base's hourly headways.
    pub fn generate(&self, base: &ScenarioBase) -> Vec<PlanSet> {
        let mut plans = Vec::new();
        let mut run_id = 0;
        for &scale in &self.headway_scales {
            for &cabs in &self.cab_counts {
                for &seed in &self.seeds {
                    let headway_s: Vec<u64> = base
                        .base_headway_s
                        .iter()
                        .map(|&h| ((h as f64 * scale).round() as u64).max(if h > 0 { 1 } else { 0 }))
                        .collect();
                    let cab_count = vec![cabs; headway_s.len()];
                    plans.push(PlanSet {
                        experiment_id: format!("scale{scale:.2}-cabs{cabs}"),
                        run_id,
                        seed,
                        headway_scale: scale,
                        cabs_per_dispatch: cabs,
                        headway_s,
                        cab_count,
                    });
                    run_id += 1;
                }
            }
        }
        plans
    }
}
