//! One flat, serializable row per simulation run.

use mobus_core::stats::RunStatistics;
use serde::Serialize;

use crate::parameters::PlanSet;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationRow {
    pub experiment_id: String,
    pub run_id: usize,
    pub seed: u64,
    pub headway_scale: f64,
    pub cabs_per_dispatch: u8,
    #[serde(flatten)]
    pub stats: RunStatistics,
}

impl SimulationRow {
    pub fn new(plan: &PlanSet, stats: RunStatistics) -> Self {
        Self {
            experiment_id: plan.experiment_id.clone(),
            run_id: plan.run_id,
            seed: plan.seed,
            headway_scale: plan.headway_scale,
            cabs_per_dispatch: plan.cabs_per_dispatch,
            stats,
        }
    }
}
