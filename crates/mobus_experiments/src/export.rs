//! Result export: CSV and JSON writers plus a feasible-minimum ranking.

use std::error::Error;
use std::fs::File;
use std::path::Path;

use crate::metrics::SimulationRow;

/// Write one CSV row per run.
pub fn export_to_csv<P: AsRef<Path>>(rows: &[SimulationRow], path: P) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record([
        "experiment_id",
        "run_id",
        "seed",
        "headway_scale",
        "cabs_per_dispatch",
        "feasible",
        "passenger_count",
        "mean_in_vehicle_min",
        "mean_journey_min",
        "mean_dwell_wait_min",
        "mean_station_wait_min",
        "mean_walk_on_m",
        "mean_walk_off_m",
        "energy_equal_speed_kwh",
        "energy_condition_kwh",
        "driver_wage_wan_per_year",
        "max_occupancy",
        "avg_occupancy",
        "avg_occupancy_early",
        "avg_occupancy_noon",
        "avg_occupancy_late",
        "carbon_emission_g",
        "optimal_in_vehicle_min",
    ])?;

    for row in rows {
        let s = &row.stats;
        writer.write_record([
            row.experiment_id.clone(),
            row.run_id.to_string(),
            row.seed.to_string(),
            row.headway_scale.to_string(),
            row.cabs_per_dispatch.to_string(),
            s.feasible.to_string(),
            s.passenger_count.to_string(),
            s.mean_in_vehicle_min.to_string(),
            s.mean_journey_min.to_string(),
            s.mean_dwell_wait_min.to_string(),
            s.mean_station_wait_min.to_string(),
            s.mean_walk_on_m.to_string(),
            s.mean_walk_off_m.to_string(),
            s.energy_equal_speed_kwh.to_string(),
            s.energy_condition_kwh.to_string(),
            s.driver_wage_wan_per_year.to_string(),
            s.max_occupancy.to_string(),
            s.avg_occupancy.to_string(),
            s.avg_occupancy_early.to_string(),
            s.avg_occupancy_noon.to_string(),
            s.avg_occupancy_late.to_string(),
            s.carbon_emission_g.to_string(),
            s.optimal_in_vehicle_min.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the full result set as pretty-printed JSON.
pub fn export_to_json<P: AsRef<Path>>(
    rows: &[SimulationRow],
    path: P,
) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, rows)?;
    Ok(())
}

/// Index of the feasible run with the lowest condition-based energy, the
/// objective the plan optimizer minimises. `None` when every run was
/// infeasible.
pub fn find_best_result_index(rows: &[SimulationRow]) -> Option<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| row.stats.feasible)
        .min_by(|(_, a), (_, b)| {
            a.stats
                .energy_condition_kwh
                .total_cmp(&b.stats.energy_condition_kwh)
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mobus_core::stats::RunStatistics;

    fn row(run_id: usize, feasible: bool, energy: f64) -> SimulationRow {
        let mut stats = RunStatistics::infeasible();
        stats.feasible = feasible;
        if feasible {
            stats.energy_condition_kwh = energy;
        }
        SimulationRow {
            experiment_id: format!("run-{run_id}"),
            run_id,
            seed: 42,
            headway_scale: 1.0,
            cabs_per_dispatch: 2,
            stats,
        }
    }

    #[test]
    fn best_result_skips_infeasible_runs() {
        let rows = vec![row(0, false, 1.0), row(1, true, 250.0), row(2, true, 120.0)];
        assert_eq!(find_best_result_index(&rows), Some(2));
        assert_eq!(find_best_result_index(&[row(0, false, 1.0)]), None);
    }

    #[test]
    fn exports_write_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![row(0, true, 10.0), row(1, true, 20.0)];

        let csv_path = dir.path().join("sweep.csv");
        let json_path = dir.path().join("sweep.json");
        export_to_csv(&rows, &csv_path).unwrap();
        export_to_json(&rows, &json_path).unwrap();

        let csv_text = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv_text.lines().count() >= 3);
        assert!(csv_text.contains("energy_condition_kwh"));
        let json_text = std::fs::read_to_string(&json_path).unwrap();
        assert!(json_text.contains("\"run_id\": 1"));
    }
}
