//! Reorganization policy: post-departure split and merge decisions.
//!
//! Evaluated once per consist per trunk departure, before the next tick; at
//! most one of split or merge fires. A split detaches trailing cabs for the
//! next station's alighters when the dwell time saved for the stay-aboard
//! passengers exceeds the manoeuvre cost. A merge fuses with a consist
//! ahead in the same section when the catch-up distance is feasible, the
//! front consist sheds enough load soon and the rear keeps enough load past
//! the horizon.

use crate::ecs::ConsistId;
use crate::scenario::SimConstants;

/// Snapshot of the deciding consist for the split evaluation.
#[derive(Debug, Clone, Copy)]
pub struct SplitContext {
    pub cab_count: usize,
    pub per_cab_capacity: u16,
    pub occupancy: u16,
    /// Aboard passengers whose destination's main station is the next one
    /// (side-branch destinations off the next station included).
    pub next_station_drops: u16,
    /// Dwell duration a stop would cost right now.
    pub stop_time_s: i64,
    /// Speed of the section being travelled.
    pub section_speed_ms: f64,
}

/// Number of trailing cabs to detach, if a split pays off.
pub fn decide_split(ctx: &SplitContext, constants: &SimConstants) -> Option<u8> {
    if ctx.cab_count < 2 {
        return None;
    }
    if ctx.next_station_drops <= constants.min_sep_pass_num {
        return None;
    }
    let staying = (ctx.occupancy - ctx.next_station_drops) as f64;
    let manoeuvre_cost =
        constants.sep_duration_s as f64 - constants.sep_dist_m / ctx.section_speed_ms;
    if staying * (ctx.stop_time_s as f64) < manoeuvre_cost {
        return None;
    }
    let per_cab = ctx.per_cab_capacity.max(1) as u32;
    let needed = (ctx.next_station_drops as u32).div_ceil(per_cab);
    Some(needed.min(ctx.cab_count as u32 - 1).max(1) as u8)
}

/// Snapshot of the just-departed (rear) consist for the merge evaluation.
#[derive(Debug, Clone, Copy)]
pub struct MergeSeeker {
    pub cab_count: usize,
    pub occupancy: u16,
    /// Aboard passengers staying past the look-ahead horizon.
    pub drops_past_horizon: u16,
}

/// Snapshot of one consist ahead in the same section.
#[derive(Debug, Clone, Copy)]
pub struct MergeCandidate {
    pub id: ConsistId,
    pub cab_count: usize,
    pub occupancy: u16,
    /// Seconds it still needs to reach the next station.
    pub time_count: i64,
    /// Its aboard passengers alighting within the look-ahead horizon.
    pub drops_within_horizon: u16,
}

/// First candidate (callers order them closest-behind first) the rear may
/// fuse with, or `None`.
pub fn decide_merge(
    seeker: &MergeSeeker,
    candidates: &[MergeCandidate],
    section_dist_m: f64,
    section_speed_ms: f64,
    constants: &SimConstants,
) -> Option<ConsistId> {
    let catch_up_limit = constants.comb_dist_m / section_speed_ms
        + (1.0 - constants.rate_comb_route) * (section_dist_m - constants.comb_dist_m)
            / section_speed_ms;

    for candidate in candidates {
        if seeker.cab_count + candidate.cab_count > 3 {
            continue;
        }
        // (1) the rear can close the gap within the remaining section
        if (candidate.time_count as f64) >= catch_up_limit {
            continue;
        }
        // (2) the front sheds enough of its load soon
        let front_sheds = candidate.occupancy == 0
            || candidate.drops_within_horizon as f64 / candidate.occupancy as f64
                >= constants.rate_front_pass;
        if !front_sheds {
            continue;
        }
        // (3) the rear keeps enough of its load past the horizon
        let rear_keeps = seeker.occupancy == 0
            || seeker.drops_past_horizon as f64 / seeker.occupancy as f64
                >= constants.rate_rear_pass;
        if !rear_keeps {
            continue;
        }
        return Some(candidate.id);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_needs_two_cabs_and_enough_drops() {
        let constants = SimConstants::default();
        let single_cab = SplitContext {
            cab_count: 1,
            per_cab_capacity: 20,
            occupancy: 18,
            next_station_drops: 10,
            stop_time_s: 26,
            section_speed_ms: 10.0,
        };
        assert_eq!(decide_split(&single_cab, &constants), None);

        let no_drops = SplitContext {
            cab_count: 3,
            next_station_drops: 0,
            ..single_cab
        };
        assert_eq!(decide_split(&no_drops, &constants), None);
    }

    #[test]
    fn split_detaches_a_ceiling_of_cabs() {
        let constants = SimConstants::default();
        let ctx = SplitContext {
            cab_count: 3,
            per_cab_capacity: 20,
            occupancy: 60,
            next_station_drops: 25,
            stop_time_s: 26,
            section_speed_ms: 10.0,
        };
        // 25 drops over 20-seat cabs → 2 trailing cabs
        assert_eq!(decide_split(&ctx, &constants), Some(2));

        // never detach every cab
        let mostly_alighting = SplitContext {
            next_station_drops: 55,
            ..ctx
        };
        assert_eq!(decide_split(&mostly_alighting, &constants), Some(2));
    }

    #[test]
    fn split_skips_when_saving_is_below_manoeuvre_cost() {
        let mut constants = SimConstants::default();
        constants.sep_duration_s = 10_000;
        let ctx = SplitContext {
            cab_count: 2,
            per_cab_capacity: 20,
            occupancy: 22,
            next_station_drops: 20,
            stop_time_s: 26,
            section_speed_ms: 10.0,
        };
        // 2 staying × 26 s « manoeuvre cost
        assert_eq!(decide_split(&ctx, &constants), None);
    }

    #[test]
    fn merge_applies_all_three_conditions() {
        let constants = SimConstants::default();
        let seeker = MergeSeeker {
            cab_count: 1,
            occupancy: 10,
            drops_past_horizon: 6,
        };
        let good = MergeCandidate {
            id: ConsistId(7),
            cab_count: 2,
            occupancy: 10,
            time_count: 30,
            drops_within_horizon: 4,
        };
        // section 1000 m at 10 m/s: limit = 18.3 + 0.5 * 81.7 = 59.15 s
        assert_eq!(
            decide_merge(&seeker, &[good], 1000.0, 10.0, &constants),
            Some(ConsistId(7))
        );

        let too_far = MergeCandidate {
            time_count: 80,
            ..good
        };
        assert_eq!(decide_merge(&seeker, &[too_far], 1000.0, 10.0, &constants), None);

        let keeps_its_load = MergeCandidate {
            drops_within_horizon: 1,
            ..good
        };
        assert_eq!(
            decide_merge(&seeker, &[keeps_its_load], 1000.0, 10.0, &constants),
            None
        );

        let too_long = MergeCandidate {
            cab_count: 3,
            ..good
        };
        assert_eq!(decide_merge(&seeker, &[too_long], 1000.0, 10.0, &constants), None);

        let light_rear = MergeSeeker {
            cab_count: 1,
            occupancy: 10,
            drops_past_horizon: 2,
        };
        assert_eq!(decide_merge(&light_rear, &[good], 1000.0, 10.0, &constants), None);
    }

    #[test]
    fn merge_takes_the_first_feasible_candidate() {
        let constants = SimConstants::default();
        let seeker = MergeSeeker {
            cab_count: 1,
            occupancy: 0,
            drops_past_horizon: 0,
        };
        let infeasible = MergeCandidate {
            id: ConsistId(1),
            cab_count: 3,
            occupancy: 0,
            time_count: 40,
            drops_within_horizon: 0,
        };
        let feasible = MergeCandidate {
            id: ConsistId(2),
            cab_count: 1,
            occupancy: 0,
            time_count: 30,
            drops_within_horizon: 0,
        };
        assert_eq!(
            decide_merge(&seeker, &[infeasible, feasible], 1000.0, 10.0, &constants),
            Some(ConsistId(2))
        );
    }
}
