//! Reorganization: evaluate split/merge for consists that just departed a
//! trunk station.
//!
//! Runs after stepping so `to_dec_trans` reflects the departure executed
//! this tick. At most one of split or merge is requested per consist; the
//! manoeuvre itself is realised by the stepping system when the section
//! timer expires.

use bevy_ecs::prelude::{Entity, World};

use crate::clock::SimulationClock;
use crate::ecs::{
    Consist, ConsistId, Lifecycle, MergePlan, MergeSide, Phase, Progress, Reorg,
};
use crate::line::Line;
use crate::location::{Location, Stop};
use crate::passenger::PassengerRegistry;
use crate::reorg::{decide_merge, decide_split, MergeCandidate, MergeSeeker, SplitContext};
use crate::scenario::{ModeConfig, SimConstants};

pub fn reorg_decision_system(world: &mut World) {
    let mode = *world.resource::<ModeConfig>();
    if !mode.mode.is_modular() {
        return;
    }
    let now = world.resource::<SimulationClock>().now();
    let constants = *world.resource::<SimConstants>();
    let stop_time = constants.stop_time_s(mode.mode, now);

    // departures this tick, in creation order
    let mut deciders: Vec<(ConsistId, Entity)> = world
        .query::<(Entity, &Consist, &Reorg, &Lifecycle)>()
        .iter(world)
        .filter(|(_, _, reorg, lifecycle)| {
            reorg.to_dec_trans && lifecycle.phase == Phase::Active && lifecycle.able
        })
        .map(|(entity, consist, ..)| (consist.id, entity))
        .collect();
    deciders.sort_by_key(|&(id, _)| id);

    for (id, entity) in deciders {
        // claimed as a merge partner earlier in this pass
        if world.get::<Reorg>(entity).unwrap().merge_request.is_some() {
            world.get_mut::<Reorg>(entity).unwrap().to_dec_trans = false;
            continue;
        }
        let location = world.get::<Progress>(entity).unwrap().location;
        let Stop::Trunk(section_start) = location.stop else {
            world.get_mut::<Reorg>(entity).unwrap().to_dec_trans = false;
            continue;
        };
        debug_assert!(!location.at_station, "reorg decider still at a station");

        let split = decide_split_for(world, entity, section_start, stop_time, &constants);
        if let Some(cabs) = split {
            let mut reorg = world.get_mut::<Reorg>(entity).unwrap();
            reorg.split_request = Some(cabs);
            reorg.to_dec_trans = false;
            continue;
        }

        if let Some(partner) = decide_merge_for(world, entity, id, location, section_start, &constants)
        {
            let partner_entity = world
                .query::<(Entity, &Consist)>()
                .iter(world)
                .find(|(_, c)| c.id == partner)
                .map(|(e, _)| e)
                .expect("merge partner vanished");
            world.get_mut::<Reorg>(partner_entity).unwrap().merge_request = Some(MergePlan {
                partner: id,
                side: MergeSide::Front,
            });
            world.get_mut::<Reorg>(entity).unwrap().merge_request = Some(MergePlan {
                partner,
                side: MergeSide::Rear,
            });
        }
        world.get_mut::<Reorg>(entity).unwrap().to_dec_trans = false;
    }
}

fn decide_split_for(
    world: &mut World,
    entity: Entity,
    section_start: u16,
    stop_time: i64,
    constants: &SimConstants,
) -> Option<u8> {
    let registry = world.resource::<PassengerRegistry>();
    let line = world.resource::<Line>();
    let consist = world.get::<Consist>(entity).unwrap();
    let ctx = SplitContext {
        cab_count: consist.cab_count(),
        per_cab_capacity: consist.capacities[0],
        occupancy: consist.occupancy(),
        next_station_drops: consist.drops_between(section_start + 1, section_start + 2, registry),
        stop_time_s: stop_time,
        section_speed_ms: line.section_speed_ms(section_start),
    };
    decide_split(&ctx, constants)
}

fn decide_merge_for(
    world: &mut World,
    entity: Entity,
    id: ConsistId,
    location: Location,
    section_start: u16,
    constants: &SimConstants,
) -> Option<ConsistId> {
    // the look-ahead window covers the stations after the merge point
    let horizon_start = section_start + 1;
    let horizon_end = section_start + 1 + constants.comb_fore_stations;

    let mut peers = world.query::<(&Consist, &Progress, &Reorg, &Lifecycle)>();
    let (seeker, candidates) = {
        let registry = world.resource::<PassengerRegistry>();
        let line = world.resource::<Line>();
        let last = line.last_station();

        let consist = world.get::<Consist>(entity).unwrap();
        let seeker = MergeSeeker {
            cab_count: consist.cab_count(),
            occupancy: consist.occupancy(),
            drops_past_horizon: consist.drops_between(horizon_end, last + 1, registry),
        };

        // consists ahead in the same section with no manoeuvre pending,
        // closest behind first
        let mut candidates: Vec<(i64, MergeCandidate)> = peers
            .iter(world)
            .filter(|(c, progress, reorg, lifecycle)| {
                c.id != id
                    && lifecycle.phase == Phase::Active
                    && lifecycle.able
                    && progress.location == location
                    && reorg.split_request.is_none()
                    && reorg.merge_request.is_none()
                    && reorg.armed.is_none()
            })
            .map(|(c, progress, ..)| {
                (
                    progress.time_count,
                    MergeCandidate {
                        id: c.id,
                        cab_count: c.cab_count(),
                        occupancy: c.occupancy(),
                        time_count: progress.time_count,
                        drops_within_horizon: c.drops_between(horizon_start, horizon_end, registry),
                    },
                )
            })
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
        (
            seeker,
            candidates.into_iter().map(|(_, c)| c).collect::<Vec<_>>(),
        )
    };

    let (dist, speed) = {
        let line = world.resource::<Line>();
        (
            line.section_distance_m(section_start),
            line.section_speed_ms(section_start),
        )
    };
    decide_merge(&seeker, &candidates, dist, speed, constants)
}
