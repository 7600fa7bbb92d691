//! Routing decisions: snapshot every at-station group, decide, apply.
//!
//! Groups are decided in descending location order; every member's demand
//! and capacity are snapshotted first, so decisions within a tick observe a
//! consistent pre-step state. Apply happens in bulk afterwards.

use std::collections::BTreeMap;

use bevy_ecs::prelude::{Entity, World};

use crate::clock::SimulationClock;
use crate::ecs::{Consist, ConsistId, DwellState, Excursion, Lifecycle, Phase, Progress};
use crate::line::Line;
use crate::location::Stop;
use crate::passenger::PassengerRegistry;
use crate::routing::{
    baseline, multi, single, BranchView, GroupMember, SideView, StopDecision, TrunkView,
};
use crate::scenario::{ModeConfig, SimConstants, SimMode, SimRng};

struct Group {
    stop: Stop,
    members: Vec<GroupMember>,
    entities: Vec<(ConsistId, Entity)>,
    trunk_view: Option<TrunkView>,
    side_view: Option<SideView>,
}

pub fn routing_decision_system(world: &mut World) {
    let now = world.resource::<SimulationClock>().now();
    let mode = *world.resource::<ModeConfig>();
    let constants = *world.resource::<SimConstants>();
    let stop_time = constants.stop_time_s(mode.mode, now);

    let mut query = world.query::<(
        Entity,
        &Consist,
        &Progress,
        &DwellState,
        &Excursion,
        &Lifecycle,
    )>();

    // able consists anywhere on each branch, for the coverage checks
    let mut branch_presence: BTreeMap<(u16, u8), usize> = BTreeMap::new();
    for (_, _, progress, _, _, lifecycle) in query.iter(world) {
        if lifecycle.phase != Phase::Active || !lifecycle.able {
            continue;
        }
        if let Stop::Side { anchor, branch, .. } = progress.location.stop {
            *branch_presence.entry((anchor, branch)).or_insert(0) += 1;
        }
    }

    // group snapshot, keyed descending by location
    let mut groups: BTreeMap<std::cmp::Reverse<(u16, u8, u8, u8)>, Group> = BTreeMap::new();
    {
        let registry = world.resource::<PassengerRegistry>();
        let line = world.resource::<Line>();
        for (entity, consist, progress, dwell, excursion, lifecycle) in query.iter(world) {
            if lifecycle.phase != Phase::Active || !lifecycle.able {
                continue;
            }
            if !progress.location.at_station {
                continue;
            }
            let stop = progress.location.stop;
            let main = stop.main_station();
            let member = GroupMember {
                id: consist.id,
                is_waiting: dwell.is_waiting,
                is_returning: excursion.is_returning,
                can_return_stop: excursion.can_return_stop,
                to_turn: excursion.to_turn,
                occupancy: consist.occupancy(),
                capacity: consist.capacity(),
                alight_here: consist.alight_count_at(stop, registry),
                sum_stations_to_go: consist.sum_stations_to_go(main, registry),
                side_drops: consist.side_drop_counts(main, registry),
            };
            let key = std::cmp::Reverse(progress.location.sort_key());
            let group = groups.entry(key).or_insert_with(|| Group {
                stop,
                members: Vec::new(),
                entities: Vec::new(),
                trunk_view: None,
                side_view: None,
            });
            group.members.push(member);
            group.entities.push((consist.id, entity));
        }

        for group in groups.values_mut() {
            // stable group order: creation order, as ids are monotonic
            let mut paired: Vec<(GroupMember, (ConsistId, Entity))> = group
                .members
                .drain(..)
                .zip(group.entities.drain(..))
                .collect();
            paired.sort_by_key(|(m, _)| m.id);
            for (member, pair) in paired {
                group.members.push(member);
                group.entities.push(pair);
            }

            match group.stop {
                Stop::Trunk(station) => {
                    let branch_view = |branch: u8| {
                        line.branch(station, branch)
                            .map(|b| BranchView {
                                present: branch_presence
                                    .get(&(station, branch))
                                    .copied()
                                    .unwrap_or(0),
                                waiting: b.waiting_total(),
                                earliest_arrival: b.earliest_waiting_arrival(registry),
                            })
                            .unwrap_or_default()
                    };
                    group.trunk_view = Some(TrunkView {
                        station,
                        pool_len: line.pool(station).len(),
                        branches: [branch_view(1), branch_view(2)],
                    });
                }
                Stop::Side {
                    anchor,
                    branch,
                    order,
                } => {
                    let side = line.branch(anchor, branch).expect("group on unknown branch");
                    group.side_view = Some(SideView {
                        anchor,
                        branch,
                        order,
                        is_terminal: order == side.last_order(),
                        pool_len: side.stop(order).pool.len(),
                    });
                }
            }
        }
    }

    // decide against the snapshots
    let mut rng = world
        .remove_resource::<SimRng>()
        .expect("SimRng missing from the world");
    let mut applications: Vec<(Entity, GroupMember, StopDecision)> = Vec::new();
    for group in groups.values() {
        let decisions: Vec<(ConsistId, StopDecision)> = match (mode.mode, group.stop) {
            (SimMode::Baseline, Stop::Trunk(_)) => {
                let pool_len = group.trunk_view.map(|v| v.pool_len).unwrap_or(0);
                group
                    .members
                    .iter()
                    .filter(|m| !m.is_waiting)
                    .map(|m| {
                        (
                            m.id,
                            StopDecision::straight(baseline::decide(m, pool_len), false),
                        )
                    })
                    .collect()
            }
            (SimMode::Single, Stop::Trunk(station)) => {
                let pool_len = group.trunk_view.map(|v| v.pool_len).unwrap_or(0);
                single::decide_group(&group.members, pool_len, constants.rate_max_stop, station)
                    .into_iter()
                    .map(|(id, stop)| (id, StopDecision::straight(stop, false)))
                    .collect()
            }
            (SimMode::Multi | SimMode::MultiOrder, Stop::Trunk(_)) => {
                let view = group.trunk_view.as_ref().expect("trunk group without view");
                multi::decide_trunk_group(
                    mode.turn_rule,
                    &group.members,
                    view,
                    &constants,
                    &mut rng.0,
                )
            }
            (_, Stop::Side { .. }) => {
                let view = group.side_view.as_ref().expect("side group without view");
                multi::decide_side_group(&group.members, view)
            }
        };

        for (id, decision) in decisions {
            let entity = group
                .entities
                .iter()
                .find(|(gid, _)| *gid == id)
                .map(|&(_, e)| e)
                .expect("decision for a consist outside the group");
            let member = group
                .members
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .expect("decision for an unsnapshotted consist");
            applications.push((entity, member, decision));
        }
    }
    world.insert_resource(rng);

    for (entity, member, decision) in applications {
        // a consist may only cruise past its own alighters on a denied
        // return pass
        assert!(
            decision.stop || member.alight_here == 0 || member.is_returning,
            "consist {:?} told to skip a stop with {} alighters aboard",
            member.id,
            member.alight_here
        );
        {
            let mut dwell = world
                .get_mut::<DwellState>(entity)
                .expect("decided consist lost its dwell state");
            if decision.stop {
                dwell.to_stop = true;
                dwell.stop_count += stop_time;
            } else {
                dwell.to_stop = false;
            }
        }
        let mut excursion = world
            .get_mut::<Excursion>(entity)
            .expect("decided consist lost its excursion state");
        excursion.to_turn = decision.turn;
        excursion.can_return_stop = decision.can_return_stop;
    }
}
