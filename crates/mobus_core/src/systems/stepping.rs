//! Consist stepping: one tick of the per-consist state machine.
//!
//! Consists are stepped in descending location order (ties by ascending
//! id), so a follower never overtakes its predecessor within a tick.
//! Section travel counts down and realises armed split/merge manoeuvres on
//! expiry; dwell completion alights, boards and departs whole co-located
//! groups at once; departures choose between the trunk, a side branch and
//! the turnaround of an excursion.

use std::collections::HashSet;

use bevy_ecs::prelude::{Entity, Mut, World};

use crate::clock::SimulationClock;
use crate::ecs::{
    Consist, ConsistBundle, ConsistId, ConsistIndex, DwellState, Excursion, FleetCounters,
    Lifecycle, Manoeuvre, MergePlan, MergeSide, Phase, Progress, Reorg,
};
use crate::ledger::CabLedger;
use crate::line::Line;
use crate::location::{Location, Stop};
use crate::passenger::{PassengerId, PassengerRegistry};
use crate::scenario::{ModeConfig, SimConstants};

struct Ctx<'a> {
    line: &'a mut Line,
    registry: &'a mut PassengerRegistry,
    ledger: &'a mut CabLedger,
    constants: SimConstants,
    modular: bool,
    now: u64,
    step: i64,
    stop_time: i64,
}

pub fn step_consists_system(world: &mut World) {
    let now = world.resource::<SimulationClock>().now();
    let step = world.resource::<SimulationClock>().step() as i64;
    let mode = *world.resource::<ModeConfig>();
    let constants = *world.resource::<SimConstants>();
    let stop_time = constants.stop_time_s(mode.mode, now);

    world.resource_scope(|world, mut line: Mut<Line>| {
        world.resource_scope(|world, mut registry: Mut<PassengerRegistry>| {
            world.resource_scope(|world, mut ledger: Mut<CabLedger>| {
                let mut ctx = Ctx {
                    line: &mut line,
                    registry: &mut registry,
                    ledger: &mut ledger,
                    constants,
                    modular: mode.mode.is_modular(),
                    now,
                    step,
                    stop_time,
                };
                step_all(world, &mut ctx);
            });
        });
    });
}

fn active_order(world: &mut World) -> Vec<(ConsistId, Entity)> {
    let mut order: Vec<((u16, u8, u8, u8), ConsistId, Entity)> = world
        .query::<(Entity, &Consist, &Progress, &Lifecycle)>()
        .iter(world)
        .filter(|(_, _, _, lifecycle)| lifecycle.phase == Phase::Active && lifecycle.able)
        .map(|(entity, consist, progress, _)| {
            (progress.location.sort_key(), consist.id, entity)
        })
        .collect();
    order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    order.into_iter().map(|(_, id, e)| (id, e)).collect()
}

fn step_all(world: &mut World, ctx: &mut Ctx) {
    let order = active_order(world);
    let mut decided: HashSet<ConsistId> = HashSet::new();

    for (id, entity) in order {
        if decided.contains(&id) {
            continue;
        }
        let location = world
            .get::<Progress>(entity)
            .expect("stepped consist lost its progress")
            .location;
        if location.at_station {
            step_at_station(world, ctx, entity, id, &mut decided);
        } else {
            step_in_section(world, ctx, entity, &mut decided);
        }
    }
}

// ---------------------------------------------------------------------------
// section travel

fn step_in_section(world: &mut World, ctx: &mut Ctx, entity: Entity, decided: &mut HashSet<ConsistId>) {
    let progress = *world.get::<Progress>(entity).unwrap();
    debug_assert!(progress.running, "mid-section consist not running");

    if let Stop::Trunk(section_start) = progress.location.stop {
        let reorg = *world.get::<Reorg>(entity).unwrap();
        if let Some(cabs) = reorg.split_request {
            arm_split(world, ctx, entity, section_start, cabs);
            return;
        }
        if let Some(plan) = reorg.merge_request {
            arm_merge(world, ctx, entity, section_start, plan, decided);
            return;
        }
    }

    if progress.time_count > ctx.step {
        world.get_mut::<Progress>(entity).unwrap().time_count -= ctx.step;
        return;
    }
    debug_assert!(progress.time_count > 0, "section timer underflow");
    world.get_mut::<Progress>(entity).unwrap().time_count = 0;

    let armed = world.get::<Reorg>(entity).unwrap().armed;
    match armed {
        Some(Manoeuvre::Split(cabs)) => execute_split(world, ctx, entity, cabs),
        Some(Manoeuvre::Merge(plan)) => execute_merge(world, ctx, entity, plan, decided),
        None => {
            let mut progress = world.get_mut::<Progress>(entity).unwrap();
            let arrived = progress.next;
            debug_assert!(arrived.at_station);
            progress.location = arrived;
            progress.next = Location::beyond(arrived.stop);
        }
    }
}

fn trunk_section_time(ctx: &Ctx, section_start: u16) -> i64 {
    let dist = ctx.line.section_distance_m(section_start) - ctx.constants.dis_fix_m;
    let speed = ctx.line.section_speed_ms(section_start);
    ((dist.max(0.0) / speed) as i64).max(1)
}

fn arm_split(world: &mut World, ctx: &mut Ctx, entity: Entity, section_start: u16, cabs: u8) {
    let dist = ctx.line.section_distance_m(section_start);
    let speed = ctx.line.section_speed_ms(section_start);
    let cruise = ((dist - ctx.constants.dis_fix_m - ctx.constants.sep_dist_m) / speed) as i64;
    let timer = (ctx.constants.sep_duration_s + cruise.max(0)).max(1);

    let mut reorg = world.get_mut::<Reorg>(entity).unwrap();
    reorg.split_request = None;
    reorg.armed = Some(Manoeuvre::Split(cabs));
    let mut progress = world.get_mut::<Progress>(entity).unwrap();
    progress.time_count = timer - ctx.step;
    debug_assert!(progress.time_count > 0, "split manoeuvre shorter than a tick");
}

fn arm_merge(
    world: &mut World,
    ctx: &mut Ctx,
    entity: Entity,
    section_start: u16,
    plan: MergePlan,
    decided: &mut HashSet<ConsistId>,
) {
    let partner_entity = world.resource::<ConsistIndex>().entity(plan.partner);
    let partner_plan = world
        .get::<Reorg>(partner_entity)
        .unwrap()
        .merge_request
        .expect("merge partner lost its decision");

    let dist = ctx.line.section_distance_m(section_start);
    let speed = ctx.line.section_speed_ms(section_start);
    let cruise = ((dist - ctx.constants.dis_fix_m - ctx.constants.comb_dist_m) / speed) as i64;
    let timer = (ctx.constants.comb_duration_s + cruise.max(0)).max(1) - ctx.step;
    debug_assert!(timer > 0, "merge manoeuvre shorter than a tick");

    for (e, merge_plan) in [(entity, plan), (partner_entity, partner_plan)] {
        let mut reorg = world.get_mut::<Reorg>(e).unwrap();
        reorg.merge_request = None;
        reorg.armed = Some(Manoeuvre::Merge(merge_plan));
        world.get_mut::<Progress>(e).unwrap().time_count = timer;
    }
    decided.insert(plan.partner);
}

fn spawn_successor(
    world: &mut World,
    ctx: &mut Ctx,
    at: Location,
    cabs: Vec<crate::ecs::CabId>,
    capacities: Vec<u16>,
    occupants: Vec<Vec<PassengerId>>,
) -> ConsistId {
    let id = world.resource_mut::<FleetCounters>().next_consist_id();
    let entity = world
        .spawn(ConsistBundle::successor(id, cabs, capacities, occupants, at))
        .id();
    world.resource_mut::<ConsistIndex>().by_id.insert(id, entity);
    let mut consist = world.get_mut::<Consist>(entity).unwrap();
    for p in consist.aboard().collect::<Vec<_>>() {
        ctx.registry.get_mut(p).aboard = Some(id);
    }
    consist.sort_passengers(at.stop.main_station(), ctx.registry, 1);
    id
}

fn execute_split(world: &mut World, ctx: &mut Ctx, entity: Entity, rear_cabs: u8) {
    let consist = world.get::<Consist>(entity).unwrap().clone();
    let progress = *world.get::<Progress>(entity).unwrap();
    let Stop::Trunk(section_start) = progress.location.stop else {
        panic!("split realised off the trunk");
    };
    let at = Location::at(Stop::Trunk(section_start + 1));

    let front_n = consist.cab_count() - rear_cabs as usize;
    debug_assert!(front_n >= 1);
    let aboard_before = consist.occupancy();

    let front = spawn_successor(
        world,
        ctx,
        at,
        consist.cabs[..front_n].to_vec(),
        consist.capacities[..front_n].to_vec(),
        consist.occupants[..front_n].to_vec(),
    );
    let rear = spawn_successor(
        world,
        ctx,
        at,
        consist.cabs[front_n..].to_vec(),
        consist.capacities[front_n..].to_vec(),
        consist.occupants[front_n..].to_vec(),
    );

    let mut lifecycle = world.get_mut::<Lifecycle>(entity).unwrap();
    lifecycle.able = false;
    lifecycle.successors = vec![front, rear];
    world.get_mut::<Reorg>(entity).unwrap().armed = None;

    // successors partition the parent's passengers exactly
    let after: u16 = [front, rear]
        .iter()
        .map(|&id| {
            let e = world.resource::<ConsistIndex>().entity(id);
            world.get::<Consist>(e).unwrap().occupancy()
        })
        .sum();
    assert_eq!(aboard_before, after, "split lost or duplicated passengers");
}

fn execute_merge(
    world: &mut World,
    ctx: &mut Ctx,
    entity: Entity,
    plan: MergePlan,
    decided: &mut HashSet<ConsistId>,
) {
    let partner_entity = world.resource::<ConsistIndex>().entity(plan.partner);
    let (front_entity, rear_entity) = match plan.side {
        MergeSide::Rear => (partner_entity, entity),
        MergeSide::Front => (entity, partner_entity),
    };
    let front = world.get::<Consist>(front_entity).unwrap().clone();
    let rear = world.get::<Consist>(rear_entity).unwrap().clone();
    let progress = *world.get::<Progress>(entity).unwrap();
    let Stop::Trunk(section_start) = progress.location.stop else {
        panic!("merge realised off the trunk");
    };
    let at = Location::at(Stop::Trunk(section_start + 1));

    let cab_count = front.cab_count() + rear.cab_count();
    assert!(cab_count <= 3, "merged consist would exceed three cabs");
    let aboard_before = front.occupancy() + rear.occupancy();

    let mut cabs = front.cabs.clone();
    cabs.extend_from_slice(&rear.cabs);
    let mut capacities = front.capacities.clone();
    capacities.extend_from_slice(&rear.capacities);
    let mut occupants = front.occupants.clone();
    occupants.extend_from_slice(&rear.occupants);

    let merged = spawn_successor(world, ctx, at, cabs, capacities, occupants);

    for e in [front_entity, rear_entity] {
        let mut lifecycle = world.get_mut::<Lifecycle>(e).unwrap();
        lifecycle.able = false;
        lifecycle.successors = vec![merged];
        world.get_mut::<Reorg>(e).unwrap().armed = None;
    }
    decided.insert(front.id);
    decided.insert(rear.id);

    let merged_entity = world.resource::<ConsistIndex>().entity(merged);
    let after = world.get::<Consist>(merged_entity).unwrap().occupancy();
    assert_eq!(aboard_before, after, "merge lost or duplicated passengers");
}

// ---------------------------------------------------------------------------
// station handling

fn step_at_station(
    world: &mut World,
    ctx: &mut Ctx,
    entity: Entity,
    id: ConsistId,
    decided: &mut HashSet<ConsistId>,
) {
    let dwell = *world.get::<DwellState>(entity).unwrap();
    if !dwell.to_stop {
        depart_or_terminate(world, ctx, entity);
        decided.insert(id);
        return;
    }

    assert!(dwell.stop_count > 0, "dwelling consist without remaining dwell");
    {
        let mut dwell = world.get_mut::<DwellState>(entity).unwrap();
        dwell.is_waiting = true;
        dwell.stop_count -= ctx.step;
        if dwell.stop_count > 0 {
            return;
        }
        dwell.stop_count = 0;
    }

    // co-located consists whose dwell expires this same tick finish as one
    // group: alight together, then board largest-residual-capacity first
    let location = world.get::<Progress>(entity).unwrap().location;
    let mut group: Vec<(ConsistId, Entity)> = world
        .query::<(Entity, &Consist, &Progress, &DwellState, &Lifecycle)>()
        .iter(world)
        .filter(|(e, consist, progress, dwell, lifecycle)| {
            *e != entity
                && lifecycle.phase == Phase::Active
                && lifecycle.able
                && progress.location == location
                && dwell.is_waiting
                && dwell.stop_count > 0
                && dwell.stop_count <= ctx.step
                && !decided.contains(&consist.id)
        })
        .map(|(e, consist, ..)| (consist.id, e))
        .collect();
    group.sort_by_key(|&(gid, _)| gid);
    for &(_, e) in &group {
        world.get_mut::<DwellState>(e).unwrap().stop_count = 0;
    }
    group.push((id, entity));

    for &(_, e) in &group {
        alight_and_bill(world, ctx, e, location.stop);
    }

    let mut boarding_order = group.clone();
    boarding_order.sort_by_key(|&(_, e)| {
        std::cmp::Reverse(world.get::<Consist>(e).unwrap().remaining_capacity())
    });
    for &(_, e) in &boarding_order {
        board_from_pool(world, ctx, e, location.stop);
    }

    for &(gid, e) in &group {
        depart_or_terminate(world, ctx, e);
        decided.insert(gid);
    }
}

fn should_alight(destination: Stop, here: Stop, turn: u8) -> bool {
    match here {
        Stop::Trunk(station) => match destination {
            Stop::Trunk(d) => d == station,
            // side-destined passengers ride through a diversion onto their
            // own branch, otherwise the anchor is their drop point
            Stop::Side { anchor, branch, .. } => anchor == station && (turn == 0 || branch != turn),
        },
        side_stop => destination == side_stop,
    }
}

fn alight_and_bill(world: &mut World, ctx: &mut Ctx, entity: Entity, here: Stop) {
    let turn = world.get::<Excursion>(entity).unwrap().to_turn;
    let consist_id = world.get::<Consist>(entity).unwrap().id;
    let aboard: Vec<PassengerId> = world.get::<Consist>(entity).unwrap().aboard().collect();

    let mut alighters = Vec::new();
    for p in aboard {
        if should_alight(ctx.registry.get(p).alight_stop, here, turn) {
            alighters.push(p);
        } else {
            ctx.registry.get_mut(p).add_dwell_wait(ctx.stop_time as u64);
        }
    }

    let mut consist = world.get_mut::<Consist>(entity).unwrap();
    for p in alighters {
        assert!(
            consist.remove(p),
            "passenger {p:?} recorded aboard consist {consist_id:?} but not found"
        );
        let passenger = ctx.registry.get_mut(p);
        passenger.alighted_at = Some(ctx.now);
        passenger.actual_alight = Some(here);
        passenger.aboard = None;
    }
}

fn board_from_pool(world: &mut World, ctx: &mut Ctx, entity: Entity, here: Stop) {
    let mut consist = world.get_mut::<Consist>(entity).unwrap();
    let id = consist.id;
    let pool = ctx.line.pool_at_mut(here);
    while !consist.is_full() {
        let Some(p) = pool.pop_front() else {
            break;
        };
        assert!(consist.board(p), "boarding refused below capacity");
        let passenger = ctx.registry.get_mut(p);
        debug_assert!(passenger.aboard.is_none(), "passenger boarded twice");
        passenger.boarded_at = Some(ctx.now);
        passenger.aboard = Some(id);
    }
    debug_assert!(consist.occupancy() <= consist.capacity());
}

// ---------------------------------------------------------------------------
// departures

fn depart_or_terminate(world: &mut World, ctx: &mut Ctx, entity: Entity) {
    let location = world.get::<Progress>(entity).unwrap().location;
    match location.stop {
        Stop::Trunk(station) => depart_trunk(world, ctx, entity, station),
        Stop::Side {
            anchor,
            branch,
            order,
        } => depart_side(world, ctx, entity, anchor, branch, order),
    }
}

fn record_departure(world: &mut World, ctx: &mut Ctx, entity: Entity, distance_m: f64) {
    let consist = world.get::<Consist>(entity).unwrap();
    let cabs = consist.cabs.clone();
    let loads: Vec<u16> = consist.occupants.iter().map(|c| c.len() as u16).collect();
    ctx.ledger.add_distance(&cabs, distance_m);
    for (cab, load) in cabs.into_iter().zip(loads) {
        ctx.ledger.record_departure(cab, ctx.now, load);
    }
}

fn reset_dwell(world: &mut World, entity: Entity) {
    let mut dwell = world.get_mut::<DwellState>(entity).unwrap();
    dwell.to_stop = false;
    dwell.is_waiting = false;
    dwell.stop_count = 0;
}

fn depart_trunk(world: &mut World, ctx: &mut Ctx, entity: Entity, station: u16) {
    let turn = world.get::<Excursion>(entity).unwrap().to_turn;

    if station == ctx.line.last_station() && turn == 0 {
        let consist = world.get::<Consist>(entity).unwrap();
        assert!(
            consist.is_empty(),
            "consist {:?} terminating with passengers aboard",
            consist.id
        );
        let cabs = consist.cabs.clone();
        ctx.ledger.close(&cabs, ctx.now);
        reset_dwell(world, entity);
        world.get_mut::<Lifecycle>(entity).unwrap().phase = Phase::Ended;
        return;
    }

    if turn > 0 {
        let branch = ctx
            .line
            .branch(station, turn)
            .expect("turn decision onto a missing branch");
        let segment_len = branch.segment_len_m;
        let segment_time = branch.segment_time_s;

        reset_dwell(world, entity);
        {
            let mut excursion = world.get_mut::<Excursion>(entity).unwrap();
            excursion.to_turn = 0;
            excursion.is_returning = false;
        }
        let mut progress = world.get_mut::<Progress>(entity).unwrap();
        progress.location = Location::beyond(Stop::Side {
            anchor: station,
            branch: turn,
            order: 0,
        });
        progress.next = Location::at(Stop::Side {
            anchor: station,
            branch: turn,
            order: 1,
        });
        progress.running = true;
        progress.time_count = segment_time;

        record_departure(world, ctx, entity, segment_len);
        sort_after_departure(world, ctx, entity, station);
        return;
    }

    // plain trunk departure
    reset_dwell(world, entity);
    {
        let mut excursion = world.get_mut::<Excursion>(entity).unwrap();
        excursion.is_returning = false;
        excursion.can_return_stop = false;
    }
    let section_time = trunk_section_time(ctx, station);
    {
        let mut progress = world.get_mut::<Progress>(entity).unwrap();
        progress.location = Location::beyond(Stop::Trunk(station));
        progress.next = Location::at(Stop::Trunk(station + 1));
        progress.running = true;
        progress.time_count = section_time;
    }
    if ctx.modular {
        world.get_mut::<Reorg>(entity).unwrap().to_dec_trans = true;
    }

    let section_len = ctx.line.section_distance_m(station);
    record_departure(world, ctx, entity, section_len);
    sort_after_departure(world, ctx, entity, station);
}

fn depart_side(
    world: &mut World,
    ctx: &mut Ctx,
    entity: Entity,
    anchor: u16,
    branch: u8,
    order: u8,
) {
    let (last_order, segment_len, segment_time) = {
        let side = ctx.line.branch(anchor, branch).expect("consist on unknown branch");
        (side.last_order(), side.segment_len_m, side.segment_time_s)
    };

    let was_returning = world.get::<Excursion>(entity).unwrap().is_returning;
    let returning = if was_returning {
        true
    } else if order == last_order {
        true
    } else {
        // early return: nothing to serve further out
        let further_alight = {
            let consist = world.get::<Consist>(entity).unwrap();
            (order + 1..=last_order).any(|o| {
                consist.has_alighter_at(
                    Stop::Side {
                        anchor,
                        branch,
                        order: o,
                    },
                    ctx.registry,
                )
            })
        };
        let further_wait = ctx
            .line
            .branch(anchor, branch)
            .map(|side| side.waiting_beyond(order))
            .unwrap_or(false);
        !further_alight && !further_wait
    };

    let next_stop = if returning {
        if order > 1 {
            Stop::Side {
                anchor,
                branch,
                order: order - 1,
            }
        } else {
            Stop::Trunk(anchor)
        }
    } else {
        Stop::Side {
            anchor,
            branch,
            order: order + 1,
        }
    };

    reset_dwell(world, entity);
    world.get_mut::<Excursion>(entity).unwrap().is_returning = returning;
    {
        let mut progress = world.get_mut::<Progress>(entity).unwrap();
        progress.location = Location::beyond(Stop::Side {
            anchor,
            branch,
            order,
        });
        progress.next = Location::at(next_stop);
        progress.running = true;
        progress.time_count = segment_time;
    }

    record_departure(world, ctx, entity, segment_len);
    sort_after_departure(world, ctx, entity, anchor);
}

fn sort_after_departure(world: &mut World, ctx: &mut Ctx, entity: Entity, station: u16) {
    world
        .get_mut::<Consist>(entity)
        .unwrap()
        .sort_passengers(station, ctx.registry, 1);
}
