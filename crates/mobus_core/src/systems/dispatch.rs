//! Dispatch: spawn a fresh consist at the first station when the policy
//! permits.

use bevy_ecs::prelude::World;
use log::debug;

use crate::clock::SimulationClock;
use crate::dispatch::{can_depart, decide, DispatchState, DispatchTables};
use crate::ecs::{ConsistBundle, ConsistIndex, FleetCounters};
use crate::ledger::CabLedger;
use crate::scenario::{ModeConfig, SimConstants};

pub fn dispatch_system(world: &mut World) {
    let now = world.resource::<SimulationClock>().now();
    let mode = world.resource::<ModeConfig>().mode;
    let constants = *world.resource::<SimConstants>();

    let permitted = {
        let tables = world.resource::<DispatchTables>();
        let state = world.resource::<DispatchState>();
        can_depart(mode, tables, state, &constants, now)
    };
    if !permitted {
        return;
    }

    let order = {
        let tables = world.resource::<DispatchTables>();
        decide(mode, tables, &constants, now)
    };
    world.resource_mut::<DispatchState>().last_departure = Some(now);

    let (id, cabs) = {
        let mut counters = world.resource_mut::<FleetCounters>();
        let id = counters.next_consist_id();
        let cabs = counters.next_cab_ids(order.cab_count as usize);
        (id, cabs)
    };
    {
        let mut ledger = world.resource_mut::<CabLedger>();
        for &cab in &cabs {
            ledger.open(cab, now);
        }
    }
    let capacities = vec![order.cab_capacity; order.cab_count as usize];
    debug!(
        "t={now}: dispatching consist {id:?} with {} cab(s) of {}",
        order.cab_count, order.cab_capacity
    );
    let entity = world
        .spawn(ConsistBundle::dispatched(id, cabs, capacities))
        .id();
    world.resource_mut::<ConsistIndex>().by_id.insert(id, entity);
}
