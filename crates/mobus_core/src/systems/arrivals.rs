//! Passenger arrivals: drain the demand stream head into waiting pools.

use bevy_ecs::prelude::{Res, ResMut};

use crate::clock::SimulationClock;
use crate::demand::DemandStream;
use crate::line::Line;
use crate::passenger::PassengerRegistry;

pub fn passenger_arrival_system(
    clock: Res<SimulationClock>,
    mut stream: ResMut<DemandStream>,
    mut registry: ResMut<PassengerRegistry>,
    mut line: ResMut<Line>,
) {
    let now = clock.now();
    while stream.cursor < stream.entries.len() {
        let entry = stream.entries[stream.cursor];
        if entry.arrive_t > now {
            break;
        }
        let id = registry.materialize(
            entry.origin,
            entry.destination,
            entry.board_stop,
            entry.alight_stop,
            entry.side_trip,
            entry.arrive_t,
        );
        line.pool_at_mut(entry.board_stop).push_back(id);
        stream.cursor += 1;
    }
}
