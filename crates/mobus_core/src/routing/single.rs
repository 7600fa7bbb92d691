//! Single-line modular group rule.
//!
//! Newly arrived consists with an alighter must stop. The rest skip when a
//! waiting consist already covers the station or the pool is empty;
//! otherwise they enter the alternate pool, which is resolved against the
//! must-stop capacity estimate (see [`super::resolve_alternate_pool`]).

use super::{resolve_alternate_pool, GroupMember};
use crate::ecs::ConsistId;

pub fn decide_group(
    members: &[GroupMember],
    pool_len: usize,
    rate_max_stop: f64,
    station: u16,
) -> Vec<(ConsistId, bool)> {
    let any_waiting = members.iter().any(|m| m.is_waiting);

    let mut decisions = Vec::new();
    let mut must_stop = Vec::new();
    let mut alternates = Vec::new();
    for member in members.iter().filter(|m| !m.is_waiting) {
        if member.alight_here > 0 {
            decisions.push((member.id, true));
            must_stop.push(member.clone());
        } else if any_waiting {
            // the dwelling consist will handle boarding
            decisions.push((member.id, false));
        } else if pool_len == 0 {
            decisions.push((member.id, false));
        } else {
            alternates.push(member.clone());
        }
    }
    if !alternates.is_empty() {
        decisions.extend(resolve_alternate_pool(
            &must_stop,
            &alternates,
            pool_len,
            rate_max_stop,
            station,
        ));
    }
    decisions
}

#[cfg(test)]
mod tests {
    use super::super::tests::member;
    use super::*;

    #[test]
    fn alighters_always_stop() {
        let members = vec![
            GroupMember {
                alight_here: 4,
                ..member(0, 10, 40, 60)
            },
            member(1, 10, 40, 70),
        ];
        let dec = decide_group(&members, 0, 1.0, 3);
        assert_eq!(dec, vec![(ConsistId(0), true), (ConsistId(1), false)]);
    }

    #[test]
    fn waiting_consist_absorbs_newcomers() {
        let members = vec![
            GroupMember {
                is_waiting: true,
                ..member(0, 10, 40, 60)
            },
            member(1, 5, 40, 70),
        ];
        let dec = decide_group(&members, 12, 1.0, 3);
        assert_eq!(dec, vec![(ConsistId(1), false)]);
    }

    #[test]
    fn overflow_promotes_the_less_committed_consist() {
        // two half-loaded consists, nobody alighting, 15 waiting:
        // exactly one stops, and it is the one with the shorter
        // remaining-station total
        let members = vec![member(0, 20, 40, 90), member(1, 20, 40, 35)];
        let dec = decide_group(&members, 15, 1.0, 5);
        assert_eq!(dec, vec![(ConsistId(1), true), (ConsistId(0), false)]);
    }

    #[test]
    fn must_stop_capacity_covers_demand_without_alternates() {
        let members = vec![
            GroupMember {
                alight_here: 20,
                ..member(0, 30, 60, 50)
            },
            member(1, 10, 60, 80),
        ];
        // est = 30 - 20 + 8 = 18 < 60 → the alternate cruises
        let dec = decide_group(&members, 8, 1.0, 5);
        assert_eq!(dec, vec![(ConsistId(0), true), (ConsistId(1), false)]);
    }
}
