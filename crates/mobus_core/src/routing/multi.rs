//! Multi-mode routing: side-stop rule plus the down-first and up-first
//! trunk-station rules.
//!
//! Down-first prioritises delivering aboard side-destined passengers;
//! up-first prioritises lifting waiting side-branch passengers and only
//! diverts lightly-loaded consists. Both share the side-stop rule and the
//! returning-consist contention for trunk stops.

use rand::rngs::StdRng;
use rand::Rng;

use super::{resolve_alternate_pool, GroupMember, SideView, StopDecision, TrunkView};
use crate::ecs::ConsistId;
use crate::scenario::{SimConstants, TurnRule};

/// Decisions for a group co-located at a side stop.
///
/// Not-returning consists stop for their alighters, the terminal stop
/// additionally boards; a returning consist stops when it is the first to
/// reach a non-empty pool with capacity left, or when it carries an
/// alighter for this stop.
pub fn decide_side_group(members: &[GroupMember], view: &SideView) -> Vec<(ConsistId, StopDecision)> {
    let any_waiting = members.iter().any(|m| m.is_waiting);
    let mut pool_claimed = false;
    let mut decisions = Vec::new();

    for member in members.iter().filter(|m| !m.is_waiting) {
        let stop = if member.is_returning {
            let lifts = !any_waiting && !pool_claimed && view.pool_len > 0 && !member.is_full();
            if lifts {
                pool_claimed = true;
            }
            lifts || member.alight_here > 0
        } else if !view.is_terminal {
            member.alight_here > 0
        } else {
            (member.alight_here > 0 || view.pool_len > 0)
                && !(member.alight_here == 0 && member.is_full())
        };
        decisions.push((
            member.id,
            StopDecision::straight(stop, member.can_return_stop),
        ));
    }
    decisions
}

/// Decisions for a group co-located at a trunk station.
pub fn decide_trunk_group(
    rule: TurnRule,
    members: &[GroupMember],
    view: &TrunkView,
    constants: &SimConstants,
    rng: &mut StdRng,
) -> Vec<(ConsistId, StopDecision)> {
    let mut decisions: Vec<(ConsistId, StopDecision)> = Vec::new();

    let dwelling: Vec<GroupMember> = members.iter().filter(|m| m.is_waiting).cloned().collect();
    let returning: Vec<&GroupMember> = members
        .iter()
        .filter(|m| !m.is_waiting && m.is_returning)
        .collect();
    let arrivals: Vec<&GroupMember> = members
        .iter()
        .filter(|m| !m.is_waiting && !m.is_returning)
        .collect();

    // returning consists: denied ones cruise, allowed ones contend for the
    // pool exactly like the single-line alternate pool
    for member in returning.iter().filter(|m| !m.can_return_stop) {
        decisions.push((member.id, StopDecision::straight(false, false)));
    }
    let contenders: Vec<GroupMember> = returning
        .iter()
        .filter(|m| m.can_return_stop)
        .map(|m| (*m).clone())
        .collect();
    if !contenders.is_empty() {
        for (id, stop) in resolve_alternate_pool(
            &dwelling,
            &contenders,
            view.pool_len,
            constants.rate_max_stop,
            view.station,
        ) {
            let keep = contenders
                .iter()
                .find(|m| m.id == id)
                .map(|m| m.can_return_stop)
                .unwrap_or(false);
            decisions.push((id, StopDecision::straight(stop, keep)));
        }
    }

    if arrivals.is_empty() {
        return decisions;
    }

    // consists already committed to a branch, including dwelling deciders
    let mut turns = [
        members.iter().filter(|m| m.to_turn == 1).count(),
        members.iter().filter(|m| m.to_turn == 2).count(),
    ];
    let have_down: Vec<&GroupMember> = arrivals
        .iter()
        .copied()
        .filter(|m| m.alight_here > 0)
        .collect();
    let mut no_down: Vec<&GroupMember> = arrivals
        .iter()
        .copied()
        .filter(|m| m.alight_here == 0)
        .collect();

    match rule {
        TurnRule::DownFirst => {
            for member in &no_down {
                let dec = down_first_no_down(member, view, constants, &dwelling, &mut turns);
                decisions.push((member.id, dec));
            }
            for member in &have_down {
                let dec = down_first_have_down(member, view, constants, &mut turns, rng);
                decisions.push((member.id, dec));
            }
        }
        TurnRule::UpFirst => {
            // lighter-committed consists pick their branch first
            no_down.sort_by_key(|m| m.sum_stations_to_go);
            let mut trunk_stops = 0usize;
            for member in &no_down {
                let dec = up_first_no_down(
                    member,
                    view,
                    constants,
                    dwelling.len() + have_down.len() + trunk_stops,
                    &mut turns,
                    rng,
                );
                if dec.stop {
                    trunk_stops += 1;
                }
                decisions.push((member.id, dec));
            }
            for member in &have_down {
                let dec = up_first_have_down(view, &mut turns, rng);
                decisions.push((member.id, dec));
            }
        }
    }

    debug_assert_eq!(
        decisions.len() + dwelling.len(),
        members.len(),
        "every group member needs a decision at station {}",
        view.station
    );
    decisions
}

fn branch_covered(view: &TrunkView, turns: &[usize; 2], branch: u8) -> bool {
    view.branches[branch as usize - 1].present + turns[branch as usize - 1] > 0
}

fn pool_of(view: &TrunkView, branch: u8) -> usize {
    view.branches[branch as usize - 1].waiting
}

fn earliest_of(view: &TrunkView, branch: u8) -> u64 {
    view.branches[branch as usize - 1]
        .earliest_arrival
        .unwrap_or(u64::MAX)
}

/// Tie-break between two non-empty branch pools: size, then (up-first only)
/// the earliest pool-head arrival, then a seeded coin flip.
fn pick_waiting_branch(view: &TrunkView, by_earliest: bool, rng: &mut StdRng) -> u8 {
    let (p1, p2) = (pool_of(view, 1), pool_of(view, 2));
    if p1 != p2 {
        return if p1 > p2 { 1 } else { 2 };
    }
    if by_earliest {
        let (e1, e2) = (earliest_of(view, 1), earliest_of(view, 2));
        if e1 != e2 {
            return if e1 < e2 { 1 } else { 2 };
        }
    }
    rng.gen_range(1..=2)
}

/// Trunk fallback for a consist with no reason to divert: stop only when
/// the trunk pool has demand, the station is not over-served and capacity
/// remains.
fn trunk_fallback(member: &GroupMember, view: &TrunkView, constants: &SimConstants, stopped: usize) -> StopDecision {
    let stop = view.pool_len > 0
        && stopped <= constants.only_main_line_stop_threshold
        && !member.is_full();
    StopDecision::straight(stop, false)
}

fn down_first_no_down(
    member: &GroupMember,
    view: &TrunkView,
    constants: &SimConstants,
    dwelling: &[GroupMember],
    turns: &mut [usize; 2],
) -> StopDecision {
    let (d1, d2) = member.side_drops;
    if d1 > 0 && d2 == 0 {
        turns[0] += 1;
        return StopDecision {
            stop: false,
            turn: 1,
            can_return_stop: true,
        };
    }
    if d2 > 0 && d1 == 0 {
        turns[1] += 1;
        return StopDecision {
            stop: false,
            turn: 2,
            can_return_stop: true,
        };
    }
    if d1 > 0 && d2 > 0 {
        // drops both ways: deliver the dominant branch, the other side
        // alights here
        let turn = if d1 != d2 {
            if d1 > d2 {
                1
            } else {
                2
            }
        } else if pool_of(view, 1) >= pool_of(view, 2) {
            1
        } else {
            2
        };
        turns[turn as usize - 1] += 1;
        return StopDecision {
            stop: true,
            turn,
            can_return_stop: false,
        };
    }

    let covered1 = branch_covered(view, turns, 1);
    let covered2 = branch_covered(view, turns, 2);
    if covered1 && covered2 {
        trunk_fallback(member, view, constants, dwelling.len())
    } else if covered1 {
        if pool_of(view, 2) > 0 {
            turns[1] += 1;
            StopDecision {
                stop: false,
                turn: 2,
                can_return_stop: true,
            }
        } else {
            trunk_fallback(member, view, constants, dwelling.len())
        }
    } else if covered2 {
        if pool_of(view, 1) > 0 {
            turns[0] += 1;
            StopDecision {
                stop: false,
                turn: 1,
                can_return_stop: true,
            }
        } else {
            trunk_fallback(member, view, constants, dwelling.len())
        }
    } else if pool_of(view, 1) > 0 || pool_of(view, 2) > 0 {
        let turn = if pool_of(view, 1) >= pool_of(view, 2) {
            1
        } else {
            2
        };
        turns[turn as usize - 1] += 1;
        StopDecision {
            stop: false,
            turn,
            can_return_stop: true,
        }
    } else {
        trunk_fallback(member, view, constants, dwelling.len())
    }
}

fn down_first_have_down(
    member: &GroupMember,
    view: &TrunkView,
    constants: &SimConstants,
    turns: &mut [usize; 2],
    rng: &mut StdRng,
) -> StopDecision {
    let (d1, d2) = member.side_drops;
    let qualifies = |drops: u16| {
        drops >= constants.stop_turn_threshold
            && drops as f64 / member.occupancy as f64 >= constants.stop_turn_rate
    };

    if d1 > 0 && d2 == 0 {
        if qualifies(d1) {
            turns[0] += 1;
            return StopDecision {
                stop: true,
                turn: 1,
                can_return_stop: false,
            };
        }
        return StopDecision::straight(true, false);
    }
    if d2 > 0 && d1 == 0 {
        if qualifies(d2) {
            turns[1] += 1;
            return StopDecision {
                stop: true,
                turn: 2,
                can_return_stop: false,
            };
        }
        return StopDecision::straight(true, false);
    }
    if d1 > 0 && d2 > 0 {
        if qualifies(d1.max(d2)) {
            let turn = if d1 >= d2 { 1 } else { 2 };
            turns[turn as usize - 1] += 1;
            return StopDecision {
                stop: true,
                turn,
                can_return_stop: false,
            };
        }
        return StopDecision::straight(true, false);
    }

    // no side drops aboard: it stops regardless, the question is whether it
    // turns afterwards
    let covered1 = branch_covered(view, turns, 1);
    let covered2 = branch_covered(view, turns, 2);
    if covered1 && covered2 {
        StopDecision::straight(true, false)
    } else if covered1 {
        if pool_of(view, 2) > 0 {
            turns[1] += 1;
            StopDecision {
                stop: true,
                turn: 2,
                can_return_stop: false,
            }
        } else {
            StopDecision::straight(true, false)
        }
    } else if covered2 {
        if pool_of(view, 1) > 0 {
            turns[0] += 1;
            StopDecision {
                stop: true,
                turn: 1,
                can_return_stop: false,
            }
        } else {
            StopDecision::straight(true, false)
        }
    } else if pool_of(view, 1) > 0 || pool_of(view, 2) > 0 {
        let turn = pick_waiting_branch(view, false, rng);
        turns[turn as usize - 1] += 1;
        StopDecision {
            stop: true,
            turn,
            can_return_stop: false,
        }
    } else {
        StopDecision::straight(true, false)
    }
}

fn up_first_no_down(
    member: &GroupMember,
    view: &TrunkView,
    constants: &SimConstants,
    stopped: usize,
    turns: &mut [usize; 2],
    rng: &mut StdRng,
) -> StopDecision {
    let (d1, d2) = member.side_drops;
    let side_down = d1 + d2;
    let light = member.occupancy <= constants.turn_max_pass_num;
    let covered1 = branch_covered(view, turns, 1);
    let covered2 = branch_covered(view, turns, 2);

    // stop straight, alighting side-destined passengers on the trunk if any
    let stay = |member: &GroupMember| -> StopDecision {
        if side_down > 0 {
            StopDecision::straight(true, false)
        } else {
            trunk_fallback(member, view, constants, stopped)
        }
    };
    // divert to `turn`: passengers for the other branch force a stop first
    let mut divert = |turn: u8| -> StopDecision {
        turns[turn as usize - 1] += 1;
        let other_down = if turn == 1 { d2 } else { d1 };
        StopDecision {
            stop: other_down > 0,
            turn,
            can_return_stop: true,
        }
    };

    if covered1 && covered2 {
        let fallback = trunk_fallback(member, view, constants, stopped);
        if fallback.stop {
            fallback
        } else {
            stay(member)
        }
    } else if covered1 {
        if pool_of(view, 2) > 0 && light {
            divert(2)
        } else if pool_of(view, 2) > 0 {
            // too heavy to divert
            if side_down > 0 {
                StopDecision::straight(true, false)
            } else {
                StopDecision::straight(false, false)
            }
        } else {
            let fallback = trunk_fallback(member, view, constants, stopped);
            if fallback.stop {
                fallback
            } else {
                stay(member)
            }
        }
    } else if covered2 {
        if pool_of(view, 1) > 0 && light {
            divert(1)
        } else if pool_of(view, 1) > 0 {
            if side_down > 0 {
                StopDecision::straight(true, false)
            } else {
                StopDecision::straight(false, false)
            }
        } else {
            let fallback = trunk_fallback(member, view, constants, stopped);
            if fallback.stop {
                fallback
            } else {
                stay(member)
            }
        }
    } else if pool_of(view, 1) > 0 || pool_of(view, 2) > 0 {
        if light {
            divert(pick_waiting_branch(view, true, rng))
        } else if side_down > 0 {
            StopDecision::straight(true, false)
        } else {
            trunk_fallback(member, view, constants, stopped)
        }
    } else {
        let fallback = trunk_fallback(member, view, constants, stopped);
        if fallback.stop {
            fallback
        } else {
            stay(member)
        }
    }
}

fn up_first_have_down(
    view: &TrunkView,
    turns: &mut [usize; 2],
    rng: &mut StdRng,
) -> StopDecision {
    let covered1 = branch_covered(view, turns, 1);
    let covered2 = branch_covered(view, turns, 2);

    if covered1 && covered2 {
        StopDecision::straight(true, false)
    } else if covered1 {
        if pool_of(view, 2) > 0 {
            turns[1] += 1;
            StopDecision {
                stop: true,
                turn: 2,
                can_return_stop: false,
            }
        } else {
            StopDecision::straight(true, false)
        }
    } else if covered2 {
        if pool_of(view, 1) > 0 {
            turns[0] += 1;
            StopDecision {
                stop: true,
                turn: 1,
                can_return_stop: false,
            }
        } else {
            StopDecision::straight(true, false)
        }
    } else if pool_of(view, 1) > 0 || pool_of(view, 2) > 0 {
        let turn = pick_waiting_branch(view, true, rng);
        turns[turn as usize - 1] += 1;
        StopDecision {
            stop: true,
            turn,
            can_return_stop: true,
        }
    } else {
        StopDecision::straight(true, false)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::member;
    use super::*;
    use rand::SeedableRng;

    fn view(pool: usize, b1: BranchViewSpec, b2: BranchViewSpec) -> TrunkView {
        TrunkView {
            station: 6,
            pool_len: pool,
            branches: [
                super::super::BranchView {
                    present: b1.0,
                    waiting: b1.1,
                    earliest_arrival: b1.2,
                },
                super::super::BranchView {
                    present: b2.0,
                    waiting: b2.1,
                    earliest_arrival: b2.2,
                },
            ],
        }
    }

    type BranchViewSpec = (usize, usize, Option<u64>);

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn down_first_diverts_without_stopping_on_unambiguous_drops() {
        let consts = SimConstants::default();
        let m = GroupMember {
            side_drops: (3, 0),
            ..member(0, 5, 40, 30)
        };
        let dec = decide_trunk_group(
            TurnRule::DownFirst,
            &[m],
            &view(0, (0, 0, None), (0, 0, None)),
            &consts,
            &mut rng(),
        );
        assert_eq!(
            dec,
            vec![(
                ConsistId(0),
                StopDecision {
                    stop: false,
                    turn: 1,
                    can_return_stop: true
                }
            )]
        );
    }

    #[test]
    fn down_first_stop_and_turn_needs_both_thresholds() {
        let consts = SimConstants::default();
        // 3 alighters on the trunk, 3 branch-1 drops out of 10 aboard:
        // 3 >= 2 and 0.3 >= 0.2 → stop and divert to branch 1
        let strong = GroupMember {
            alight_here: 3,
            side_drops: (3, 0),
            ..member(0, 10, 40, 30)
        };
        // only 1 branch drop: below the count threshold → stop straight
        let weak = GroupMember {
            alight_here: 3,
            side_drops: (0, 1),
            ..member(1, 10, 40, 30)
        };
        let dec = decide_trunk_group(
            TurnRule::DownFirst,
            &[strong, weak],
            &view(0, (0, 0, None), (0, 0, None)),
            &consts,
            &mut rng(),
        );
        assert_eq!(
            dec,
            vec![
                (
                    ConsistId(0),
                    StopDecision {
                        stop: true,
                        turn: 1,
                        can_return_stop: false
                    }
                ),
                (ConsistId(1), StopDecision::straight(true, false)),
            ]
        );
    }

    #[test]
    fn down_first_sends_help_to_the_uncovered_branch() {
        let consts = SimConstants::default();
        // branch 1 already has a consist, branch 2 has waiting passengers
        let m = member(0, 2, 40, 30);
        let dec = decide_trunk_group(
            TurnRule::DownFirst,
            &[m],
            &view(0, (1, 0, None), (0, 4, Some(100))),
            &consts,
            &mut rng(),
        );
        assert_eq!(
            dec,
            vec![(
                ConsistId(0),
                StopDecision {
                    stop: false,
                    turn: 2,
                    can_return_stop: true
                }
            )]
        );
    }

    #[test]
    fn up_first_heavy_consists_never_divert() {
        let consts = SimConstants::default();
        // occupancy above the up-first diversion cap
        let heavy = member(0, 15, 40, 30);
        let dec = decide_trunk_group(
            TurnRule::UpFirst,
            &[heavy],
            &view(0, (0, 3, Some(50)), (0, 0, None)),
            &consts,
            &mut rng(),
        );
        assert_eq!(dec, vec![(ConsistId(0), StopDecision::straight(false, false))]);

        let light = member(1, 4, 40, 30);
        let dec = decide_trunk_group(
            TurnRule::UpFirst,
            &[light],
            &view(0, (0, 3, Some(50)), (0, 0, None)),
            &consts,
            &mut rng(),
        );
        assert_eq!(
            dec,
            vec![(
                ConsistId(1),
                StopDecision {
                    stop: false,
                    turn: 1,
                    can_return_stop: true
                }
            )]
        );
    }

    #[test]
    fn up_first_ties_break_by_pool_then_earliest_arrival() {
        let consts = SimConstants::default();
        let m = member(0, 4, 40, 30);
        // equal pools, branch 2's head passenger arrived earlier
        let dec = decide_trunk_group(
            TurnRule::UpFirst,
            &[m],
            &view(0, (0, 2, Some(500)), (0, 2, Some(100))),
            &consts,
            &mut rng(),
        );
        assert_eq!(
            dec,
            vec![(
                ConsistId(0),
                StopDecision {
                    stop: false,
                    turn: 2,
                    can_return_stop: true
                }
            )]
        );
    }

    #[test]
    fn returning_consists_honour_the_return_stop_flag() {
        let consts = SimConstants::default();
        let denied = GroupMember {
            is_returning: true,
            can_return_stop: false,
            ..member(0, 5, 40, 30)
        };
        let allowed = GroupMember {
            is_returning: true,
            can_return_stop: true,
            ..member(1, 5, 40, 30)
        };
        let dec = decide_trunk_group(
            TurnRule::DownFirst,
            &[denied, allowed],
            &view(6, (0, 0, None), (0, 0, None)),
            &consts,
            &mut rng(),
        );
        assert_eq!(
            dec,
            vec![
                (ConsistId(0), StopDecision::straight(false, false)),
                (ConsistId(1), StopDecision::straight(true, true)),
            ]
        );
    }

    #[test]
    fn side_stop_rule_alights_boards_and_early_claims() {
        let outbound_mid = SideView {
            anchor: 6,
            branch: 1,
            order: 2,
            is_terminal: false,
            pool_len: 3,
        };
        // intermediate outbound stop: only alighters matter
        let cruiser = member(0, 5, 40, 30);
        let alighter = GroupMember {
            alight_here: 2,
            ..member(1, 5, 40, 30)
        };
        let dec = decide_side_group(&[cruiser, alighter], &outbound_mid);
        assert_eq!(
            dec,
            vec![
                (ConsistId(0), StopDecision::straight(false, false)),
                (ConsistId(1), StopDecision::straight(true, false)),
            ]
        );

        // terminal stop boards waiting passengers unless full
        let terminal = SideView {
            is_terminal: true,
            ..outbound_mid
        };
        let full = member(2, 40, 40, 30);
        let hungry = member(3, 5, 40, 30);
        let dec = decide_side_group(&[full, hungry], &terminal);
        assert_eq!(
            dec,
            vec![
                (ConsistId(2), StopDecision::straight(false, false)),
                (ConsistId(3), StopDecision::straight(true, false)),
            ]
        );

        // first returning consist claims a non-empty pool
        let r1 = GroupMember {
            is_returning: true,
            ..member(4, 5, 40, 30)
        };
        let r2 = GroupMember {
            is_returning: true,
            ..member(5, 5, 40, 30)
        };
        let dec = decide_side_group(&[r1, r2], &outbound_mid);
        assert_eq!(
            dec,
            vec![
                (ConsistId(4), StopDecision::straight(true, false)),
                (ConsistId(5), StopDecision::straight(false, false)),
            ]
        );
    }
}
