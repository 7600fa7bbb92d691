//! Baseline stop rule: dwell iff somebody alights here or somebody waits.

use super::GroupMember;

pub fn decide(member: &GroupMember, pool_len: usize) -> bool {
    member.alight_here > 0 || pool_len > 0
}

#[cfg(test)]
mod tests {
    use super::super::tests::member;
    use super::*;

    #[test]
    fn stops_only_on_demand() {
        let mut m = member(0, 10, 90, 40);
        assert!(!decide(&m, 0));
        assert!(decide(&m, 3));
        m.alight_here = 2;
        assert!(decide(&m, 0));
    }
}
