//! Unit tests for ctm-network.

use approx::assert_abs_diff_eq;

use ctm_core::{LaneGroupId, LinkId, State, Target};

use crate::{NetworkBuilder, NetworkError, RoadParams};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Diverge: `in` (2 lane groups) splits into `left` and `right`.
///
/// ```text
///            ┌── left ──▶ n2
/// n0 ── in ──┤
///            └── right ─▶ n3
/// ```
struct Diverge {
    b:     NetworkBuilder,
    inl:   LinkId,
    left:  LinkId,
    right: LinkId,
    in_lgs: Vec<LaneGroupId>,
}

fn diverge() -> Diverge {
    let mut b = NetworkBuilder::new();
    let n: Vec<_> = (0..4).map(|_| b.add_node()).collect();
    let p = RoadParams::default();
    let (inl, in_lgs) = b.add_link_with_lanes(n[0], n[1], 300.0, p, &[2, 1]);
    let (left, left_lgs) = b.add_link_with_lanes(n[1], n[2], 300.0, p, &[2]);
    let (right, right_lgs) = b.add_link_with_lanes(n[1], n[3], 300.0, p, &[1]);
    b.connect(&in_lgs[..1], &left_lgs);
    b.connect(&in_lgs[1..], &right_lgs);
    Diverge { b, inl, left, right, in_lgs }
}

fn validation_messages(err: NetworkError) -> Vec<String> {
    match err {
        NetworkError::Validation(log) => log.errors().map(str::to_owned).collect(),
        other => panic!("expected validation error, got {other}"),
    }
}

// ── Topology ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod topology {
    use super::*;

    #[test]
    fn source_and_sink_flags() {
        let d = diverge();
        let (inl, left, right) = (d.inl, d.left, d.right);
        let net = d.b.build().unwrap();
        assert!(net.link(inl).is_source);
        assert!(!net.link(inl).is_sink);
        assert!(net.link(left).is_sink && net.link(right).is_sink);
        assert_eq!(net.source_links().count(), 1);
        assert_eq!(net.sink_links().count(), 2);
        assert_eq!(net.interior_nodes().count(), 1);
    }

    #[test]
    fn lane_groups_ordered_inner_to_outer() {
        let d = diverge();
        let (inl, lgs) = (d.inl, d.in_lgs.clone());
        let net = d.b.build().unwrap();
        assert_eq!(net.link(inl).lane_groups, lgs);
        let inner = net.lane_group(lgs[0]);
        let outer = net.lane_group(lgs[1]);
        assert_eq!(inner.position, 0);
        assert_eq!(inner.inner, None);
        assert_eq!(inner.outer, Some(lgs[1]));
        assert_eq!(outer.inner, Some(lgs[0]));
        assert_eq!(outer.outer, None);
        assert_eq!(net.link_lanes(inl), 3);
    }

    #[test]
    fn connections_and_reachability() {
        let d = diverge();
        let (inl, left, right, lgs) = (d.inl, d.left, d.right, d.in_lgs.clone());
        let net = d.b.build().unwrap();
        assert_eq!(net.reachable_links(inl), vec![left, right]);
        assert!(net.connection_to(lgs[0], left).is_some());
        assert!(net.connection_to(lgs[0], right).is_none());
        assert!(net.connection_to(lgs[1], right).is_some());
    }

    #[test]
    fn default_priority_is_upstream_lane_count() {
        let d = diverge();
        let net = d.b.build().unwrap();
        assert_abs_diff_eq!(net.road_connections[0].priority, 2.0);
        assert_abs_diff_eq!(net.road_connections[1].priority, 1.0);
    }
}

// ── States & routing ──────────────────────────────────────────────────────────

#[cfg(test)]
mod routing {
    use super::*;

    #[test]
    fn pathless_states_per_reachable_link() {
        let mut d = diverge();
        let car = d.b.add_commodity("car", false);
        let (inl, left, right) = (d.inl, d.left, d.right);
        d.b.set_splits(inl, car, &[(left, 0.25), (right, 0.75)]);
        let net = d.b.build().unwrap();

        assert_eq!(net.states_on(inl), vec![State::pathless(car, left), State::pathless(car, right)]);
        assert_eq!(net.states_on(left), vec![State::exiting(car)]);

        let targets = net.split_targets(inl, car);
        assert_eq!(targets[0].0, Target::NextLink(left));
        assert_abs_diff_eq!(targets[0].1, 0.25);
        assert_eq!(net.split_targets(right, car), vec![(Target::Exit, 1.0)]);
    }

    #[test]
    fn pathful_states_and_next_link() {
        let mut d = diverge();
        let bus = d.b.add_commodity("bus", true);
        let (inl, left) = (d.inl, d.left);
        let path = d.b.add_path(bus, &[inl, left]);
        let net = d.b.build().unwrap();

        assert_eq!(net.commodity(bus).paths, vec![path]);
        let s = State::pathful(bus, path);
        assert_eq!(net.states_on(inl), vec![s]);
        assert!(net.states_on(d.right).is_empty());
        assert_eq!(net.next_link(s, inl), Some(left));
        assert_eq!(net.next_link(s, left), None);
    }

    #[test]
    fn missing_splits_fall_back_to_uniform_with_warning() {
        let mut d = diverge();
        let car = d.b.add_commodity("car", false);
        let inl = d.inl;
        let net = d.b.build().unwrap();
        let targets = net.split_targets(inl, car);
        assert_eq!(targets.len(), 2);
        assert_abs_diff_eq!(targets[0].1, 0.5);
        assert_abs_diff_eq!(targets[1].1, 0.5);
    }

    #[test]
    fn runtime_split_update_is_normalized() {
        let mut d = diverge();
        let car = d.b.add_commodity("car", false);
        let (inl, left, right) = (d.inl, d.left, d.right);
        let mut net = d.b.build().unwrap();
        net.set_splits(inl, car, &[(left, 0.5005), (right, 0.5)]).unwrap();
        let sum: f64 = net.split_targets(inl, car).iter().map(|t| t.1).sum();
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn runtime_split_to_unreachable_link_rejected() {
        let mut d = diverge();
        let car = d.b.add_commodity("car", false);
        let (inl, left) = (d.inl, d.left);
        let mut net = d.b.build().unwrap();
        // `left` is a sink; nothing leaves it.
        let err = net.set_splits(left, car, &[(inl, 1.0)]).unwrap_err();
        assert!(matches!(err, NetworkError::Validation(_)));
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod validation {
    use super::*;

    #[test]
    fn all_defects_reported_together() {
        let mut b = NetworkBuilder::new();
        let n0 = b.add_node();
        let n1 = b.add_node();
        let bad_len = b.add_link(n0, n1, -5.0, RoadParams::default());
        b.add_lane_group(bad_len, 1);
        b.add_link(n1, n0, 100.0, RoadParams::new(2_000.0, 10.0, 100.0));
        let msgs = validation_messages(b.build().unwrap_err());
        assert!(msgs.iter().any(|m| m.contains("length must be positive")));
        assert!(msgs.iter().any(|m| m.contains("critical density")));
        assert!(msgs.iter().any(|m| m.contains("has no lane groups")));
    }

    #[test]
    fn unknown_references_rejected() {
        let mut b = NetworkBuilder::new();
        let n0 = b.add_node();
        b.add_link(n0, ctm_core::NodeId(9), 100.0, RoadParams::default());
        let msgs = validation_messages(b.build().unwrap_err());
        assert!(msgs[0].contains("unknown start or end node"));
    }

    #[test]
    fn connection_must_meet_at_node() {
        let mut b = NetworkBuilder::new();
        let n: Vec<_> = (0..4).map(|_| b.add_node()).collect();
        let (_, a) = b.add_link_with_lanes(n[0], n[1], 100.0, RoadParams::default(), &[1]);
        let (_, c) = b.add_link_with_lanes(n[2], n[3], 100.0, RoadParams::default(), &[1]);
        b.connect(&a, &c);
        let msgs = validation_messages(b.build().unwrap_err());
        assert!(msgs.iter().any(|m| m.contains("do not meet at a node")));
    }

    #[test]
    fn dead_end_link_rejected() {
        let mut b = NetworkBuilder::new();
        let n: Vec<_> = (0..4).map(|_| b.add_node()).collect();
        let (_, src) = b.add_link_with_lanes(n[0], n[1], 100.0, RoadParams::default(), &[1]);
        let (main, main_lgs) = b.add_link_with_lanes(n[1], n[2], 300.0, RoadParams::default(), &[1]);
        b.add_link_with_lanes(n[2], n[3], 100.0, RoadParams::default(), &[1]);
        b.connect(&src, &main_lgs);
        let msgs = validation_messages(b.build().unwrap_err());
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].starts_with(&main.to_string()));
        assert!(msgs[0].contains("no road connection leaves"));
    }

    #[test]
    fn duplicate_connection_into_same_link_rejected() {
        let mut d = diverge();
        let left_lgs = vec![LaneGroupId(2)];
        let first = d.in_lgs[0];
        d.b.connect(&[first], &left_lgs);
        let msgs = validation_messages(d.b.build().unwrap_err());
        assert!(msgs.iter().any(|m| m.contains("lead into")));
    }

    #[test]
    fn disconnected_path_rejected() {
        let mut d = diverge();
        let bus = d.b.add_commodity("bus", true);
        let (left, right) = (d.left, d.right);
        d.b.add_path(bus, &[left, right]);
        let msgs = validation_messages(d.b.build().unwrap_err());
        assert!(msgs.iter().any(|m| m.contains("does not end where")));
    }

    #[test]
    fn path_must_end_on_sink() {
        let mut d = diverge();
        let bus = d.b.add_commodity("bus", true);
        let inl = d.inl;
        d.b.add_path(bus, &[inl]);
        let msgs = validation_messages(d.b.build().unwrap_err());
        assert!(msgs.iter().any(|m| m.contains("must end on a sink")));
    }

    #[test]
    fn path_on_pathless_commodity_rejected() {
        let mut d = diverge();
        let car = d.b.add_commodity("car", false);
        let inl = d.inl;
        d.b.add_path(car, &[inl]);
        let msgs = validation_messages(d.b.build().unwrap_err());
        assert!(msgs.iter().any(|m| m.contains("is pathless")));
    }

    #[test]
    fn split_sum_must_be_one() {
        let mut d = diverge();
        let car = d.b.add_commodity("car", false);
        let (inl, left, right) = (d.inl, d.left, d.right);
        d.b.set_splits(inl, car, &[(left, 0.3), (right, 0.3)]);
        let msgs = validation_messages(d.b.build().unwrap_err());
        assert!(msgs.iter().any(|m| m.contains("sum to")));
    }
}
