//! Junction flow allocation.
//!
//! One [`NodeModel`] exists per interior node.  Each flow update it:
//!
//! 1. maps every upstream lane group's downstream-cell demand, per state,
//!    onto the road connection leading to that state's next link (states
//!    with no such connection wait),
//! 2. splits each connection's demand over its destination lane groups in
//!    proportion to their longitudinal supply,
//! 3. rations each destination lane group's supply among the connections
//!    competing for it, using the configured [`MergeRule`].
//!
//! The realized flows are kept until the next update and read by the
//! exchange phase of [`FluidNetworkModel`](crate::FluidNetworkModel).

use rustc_hash::FxHashMap;

use ctm_core::{EPSILON, LaneGroupId, NodeId, RoadConnectionId, State};
use ctm_network::{Network, Node};

use crate::{FluidLaneGroup, MergeRule, StateMap};

/// Read access to lane-group demand and supply.
pub trait LaneGroupAccess {
    /// Per-state demand of the lane group's downstream cell.
    fn demand(&self, lane_group: LaneGroupId) -> StateMap;

    /// Supply of the lane group's upstream cell.
    fn long_supply(&self, lane_group: LaneGroupId) -> f64;
}

impl LaneGroupAccess for [FluidLaneGroup] {
    fn demand(&self, lane_group: LaneGroupId) -> StateMap {
        self[lane_group.index()].demand()
    }

    fn long_supply(&self, lane_group: LaneGroupId) -> f64 {
        self[lane_group.index()].long_supply()
    }
}

/// One realized movement through the node.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ConnectionFlow {
    pub connection:  RoadConnectionId,
    pub from:        LaneGroupId,
    pub destination: LaneGroupId,
    pub state:       State,
    pub flow:        f64,
}

#[derive(Clone, Debug)]
pub struct NodeModel {
    pub node: NodeId,
    upstream: Vec<LaneGroupId>,
    flows:    Vec<ConnectionFlow>,
    exits:    FxHashMap<LaneGroupId, StateMap>,
}

impl NodeModel {
    /// Build for `node`, whose upstream lane groups are those of every
    /// inbound link.
    pub fn new(net: &Network, node: &Node) -> Self {
        let upstream = node
            .in_links
            .iter()
            .flat_map(|&l| net.link(l).lane_groups.iter().copied())
            .collect();
        Self { node: node.id, upstream, flows: Vec::new(), exits: FxHashMap::default() }
    }

    pub fn upstream_lane_groups(&self) -> &[LaneGroupId] {
        &self.upstream
    }

    /// Flows realized by the last update, per (connection, destination, state).
    pub fn connection_flows(&self) -> &[ConnectionFlow] {
        &self.flows
    }

    /// Flows leaving each upstream lane group in the last update.
    pub fn exit_flows(&self) -> &FxHashMap<LaneGroupId, StateMap> {
        &self.exits
    }

    pub fn update_flow<A>(&mut self, net: &Network, lanes: &A, rule: MergeRule)
    where
        A: LaneGroupAccess + ?Sized,
    {
        self.flows.clear();
        self.exits.clear();

        // 1–2: demand per (upstream, connection, destination, state).
        let mut requests: Vec<ConnectionFlow> = Vec::new();
        let mut supply: FxHashMap<LaneGroupId, f64> = FxHashMap::default();
        for &up in &self.upstream {
            let link = net.lane_group(up).link;
            let mut demand: Vec<(State, f64)> = lanes.demand(up).into_iter().collect();
            demand.sort_unstable_by(|a, b| a.0.cmp(&b.0));
            for (state, d) in demand {
                if d <= EPSILON {
                    continue;
                }
                let Some(rc) = net.next_link(state, link).and_then(|next| net.connection_to(up, next)) else {
                    continue;
                };
                let dests = &net.road_connection(rc).to_lane_groups;
                let sups: Vec<f64> = dests
                    .iter()
                    .map(|&g| *supply.entry(g).or_insert_with(|| lanes.long_supply(g)))
                    .collect();
                let total: f64 = sups.iter().sum();
                for (&dest, &s) in dests.iter().zip(&sups) {
                    let share = if total > EPSILON { s / total } else { 1.0 / dests.len() as f64 };
                    if share <= 0.0 {
                        continue;
                    }
                    requests.push(ConnectionFlow {
                        connection: rc,
                        from: up,
                        destination: dest,
                        state,
                        flow: d * share,
                    });
                }
            }
        }

        // 3: ration each destination among its connections.
        let mut destinations: Vec<LaneGroupId> = requests.iter().map(|r| r.destination).collect();
        destinations.sort_unstable();
        destinations.dedup();

        for dest in destinations {
            let mut connections: Vec<RoadConnectionId> = Vec::new();
            let mut demands: Vec<f64> = Vec::new();
            for r in requests.iter().filter(|r| r.destination == dest) {
                match connections.iter().position(|&c| c == r.connection) {
                    Some(k) => demands[k] += r.flow,
                    None => {
                        connections.push(r.connection);
                        demands.push(r.flow);
                    }
                }
            }
            let weights: Vec<f64> = connections.iter().map(|&c| net.road_connection(c).priority).collect();
            let s = supply.get(&dest).copied().unwrap_or(0.0);
            let served = ration(&demands, &weights, s, rule);

            for r in requests.iter().filter(|r| r.destination == dest) {
                let Some(k) = connections.iter().position(|&c| c == r.connection) else {
                    continue;
                };
                let gamma = if demands[k] > 0.0 { served[k] / demands[k] } else { 0.0 };
                let flow = r.flow * gamma;
                if flow <= 0.0 {
                    continue;
                }
                self.flows.push(ConnectionFlow { flow, ..*r });
                *self.exits.entry(r.from).or_default().entry(r.state).or_insert(0.0) += flow;
            }
        }
    }
}

/// Share `supply` among competing `demands`.
///
/// Every rule guarantees `flow_k ≤ demand_k` and `Σ flow ≤ supply`, and
/// serves everything when total demand fits.
///
/// - [`MergeRule::Proportional`]: one common factor `min(1, supply / Σ demand)`,
///   so served flows keep the ratio of demands.
/// - [`MergeRule::Priority`]: supply is offered in proportion to `weights`;
///   demands smaller than their offer are served in full and the remainder
///   is offered again to the rest.
pub fn ration(demands: &[f64], weights: &[f64], supply: f64, rule: MergeRule) -> Vec<f64> {
    let supply = supply.max(0.0);
    let total: f64 = demands.iter().sum();
    if total <= supply {
        return demands.to_vec();
    }
    match rule {
        MergeRule::Proportional => {
            let gamma = if total > 0.0 { supply / total } else { 0.0 };
            demands.iter().map(|d| d * gamma).collect()
        }
        MergeRule::Priority => water_fill(demands, weights, supply),
    }
}

fn water_fill(demands: &[f64], weights: &[f64], supply: f64) -> Vec<f64> {
    let mut flow = vec![0.0; demands.len()];
    let mut open: Vec<usize> = (0..demands.len()).filter(|&k| demands[k] > 0.0).collect();
    let mut remaining = supply;

    while !open.is_empty() && remaining > EPSILON {
        let positive: f64 = open.iter().map(|&k| weights[k].max(0.0)).sum();
        let uniform = positive <= 0.0;
        let wsum = if uniform { open.len() as f64 } else { positive };
        let weight = |k: usize| if uniform { 1.0 } else { weights[k].max(0.0) };
        let (full, partial): (Vec<usize>, Vec<usize>) = open
            .iter()
            .copied()
            .partition(|&k| demands[k] <= remaining * weight(k) / wsum);
        if full.is_empty() {
            for &k in &partial {
                flow[k] = remaining * weight(k) / wsum;
            }
            break;
        }
        for &k in &full {
            flow[k] = demands[k];
            remaining -= demands[k];
        }
        open = partial;
    }
    flow
}
