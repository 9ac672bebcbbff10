//! Road topology and its builder.
//!
//! # Data layout
//!
//! Every element lives in a flat registry on [`Network`], indexed by its
//! typed ID:
//!
//! ```text
//! nodes[NodeId]   links[LinkId]   lane_groups[LaneGroupId]
//! road_connections[RoadConnectionId]   commodities[CommodityId]   paths[PathId]
//! ```
//!
//! Links list their lane groups inner → outer; lane groups record their
//! lateral neighbours and outbound road connections.  Only split ratios
//! change after [`NetworkBuilder::build`].

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use ctm_core::{
    CommodityId, ErrorLog, LaneGroupId, LinkId, NodeId, PathId, RoadConnectionId, State, Target,
};

use crate::{Commodity, NetworkError, NetworkResult, Path, RoadParams};

/// Tolerance on split-ratio sums.
const SPLIT_SUM_TOL: f64 = 1e-3;

// ── Elements ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub id:        NodeId,
    pub in_links:  Vec<LinkId>,
    pub out_links: Vec<LinkId>,
    /// Road connections whose upstream link ends here.
    pub road_connections: Vec<RoadConnectionId>,
}

impl Node {
    /// A junction with at least one inbound and one outbound link.
    pub fn is_interior(&self) -> bool {
        !self.in_links.is_empty() && !self.out_links.is_empty()
    }
}

/// A directed road segment.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Link {
    pub id:         LinkId,
    pub start_node: NodeId,
    pub end_node:   NodeId,
    pub length_m:   f64,
    pub params:     RoadParams,
    /// Inner → outer.
    pub lane_groups: Vec<LaneGroupId>,
    /// Start node has no inbound links.
    pub is_source: bool,
    /// End node has no outbound links.
    pub is_sink:   bool,
    /// Normalized split ratios for pathless commodities, keyed by commodity.
    pub splits: FxHashMap<CommodityId, Vec<(LinkId, f64)>>,
}

/// Static description of one lane group.  The dynamic state lives in
/// `ctm-fluid`.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LaneGroupSpec {
    pub id:    LaneGroupId,
    pub link:  LinkId,
    pub lanes: u32,
    /// Position within the link, 0 = innermost.
    pub position: usize,
    pub inner: Option<LaneGroupId>,
    pub outer: Option<LaneGroupId>,
    pub out_connections: Vec<RoadConnectionId>,
}

/// Lane-level movement across a node.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoadConnection {
    pub id:               RoadConnectionId,
    pub node:             NodeId,
    pub from_link:        LinkId,
    pub from_lane_groups: Vec<LaneGroupId>,
    pub to_link:          LinkId,
    pub to_lane_groups:   Vec<LaneGroupId>,
    /// Weight used by the priority merge rule.
    pub priority: f64,
}

// ── Network ───────────────────────────────────────────────────────────────────

/// Immutable road topology.  Construct with [`NetworkBuilder`].
///
/// The indexing accessors (`link`, `lane_group`, ...) panic on an unknown
/// ID; IDs handed out by the builder are always valid.  Use the `try_*`
/// variants for IDs that come from outside, e.g. scheduled commands.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Network {
    pub nodes:            Vec<Node>,
    pub links:            Vec<Link>,
    pub lane_groups:      Vec<LaneGroupSpec>,
    pub road_connections: Vec<RoadConnection>,
    pub commodities:      Vec<Commodity>,
    pub paths:            Vec<Path>,
}

impl Network {
    // ── Registry access ───────────────────────────────────────────────────

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.index()]
    }

    #[inline]
    pub fn lane_group(&self, id: LaneGroupId) -> &LaneGroupSpec {
        &self.lane_groups[id.index()]
    }

    #[inline]
    pub fn road_connection(&self, id: RoadConnectionId) -> &RoadConnection {
        &self.road_connections[id.index()]
    }

    #[inline]
    pub fn commodity(&self, id: CommodityId) -> &Commodity {
        &self.commodities[id.index()]
    }

    #[inline]
    pub fn path(&self, id: PathId) -> &Path {
        &self.paths[id.index()]
    }

    pub fn try_link(&self, id: LinkId) -> NetworkResult<&Link> {
        self.links.get(id.index()).ok_or(NetworkError::LinkNotFound(id))
    }

    pub fn try_lane_group(&self, id: LaneGroupId) -> NetworkResult<&LaneGroupSpec> {
        self.lane_groups.get(id.index()).ok_or(NetworkError::LaneGroupNotFound(id))
    }

    pub fn try_commodity(&self, id: CommodityId) -> NetworkResult<&Commodity> {
        self.commodities.get(id.index()).ok_or(NetworkError::CommodityNotFound(id))
    }

    pub fn try_path(&self, id: PathId) -> NetworkResult<&Path> {
        self.paths.get(id.index()).ok_or(NetworkError::PathNotFound(id))
    }

    // ── Topology queries ──────────────────────────────────────────────────

    pub fn source_links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.links.iter().filter(|l| l.is_source)
    }

    pub fn sink_links(&self) -> impl Iterator<Item = &Link> + '_ {
        self.links.iter().filter(|l| l.is_sink)
    }

    pub fn interior_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().filter(|n| n.is_interior())
    }

    /// Total lanes across all lane groups of `link`.
    pub fn link_lanes(&self, link: LinkId) -> u32 {
        self.link(link).lane_groups.iter().map(|&lg| self.lane_group(lg).lanes).sum()
    }

    /// Road connection from `lane_group` into `to_link`, if any.
    pub fn connection_to(&self, lane_group: LaneGroupId, to_link: LinkId) -> Option<RoadConnectionId> {
        self.lane_group(lane_group)
            .out_connections
            .iter()
            .copied()
            .find(|&rc| self.road_connection(rc).to_link == to_link)
    }

    /// Outbound links reachable from at least one lane group of `link`,
    /// in ascending ID order.
    pub fn reachable_links(&self, link: LinkId) -> Vec<LinkId> {
        let mut out: Vec<LinkId> = self
            .link(link)
            .lane_groups
            .iter()
            .flat_map(|&lg| self.lane_group(lg).out_connections.iter())
            .map(|&rc| self.road_connection(rc).to_link)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// The link a vehicle in `state` on `link` will enter next.  `None` if
    /// the state leaves the network at the end of `link`.
    pub fn next_link(&self, state: State, link: LinkId) -> Option<LinkId> {
        match state.target {
            Target::Path(p)     => self.path(p).next_after(link),
            Target::NextLink(l) => Some(l),
            Target::Exit        => None,
        }
    }

    /// Every state that can be present on `link`.
    ///
    /// Pathful commodities contribute one state per path through the link.
    /// Pathless commodities contribute `Exit` on sink links and one state
    /// per reachable outbound link otherwise.
    pub fn states_on(&self, link: LinkId) -> Vec<State> {
        let l = self.link(link);
        let reachable = if l.is_sink { Vec::new() } else { self.reachable_links(link) };
        let mut states = Vec::new();
        for c in &self.commodities {
            if c.pathful {
                for &p in &c.paths {
                    if self.path(p).contains(link) {
                        states.push(State::pathful(c.id, p));
                    }
                }
            } else if l.is_sink {
                states.push(State::exiting(c.id));
            } else {
                states.extend(reachable.iter().map(|&next| State::pathless(c.id, next)));
            }
        }
        states
    }

    /// Targets a pathless `commodity` takes on entering `link`, with their
    /// fractions.  Sink links yield `Exit`; otherwise the configured splits,
    /// or a uniform split over reachable outbound links when none are set.
    pub fn split_targets(&self, link: LinkId, commodity: CommodityId) -> Vec<(Target, f64)> {
        let l = self.link(link);
        if l.is_sink {
            return vec![(Target::Exit, 1.0)];
        }
        if let Some(splits) = l.splits.get(&commodity) {
            return splits.iter().map(|&(to, f)| (Target::NextLink(to), f)).collect();
        }
        let reachable = self.reachable_links(link);
        let share = 1.0 / reachable.len().max(1) as f64;
        reachable.into_iter().map(|to| (Target::NextLink(to), share)).collect()
    }

    /// Replace the split ratios of a pathless commodity on `link` at run time.
    ///
    /// Fractions are normalized; every target must be reachable from `link`.
    pub fn set_splits(
        &mut self,
        link:      LinkId,
        commodity: CommodityId,
        splits:    &[(LinkId, f64)],
    ) -> NetworkResult<()> {
        self.try_link(link)?;
        let mut log = ErrorLog::new();
        if self.try_commodity(commodity)?.pathful {
            log.add_error(format!("{commodity} is pathful and does not use splits"));
            return Err(NetworkError::Validation(log));
        }
        let normalized = normalize_splits(self, link, commodity, splits, &mut log);
        if log.has_errors() {
            return Err(NetworkError::Validation(log));
        }
        self.links[link.index()].splits.insert(commodity, normalized);
        Ok(())
    }
}

// ── NetworkBuilder ────────────────────────────────────────────────────────────

/// Construct a [`Network`] incrementally, then call [`build`](Self::build).
///
/// Adders never fail; every defect is collected by `build()` into a single
/// [`ErrorLog`] and returned as [`NetworkError::Validation`].
///
/// # Example
///
/// ```
/// use ctm_network::{NetworkBuilder, RoadParams};
///
/// let mut b = NetworkBuilder::new();
/// let (n0, n1, n2) = (b.add_node(), b.add_node(), b.add_node());
/// let (up, up_lgs)     = b.add_link_with_lanes(n0, n1, 500.0, RoadParams::default(), &[2]);
/// let (down, down_lgs) = b.add_link_with_lanes(n1, n2, 500.0, RoadParams::default(), &[2]);
/// b.connect(&up_lgs, &down_lgs);
/// b.add_commodity("car", false);
/// let net = b.build().unwrap();
/// assert!(net.link(up).is_source);
/// assert!(net.link(down).is_sink);
/// ```
#[derive(Default)]
pub struct NetworkBuilder {
    node_count:  u32,
    links:       Vec<RawLink>,
    lane_groups: Vec<RawLaneGroup>,
    connections: Vec<RawConnection>,
    commodities: Vec<RawCommodity>,
    paths:       Vec<RawPath>,
    splits:      Vec<RawSplits>,
}

struct RawLink {
    start:    NodeId,
    end:      NodeId,
    length_m: f64,
    params:   RoadParams,
}

struct RawLaneGroup {
    link:  LinkId,
    lanes: u32,
}

struct RawConnection {
    from:     Vec<LaneGroupId>,
    to:       Vec<LaneGroupId>,
    priority: Option<f64>,
}

struct RawCommodity {
    name:    String,
    pathful: bool,
}

struct RawPath {
    commodity: CommodityId,
    links:     Vec<LinkId>,
}

struct RawSplits {
    link:      LinkId,
    commodity: CommodityId,
    splits:    Vec<(LinkId, f64)>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId(self.node_count);
        self.node_count += 1;
        id
    }

    pub fn add_link(&mut self, start: NodeId, end: NodeId, length_m: f64, params: RoadParams) -> LinkId {
        let id = LinkId(self.links.len() as u32);
        self.links.push(RawLink { start, end, length_m, params });
        id
    }

    /// Append a lane group on the outer side of `link`.
    pub fn add_lane_group(&mut self, link: LinkId, lanes: u32) -> LaneGroupId {
        let id = LaneGroupId(self.lane_groups.len() as u32);
        self.lane_groups.push(RawLaneGroup { link, lanes });
        id
    }

    /// Add a link and its lane groups (inner → outer) in one call.
    pub fn add_link_with_lanes(
        &mut self,
        start:    NodeId,
        end:      NodeId,
        length_m: f64,
        params:   RoadParams,
        lanes:    &[u32],
    ) -> (LinkId, Vec<LaneGroupId>) {
        let link = self.add_link(start, end, length_m, params);
        let lgs = lanes.iter().map(|&n| self.add_lane_group(link, n)).collect();
        (link, lgs)
    }

    /// Connect upstream lane groups to downstream lane groups.  The merge
    /// priority defaults to the number of upstream lanes.
    pub fn connect(&mut self, from: &[LaneGroupId], to: &[LaneGroupId]) -> RoadConnectionId {
        self.push_connection(from, to, None)
    }

    pub fn connect_with_priority(
        &mut self,
        from:     &[LaneGroupId],
        to:       &[LaneGroupId],
        priority: f64,
    ) -> RoadConnectionId {
        self.push_connection(from, to, Some(priority))
    }

    fn push_connection(
        &mut self,
        from:     &[LaneGroupId],
        to:       &[LaneGroupId],
        priority: Option<f64>,
    ) -> RoadConnectionId {
        let id = RoadConnectionId(self.connections.len() as u32);
        self.connections.push(RawConnection { from: from.to_vec(), to: to.to_vec(), priority });
        id
    }

    pub fn add_commodity(&mut self, name: impl Into<String>, pathful: bool) -> CommodityId {
        let id = CommodityId(self.commodities.len() as u32);
        self.commodities.push(RawCommodity { name: name.into(), pathful });
        id
    }

    pub fn add_path(&mut self, commodity: CommodityId, links: &[LinkId]) -> PathId {
        let id = PathId(self.paths.len() as u32);
        self.paths.push(RawPath { commodity, links: links.to_vec() });
        id
    }

    /// Split ratios of a pathless commodity at the end of `link`.
    pub fn set_splits(&mut self, link: LinkId, commodity: CommodityId, splits: &[(LinkId, f64)]) {
        self.splits.push(RawSplits { link, commodity, splits: splits.to_vec() });
    }

    /// Validate and assemble the network.
    pub fn build(self) -> NetworkResult<Network> {
        let mut log = ErrorLog::new();

        self.check_references(&mut log);
        if log.has_errors() {
            return Err(NetworkError::Validation(log));
        }

        let mut net = self.assemble(&mut log);
        if log.has_errors() {
            return Err(NetworkError::Validation(log));
        }
        check_exits(&net, &mut log);
        self.check_paths(&mut net, &mut log);
        self.apply_splits(&mut net, &mut log);
        warn_missing_splits(&net, &mut log);

        let log = log.into_result().map_err(NetworkError::Validation)?;
        for w in log.warnings() {
            warn!(target: "ctm::network", "{w}");
        }
        debug!(
            target: "ctm::network",
            nodes = net.nodes.len(),
            links = net.links.len(),
            lane_groups = net.lane_groups.len(),
            road_connections = net.road_connections.len(),
            commodities = net.commodities.len(),
            "network built"
        );
        Ok(net)
    }

    // ── Validation passes ─────────────────────────────────────────────────

    /// Every ID must point into its registry before anything is assembled.
    fn check_references(&self, log: &mut ErrorLog) {
        let nodes = self.node_count as usize;
        let links = self.links.len();
        let lgs = self.lane_groups.len();
        let commodities = self.commodities.len();

        for (i, l) in self.links.iter().enumerate() {
            if l.start.index() >= nodes || l.end.index() >= nodes {
                log.add_error(format!("link {i}: unknown start or end node"));
            }
        }
        for (i, lg) in self.lane_groups.iter().enumerate() {
            if lg.link.index() >= links {
                log.add_error(format!("lane group {i}: unknown {}", lg.link));
            }
        }
        for (i, rc) in self.connections.iter().enumerate() {
            if rc.from.iter().chain(&rc.to).any(|lg| lg.index() >= lgs) {
                log.add_error(format!("road connection {i}: unknown lane group"));
            }
        }
        for (i, p) in self.paths.iter().enumerate() {
            if p.commodity.index() >= commodities {
                log.add_error(format!("path {i}: unknown {}", p.commodity));
            }
            if p.links.iter().any(|l| l.index() >= links) {
                log.add_error(format!("path {i}: unknown link"));
            }
        }
        for s in &self.splits {
            if s.link.index() >= links || s.commodity.index() >= commodities {
                log.add_error(format!("splits on {} for {}: unknown link or commodity", s.link, s.commodity));
            }
            if s.splits.iter().any(|(to, _)| to.index() >= links) {
                log.add_error(format!("splits on {}: unknown target link", s.link));
            }
        }
    }

    /// Build the registries and check per-element geometry.
    fn assemble(&self, log: &mut ErrorLog) -> Network {
        let mut nodes: Vec<Node> = (0..self.node_count)
            .map(|n| Node {
                id:               NodeId(n),
                in_links:         Vec::new(),
                out_links:        Vec::new(),
                road_connections: Vec::new(),
            })
            .collect();

        for (i, raw) in self.links.iter().enumerate() {
            let id = LinkId(i as u32);
            nodes[raw.start.index()].out_links.push(id);
            nodes[raw.end.index()].in_links.push(id);
        }

        let mut links: Vec<Link> = self
            .links
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let id = LinkId(i as u32);
                check_link_geometry(id, raw, log);
                Link {
                    id,
                    start_node:  raw.start,
                    end_node:    raw.end,
                    length_m:    raw.length_m,
                    params:      raw.params,
                    lane_groups: Vec::new(),
                    is_source:   nodes[raw.start.index()].in_links.is_empty(),
                    is_sink:     nodes[raw.end.index()].out_links.is_empty(),
                    splits:      FxHashMap::default(),
                }
            })
            .collect();

        let mut lane_groups: Vec<LaneGroupSpec> = Vec::with_capacity(self.lane_groups.len());
        for (i, raw) in self.lane_groups.iter().enumerate() {
            let id = LaneGroupId(i as u32);
            if raw.lanes == 0 {
                log.add_error(format!("{id}: must have at least one lane"));
            }
            let siblings = &mut links[raw.link.index()].lane_groups;
            let position = siblings.len();
            let inner = siblings.last().copied();
            siblings.push(id);
            if let Some(inner) = inner {
                lane_groups[inner.index()].outer = Some(id);
            }
            lane_groups.push(LaneGroupSpec {
                id,
                link: raw.link,
                lanes: raw.lanes,
                position,
                inner,
                outer: None,
                out_connections: Vec::new(),
            });
        }

        for l in &links {
            if l.lane_groups.is_empty() {
                log.add_error(format!("{}: has no lane groups", l.id));
            }
        }

        let mut road_connections = Vec::with_capacity(self.connections.len());
        let mut seen: FxHashMap<(LaneGroupId, LinkId), RoadConnectionId> = FxHashMap::default();
        for (i, raw) in self.connections.iter().enumerate() {
            let id = RoadConnectionId(i as u32);
            let Some(rc) = build_connection(id, raw, &links, &lane_groups, log) else {
                continue;
            };
            for &lg in &rc.from_lane_groups {
                if let Some(prev) = seen.insert((lg, rc.to_link), id) {
                    log.add_error(format!("{lg}: both {prev} and {id} lead into {}", rc.to_link));
                }
                lane_groups[lg.index()].out_connections.push(id);
            }
            nodes[rc.node.index()].road_connections.push(id);
            road_connections.push(rc);
        }

        let commodities = self
            .commodities
            .iter()
            .enumerate()
            .map(|(i, raw)| Commodity {
                id:      CommodityId(i as u32),
                name:    raw.name.clone(),
                pathful: raw.pathful,
                paths:   Vec::new(),
            })
            .collect();

        let paths = self
            .paths
            .iter()
            .enumerate()
            .map(|(i, raw)| Path {
                id:        PathId(i as u32),
                commodity: raw.commodity,
                links:     raw.links.clone(),
            })
            .collect();

        Network { nodes, links, lane_groups, road_connections, commodities, paths }
    }

    /// Paths must be non-empty, belong to a pathful commodity, be connected
    /// lane-wise between consecutive links and end on a sink.  Valid paths are
    /// attached to their commodity.
    fn check_paths(&self, net: &mut Network, log: &mut ErrorLog) {
        let mut valid: Vec<(CommodityId, PathId)> = Vec::with_capacity(self.paths.len());
        for p in &net.paths {
            if p.links.is_empty() {
                log.add_error(format!("{}: empty", p.id));
                continue;
            }
            if !net.commodity(p.commodity).pathful {
                log.add_error(format!("{}: {} is pathless", p.id, p.commodity));
                continue;
            }
            for pair in p.links.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                if net.link(a).end_node != net.link(b).start_node {
                    log.add_error(format!("{}: {a} does not end where {b} starts", p.id));
                } else if !net.reachable_links(a).contains(&b) {
                    log.add_error(format!("{}: no road connection from {a} into {b}", p.id));
                }
            }
            if let Some(&last) = p.links.last() {
                if !net.link(last).is_sink {
                    log.add_error(format!("{}: must end on a sink link, ends on {last}", p.id));
                }
            }
            valid.push((p.commodity, p.id));
        }
        for (c, p) in valid {
            net.commodities[c.index()].paths.push(p);
        }
    }

    fn apply_splits(&self, net: &mut Network, log: &mut ErrorLog) {
        for raw in &self.splits {
            if net.commodity(raw.commodity).pathful {
                log.add_warning(format!(
                    "splits on {} for pathful {} are ignored",
                    raw.link, raw.commodity
                ));
                continue;
            }
            let normalized = normalize_splits(net, raw.link, raw.commodity, &raw.splits, log);
            net.links[raw.link.index()].splits.insert(raw.commodity, normalized);
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Flow reaching the end of a non-sink link must have somewhere to go.
fn check_exits(net: &Network, log: &mut ErrorLog) {
    for l in net.links.iter().filter(|l| !l.is_sink) {
        if net.reachable_links(l.id).is_empty() {
            log.add_error(format!("{}: no road connection leaves the link", l.id));
        }
    }
}

fn check_link_geometry(id: LinkId, raw: &RawLink, log: &mut ErrorLog) {
    if raw.start == raw.end {
        log.add_error(format!("{id}: start and end node are the same"));
    }
    if !(raw.length_m.is_finite() && raw.length_m > 0.0) {
        log.add_error(format!("{id}: length must be positive, got {}", raw.length_m));
    }
    let p = &raw.params;
    if !(p.capacity_vphpl > 0.0 && p.ffspeed_kph > 0.0 && p.jam_density_vpkpl > 0.0) {
        log.add_error(format!("{id}: road parameters must be positive, got {p:?}"));
    } else if p.critical_density_vpkpl() >= p.jam_density_vpkpl {
        log.add_error(format!(
            "{id}: critical density {:.2} must be below jam density {:.2}",
            p.critical_density_vpkpl(),
            p.jam_density_vpkpl
        ));
    }
}

fn build_connection(
    id:          RoadConnectionId,
    raw:         &RawConnection,
    links:       &[Link],
    lane_groups: &[LaneGroupSpec],
    log:         &mut ErrorLog,
) -> Option<RoadConnection> {
    let (Some(&first_from), Some(&first_to)) = (raw.from.first(), raw.to.first()) else {
        log.add_error(format!("{id}: needs at least one upstream and one downstream lane group"));
        return None;
    };
    let from_link = lane_groups[first_from.index()].link;
    let to_link = lane_groups[first_to.index()].link;
    if raw.from.iter().any(|lg| lane_groups[lg.index()].link != from_link) {
        log.add_error(format!("{id}: upstream lane groups span more than one link"));
        return None;
    }
    if raw.to.iter().any(|lg| lane_groups[lg.index()].link != to_link) {
        log.add_error(format!("{id}: downstream lane groups span more than one link"));
        return None;
    }
    let node = links[from_link.index()].end_node;
    if links[to_link.index()].start_node != node {
        log.add_error(format!("{id}: {from_link} and {to_link} do not meet at a node"));
        return None;
    }
    let priority = raw.priority.unwrap_or_else(|| {
        raw.from.iter().map(|lg| f64::from(lane_groups[lg.index()].lanes)).sum()
    });
    if !(priority.is_finite() && priority > 0.0) {
        log.add_error(format!("{id}: priority must be positive, got {priority}"));
    }
    Some(RoadConnection {
        id,
        node,
        from_link,
        from_lane_groups: raw.from.clone(),
        to_link,
        to_lane_groups: raw.to.clone(),
        priority,
    })
}

/// Validate one split table and return it normalized to sum 1.
fn normalize_splits(
    net:       &Network,
    link:      LinkId,
    commodity: CommodityId,
    splits:    &[(LinkId, f64)],
    log:       &mut ErrorLog,
) -> Vec<(LinkId, f64)> {
    let reachable = net.reachable_links(link);
    let mut total = 0.0;
    for &(to, f) in splits {
        if !reachable.contains(&to) {
            log.add_error(format!("splits on {link} for {commodity}: {to} is not reachable"));
        }
        if !(f.is_finite() && f >= 0.0) {
            log.add_error(format!("splits on {link} for {commodity}: invalid fraction {f}"));
        }
        total += f;
    }
    if (total - 1.0).abs() > SPLIT_SUM_TOL {
        log.add_error(format!("splits on {link} for {commodity}: fractions sum to {total}, not 1"));
        return splits.to_vec();
    }
    splits.iter().map(|&(to, f)| (to, f / total)).collect()
}

/// Pathless commodities at a diverge without explicit splits fall back to
/// a uniform split.
fn warn_missing_splits(net: &Network, log: &mut ErrorLog) {
    for l in &net.links {
        if l.is_sink || net.reachable_links(l.id).len() < 2 {
            continue;
        }
        for c in net.commodities.iter().filter(|c| !c.pathful) {
            if !l.splits.contains_key(&c.id) {
                log.add_warning(format!("{}: no splits for {}, using uniform split", l.id, c.id));
            }
        }
    }
}
