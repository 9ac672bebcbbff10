//! The fluid network model: configuration and the per-step update.

use tracing::{debug, trace};

use ctm_core::{CommodityId, ErrorLog, LaneGroupId, LinkId, PathId, SimRng, State, Target};
use ctm_network::{Link, Network, NetworkError};

use crate::{
    AccumulatorRequest, Bucket, Discretization, FlowAccumulator, FluidError, FluidLaneGroup, FluidParams,
    FluidResult, LaneChangeSplit, LaneGroupOverride, Maneuvers, NodeModel, OverrideOutcome, SourceDemand,
    TravelTimer, perform_lane_changes, source,
};

/// Relative tolerance for treating `length / max_cell_length` as whole.
const EXACT_DIVISION_TOL: f64 = 1e-6;

/// Number of cells on `link`.
///
/// Source and sink links get a single cell.  Otherwise the link is cut into
/// `ceil(length / max_cell_length)` cells, or exactly the quotient when it
/// is whole to within tolerance.
pub fn cell_count(link: &Link, max_cell_length_m: f64) -> usize {
    if link.is_source || link.is_sink {
        return 1;
    }
    let r = link.length_m / max_cell_length_m;
    let n = if (r - r.round()).abs() < EXACT_DIVISION_TOL { r.round() } else { r.ceil() };
    (n as usize).max(1)
}

/// Cell transmission model over a whole [`Network`].
///
/// Built once by [`configure`](Self::configure); advanced by alternating
/// [`update_flow`](Self::update_flow) and [`update_state`](Self::update_state),
/// once each per step.
pub struct FluidNetworkModel {
    net:         Network,
    params:      FluidParams,
    lane_groups: Vec<FluidLaneGroup>,
    node_models: Vec<NodeModel>,
    sources:     Vec<SourceDemand>,
    rng:         SimRng,
    started:     bool,
    steps:       u64,
    injected:    f64,
    exited:      f64,
}

impl FluidNetworkModel {
    // ── Configuration ─────────────────────────────────────────────────────

    /// Discretize every link, build lane groups and node models, and derive
    /// lane-change options.  Every problem found is reported together.
    pub fn configure(net: Network, params: FluidParams, seed: u64) -> FluidResult<Self> {
        let mut log = ErrorLog::new();
        check_params(&params, &mut log);
        if log.has_errors() {
            return Err(FluidError::Validation(log));
        }

        let mut lane_groups = Vec::with_capacity(net.lane_groups.len());
        for spec in &net.lane_groups {
            let link = net.link(spec.link);
            let num_cells = cell_count(link, params.max_cell_length_m);
            let disc = Discretization {
                step_secs:     params.step_secs,
                cell_length_m: link.length_m / num_cells as f64,
                lanes:         spec.lanes,
            };
            let lg = FluidLaneGroup::new(
                spec.id,
                spec.link,
                spec.lanes,
                spec.inner,
                spec.outer,
                link.is_source,
                link.is_sink,
                num_cells,
                disc,
                &link.params,
            );
            if let Err(reason) = lg.check_parameters() {
                log.add_error(format!("{} on {}: {reason}", spec.id, spec.link));
            }
            lane_groups.push(lg);
        }

        for link in &net.links {
            configure_lane_changes(&net, link, &mut lane_groups, &mut log);
        }

        let node_models: Vec<NodeModel> = net.interior_nodes().map(|n| NodeModel::new(&net, n)).collect();

        if log.has_errors() {
            return Err(FluidError::Validation(log));
        }

        debug!(
            target: "ctm::fluid",
            lane_groups = lane_groups.len(),
            cells = lane_groups.iter().map(|lg| lg.cells.len()).sum::<usize>(),
            node_models = node_models.len(),
            step_secs = params.step_secs,
            "fluid model configured"
        );

        Ok(Self {
            net,
            params,
            lane_groups,
            node_models,
            sources: Vec::new(),
            rng: SimRng::new(seed),
            started: false,
            steps: 0,
            injected: 0.0,
            exited: 0.0,
        })
    }

    /// Request an accumulator.  Only allowed before the first update.
    pub fn subscribe(&mut self, request: AccumulatorRequest) -> FluidResult<()> {
        if self.started {
            return Err(FluidError::SubscriptionClosed);
        }
        let id = request.lane_group();
        self.net.try_lane_group(id)?;
        let lg = &mut self.lane_groups[id.index()];
        match request {
            AccumulatorRequest::LaneGroupExit(_) => {
                lg.exit_acc.get_or_insert_with(FlowAccumulator::new);
            }
            AccumulatorRequest::CellFlow(_) => {
                for c in &mut lg.cells {
                    c.flow_acc.get_or_insert_with(FlowAccumulator::new);
                }
            }
            AccumulatorRequest::CellLaneChangeIn(_) => {
                for c in &mut lg.cells {
                    c.lc_in_acc.get_or_insert_with(FlowAccumulator::new);
                }
            }
            AccumulatorRequest::CellLaneChangeOut(_) => {
                for c in &mut lg.cells {
                    c.lc_out_acc.get_or_insert_with(FlowAccumulator::new);
                }
            }
            AccumulatorRequest::TravelTime(_) => {
                lg.travel_timer.get_or_insert_with(TravelTimer::default);
            }
        }
        Ok(())
    }

    /// Fix the lane-change split of `state` entering `lane_group`.
    pub fn set_lane_change_split(
        &mut self,
        lane_group: LaneGroupId,
        state:      State,
        split:      LaneChangeSplit,
    ) -> FluidResult<()> {
        self.net.try_lane_group(lane_group)?;
        let lg = &mut self.lane_groups[lane_group.index()];
        let mut log = ErrorLog::new();
        match lg.maneuvers.get(&state) {
            None => log.add_error(format!("{lane_group}: state {state} does not use this link")),
            Some(m) if !m.permits(&split) => {
                log.add_error(format!("{lane_group}: split {split:?} uses a maneuver not open to {state}"))
            }
            Some(_) => {}
        }
        if split.stay < 0.0 || split.inner < 0.0 || split.outer < 0.0 {
            log.add_error(format!("{lane_group}: negative probability in {split:?}"));
        }
        if (split.sum() - 1.0).abs() > 1e-6 {
            log.add_error(format!("{lane_group}: probabilities sum to {}", split.sum()));
        }
        if log.has_errors() {
            return Err(FluidError::Validation(log));
        }
        lg.lc_table.insert(state, split);
        Ok(())
    }

    // ── Demand & routing ──────────────────────────────────────────────────

    /// Set (or replace) the demand of a commodity, and path if pathful, at a
    /// source link.
    pub fn set_source_demand(
        &mut self,
        link:      LinkId,
        commodity: CommodityId,
        path:      Option<PathId>,
        rate_vps:  f64,
    ) -> FluidResult<()> {
        let demand = SourceDemand { link, commodity, path, rate_vps };
        demand.validate(&self.net)?;
        match self
            .sources
            .iter_mut()
            .find(|s| s.link == link && s.commodity == commodity && s.path == path)
        {
            Some(existing) => existing.rate_vps = rate_vps,
            None => self.sources.push(demand),
        }
        self.rebuild_source_flows(link);
        Ok(())
    }

    /// Replace split ratios of a pathless commodity at the end of `link`.
    pub fn set_splits(&mut self, link: LinkId, commodity: CommodityId, splits: &[(LinkId, f64)]) -> FluidResult<()> {
        self.net.set_splits(link, commodity, splits)?;
        if self.net.link(link).is_source {
            self.rebuild_source_flows(link);
        }
        Ok(())
    }

    /// Queue vehicles handed over from outside the model at a source link.
    /// They enter the link's upstream cell in the state update, as fast as
    /// its supply allows.
    pub fn add_external_packet(&mut self, link: LinkId, packet: &[(State, f64)]) -> FluidResult<()> {
        if !self.net.try_link(link)?.is_source {
            return Err(FluidError::NotASource(link));
        }
        for &(state, veh) in packet {
            let next = self.net.next_link(state, link);
            let candidates: Vec<LaneGroupId> = self
                .net
                .link(link)
                .lane_groups
                .iter()
                .copied()
                .filter(|&lg| self.lane_groups[lg.index()].maneuvers.contains_key(&state))
                .filter(|&lg| next.is_none_or(|to| self.net.connection_to(lg, to).is_some()))
                .collect();
            if candidates.is_empty() {
                return Err(FluidError::InvalidSource {
                    link,
                    commodity: state.commodity,
                    reason: format!("no lane group carries state {state}"),
                });
            }
            let each = veh / candidates.len() as f64;
            for lg in candidates {
                self.lane_groups[lg.index()].add_to_buffer(state, each);
                self.injected += each;
            }
        }
        for &lg in &self.net.link(link).lane_groups {
            self.lane_groups[lg.index()].update_long_supply()?;
        }
        Ok(())
    }

    fn rebuild_source_flows(&mut self, link: LinkId) {
        for &lg in &self.net.link(link).lane_groups {
            self.lane_groups[lg.index()].source_flow.clear();
        }
        for src in self.sources.iter().filter(|s| s.link == link) {
            for (lg, state, veh) in src.split(&self.net, self.params.step_secs) {
                *self.lane_groups[lg.index()].source_flow.entry(state).or_insert(0.0) += veh;
            }
        }
    }

    // ── Runtime overrides ─────────────────────────────────────────────────

    pub fn apply_override(&mut self, lane_group: LaneGroupId, cmd: LaneGroupOverride) -> FluidResult<OverrideOutcome> {
        let lg = self
            .lane_groups
            .get_mut(lane_group.index())
            .ok_or(NetworkError::LaneGroupNotFound(lane_group))?;
        match cmd {
            LaneGroupOverride::Capacity { rate_vps } => return lg.override_capacity(rate_vps),
            LaneGroupOverride::Speed { speed_mps } => return Ok(lg.override_speed(speed_mps)),
            LaneGroupOverride::Reset => lg.reset_to_nominal()?,
            LaneGroupOverride::RoadParams(p) => lg.set_road_params(&p)?,
        }
        Ok(OverrideOutcome::Applied)
    }

    // ── Per-step update ───────────────────────────────────────────────────

    /// Phase I (supplies, lane changes, demands, node models) followed by
    /// phase II (source injection, sink release, node exchange).
    pub fn update_flow(&mut self) -> FluidResult<()> {
        self.started = true;

        for link in &self.net.links {
            for &lg in &link.lane_groups {
                self.lane_groups[lg.index()].update_all_supplies()?;
            }
            if link.lane_groups.len() >= 2 {
                perform_lane_changes(&mut self.lane_groups, &link.lane_groups, self.params.lc_coefficient);
            }
            for &lg in &link.lane_groups {
                self.lane_groups[lg.index()].update_all_demands();
            }
        }
        for nm in &mut self.node_models {
            nm.update_flow(&self.net, self.lane_groups.as_slice(), self.params.merge_rule);
        }

        self.inject_sources();

        for lg in self.lane_groups.iter_mut().filter(|lg| lg.is_sink) {
            let flows = lg.demand();
            self.exited += flows.values().sum::<f64>();
            lg.release(&flows)?;
        }

        for nm in &self.node_models {
            for f in nm.connection_flows() {
                let to_link = self.net.road_connection(f.connection).to_link;
                for (state, fraction) in entry_states(&self.net, to_link, f.state)? {
                    self.lane_groups[f.destination.index()].add_inflow(state, f.flow * fraction);
                }
            }
            for (&up, flows) in nm.exit_flows() {
                self.lane_groups[up.index()].release(flows)?;
            }
        }
        Ok(())
    }

    fn inject_sources(&mut self) {
        let process = self.params.demand_process;
        for lg in self.lane_groups.iter_mut().filter(|lg| lg.is_source) {
            let mut entries: Vec<(State, f64)> = lg.source_flow.iter().map(|(&s, &v)| (s, v)).collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));
            for (state, mean) in entries {
                let veh = source::draw(process, mean, &mut self.rng);
                if veh <= 0.0 {
                    continue;
                }
                let cell = &mut lg.cells[0];
                cell.add(Bucket::Stay, state, veh);
                cell.credit_flow(state, veh);
                self.injected += veh;
            }
        }
    }

    /// Cell-to-cell transport, travel-time sampling, and buffer draining.
    pub fn update_state(&mut self) -> FluidResult<()> {
        for lg in &mut self.lane_groups {
            let tt = lg.transport();
            if let Some(timer) = lg.travel_timer.as_mut() {
                timer.record(tt);
            }
            lg.update_long_supply()?;
            lg.process_buffer()?;
        }
        self.steps += 1;
        trace!(target: "ctm::fluid", step = self.steps, vehicles = self.total_vehicles(), "state updated");
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn network(&self) -> &Network {
        &self.net
    }

    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    pub fn lane_group(&self, id: LaneGroupId) -> &FluidLaneGroup {
        &self.lane_groups[id.index()]
    }

    pub fn lane_groups(&self) -> &[FluidLaneGroup] {
        &self.lane_groups
    }

    pub fn node_models(&self) -> &[NodeModel] {
        &self.node_models
    }

    pub fn sources(&self) -> &[SourceDemand] {
        &self.sources
    }

    /// Completed steps (state updates).
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Vehicles in all cells and buffers.
    pub fn total_vehicles(&self) -> f64 {
        self.lane_groups.iter().map(|lg| lg.total_vehicles() + lg.buffer_total()).sum()
    }

    pub fn link_vehicles(&self, link: LinkId) -> f64 {
        self.net.link(link).lane_groups.iter().map(|&lg| self.lane_group(lg).total_vehicles()).sum()
    }

    /// Mean of the link's lane-group travel times.  Lane groups without a
    /// timer or without samples are left out.
    pub fn link_travel_time(&self, link: LinkId) -> Option<f64> {
        mean_of(
            self.net
                .link(link)
                .lane_groups
                .iter()
                .filter_map(|&lg| self.lane_group(lg).travel_timer().and_then(TravelTimer::mean)),
        )
    }

    /// As [`link_travel_time`](Self::link_travel_time), and starts a new
    /// output interval on every lane-group timer of the link.
    pub fn take_link_travel_time(&mut self, link: LinkId) -> Option<f64> {
        let lane_groups = &mut self.lane_groups;
        mean_of(self.net.link(link).lane_groups.iter().filter_map(|&lg| {
            lane_groups[lg.index()].travel_timer.as_mut().and_then(TravelTimer::mean_and_clear)
        }))
    }

    pub fn commodity_vehicles(&self, commodity: CommodityId) -> f64 {
        self.lane_groups.iter().map(|lg| lg.vehicles_for_commodity(commodity)).sum()
    }

    /// Vehicles that have entered the model so far.
    pub fn injected_total(&self) -> f64 {
        self.injected
    }

    /// Vehicles that have left through sink links so far.
    pub fn exited_total(&self) -> f64 {
        self.exited
    }
}

// ── Configuration helpers ─────────────────────────────────────────────────────

fn check_params(p: &FluidParams, log: &mut ErrorLog) {
    if !(p.step_secs.is_finite() && p.step_secs > 0.0) {
        log.add_error(format!("step_secs must be positive, got {}", p.step_secs));
    }
    if !(p.max_cell_length_m.is_finite() && p.max_cell_length_m > 0.0) {
        log.add_error(format!("max_cell_length_m must be positive, got {}", p.max_cell_length_m));
    }
    if !(0.0..=1.0).contains(&p.lc_coefficient) {
        log.add_error(format!("lc_coefficient must lie in [0, 1], got {}", p.lc_coefficient));
    }
}

/// Maneuvers and lateral-inflow direction of every state on `link`.
///
/// A lane group is feasible for a state if it has a road connection into
/// the state's next link (every lane group is, for a state leaving the
/// network).  Inflow to a feasible lane group stays; otherwise it heads
/// toward the nearest feasible side, inner on a tie.
fn configure_lane_changes(net: &Network, link: &Link, lane_groups: &mut [FluidLaneGroup], log: &mut ErrorLog) {
    let ids = &link.lane_groups;
    for state in net.states_on(link.id) {
        let next = net.next_link(state, link.id);
        let feasible: Vec<bool> = ids
            .iter()
            .map(|&lg| next.is_none_or(|to| net.connection_to(lg, to).is_some()))
            .collect();
        if !feasible.iter().any(|&f| f) {
            log.add_error(format!("{}: no lane group can carry state {state}", link.id));
            continue;
        }
        for (pos, &id) in ids.iter().enumerate() {
            let maneuvers = Maneuvers {
                stay:  feasible[pos],
                inner: feasible[..pos].iter().any(|&f| f),
                outer: feasible[pos + 1..].iter().any(|&f| f),
            };
            let direction = if feasible[pos] {
                Bucket::Stay
            } else {
                let inner = (0..pos).rev().find(|&k| feasible[k]).map(|k| pos - k);
                let outer = (pos + 1..ids.len()).find(|&k| feasible[k]).map(|k| k - pos);
                match (inner, outer) {
                    (Some(a), Some(b)) if b < a => Bucket::Out,
                    (Some(_), _) => Bucket::In,
                    (None, _) => Bucket::Out,
                }
            };
            let lg = &mut lane_groups[id.index()];
            lg.maneuvers.insert(state, maneuvers);
            lg.lc_direction.insert(state, direction);
        }
    }
}

fn mean_of(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0u32), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / f64::from(n))
}

/// States (with fractions) that flow in `state` takes on entering `link`.
/// Pathful states keep their path; pathless ones are re-keyed by the
/// link's split ratios.
pub(crate) fn entry_states(net: &Network, link: LinkId, state: State) -> FluidResult<Vec<(State, f64)>> {
    if let Target::Path(_) = state.target {
        return Ok(vec![(state, 1.0)]);
    }
    let targets = net.split_targets(link, state.commodity);
    if targets.is_empty() {
        return Err(FluidError::Unroutable { link, state });
    }
    Ok(targets
        .into_iter()
        .map(|(target, f)| (State { commodity: state.commodity, target }, f))
        .collect())
}
