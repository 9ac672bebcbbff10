//! Fluent builder for constructing a [`Sim`].

use tracing::{debug, warn};

use ctm_core::{ControllerId, ErrorLog, LaneGroupId, LinkId, SimConfig, SimTime};
use ctm_dispatch::Action;
use ctm_fluid::FlowModel;
use ctm_network::Network;

use crate::{Controller, Sim, SimError, SimResult};

/// Fluent builder for [`Sim<M>`].
///
/// # Required inputs
///
/// - [`SimConfig`] — start, duration, seed
/// - `M: FlowModel` — a configured model, e.g. `FluidNetworkModel`
///
/// # Optional inputs
///
/// | Method              | Effect                                           |
/// |---------------------|--------------------------------------------------|
/// | `.controller(c)`    | Register a controller; poked from its start time |
/// | `.schedule(t, a)`   | Dispatch action `a` at `t` seconds               |
///
/// `build()` checks everything at once and reports all problems as a
/// single [`SimError::Validation`].
///
/// # Example
///
/// ```rust,ignore
/// let model = FluidNetworkModel::configure(net, FluidParams::default(), config.seed)?;
/// let mut sim = SimBuilder::new(config, model)
///     .controller(meter)
///     .schedule(900.0, Action::SetSourceDemand { link: ramp, commodity: car, path: None, rate_vps: 0.3 })
///     .build()?;
/// sim.run(&mut NoopObserver)?;
/// ```
pub struct SimBuilder<M: FlowModel> {
    config:      SimConfig,
    model:       M,
    controllers: Vec<Box<dyn Controller>>,
    scheduled:   Vec<(f64, Action)>,
}

impl<M: FlowModel> SimBuilder<M> {
    pub fn new(config: SimConfig, model: M) -> Self {
        Self { config, model, controllers: Vec::new(), scheduled: Vec::new() }
    }

    pub fn controller(mut self, controller: impl Controller + 'static) -> Self {
        self.controllers.push(Box::new(controller));
        self
    }

    /// Dispatch `action` at `at_secs`.  Fluid update actions are managed by
    /// the run loop and may not be scheduled here.
    pub fn schedule(mut self, at_secs: f64, action: Action) -> Self {
        self.scheduled.push((at_secs, action));
        self
    }

    /// Validate inputs and return a ready-to-run [`Sim`].
    pub fn build(self) -> SimResult<Sim<M>> {
        let mut log = ErrorLog::new();
        let c = &self.config;

        if !c.start_secs.is_finite() {
            log.add_error(format!("start_secs must be finite, got {}", c.start_secs));
        }
        if !(c.duration_secs.is_finite() && c.duration_secs > 0.0) {
            log.add_error(format!("duration_secs must be positive, got {}", c.duration_secs));
        }
        let dt = self.model.step_secs();
        if c.duration_secs.is_finite() && c.duration_secs < dt {
            log.add_warning(format!("run of {}s is shorter than one {dt}s step", c.duration_secs));
        }

        let net = self.model.network();
        let mut seen = Vec::with_capacity(self.controllers.len());
        for ctrl in &self.controllers {
            if seen.contains(&ctrl.id()) {
                log.add_error(format!("{} is registered twice", ctrl.id()));
            }
            seen.push(ctrl.id());
            ctrl.validate(net, &mut log);
        }

        let end = c.start_secs + c.duration_secs;
        for (at, action) in &self.scheduled {
            if !(at.is_finite() && *at >= c.start_secs && *at <= end) {
                log.add_error(format!("{action:?} at {at}s is outside the run"));
            }
            check_action(net, action, &seen, &mut log);
        }

        let log = log.into_result().map_err(SimError::Validation)?;
        for w in log.warnings() {
            warn!(target: "ctm::sim", "{w}");
        }

        debug!(
            target: "ctm::sim",
            controllers = self.controllers.len(),
            scheduled = self.scheduled.len(),
            "simulation built"
        );

        let scheduled = self
            .scheduled
            .into_iter()
            .map(|(at, action)| (SimTime::from_secs(at), action))
            .collect();
        Ok(Sim::new(self.config, self.model, self.controllers, scheduled))
    }
}

/// References and values of a user-scheduled action.
fn check_action(net: &Network, action: &Action, controllers: &[ControllerId], log: &mut ErrorLog) {
    let lane_group_exists = |lg: &LaneGroupId, log: &mut ErrorLog| {
        if net.try_lane_group(*lg).is_err() {
            log.add_error(format!("{action:?} refers to unknown {lg}"));
        }
    };
    let link_exists = |link: &LinkId, log: &mut ErrorLog| {
        if net.try_link(*link).is_err() {
            log.add_error(format!("{action:?} refers to unknown {link}"));
        }
    };
    match action {
        Action::FluidFlowUpdate | Action::FluidStateUpdate => {
            log.add_error(format!("{action:?} is scheduled by the run loop"));
        }
        Action::OverrideCapacity { lane_group: lg, rate_vps } => {
            lane_group_exists(lg, log);
            if !(rate_vps.is_finite() && *rate_vps >= 0.0) {
                log.add_error(format!("{action:?}: rate must be finite and non-negative"));
            }
        }
        Action::OverrideSpeed { lane_group: lg, speed_mps } => {
            lane_group_exists(lg, log);
            if !(speed_mps.is_finite() && *speed_mps > 0.0) {
                log.add_error(format!("{action:?}: speed must be finite and positive"));
            }
        }
        Action::ResetToNominal { lane_group: lg } | Action::SetRoadParams { lane_group: lg, .. } => {
            lane_group_exists(lg, log)
        }
        Action::SetSourceDemand { link, rate_vps, .. } => {
            link_exists(link, log);
            if !(rate_vps.is_finite() && *rate_vps >= 0.0) {
                log.add_error(format!("{action:?}: rate must be finite and non-negative"));
            }
        }
        Action::SetSplits { link, .. } => link_exists(link, log),
        Action::ControllerPoke { controller } => {
            if !controllers.contains(controller) {
                log.add_error(format!("poke for unregistered {controller}"));
            }
        }
        Action::StopSimulation => {}
    }
}
