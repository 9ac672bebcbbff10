//! The `Sim` struct and its event loop.

use tracing::{debug, error, info, warn};

use ctm_core::{LaneGroupId, SimConfig, SimTime};
use ctm_dispatch::{Action, Dispatcher, Event, EventHandler, EventKind, Recipient};
use ctm_fluid::{FlowModel, LaneGroupOverride, OverrideOutcome};
use ctm_network::RoadParams;

use crate::{Controller, SimError, SimObserver, SimResult};

// ── RunStats ──────────────────────────────────────────────────────────────────

/// Counters reported at the end of a run.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunStats {
    /// Completed model steps (state updates).
    pub steps:              u64,
    /// Events dispatched.
    pub events:             u64,
    /// Controller pokes handled.
    pub pokes:              u64,
    /// Overrides that were rejected and not applied.
    pub rejected_overrides: u64,
}

// ── Sim ───────────────────────────────────────────────────────────────────────

/// The main simulation runner.
///
/// `Sim<M>` owns the [`Dispatcher`] and the model.  [`run`](Self::run)
/// seeds the queue with:
///
/// - the flow-update and state-update chains, both first due one step after
///   the start and each re-scheduling itself one step later,
/// - the first poke of every controller,
/// - actions scheduled through the builder,
/// - `StopSimulation` at the end time,
///
/// and then dispatches until the stop flag is raised.  A failing update
/// stops the run and is returned.
///
/// Create via [`SimBuilder`][crate::SimBuilder].
pub struct Sim<M: FlowModel> {
    pub config:     SimConfig,
    pub dispatcher: Dispatcher,
    core:           SimCore<M>,
    scheduled:      Vec<(SimTime, Action)>,
    ran:            bool,
}

/// Everything the event handler mutates besides the dispatcher.
struct SimCore<M: FlowModel> {
    model:       M,
    controllers: Vec<Box<dyn Controller>>,
    stats:       RunStats,
}

/// Borrowed view handed to [`Dispatcher::run_until_stopped`].
struct Handler<'a, M: FlowModel, O: SimObserver<M>> {
    core:     &'a mut SimCore<M>,
    observer: &'a mut O,
}

impl<M: FlowModel> Sim<M> {
    pub(crate) fn new(
        config:      SimConfig,
        model:       M,
        controllers: Vec<Box<dyn Controller>>,
        scheduled:   Vec<(SimTime, Action)>,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::starting_at(config.start_time()),
            config,
            core: SimCore { model, controllers, stats: RunStats::default() },
            scheduled,
            ran: false,
        }
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Run from `config.start_secs` to the end time.
    ///
    /// Calls observer hooks after every step.  Use
    /// [`NoopObserver`][crate::NoopObserver] if you don't need callbacks.
    pub fn run<O: SimObserver<M>>(&mut self, observer: &mut O) -> SimResult<RunStats> {
        if self.ran {
            return Err(SimError::AlreadyRan);
        }
        self.ran = true;

        let start = self.config.start_time();
        let end = self.config.end_time();
        let dt = self.core.model.step_secs();
        self.dispatcher.reset(start);

        self.dispatcher.schedule(start + dt, Action::FluidFlowUpdate);
        self.dispatcher.schedule(start + dt, Action::FluidStateUpdate);
        for c in &self.core.controllers {
            let first = c.start_time().max(start);
            if first.is_finite() {
                self.dispatcher.schedule(first, Action::ControllerPoke { controller: c.id() });
            }
        }
        for (at, action) in self.scheduled.drain(..) {
            self.dispatcher.schedule(at, action);
        }
        self.dispatcher.schedule(end, Action::StopSimulation);

        info!(
            target: "ctm::sim",
            start = start.secs(),
            end = end.secs(),
            step_secs = dt,
            controllers = self.core.controllers.len(),
            "run started"
        );
        observer.on_start(start, &self.core.model);

        let mut handler = Handler { core: &mut self.core, observer: &mut *observer };
        match self.dispatcher.run_until_stopped(&mut handler) {
            Ok(events) => {
                self.core.stats.events = events;
                let now = self.dispatcher.current_time();
                observer.on_sim_end(now, &self.core.model);
                info!(
                    target: "ctm::sim",
                    %now,
                    steps = self.core.stats.steps,
                    events,
                    vehicles = self.core.model.total_vehicles(),
                    "run finished"
                );
                Ok(self.core.stats)
            }
            Err(e) => {
                error!(target: "ctm::sim", now = %self.dispatcher.current_time(), error = %e, "run aborted");
                Err(e)
            }
        }
    }

    pub fn model(&self) -> &M {
        &self.core.model
    }

    /// Mutable access for set-up between building and running, e.g.
    /// accumulator subscriptions or initial source demand.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.core.model
    }

    pub fn stats(&self) -> RunStats {
        self.core.stats
    }

    pub fn now(&self) -> SimTime {
        self.dispatcher.current_time()
    }
}

// ── Event handling ────────────────────────────────────────────────────────────

impl<M: FlowModel, O: SimObserver<M>> EventHandler for Handler<'_, M, O> {
    type Error = SimError;

    fn handle(&mut self, event: Event, dispatcher: &mut Dispatcher) -> SimResult<()> {
        let now = event.timestamp;
        let core = &mut *self.core;
        let dt = core.model.step_secs();

        match event.action {
            Action::FluidFlowUpdate => {
                core.model.update_flow()?;
                dispatcher.schedule_in(dt, Action::FluidFlowUpdate);
            }
            Action::FluidStateUpdate => {
                core.model.update_state()?;
                core.stats.steps += 1;
                self.observer.on_step_end(now, &core.model);
                dispatcher.schedule_in(dt, Action::FluidStateUpdate);
            }
            Action::OverrideCapacity { lane_group, rate_vps } => {
                core.override_lane_group(lane_group, LaneGroupOverride::Capacity { rate_vps })?;
            }
            Action::OverrideSpeed { lane_group, speed_mps } => {
                core.override_lane_group(lane_group, LaneGroupOverride::Speed { speed_mps })?;
            }
            Action::ResetToNominal { lane_group } => {
                core.override_lane_group(lane_group, LaneGroupOverride::Reset)?;
            }
            Action::SetRoadParams { lane_group, capacity_vphpl, jam_density_vpkpl, ffspeed_kph } => {
                let params = RoadParams::new(capacity_vphpl, jam_density_vpkpl, ffspeed_kph);
                core.override_lane_group(lane_group, LaneGroupOverride::RoadParams(params))?;
            }
            Action::SetSourceDemand { link, commodity, path, rate_vps } => {
                core.model.set_source_demand(link, commodity, path, rate_vps)?;
                debug!(target: "ctm::sim", %now, %link, %commodity, rate_vps, "source demand set");
            }
            Action::SetSplits { link, commodity, splits } => {
                core.model.set_splits(link, commodity, &splits)?;
            }
            Action::ControllerPoke { controller } => {
                let c = core
                    .controllers
                    .iter_mut()
                    .find(|c| c.id() == controller)
                    .ok_or(SimError::UnknownController(controller))?;
                let output = c.update_command(now);
                core.stats.pokes += 1;
                if output.supersede {
                    dispatcher.cancel_for_recipient(Recipient::Controller(controller), EventKind::ControllerPoke);
                }
                for cmd in output.commands {
                    dispatcher.schedule(now, cmd);
                }
                if let Some(next) = output.next_poke.filter(|t| t.is_finite()) {
                    if !dispatcher.schedule(next, Action::ControllerPoke { controller }) {
                        warn!(target: "ctm::sim", %controller, %now, %next, "discarded poke in the past");
                    }
                }
            }
            Action::StopSimulation => dispatcher.stop(),
        }
        Ok(())
    }
}

impl<M: FlowModel> SimCore<M> {
    fn override_lane_group(&mut self, lane_group: LaneGroupId, cmd: LaneGroupOverride) -> SimResult<()> {
        if let OverrideOutcome::Rejected(reason) = self.model.apply_override(lane_group, cmd)? {
            self.stats.rejected_overrides += 1;
            warn!(target: "ctm::sim", %lane_group, ?cmd, %reason, "override rejected");
        }
        Ok(())
    }
}
