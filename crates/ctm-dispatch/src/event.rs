//! Events and the actions they carry.
//!
//! Every effect in the simulator is an [`Action`] wrapped in an [`Event`]
//! placed on the dispatcher queue.  The action kind fixes both the numeric
//! priority used to break timestamp ties and the recipient used for
//! cancellation, so two runs with the same inputs always dispatch in the
//! same order.

use std::fmt;

use ctm_core::{CommodityId, ControllerId, LaneGroupId, LinkId, PathId, SimTime};

/// Tie-break priorities for events sharing a timestamp (lower runs first).
pub mod priority {
    /// Demand profile and split-ratio changes.
    pub const DEMAND: u8 = 5;
    /// Fluid model phase I/II (flow computation and exchange).
    pub const FLOW_UPDATE: u8 = 10;
    /// Fluid model intra-link state advance.
    pub const STATE_UPDATE: u8 = 20;
    /// Controller command computation.
    pub const CONTROLLER: u8 = 25;
    /// Actuator overrides.  Runs after both fluid updates of the same
    /// instant, so an override takes effect from the next flow update.
    pub const ACTUATOR: u8 = 30;
    /// End of run.
    pub const STOP: u8 = u8::MAX;
}

// ── Action ────────────────────────────────────────────────────────────────────

/// What an event does when it fires.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Action {
    /// Phase I + II of the fluid model step.
    FluidFlowUpdate,
    /// Cell-to-cell transport and supply refresh.
    FluidStateUpdate,
    /// Actuator capacity command, vehicles per second.
    OverrideCapacity { lane_group: LaneGroupId, rate_vps: f64 },
    /// Actuator speed command, metres per second.
    OverrideSpeed { lane_group: LaneGroupId, speed_mps: f64 },
    /// Restore the nominal fundamental diagram.
    ResetToNominal { lane_group: LaneGroupId },
    /// Replace the lane group's macroscopic road parameters.
    SetRoadParams {
        lane_group:        LaneGroupId,
        capacity_vphpl:    f64,
        jam_density_vpkpl: f64,
        ffspeed_kph:       f64,
    },
    /// Change the demand of one commodity (and path) at a source link.
    SetSourceDemand {
        link:      LinkId,
        commodity: CommodityId,
        path:      Option<PathId>,
        rate_vps:  f64,
    },
    /// Replace a pathless commodity's split ratios on a link.
    SetSplits {
        link:      LinkId,
        commodity: CommodityId,
        splits:    Vec<(LinkId, f64)>,
    },
    /// Ask a controller to recompute its command.
    ControllerPoke { controller: ControllerId },
    /// End the run.
    StopSimulation,
}

/// Field-less discriminant of [`Action`], used for cancellation queries.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum EventKind {
    FluidFlowUpdate,
    FluidStateUpdate,
    OverrideCapacity,
    OverrideSpeed,
    ResetToNominal,
    SetRoadParams,
    SetSourceDemand,
    SetSplits,
    ControllerPoke,
    StopSimulation,
}

/// The element an event is addressed to.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Recipient {
    FluidModel,
    LaneGroup(LaneGroupId),
    Link(LinkId),
    Controller(ControllerId),
    Simulation,
}

impl Action {
    pub fn kind(&self) -> EventKind {
        match self {
            Action::FluidFlowUpdate         => EventKind::FluidFlowUpdate,
            Action::FluidStateUpdate        => EventKind::FluidStateUpdate,
            Action::OverrideCapacity { .. } => EventKind::OverrideCapacity,
            Action::OverrideSpeed { .. }    => EventKind::OverrideSpeed,
            Action::ResetToNominal { .. }   => EventKind::ResetToNominal,
            Action::SetRoadParams { .. }    => EventKind::SetRoadParams,
            Action::SetSourceDemand { .. }  => EventKind::SetSourceDemand,
            Action::SetSplits { .. }        => EventKind::SetSplits,
            Action::ControllerPoke { .. }   => EventKind::ControllerPoke,
            Action::StopSimulation          => EventKind::StopSimulation,
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            Action::SetSourceDemand { .. } | Action::SetSplits { .. } => priority::DEMAND,
            Action::FluidFlowUpdate  => priority::FLOW_UPDATE,
            Action::FluidStateUpdate => priority::STATE_UPDATE,
            Action::ControllerPoke { .. } => priority::CONTROLLER,
            Action::OverrideCapacity { .. }
            | Action::OverrideSpeed { .. }
            | Action::ResetToNominal { .. }
            | Action::SetRoadParams { .. } => priority::ACTUATOR,
            Action::StopSimulation => priority::STOP,
        }
    }

    pub fn recipient(&self) -> Recipient {
        match *self {
            Action::FluidFlowUpdate | Action::FluidStateUpdate => Recipient::FluidModel,
            Action::OverrideCapacity { lane_group, .. }
            | Action::OverrideSpeed { lane_group, .. }
            | Action::ResetToNominal { lane_group }
            | Action::SetRoadParams { lane_group, .. } => Recipient::LaneGroup(lane_group),
            Action::SetSourceDemand { link, .. } | Action::SetSplits { link, .. } => {
                Recipient::Link(link)
            }
            Action::ControllerPoke { controller } => Recipient::Controller(controller),
            Action::StopSimulation => Recipient::Simulation,
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────────────

/// A dequeued event, handed to the [`EventHandler`][crate::EventHandler].
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub timestamp: SimTime,
    pub priority:  u8,
    pub action:    Action,
}

impl Event {
    pub fn new(timestamp: SimTime, action: Action) -> Self {
        Self { timestamp, priority: action.priority(), action }
    }

    #[inline]
    pub fn recipient(&self) -> Recipient {
        self.action.recipient()
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.action.kind()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} p{} {:?}", self.timestamp, self.priority, self.action)
    }
}
