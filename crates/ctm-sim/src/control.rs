//! Controllers and the capacity actuator.
//!
//! A controller computes commands when poked.  The run loop schedules the
//! returned actions at the current instant (actuator events run after the
//! controller event of the same timestamp) and the next poke, if any.

use ctm_core::{ControllerId, ErrorLog, LaneGroupId, LinkId, SimTime};
use ctm_dispatch::Action;
use ctm_network::{Network, NetworkResult};

// ── Controller ────────────────────────────────────────────────────────────────

/// Result of one controller update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControlOutput {
    /// Actions to schedule at the current instant.
    pub commands:  Vec<Action>,
    /// When to poke the controller again.
    pub next_poke: Option<SimTime>,
    /// Cancel this controller's other pending pokes first.
    pub supersede: bool,
}

pub trait Controller {
    fn id(&self) -> ControllerId;

    /// First poke.  The run loop never pokes before the run starts.
    fn start_time(&self) -> SimTime {
        SimTime::ZERO
    }

    /// Report configuration problems against `net`.
    fn validate(&self, net: &Network, log: &mut ErrorLog);

    fn update_command(&mut self, now: SimTime) -> ControlOutput;
}

// ── CapacityActuator ──────────────────────────────────────────────────────────

/// Turns a rate for a set of lane groups into per-lane-group capacity
/// overrides, split in proportion to lane count.
#[derive(Clone, Debug, PartialEq)]
pub struct CapacityActuator {
    shares: Vec<(LaneGroupId, f64)>,
}

impl CapacityActuator {
    pub fn new(net: &Network, lane_groups: &[LaneGroupId]) -> NetworkResult<Self> {
        let mut lanes = Vec::with_capacity(lane_groups.len());
        for &lg in lane_groups {
            lanes.push((lg, f64::from(net.try_lane_group(lg)?.lanes)));
        }
        let total: f64 = lanes.iter().map(|(_, n)| n).sum();
        let shares = lanes.into_iter().map(|(lg, n)| (lg, n / total)).collect();
        Ok(Self { shares })
    }

    /// Every lane group of `link`.
    pub fn on_link(net: &Network, link: LinkId) -> NetworkResult<Self> {
        let lgs = net.try_link(link)?.lane_groups.clone();
        Self::new(net, &lgs)
    }

    pub fn lane_groups(&self) -> impl Iterator<Item = LaneGroupId> + '_ {
        self.shares.iter().map(|&(lg, _)| lg)
    }

    /// Capacity overrides for `rate_vps`; nothing for `None`.
    pub fn commands(&self, rate_vps: Option<f64>) -> Vec<Action> {
        let Some(rate) = rate_vps else {
            return Vec::new();
        };
        self.shares
            .iter()
            .map(|&(lane_group, share)| Action::OverrideCapacity { lane_group, rate_vps: rate * share })
            .collect()
    }

    /// Back to nominal on every lane group.
    pub fn release(&self) -> Vec<Action> {
        self.lane_groups().map(|lane_group| Action::ResetToNominal { lane_group }).collect()
    }

    fn validate(&self, owner: ControllerId, net: &Network, log: &mut ErrorLog) {
        if self.shares.is_empty() {
            log.add_error(format!("{owner}: actuator has no lane groups"));
        }
        for lg in self.lane_groups() {
            if net.try_lane_group(lg).is_err() {
                log.add_error(format!("{owner}: actuator refers to unknown {lg}"));
            }
        }
    }
}

// ── FixedRateController ───────────────────────────────────────────────────────

/// Commands one rate, once or every `period_secs`.
#[derive(Clone, Debug)]
pub struct FixedRateController {
    id:          ControllerId,
    actuator:    CapacityActuator,
    rate_vps:    Option<f64>,
    start:       SimTime,
    period_secs: Option<f64>,
}

impl FixedRateController {
    pub fn new(id: ControllerId, actuator: CapacityActuator, rate_vps: Option<f64>) -> Self {
        Self { id, actuator, rate_vps, start: SimTime::ZERO, period_secs: None }
    }

    pub fn starting_at(mut self, start: SimTime) -> Self {
        self.start = start;
        self
    }

    /// Re-issue the command every `period_secs`.
    pub fn every(mut self, period_secs: f64) -> Self {
        self.period_secs = Some(period_secs);
        self
    }

    pub fn set_rate(&mut self, rate_vps: Option<f64>) {
        self.rate_vps = rate_vps;
    }
}

impl Controller for FixedRateController {
    fn id(&self) -> ControllerId {
        self.id
    }

    fn start_time(&self) -> SimTime {
        self.start
    }

    fn validate(&self, net: &Network, log: &mut ErrorLog) {
        self.actuator.validate(self.id, net, log);
        if let Some(rate) = self.rate_vps {
            if rate.is_nan() || rate < 0.0 {
                log.add_error(format!("{}: rate {rate} veh/s is negative", self.id));
            }
        }
        if let Some(p) = self.period_secs {
            if !(p.is_finite() && p > 0.0) {
                log.add_error(format!("{}: period must be positive, got {p}", self.id));
            }
        }
    }

    fn update_command(&mut self, now: SimTime) -> ControlOutput {
        ControlOutput {
            commands:  self.actuator.commands(self.rate_vps),
            next_poke: self.period_secs.map(|p| now + p),
            supersede: false,
        }
    }
}

// ── ScheduleController ────────────────────────────────────────────────────────

/// One entry of a [`ScheduleController`]: from `start_secs` on, meter at
/// `rate_vps`, or release the meter for `None`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduleEntry {
    pub start_secs: f64,
    pub rate_vps:   Option<f64>,
}

/// Time-of-day schedule of metering rates.
///
/// Poked at each entry's start; each poke applies the entry in force and
/// asks to be poked again at the next entry, cancelling any stale poke.
#[derive(Clone, Debug)]
pub struct ScheduleController {
    id:       ControllerId,
    actuator: CapacityActuator,
    entries:  Vec<ScheduleEntry>,
}

impl ScheduleController {
    pub fn new(id: ControllerId, actuator: CapacityActuator, entries: Vec<ScheduleEntry>) -> Self {
        Self { id, actuator, entries }
    }

    /// Entry in force at `now`.
    pub fn active_entry(&self, now: SimTime) -> Option<&ScheduleEntry> {
        self.entries.iter().rev().find(|e| e.start_secs <= now.secs())
    }

    fn next_start(&self, now: SimTime) -> Option<SimTime> {
        self.entries
            .iter()
            .find(|e| e.start_secs > now.secs())
            .map(|e| SimTime::from_secs(e.start_secs))
    }
}

impl Controller for ScheduleController {
    fn id(&self) -> ControllerId {
        self.id
    }

    fn start_time(&self) -> SimTime {
        self.entries.first().map_or(SimTime::NEVER, |e| SimTime::from_secs(e.start_secs))
    }

    fn validate(&self, net: &Network, log: &mut ErrorLog) {
        self.actuator.validate(self.id, net, log);
        if self.entries.is_empty() {
            log.add_error(format!("{}: schedule has no entries", self.id));
        }
        for pair in self.entries.windows(2) {
            if pair[1].start_secs <= pair[0].start_secs {
                log.add_error(format!(
                    "{}: entry at {}s does not follow entry at {}s",
                    self.id, pair[1].start_secs, pair[0].start_secs
                ));
            }
        }
        for e in &self.entries {
            if !e.start_secs.is_finite() {
                log.add_error(format!("{}: entry start {} is not finite", self.id, e.start_secs));
            }
            if e.rate_vps.is_some_and(|r| r.is_nan() || r < 0.0) {
                log.add_error(format!("{}: entry at {}s has a negative rate", self.id, e.start_secs));
            }
        }
    }

    fn update_command(&mut self, now: SimTime) -> ControlOutput {
        let commands = match self.active_entry(now) {
            Some(ScheduleEntry { rate_vps: Some(rate), .. }) => self.actuator.commands(Some(*rate)),
            Some(ScheduleEntry { rate_vps: None, .. }) => self.actuator.release(),
            None => Vec::new(),
        };
        ControlOutput { commands, next_poke: self.next_start(now), supersede: true }
    }
}
