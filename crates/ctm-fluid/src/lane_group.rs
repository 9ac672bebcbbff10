//! Dynamic state of one lane group: its cells and current diagram.

use rustc_hash::FxHashMap;

use ctm_core::{CommodityId, EPSILON, LaneGroupId, LinkId, State};
use ctm_network::RoadParams;

use crate::{
    Bucket, Cell, Discretization, FlowAccumulator, FluidError, FluidResult, FundamentalDiagram,
    LaneChangeSplit, Maneuvers, StateMap, TravelTimer,
};

/// Supply more negative than this is a jam-density violation.
pub(crate) const SUPPLY_TOL: f64 = 1e-6;

/// Buffer content at or above which a lane group refuses upstream inflow.
const BUFFER_FULL_VEH: f64 = 1.0;

/// Runtime change to a lane group's diagram.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LaneGroupOverride {
    /// Actuated capacity in vehicles per second for the whole lane group.
    Capacity { rate_vps: f64 },
    /// Actuated free-flow speed.
    Speed { speed_mps: f64 },
    /// Back to the nominal diagram.
    Reset,
    /// Replace the nominal parameters.
    RoadParams(RoadParams),
}

#[derive(Clone, Debug, PartialEq)]
pub enum OverrideOutcome {
    Applied,
    /// Not applied; the lane group is unchanged.
    Rejected(String),
}

/// One lane group in the fluid model.
///
/// Cells are ordered upstream (index 0) to downstream.  The lane group
/// owns two diagrams: the nominal one, set at configuration or by
/// [`set_road_params`](Self::set_road_params), and the current one, which
/// actuator overrides may lower but never raise above nominal.
#[derive(Clone, Debug)]
pub struct FluidLaneGroup {
    pub id:        LaneGroupId,
    pub link:      LinkId,
    pub lanes:     u32,
    pub inner:     Option<LaneGroupId>,
    pub outer:     Option<LaneGroupId>,
    pub is_source: bool,
    pub is_sink:   bool,
    pub cells:     Vec<Cell>,

    disc:        Discretization,
    nominal:     FundamentalDiagram,
    fd:          FundamentalDiagram,
    long_supply: f64,

    pub(crate) maneuvers:    FxHashMap<State, Maneuvers>,
    pub(crate) lc_table:     FxHashMap<State, LaneChangeSplit>,
    pub(crate) lc_direction: FxHashMap<State, Bucket>,

    /// Mean source inflow per step, by state.
    pub(crate) source_flow: StateMap,
    /// Vehicles waiting to enter cell 0.
    pub(crate) buffer: StateMap,
    /// Vehicles released from the last cell during the current step.
    released: f64,

    pub(crate) exit_acc:     Option<FlowAccumulator>,
    pub(crate) travel_timer: Option<TravelTimer>,
}

impl FluidLaneGroup {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id:        LaneGroupId,
        link:      LinkId,
        lanes:     u32,
        inner:     Option<LaneGroupId>,
        outer:     Option<LaneGroupId>,
        is_source: bool,
        is_sink:   bool,
        num_cells: usize,
        disc:      Discretization,
        params:    &RoadParams,
    ) -> Self {
        let fd = if is_source {
            FundamentalDiagram::source(params, &disc)
        } else {
            FundamentalDiagram::from_road_params(params, &disc)
        };
        Self {
            id,
            link,
            lanes,
            inner,
            outer,
            is_source,
            is_sink,
            cells: vec![Cell::new(); num_cells],
            disc,
            nominal: fd,
            fd,
            long_supply: fd.capacity,
            maneuvers: FxHashMap::default(),
            lc_table: FxHashMap::default(),
            lc_direction: FxHashMap::default(),
            source_flow: StateMap::default(),
            buffer: StateMap::default(),
            released: 0.0,
            exit_acc: None,
            travel_timer: None,
        }
    }

    // ── Diagram ───────────────────────────────────────────────────────────

    pub fn fd(&self) -> &FundamentalDiagram {
        &self.fd
    }

    pub fn nominal(&self) -> &FundamentalDiagram {
        &self.nominal
    }

    pub fn discretization(&self) -> &Discretization {
        &self.disc
    }

    /// Current diagram in macroscopic per-lane units.
    pub fn road_params(&self) -> RoadParams {
        self.fd.to_road_params(&self.disc)
    }

    /// Positivity and CFL of the current diagram.  Source lane groups are
    /// never jammed and only need a non-negative capacity.
    pub fn check_parameters(&self) -> Result<(), String> {
        if self.is_source {
            if self.fd.capacity.is_nan() || self.fd.capacity < 0.0 {
                return Err(format!("capacity {:.4} is negative", self.fd.capacity));
            }
            return Ok(());
        }
        self.fd.check()
    }

    /// Replace the nominal parameters and reset the current diagram to them.
    ///
    /// Fails if the new diagram is invalid or if any cell already holds
    /// more vehicles than the new jam density; in both cases nothing changes.
    pub fn set_road_params(&mut self, params: &RoadParams) -> FluidResult<()> {
        let fd = if self.is_source {
            FundamentalDiagram::source(params, &self.disc)
        } else {
            FundamentalDiagram::from_road_params(params, &self.disc)
        };
        if !self.is_source {
            fd.check().map_err(|reason| FluidError::InvalidParameters { lane_group: self.id, reason })?;
        }
        for (i, cell) in self.cells.iter().enumerate() {
            let vehicles = cell.total_vehicles();
            if vehicles > fd.jam_density + SUPPLY_TOL {
                return Err(FluidError::JamDensityExceeded {
                    lane_group: self.id,
                    cell: i,
                    vehicles,
                    jam_density: fd.jam_density,
                });
            }
        }
        self.nominal = fd;
        self.fd = fd;
        self.update_long_supply()
    }

    /// Actuated capacity, clamped to nominal.  The longitudinal supply is
    /// recomputed immediately.  NaN or negative rates are rejected without
    /// change.
    pub fn override_capacity(&mut self, rate_vps: f64) -> FluidResult<OverrideOutcome> {
        if rate_vps.is_nan() || rate_vps < 0.0 {
            return Ok(OverrideOutcome::Rejected(format!("capacity {rate_vps} veh/s is negative or NaN")));
        }
        let capacity = (rate_vps * self.disc.step_secs).min(self.nominal.capacity);
        self.fd = self.fd.with_capacity(capacity);
        self.update_long_supply()?;
        Ok(OverrideOutcome::Applied)
    }

    /// Actuated free-flow speed, clamped to nominal.  Critical density and
    /// wave speed follow.  Rejected without change if the result would be
    /// invalid.
    pub fn override_speed(&mut self, speed_mps: f64) -> OverrideOutcome {
        if speed_mps.is_nan() || speed_mps <= 0.0 {
            return OverrideOutcome::Rejected(format!("free-flow speed {speed_mps} m/s is not positive"));
        }
        let ffspeed = (speed_mps * self.disc.step_secs / self.disc.cell_length_m).min(self.nominal.ffspeed);
        let candidate = self.fd.with_ffspeed(ffspeed);
        if !self.is_source {
            if let Err(reason) = candidate.check() {
                return OverrideOutcome::Rejected(reason);
            }
        }
        self.fd = candidate;
        OverrideOutcome::Applied
    }

    pub fn reset_to_nominal(&mut self) -> FluidResult<()> {
        self.fd = self.nominal;
        self.update_long_supply()
    }

    // ── Supply & demand ───────────────────────────────────────────────────

    /// Lateral supply: sum of cell supplies.
    pub fn get_supply(&self) -> f64 {
        self.cells.iter().map(|c| c.supply).sum()
    }

    /// Longitudinal supply: what the upstream cell accepts from the node.
    pub fn long_supply(&self) -> f64 {
        self.long_supply
    }

    fn cell_supply(&self, i: usize) -> FluidResult<f64> {
        let raw = self.cells[i].raw_supply(&self.fd, self.is_source);
        if raw < -SUPPLY_TOL {
            return Err(FluidError::NegativeSupply { lane_group: self.id, cell: i, supply: raw });
        }
        Ok(raw.max(0.0))
    }

    pub fn update_long_supply(&mut self) -> FluidResult<()> {
        if self.cells.is_empty() {
            return Ok(());
        }
        let supply = self.cell_supply(0)?;
        self.cells[0].supply = supply;
        self.long_supply = if self.buffer_total() >= BUFFER_FULL_VEH { 0.0 } else { supply };
        Ok(())
    }

    pub(crate) fn update_all_supplies(&mut self) -> FluidResult<()> {
        for i in 0..self.cells.len() {
            self.cells[i].supply = self.cell_supply(i)?;
        }
        self.long_supply = if self.buffer_total() >= BUFFER_FULL_VEH {
            0.0
        } else {
            self.cells.first().map_or(0.0, |c| c.supply)
        };
        Ok(())
    }

    pub(crate) fn update_all_demands(&mut self) {
        let (fd, is_source) = (self.fd, self.is_source);
        for cell in &mut self.cells {
            cell.update_demand(&fd, is_source);
        }
    }

    /// Per-state demand of the downstream cell.
    pub fn demand(&self) -> StateMap {
        self.cells.last().map(Cell::demand_by_state).unwrap_or_default()
    }

    // ── Lane-change model ─────────────────────────────────────────────────

    /// Maneuvers open to `state` in this lane group.
    pub fn maneuvers(&self, state: State) -> Maneuvers {
        self.maneuvers.get(&state).copied().unwrap_or_default()
    }

    /// How vehicles of `state` entering this lane group spread over the
    /// buckets: the configured table if any, otherwise uniform over the
    /// allowed maneuvers.
    pub fn lc_split(&self, state: State) -> LaneChangeSplit {
        if let Some(split) = self.lc_table.get(&state) {
            return *split;
        }
        LaneChangeSplit::uniform(self.maneuvers(state))
    }

    /// Bucket that lateral inflow of `state` lands in.
    pub fn lc_direction(&self, state: State) -> Bucket {
        self.lc_direction.get(&state).copied().unwrap_or(Bucket::Stay)
    }

    // ── Exchange ──────────────────────────────────────────────────────────

    /// Add vehicles to the upstream cell, spread by the lane-change split.
    pub(crate) fn add_inflow(&mut self, state: State, veh: f64) {
        if veh <= 0.0 {
            return;
        }
        let split = self.lc_split(state);
        let cell = &mut self.cells[0];
        cell.add_split(state, veh, &split);
        cell.credit_flow(state, veh);
    }

    /// Remove `flows` from the downstream cell and credit the exit counter.
    pub(crate) fn release(&mut self, flows: &StateMap) -> FluidResult<()> {
        let Some(last) = self.cells.last_mut() else {
            return Ok(());
        };
        let mut total = 0.0;
        for (&state, &x) in flows {
            if x <= 0.0 {
                continue;
            }
            last.release(state, x);
            total += x;
            if let Some(acc) = self.exit_acc.as_mut() {
                acc.add(state, x);
            }
        }
        self.released += total;
        if self.cells.len() == 1 {
            self.update_long_supply()?;
        }
        Ok(())
    }

    // ── State update ──────────────────────────────────────────────────────

    /// Cell-to-cell transport for one step, `γ = min(1, supply_{i+1} / demand_i)`.
    /// Returns the travel-time sample in seconds.
    pub(crate) fn transport(&mut self) -> f64 {
        let dt = self.disc.step_secs;
        let n = self.cells.len();
        let mut outflow = vec![0.0; n];

        for i in 0..n.saturating_sub(1) {
            let (head, tail) = self.cells.split_at_mut(i + 1);
            let (up, dn) = (&mut head[i], &mut tail[0]);
            let total = up.total_demand();
            if total <= EPSILON {
                continue;
            }
            let gamma = (dn.supply / total).min(1.0);
            outflow[i] = up.move_demand_into(dn, gamma);
        }
        if let Some(last) = outflow.last_mut() {
            *last = self.released;
        }
        self.released = 0.0;

        let free = if self.is_source { dt } else { dt / self.fd.ffspeed };
        self.cells
            .iter()
            .zip(&outflow)
            .map(|(cell, &out)| {
                let veh = cell.total_vehicles();
                if veh > EPSILON && out > EPSILON { dt * veh / out } else { free }
            })
            .sum()
    }

    /// Move buffered vehicles into the upstream cell, as far as its supply
    /// allows.
    pub(crate) fn process_buffer(&mut self) -> FluidResult<()> {
        let total = self.buffer_total();
        if total < EPSILON {
            return Ok(());
        }
        let factor = (self.cells[0].supply / total).min(1.0);
        let entries: Vec<(State, f64)> = self.buffer.iter().map(|(&s, &v)| (s, v)).collect();
        for (state, veh) in entries {
            self.add_inflow(state, veh * factor);
            let left = veh * (1.0 - factor);
            if left > EPSILON {
                self.buffer.insert(state, left);
            } else {
                self.buffer.remove(&state);
            }
        }
        self.update_long_supply()
    }

    pub(crate) fn add_to_buffer(&mut self, state: State, veh: f64) {
        if veh > 0.0 {
            *self.buffer.entry(state).or_insert(0.0) += veh;
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn total_vehicles(&self) -> f64 {
        self.cells.iter().map(Cell::total_vehicles).sum()
    }

    pub fn vehicles_for(&self, state: State) -> f64 {
        self.cells.iter().map(|c| c.vehicles_for(state)).sum()
    }

    pub fn vehicles_for_commodity(&self, commodity: CommodityId) -> f64 {
        self.cells.iter().map(|c| c.vehicles_for_commodity(commodity)).sum()
    }

    pub fn cell_vehicles(&self) -> Vec<f64> {
        self.cells.iter().map(Cell::total_vehicles).collect()
    }

    /// Jam density times cell count; infinite on source lane groups.
    pub fn max_vehicles(&self) -> f64 {
        self.fd.jam_density * self.cells.len() as f64
    }

    pub fn buffer_total(&self) -> f64 {
        self.buffer.values().sum()
    }

    pub fn exit_flow(&self) -> Option<&FlowAccumulator> {
        self.exit_acc.as_ref()
    }

    pub fn travel_timer(&self) -> Option<&TravelTimer> {
        self.travel_timer.as_ref()
    }
}
