//! A single CTM cell.
//!
//! Vehicles in a cell are held in three buckets keyed by [`State`]:
//!
//! - `Stay` — vehicles that remain in their lane group,
//! - `In`   — vehicles about to move to the inner neighbour,
//! - `Out`  — vehicles about to move to the outer neighbour.
//!
//! Demand is recomputed from the buckets once per step and kept per bucket
//! so that longitudinal transport preserves each vehicle's lateral intent.

use rustc_hash::FxHashMap;

use ctm_core::{CommodityId, EPSILON, State};

use crate::{FlowAccumulator, FundamentalDiagram, LaneChangeSplit};

/// Vehicles (or vehicles per step) keyed by state.
pub type StateMap = FxHashMap<State, f64>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Bucket {
    Stay,
    In,
    Out,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Stay, Bucket::In, Bucket::Out];

    #[inline]
    fn idx(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug, Default)]
pub struct Cell {
    pub(crate) veh:    [StateMap; 3],
    pub(crate) demand: [StateMap; 3],
    /// Vehicles this cell can accept during the current step.
    pub supply: f64,

    pub flow_acc:   Option<FlowAccumulator>,
    pub lc_in_acc:  Option<FlowAccumulator>,
    pub lc_out_acc: Option<FlowAccumulator>,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn vehicles(&self, bucket: Bucket) -> &StateMap {
        &self.veh[bucket.idx()]
    }

    pub fn demand(&self, bucket: Bucket) -> &StateMap {
        &self.demand[bucket.idx()]
    }

    pub fn bucket_total(&self, bucket: Bucket) -> f64 {
        self.veh[bucket.idx()].values().sum()
    }

    pub fn total_vehicles(&self) -> f64 {
        self.veh.iter().flat_map(|m| m.values()).sum()
    }

    pub fn vehicles_for(&self, state: State) -> f64 {
        self.veh.iter().filter_map(|m| m.get(&state)).sum()
    }

    pub fn vehicles_for_commodity(&self, commodity: CommodityId) -> f64 {
        self.veh
            .iter()
            .flat_map(|m| m.iter())
            .filter(|(s, _)| s.commodity == commodity)
            .map(|(_, v)| v)
            .sum()
    }

    pub fn total_demand(&self) -> f64 {
        self.demand.iter().flat_map(|m| m.values()).sum()
    }

    /// Demand summed over buckets.
    pub fn demand_by_state(&self) -> StateMap {
        let mut out = StateMap::default();
        for m in &self.demand {
            for (&s, &d) in m {
                *out.entry(s).or_insert(0.0) += d;
            }
        }
        out
    }

    // ── Mutation ──────────────────────────────────────────────────────────

    pub fn add(&mut self, bucket: Bucket, state: State, veh: f64) {
        if veh > 0.0 {
            *self.veh[bucket.idx()].entry(state).or_insert(0.0) += veh;
        }
    }

    /// Remove up to `veh`; entries that fall to round-off are dropped.
    pub fn take(&mut self, bucket: Bucket, state: State, veh: f64) {
        let map = &mut self.veh[bucket.idx()];
        if let Some(x) = map.get_mut(&state) {
            *x -= veh;
            if *x <= EPSILON {
                map.remove(&state);
            }
        }
    }

    /// Add `veh` of `state`, spread over the buckets by `split`.
    pub fn add_split(&mut self, state: State, veh: f64, split: &LaneChangeSplit) {
        for b in Bucket::ALL {
            self.add(b, state, veh * split.weight(b));
        }
    }

    /// Remove `veh` of `state` from the buckets in proportion to their
    /// demand, or to their content if there is no demand.
    pub fn release(&mut self, state: State, veh: f64) {
        let shares: [f64; 3] = {
            let by_demand = Bucket::ALL.map(|b| self.demand[b.idx()].get(&state).copied().unwrap_or(0.0));
            let total: f64 = by_demand.iter().sum();
            if total > EPSILON {
                by_demand.map(|d| d / total)
            } else {
                let by_veh = Bucket::ALL.map(|b| self.veh[b.idx()].get(&state).copied().unwrap_or(0.0));
                let total: f64 = by_veh.iter().sum();
                if total <= EPSILON {
                    return;
                }
                by_veh.map(|v| v / total)
            }
        };
        for b in Bucket::ALL {
            self.take(b, state, veh * shares[b.idx()]);
        }
    }

    pub fn credit_flow(&mut self, state: State, veh: f64) {
        if let Some(acc) = self.flow_acc.as_mut() {
            acc.add(state, veh);
        }
    }

    // ── Per-step computations ─────────────────────────────────────────────

    /// `min(w · (kj − n), c)`, or `c` for a source cell.  May be negative
    /// if the cell is over jam density; the caller decides what to do.
    pub fn raw_supply(&self, fd: &FundamentalDiagram, is_source: bool) -> f64 {
        if is_source {
            return fd.capacity;
        }
        (fd.wave_speed * (fd.jam_density - self.total_vehicles())).min(fd.capacity)
    }

    /// Total demand is `min(v · n, c)` (`min(n, c)` for a source cell),
    /// shared over states and buckets in proportion to their content.
    pub fn update_demand(&mut self, fd: &FundamentalDiagram, is_source: bool) {
        for m in &mut self.demand {
            m.clear();
        }
        let total = self.total_vehicles();
        if total <= EPSILON {
            return;
        }
        let total_demand = if is_source {
            total.min(fd.capacity)
        } else {
            (fd.ffspeed * total).min(fd.capacity)
        };
        let ratio = total_demand / total;
        for (veh, demand) in self.veh.iter().zip(self.demand.iter_mut()) {
            demand.extend(veh.iter().map(|(&s, &v)| (s, v * ratio)));
        }
    }

    /// Move `gamma` of this cell's demand into `dn`, bucket to bucket.
    /// Returns the vehicles moved.
    pub fn move_demand_into(&mut self, dn: &mut Cell, gamma: f64) -> f64 {
        let mut moved = 0.0;
        for b in Bucket::ALL {
            let i = b.idx();
            for (&state, &d) in &self.demand[i] {
                let x = gamma * d;
                if x <= 0.0 {
                    continue;
                }
                if let Some(v) = self.veh[i].get_mut(&state) {
                    *v -= x;
                }
                *dn.veh[i].entry(state).or_insert(0.0) += x;
                if let Some(acc) = dn.flow_acc.as_mut() {
                    acc.add(state, x);
                }
                moved += x;
            }
            self.veh[i].retain(|_, v| *v > EPSILON);
        }
        moved
    }
}
