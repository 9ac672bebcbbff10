//! Observer-facing flow counters and travel-time samples.
//!
//! Nothing here is allocated unless requested: lane groups and cells carry
//! `Option<FlowAccumulator>` / `Option<TravelTimer>` fields that stay `None`
//! until an observer subscribes through
//! [`FluidNetworkModel::subscribe`](crate::FluidNetworkModel::subscribe).

use rustc_hash::FxHashMap;

use ctm_core::{CommodityId, LaneGroupId, State};

/// What an observer wants counted.  Requests must be made before the run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccumulatorRequest {
    /// Vehicles leaving the lane group downstream.
    LaneGroupExit(LaneGroupId),
    /// Vehicles entering each cell longitudinally.
    CellFlow(LaneGroupId),
    /// Vehicles entering each cell from a neighbouring lane group.
    CellLaneChangeIn(LaneGroupId),
    /// Vehicles leaving each cell for a neighbouring lane group.
    CellLaneChangeOut(LaneGroupId),
    /// One travel-time sample per state update.
    TravelTime(LaneGroupId),
}

impl AccumulatorRequest {
    pub fn lane_group(self) -> LaneGroupId {
        match self {
            Self::LaneGroupExit(lg)
            | Self::CellFlow(lg)
            | Self::CellLaneChangeIn(lg)
            | Self::CellLaneChangeOut(lg)
            | Self::TravelTime(lg) => lg,
        }
    }
}

/// Cumulative vehicle count, per state and in total.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowAccumulator {
    by_state: FxHashMap<State, f64>,
    total:    f64,
}

impl FlowAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, state: State, veh: f64) {
        *self.by_state.entry(state).or_insert(0.0) += veh;
        self.total += veh;
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn for_state(&self, state: State) -> f64 {
        self.by_state.get(&state).copied().unwrap_or(0.0)
    }

    pub fn for_commodity(&self, commodity: CommodityId) -> f64 {
        self.by_state
            .iter()
            .filter(|(s, _)| s.commodity == commodity)
            .map(|(_, v)| v)
            .sum()
    }

    pub fn reset(&mut self) {
        self.by_state.clear();
        self.total = 0.0;
    }
}

/// Running travel-time statistics for one lane group, in seconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TravelTimer {
    last:  Option<f64>,
    sum:   f64,
    count: u64,
}

impl TravelTimer {
    pub fn record(&mut self, secs: f64) {
        self.last = Some(secs);
        self.sum += secs;
        self.count += 1;
    }

    /// Most recent sample.
    pub fn last(&self) -> Option<f64> {
        self.last
    }

    /// Mean over the samples since the last clear, `None` if there are none.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Mean for the output interval just ended; starts the next one.
    pub fn mean_and_clear(&mut self) -> Option<f64> {
        let mean = self.mean();
        self.sum = 0.0;
        self.count = 0;
        mean
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
