//! Lateral redistribution between adjacent lane groups of one link.
//!
//! Runs once per flow update on every link with two or more lane groups,
//! after cell supplies and before cell demands are computed.  Cross
//! sections are scanned upstream to downstream.  At cross section `i`,
//! each lane group `g` receives the `Out` bucket of its inner neighbour and
//! the `In` bucket of its outer neighbour, scaled by
//!
//! ```text
//! γ_g = min(1, coef · (1 − w_g) · supply_g,i / lateral demand_g,i)
//! ```
//!
//! Lane groups are processed inner to outer and each transfer is applied
//! immediately, so a state that is laterally reachable in both directions
//! can see an order-dependent result.

use ctm_core::{EPSILON, LaneGroupId, State};

use crate::{Bucket, FluidLaneGroup};

// ── LaneChangeSplit ───────────────────────────────────────────────────────────

/// Which lateral maneuvers a state may perform in a lane group.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Maneuvers {
    pub stay:  bool,
    pub inner: bool,
    pub outer: bool,
}

impl Maneuvers {
    pub fn count(self) -> usize {
        usize::from(self.stay) + usize::from(self.inner) + usize::from(self.outer)
    }

    pub fn is_empty(self) -> bool {
        self.count() == 0
    }

    /// `true` if `split` puts no weight on a disallowed maneuver.
    pub fn permits(self, split: &LaneChangeSplit) -> bool {
        (self.stay || split.stay <= 0.0)
            && (self.inner || split.inner <= 0.0)
            && (self.outer || split.outer <= 0.0)
    }
}

/// Probabilities of the three lateral maneuvers for vehicles entering a
/// lane group.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LaneChangeSplit {
    pub stay:  f64,
    pub inner: f64,
    pub outer: f64,
}

impl LaneChangeSplit {
    pub const STAY: Self = Self { stay: 1.0, inner: 0.0, outer: 0.0 };

    /// Equal weight on every allowed maneuver; all-stay if none is allowed.
    pub fn uniform(m: Maneuvers) -> Self {
        let n = m.count();
        if n == 0 {
            return Self::STAY;
        }
        let p = 1.0 / n as f64;
        let pick = |allowed: bool| if allowed { p } else { 0.0 };
        Self { stay: pick(m.stay), inner: pick(m.inner), outer: pick(m.outer) }
    }

    pub fn weight(&self, bucket: Bucket) -> f64 {
        match bucket {
            Bucket::Stay => self.stay,
            Bucket::In   => self.inner,
            Bucket::Out  => self.outer,
        }
    }

    pub fn sum(&self) -> f64 {
        self.stay + self.inner + self.outer
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Perform one step of lane changes on a link.
///
/// `link_lgs` lists the link's lane groups inner → outer; all of them have
/// the same number of cells.
pub fn perform_lane_changes(lane_groups: &mut [FluidLaneGroup], link_lgs: &[LaneGroupId], coefficient: f64) {
    let Some(&first) = link_lgs.first() else {
        return;
    };
    let num_cells = lane_groups[first.index()].cells.len();

    for i in 0..num_cells {
        let gammas: Vec<f64> = link_lgs
            .iter()
            .map(|&id| lateral_gamma(lane_groups, id, i, coefficient))
            .collect();

        for (&id, &gamma) in link_lgs.iter().zip(&gammas) {
            let lg = &lane_groups[id.index()];
            let (inner, outer) = (lg.inner, lg.outer);
            if let Some(donor) = inner {
                transfer(lane_groups, donor, Bucket::Out, id, i, gamma);
            }
            if let Some(donor) = outer {
                transfer(lane_groups, donor, Bucket::In, id, i, gamma);
            }
        }
    }
}

fn lateral_gamma(lane_groups: &[FluidLaneGroup], id: LaneGroupId, i: usize, coefficient: f64) -> f64 {
    let lg = &lane_groups[id.index()];
    let mut demand = 0.0;
    if let Some(inner) = lg.inner {
        demand += lane_groups[inner.index()].cells[i].bucket_total(Bucket::Out);
    }
    if let Some(outer) = lg.outer {
        demand += lane_groups[outer.index()].cells[i].bucket_total(Bucket::In);
    }
    let supply = lg.fd().lc_supply_fraction(coefficient) * lg.cells[i].supply;
    if demand > supply { supply.max(0.0) / demand } else { 1.0 }
}

/// Move `gamma` of `donor`'s `from` bucket at cell `i` into `receiver`.
fn transfer(
    lane_groups: &mut [FluidLaneGroup],
    donor:       LaneGroupId,
    from:        Bucket,
    receiver:    LaneGroupId,
    i:           usize,
    gamma:       f64,
) {
    let moves: Vec<(State, f64)> = lane_groups[donor.index()].cells[i]
        .vehicles(from)
        .iter()
        .filter(|(_, v)| **v > EPSILON)
        .map(|(&s, &v)| (s, gamma * v))
        .collect();
    if moves.is_empty() {
        return;
    }

    let from_cell = &mut lane_groups[donor.index()].cells[i];
    for &(state, x) in &moves {
        from_cell.take(from, state, x);
        if let Some(acc) = from_cell.lc_out_acc.as_mut() {
            acc.add(state, x);
        }
    }

    let to = &mut lane_groups[receiver.index()];
    let directions: Vec<Bucket> = moves.iter().map(|&(s, _)| to.lc_direction(s)).collect();
    let to_cell = &mut to.cells[i];
    for (&(state, x), bucket) in moves.iter().zip(directions) {
        to_cell.add(bucket, state, x);
        if let Some(acc) = to_cell.lc_in_acc.as_mut() {
            acc.add(state, x);
        }
    }
}
