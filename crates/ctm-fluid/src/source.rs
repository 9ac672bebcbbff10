//! External demand entering at source links.

use ctm_core::{CommodityId, LaneGroupId, LinkId, PathId, SimRng, State, Target};
use ctm_network::Network;

use crate::{DemandProcess, FluidError, FluidResult};

/// Demand rate of one commodity (and path, if pathful) at a source link.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceDemand {
    pub link:      LinkId,
    pub commodity: CommodityId,
    pub path:      Option<PathId>,
    pub rate_vps:  f64,
}

impl SourceDemand {
    /// Check the source against the network.
    pub fn validate(&self, net: &Network) -> FluidResult<()> {
        let invalid = |reason: String| FluidError::InvalidSource {
            link:      self.link,
            commodity: self.commodity,
            reason,
        };
        if !net.try_link(self.link)?.is_source {
            return Err(FluidError::NotASource(self.link));
        }
        let commodity = net.try_commodity(self.commodity)?;
        if !(self.rate_vps.is_finite() && self.rate_vps >= 0.0) {
            return Err(invalid(format!("rate {} veh/s is not a non-negative number", self.rate_vps)));
        }
        match (commodity.pathful, self.path) {
            (true, None) => Err(invalid("pathful commodity needs a path".into())),
            (false, Some(p)) => Err(invalid(format!("pathless commodity given {p}"))),
            (true, Some(p)) => {
                let path = net.try_path(p)?;
                if path.commodity != self.commodity {
                    return Err(invalid(format!("{p} belongs to {}", path.commodity)));
                }
                if path.first() != Some(self.link) {
                    return Err(invalid(format!("{p} does not start here")));
                }
                Ok(())
            }
            (false, None) => Ok(()),
        }
    }

    /// Mean vehicles per step for each (lane group, state).
    ///
    /// Pathful demand goes in equal parts to the lane groups that reach the
    /// path's next link.  Pathless demand is first divided by the link's
    /// split ratios, then in equal parts over the lane groups reaching each
    /// next link.
    pub fn split(&self, net: &Network, step_secs: f64) -> Vec<(LaneGroupId, State, f64)> {
        let veh_per_step = self.rate_vps * step_secs;
        let targets: Vec<(Target, f64)> = match self.path {
            Some(p) => vec![(Target::Path(p), 1.0)],
            None => net.split_targets(self.link, self.commodity),
        };

        let mut out = Vec::new();
        for (target, fraction) in targets {
            if fraction <= 0.0 {
                continue;
            }
            let state = State { commodity: self.commodity, target };
            let next = net.next_link(state, self.link);
            let candidates: Vec<LaneGroupId> = net
                .link(self.link)
                .lane_groups
                .iter()
                .copied()
                .filter(|&lg| next.is_none_or(|to| net.connection_to(lg, to).is_some()))
                .collect();
            if candidates.is_empty() {
                continue;
            }
            let each = veh_per_step * fraction / candidates.len() as f64;
            out.extend(candidates.into_iter().map(|lg| (lg, state, each)));
        }
        out
    }
}

/// Vehicles injected this step for a mean of `mean`.
pub fn draw(process: DemandProcess, mean: f64, rng: &mut SimRng) -> f64 {
    match process {
        DemandProcess::Deterministic => mean,
        DemandProcess::Poisson => rng.poisson(mean) as f64,
    }
}
