//! Conserved flow classes.
//!
//! Every vehicle amount in the fluid model is keyed by a [`State`]: the
//! commodity it belongs to plus its routing target on the current link.
//! Pathful commodities are keyed by their path; pathless commodities are
//! keyed by the link they will take next, which is re-drawn from split
//! ratios each time flow enters a new link.

use std::fmt;

use crate::{CommodityId, LinkId, PathId};

/// Where a unit of flow is heading.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Target {
    /// Pathful commodity following a fixed path.
    Path(PathId),
    /// Pathless commodity that will enter this link next.
    NextLink(LinkId),
    /// Pathless commodity on a sink link; leaves the network downstream.
    Exit,
}

/// A conserved flow class: `(commodity, target)`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct State {
    pub commodity: CommodityId,
    pub target:    Target,
}

impl State {
    #[inline]
    pub fn pathful(commodity: CommodityId, path: PathId) -> Self {
        Self { commodity, target: Target::Path(path) }
    }

    #[inline]
    pub fn pathless(commodity: CommodityId, next_link: LinkId) -> Self {
        Self { commodity, target: Target::NextLink(next_link) }
    }

    #[inline]
    pub fn exiting(commodity: CommodityId) -> Self {
        Self { commodity, target: Target::Exit }
    }

    #[inline]
    pub fn is_pathful(self) -> bool {
        matches!(self.target, Target::Path(_))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target {
            Target::Path(p)     => write!(f, "({}, {})", self.commodity.0, p),
            Target::NextLink(l) => write!(f, "({}, ->{})", self.commodity.0, l),
            Target::Exit        => write!(f, "({}, exit)", self.commodity.0),
        }
    }
}
