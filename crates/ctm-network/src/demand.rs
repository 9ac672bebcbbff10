//! Commodities and paths.

use ctm_core::{CommodityId, LinkId, PathId};

/// A class of vehicles that is tracked separately through the network.
///
/// Pathful commodities follow one of their `paths`; pathless commodities
/// are routed link by link with split ratios.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Commodity {
    pub id:      CommodityId,
    pub name:    String,
    pub pathful: bool,
    pub paths:   Vec<PathId>,
}

/// An ordered, contiguous sequence of links.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Path {
    pub id:        PathId,
    pub commodity: CommodityId,
    pub links:     Vec<LinkId>,
}

impl Path {
    /// The link following `link` on this path, or `None` if `link` is the
    /// last one (or not on the path).
    pub fn next_after(&self, link: LinkId) -> Option<LinkId> {
        let pos = self.links.iter().position(|&l| l == link)?;
        self.links.get(pos + 1).copied()
    }

    pub fn contains(&self, link: LinkId) -> bool {
        self.links.contains(&link)
    }

    pub fn first(&self) -> Option<LinkId> {
        self.links.first().copied()
    }
}
