//! Strongly typed, zero-cost identifier wrappers.
//!
//! All IDs are `Copy + Ord + Hash` so they can be used as map keys and sorted
//! collection elements without ceremony.  Registries (links, lane groups,
//! road connections) are plain `Vec`s indexed by these IDs; cross references
//! between network elements are stored as IDs rather than live references.

use std::fmt;

/// Generate a typed ID wrapper around a primitive integer.
macro_rules! typed_id {
    ($(#[$attr:meta])* $vis:vis struct $name:ident($inner:ty);) => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        $vis struct $name(pub $inner);

        impl $name {
            /// Cast to `usize` for direct use as a `Vec` index.
            #[inline(always)]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

typed_id! {
    /// Index of a network node (junction, origin, or destination).
    pub struct NodeId(u32);
}

typed_id! {
    /// Index of a directed link.
    pub struct LinkId(u32);
}

typed_id! {
    /// Index of a lane group.  Unique across the whole network, not per link.
    pub struct LaneGroupId(u32);
}

typed_id! {
    /// Index of a road connection (lane-level turning movement at a node).
    pub struct RoadConnectionId(u32);
}

typed_id! {
    /// Index of a commodity (vehicle type / routing class).
    pub struct CommodityId(u32);
}

typed_id! {
    /// Index of a path (ordered link sequence) used by pathful commodities.
    pub struct PathId(u32);
}

typed_id! {
    /// Index of a controller registered with the simulation.
    pub struct ControllerId(u32);
}
