//! `ctm-network` — static road topology for the fluid traffic kernel.
//!
//! # Crate layout
//!
//! | Module      | Contents                                                     |
//! |-------------|--------------------------------------------------------------|
//! | [`network`] | `Network`, `Node`, `Link`, `LaneGroupSpec`, `RoadConnection`, `NetworkBuilder` |
//! | [`demand`]  | `Commodity`, `Path`                                          |
//! | [`params`]  | `RoadParams` — macroscopic per-lane fundamental diagram      |
//! | [`error`]   | `NetworkError`, `NetworkResult<T>`                           |
//!
//! # Topology conventions
//!
//! - Lane groups of a link are ordered from the inner (median) side to the
//!   outer (shoulder) side; adjacent entries are lateral neighbours.
//! - A link is a *source* if its start node has no inbound links and a
//!   *sink* if its end node has no outbound links.
//! - A road connection joins a set of lane groups on one link to a set of
//!   lane groups on a link leaving the same node.
//!
//! All cross references are IDs into the registries held by [`Network`];
//! nothing holds a live reference to another element.
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                       |
//! |---------|--------------------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on public types.           |

pub mod demand;
pub mod error;
pub mod network;
pub mod params;

#[cfg(test)]
mod tests;

pub use demand::{Commodity, Path};
pub use error::{NetworkError, NetworkResult};
pub use network::{LaneGroupSpec, Link, Network, NetworkBuilder, Node, RoadConnection};
pub use params::RoadParams;
