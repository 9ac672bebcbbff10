//! `ctm-core` — foundational types for the `ctm` fluid traffic simulator.
//!
//! This crate is a dependency of every other `ctm-*` crate.  It intentionally
//! has no `ctm-*` dependencies and minimal external ones (only `rand`, plus
//! optional `serde`).
//!
//! # What lives here
//!
//! | Module          | Contents                                                   |
//! |-----------------|------------------------------------------------------------|
//! | [`ids`]         | `NodeId`, `LinkId`, `LaneGroupId`, `RoadConnectionId`, …   |
//! | [`time`]        | `SimTime`, `SimConfig`                                     |
//! | [`state`]       | `State`, `Target` — conserved flow classes                 |
//! | [`rng`]         | `SimRng` (seeded, for plugged-in stochastic processes)     |
//! | [`error`]       | `ErrorLog`, `Issue`, `Severity`                            |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.        |

pub mod error;
pub mod ids;
pub mod rng;
pub mod state;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use error::{ErrorLog, Issue, Severity};
pub use ids::{CommodityId, ControllerId, LaneGroupId, LinkId, NodeId, PathId, RoadConnectionId};
pub use rng::SimRng;
pub use state::{State, Target};
pub use time::{SimConfig, SimTime};

/// Numerical tolerance used for "effectively zero" vehicle amounts.
pub const EPSILON: f64 = 1e-9;
