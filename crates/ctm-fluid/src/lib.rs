//! `ctm-fluid` — cell transmission model over a `ctm-network` topology.
//!
//! # Crate layout
//!
//! | Module          | Contents                                                       |
//! |-----------------|----------------------------------------------------------------|
//! | [`model`]       | `FluidNetworkModel` — configuration and the per-step update    |
//! | [`flow_model`]  | `FlowModel` trait driven by the event loop                     |
//! | [`lane_group`]  | `FluidLaneGroup`, `LaneGroupOverride`, `OverrideOutcome`       |
//! | [`cell`]        | `Cell`, `Bucket`, `StateMap`                                   |
//! | [`fd`]          | `FundamentalDiagram`, `Discretization`                         |
//! | [`node_model`]  | `NodeModel`, `ration` — junction flow allocation               |
//! | [`lane_change`] | `perform_lane_changes`, `LaneChangeSplit`, `Maneuvers`         |
//! | [`source`]      | `SourceDemand`                                                 |
//! | [`accumulator`] | `FlowAccumulator`, `TravelTimer`, `AccumulatorRequest`         |
//! | [`params`]      | `FluidParams`, `MergeRule`, `DemandProcess`                    |
//! | [`error`]       | `FluidError`, `FluidResult<T>`                                 |
//!
//! # One step
//!
//! ```text
//! update_flow:
//!   for each link:   cell supplies → lane changes → cell demands
//!   for each node:   node model (demand per connection, rationed by supply)
//!   sources inject, sinks release, nodes move flow between links
//! update_state:
//!   cell-to-cell transport, travel-time sample, drain entry buffers
//! ```
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                         |
//! |---------|----------------------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on parameters and requests.  |

pub mod accumulator;
pub mod cell;
pub mod error;
pub mod fd;
pub mod flow_model;
pub mod lane_change;
pub mod lane_group;
pub mod model;
pub mod node_model;
pub mod params;
pub mod source;


pub use accumulator::{AccumulatorRequest, FlowAccumulator, TravelTimer};
pub use cell::{Bucket, Cell, StateMap};
pub use error::{FluidError, FluidResult};
pub use fd::{Discretization, FundamentalDiagram};
pub use flow_model::FlowModel;
pub use lane_change::{LaneChangeSplit, Maneuvers, perform_lane_changes};
pub use lane_group::{FluidLaneGroup, LaneGroupOverride, OverrideOutcome};
pub use model::{FluidNetworkModel, cell_count};
pub use node_model::{ConnectionFlow, LaneGroupAccess, NodeModel, ration};
pub use params::{DemandProcess, FluidParams, MergeRule};
pub use source::SourceDemand;
