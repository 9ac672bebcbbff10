//! `ctm-sim` — event-driven run loop for the ctm traffic simulator.
//!
//! # Event loop
//!
//! ```text
//! run():
//!   schedule FluidFlowUpdate, FluidStateUpdate at start + dt
//!   schedule first ControllerPoke of every controller
//!   schedule StopSimulation at end
//!   dispatch until stopped:
//!     FluidFlowUpdate   → model.update_flow();  re-schedule at +dt
//!     FluidStateUpdate  → model.update_state(); observer; re-schedule at +dt
//!     ControllerPoke    → commands scheduled now, next poke scheduled
//!     Override*/Reset   → model.apply_override (rejections logged)
//!     SetSourceDemand / SetSplits → model
//!     StopSimulation    → raise the stop flag
//! ```
//!
//! Same-instant events run in priority order: demand changes, flow update,
//! state update, controllers, actuators, stop.  An actuator command therefore
//! affects the model from the next flow update on.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                     |
//! |--------------|--------------------------------------------------------------|
//! | [`sim`]      | `Sim`, `RunStats`                                            |
//! | [`builder`]  | `SimBuilder`                                                 |
//! | [`control`]  | `Controller`, `ControlOutput`, `CapacityActuator`, `FixedRateController`, `ScheduleController` |
//! | [`observer`] | `SimObserver`, `NoopObserver`                                |
//! | [`error`]    | `SimError`, `SimResult<T>`                                   |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use ctm_core::SimConfig;
//! use ctm_fluid::{FluidNetworkModel, FluidParams};
//! use ctm_sim::{NoopObserver, SimBuilder};
//!
//! let mut model = FluidNetworkModel::configure(net, FluidParams::default(), config.seed)?;
//! model.set_source_demand(src, car, None, 0.5)?;
//! let mut sim = SimBuilder::new(config, model).build()?;
//! sim.run(&mut NoopObserver)?;
//! ```
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                       |
//! |---------|--------------------------------------------------------------|
//! | `serde` | Derives `Serialize`/`Deserialize` on `ScheduleEntry`, `RunStats`. |

pub mod builder;
pub mod control;
pub mod error;
pub mod observer;
pub mod sim;

#[cfg(test)]
mod tests;

pub use builder::SimBuilder;
pub use control::{CapacityActuator, ControlOutput, Controller, FixedRateController, ScheduleController, ScheduleEntry};
pub use error::{SimError, SimResult};
pub use observer::{NoopObserver, SimObserver};
pub use sim::{RunStats, Sim};
