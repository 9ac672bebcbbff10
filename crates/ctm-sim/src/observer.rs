//! Simulation observer trait for progress reporting and data collection.

use ctm_core::SimTime;

/// Callbacks invoked by [`Sim::run`][crate::Sim::run].
///
/// All methods have default no-op implementations so implementors only need
/// to override what they care about.  The model is passed read-only; lane
/// group accumulators requested with `subscribe` before the run are read
/// through it.
///
/// # Example — occupancy printer
///
/// ```rust,ignore
/// struct Occupancy { every: u64, steps: u64 }
///
/// impl SimObserver<FluidNetworkModel> for Occupancy {
///     fn on_step_end(&mut self, now: SimTime, model: &FluidNetworkModel) {
///         self.steps += 1;
///         if self.steps % self.every == 0 {
///             println!("{now}: {:.1} vehicles", model.total_vehicles());
///         }
///     }
/// }
/// ```
pub trait SimObserver<M> {
    /// Called once after initial events are scheduled, before the first one
    /// is dispatched.
    fn on_start(&mut self, _now: SimTime, _model: &M) {}

    /// Called after every state update, i.e. once per completed step.
    fn on_step_end(&mut self, _now: SimTime, _model: &M) {}

    /// Called once when the run ends without error.
    fn on_sim_end(&mut self, _now: SimTime, _model: &M) {}
}

/// A [`SimObserver`] that does nothing.
pub struct NoopObserver;

impl<M> SimObserver<M> for NoopObserver {}
