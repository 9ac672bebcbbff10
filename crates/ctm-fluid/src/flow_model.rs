//! The `FlowModel` trait: what the event loop needs from a traffic model.

use ctm_core::{CommodityId, LaneGroupId, LinkId, PathId};
use ctm_network::Network;

use crate::{FluidNetworkModel, FluidResult, LaneGroupOverride, OverrideOutcome};

/// A time-stepped traffic model driven by the simulation event loop.
///
/// Each step the loop calls [`update_flow`][Self::update_flow] and then
/// [`update_state`][Self::update_state], at the same timestamp, then
/// schedules the next step [`step_secs`][Self::step_secs] later.  Control
/// commands reach the model through the remaining methods between steps.
///
/// # Example
///
/// ```rust,ignore
/// let mut model = FluidNetworkModel::configure(net, FluidParams::default(), 7)?;
/// model.set_source_demand(onramp, cars, None, 0.5)?;
/// for _ in 0..100 {
///     model.update_flow()?;
///     model.update_state()?;
/// }
/// ```
pub trait FlowModel {
    fn network(&self) -> &Network;

    /// Seconds between consecutive steps.
    fn step_secs(&self) -> f64;

    /// Compute and exchange this step's flows.
    fn update_flow(&mut self) -> FluidResult<()>;

    /// Advance cell contents by the flows of the preceding
    /// [`update_flow`][Self::update_flow].
    fn update_state(&mut self) -> FluidResult<()>;

    fn apply_override(&mut self, lane_group: LaneGroupId, cmd: LaneGroupOverride) -> FluidResult<OverrideOutcome>;

    fn set_source_demand(
        &mut self,
        link:      LinkId,
        commodity: CommodityId,
        path:      Option<PathId>,
        rate_vps:  f64,
    ) -> FluidResult<()>;

    fn set_splits(&mut self, link: LinkId, commodity: CommodityId, splits: &[(LinkId, f64)]) -> FluidResult<()>;

    /// Vehicles currently held by the model.
    fn total_vehicles(&self) -> f64;
}

impl FlowModel for FluidNetworkModel {
    fn network(&self) -> &Network {
        FluidNetworkModel::network(self)
    }

    fn step_secs(&self) -> f64 {
        self.params().step_secs
    }

    fn update_flow(&mut self) -> FluidResult<()> {
        FluidNetworkModel::update_flow(self)
    }

    fn update_state(&mut self) -> FluidResult<()> {
        FluidNetworkModel::update_state(self)
    }

    fn apply_override(&mut self, lane_group: LaneGroupId, cmd: LaneGroupOverride) -> FluidResult<OverrideOutcome> {
        FluidNetworkModel::apply_override(self, lane_group, cmd)
    }

    fn set_source_demand(
        &mut self,
        link:      LinkId,
        commodity: CommodityId,
        path:      Option<PathId>,
        rate_vps:  f64,
    ) -> FluidResult<()> {
        FluidNetworkModel::set_source_demand(self, link, commodity, path, rate_vps)
    }

    fn set_splits(&mut self, link: LinkId, commodity: CommodityId, splits: &[(LinkId, f64)]) -> FluidResult<()> {
        FluidNetworkModel::set_splits(self, link, commodity, splits)
    }

    fn total_vehicles(&self) -> f64 {
        FluidNetworkModel::total_vehicles(self)
    }
}
