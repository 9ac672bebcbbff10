//! Fluid-model error type.

use thiserror::Error;

use ctm_core::{CommodityId, ErrorLog, LaneGroupId, LinkId, State};
use ctm_network::NetworkError;

/// Errors produced by `ctm-fluid`.
///
/// `Validation` carries every configuration problem found in one pass.
/// `JamDensityExceeded`, `NegativeSupply` and `Unroutable` are runtime
/// invariant violations and end the run.
#[derive(Debug, Error)]
pub enum FluidError {
    #[error("invalid fluid model configuration:\n{0}")]
    Validation(ErrorLog),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("{lane_group} cell {cell}: {vehicles:.4} vehicles exceed jam density {jam_density:.4}")]
    JamDensityExceeded {
        lane_group:  LaneGroupId,
        cell:        usize,
        vehicles:    f64,
        jam_density: f64,
    },

    #[error("{lane_group} cell {cell}: negative supply {supply:.6}")]
    NegativeSupply {
        lane_group: LaneGroupId,
        cell:       usize,
        supply:     f64,
    },

    #[error("{link}: no downstream target for {state} entering the link")]
    Unroutable { link: LinkId, state: State },

    #[error("{lane_group}: invalid road parameters: {reason}")]
    InvalidParameters { lane_group: LaneGroupId, reason: String },

    #[error("{0} is not a source link")]
    NotASource(LinkId),

    #[error("source on {link} for {commodity}: {reason}")]
    InvalidSource {
        link:      LinkId,
        commodity: CommodityId,
        reason:    String,
    },

    #[error("accumulators must be subscribed before the run starts")]
    SubscriptionClosed,
}

pub type FluidResult<T> = Result<T, FluidError>;
