//! Network-subsystem error type.

use thiserror::Error;

use ctm_core::{CommodityId, ErrorLog, LaneGroupId, LinkId, PathId};

/// Errors produced by `ctm-network`.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("invalid network:\n{0}")]
    Validation(ErrorLog),

    #[error("link {0} not found in network")]
    LinkNotFound(LinkId),

    #[error("lane group {0} not found in network")]
    LaneGroupNotFound(LaneGroupId),

    #[error("commodity {0} not found in network")]
    CommodityNotFound(CommodityId),

    #[error("path {0} not found in network")]
    PathNotFound(PathId),
}

pub type NetworkResult<T> = Result<T, NetworkError>;
