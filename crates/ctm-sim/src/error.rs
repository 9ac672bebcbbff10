use thiserror::Error;

use ctm_core::{ControllerId, ErrorLog};
use ctm_fluid::FluidError;
use ctm_network::NetworkError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid simulation setup:\n{0}")]
    Validation(ErrorLog),

    #[error(transparent)]
    Fluid(#[from] FluidError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("poke for unregistered {0}")]
    UnknownController(ControllerId),

    #[error("the simulation has already run")]
    AlreadyRan,
}

pub type SimResult<T> = Result<T, SimError>;
