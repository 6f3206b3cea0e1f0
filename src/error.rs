use cache_side_channel::AllocationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeltdownError {
    #[error("failed to allocate memory for side channel: {0}")]
    Allocation(#[from] AllocationError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unsupported processor: {0}")]
    Unsupported(&'static str),
    #[error("failed to install fault boundary: {0}")]
    FaultBoundary(nix::Error),
    #[error("failed to pin to a core: {0}")]
    Affinity(nix::Error),
    #[error("failed to write result: {0}")]
    Output(#[from] std::io::Error),
}

impl MeltdownError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            MeltdownError::Allocation(_) => 1,
            _ => 2,
        }
    }
}
