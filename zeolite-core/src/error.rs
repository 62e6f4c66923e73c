use cid::Cid;

/// Shared error taxonomy for the router and its collaborators.
///
/// Backends return this type directly, so backend failures pass through the
/// router without translation. `NotFound` (failed read) and `BlockNotFound`
/// (failed delete precondition) are distinct so callers can tell them apart.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("block not found: {0}")]
    NotFound(Cid),
    #[error("cannot delete missing block: {0}")]
    BlockNotFound(Cid),
    #[error("operation cancelled")]
    Cancelled,
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl BlockError {
    /// Wraps an opaque store or exchange failure for passthrough.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        BlockError::Backend(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, BlockError>;
