use crate::delivery::DeliveryError;
use crate::store::StoreError;

/// Result type for chat core operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors surfaced by the registry, log, counter and orchestration layers
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Lookup of a connection that is not registered
    #[error("connection not found: {0}")]
    NotFound(String),

    /// The backing store failed; fatal to the current unit of work
    #[error("storage unavailable: {0}")]
    StorageUnavailable(StoreError),

    /// The store answered, but an item did not have the expected layout
    #[error("corrupt data: {0}")]
    Corrupt(StoreError),

    /// A direct (non-broadcast) send failed
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(_) => Self::StorageUnavailable(e),
            StoreError::Malformed { .. } => Self::Corrupt(e),
        }
    }
}
