//! Error types for the asset store.

use thiserror::Error;

use super::types::{AssetId, AssetStatus};

/// Errors returned by asset store mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No record with this id (never existed or was removed).
    #[error("Asset not found: {0}")]
    NotFound(AssetId),

    /// The requested change is not allowed from the record's current status.
    #[error("Cannot {operation} asset {id}: current status is {current}")]
    InvalidTransition {
        id: AssetId,
        current: AssetStatus,
        operation: &'static str,
    },
}

impl StoreError {
    /// Whether this error means the record is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
