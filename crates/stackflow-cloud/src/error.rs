//! Reconciliation error types

use stackflow_core::StackError;
use thiserror::Error;

/// Errors that abort a run before or around provisioning.
///
/// Per-resource provider failures never surface here; they are recorded in
/// the [`RunReport`](crate::report::RunReport) instead.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    Stack(#[from] StackError),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Template, reference and cycle errors; nothing was provisioned.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, CloudError::Stack(e) if e.is_validation_error())
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
