//! Errors shared by the span and metric export pipelines.
//!
//! These errors stay inside the telemetry pipeline: nothing here is ever
//! surfaced to application code recording spans or metrics. They are returned
//! by lifecycle operations (`force_flush`, `shutdown`) and by exporters so
//! that the pipeline can log and count failures.

use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// Result of a pipeline lifecycle or export operation.
pub type SdkResult = Result<(), SdkError>;

/// Errors returned by processors, readers, and exporters.
#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum SdkError {
    /// The operation was called on an already shut down component.
    #[error("shutdown already invoked")]
    AlreadyShutdown,

    /// The operation did not complete within its deadline. The batch in
    /// flight is discarded; the component itself keeps running.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Any other failure, carried as text since it only feeds diagnostics.
    #[error("operation failed: {0}")]
    InternalFailure(String),
}

impl<T> From<PoisonError<T>> for SdkError {
    fn from(err: PoisonError<T>) -> Self {
        SdkError::InternalFailure(format!("lock poisoned: {err}"))
    }
}
