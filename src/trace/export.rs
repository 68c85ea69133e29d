//! The contract between span processors and span exporters.

use crate::error::SdkError;
use crate::trace::SpanData;
use futures_util::future::BoxFuture;
use std::fmt;

/// Result of an export attempt.
pub type ExportResult = Result<(), SdkError>;

/// `SpanExporter` turns batches of finished spans into some wire format and
/// delivers them.
///
/// Exporters receive batches from one processor thread at a time and never
/// see the same span twice. Any retry logic that is required by the exporter
/// is the responsibility of the exporter: a returned error means the batch is
/// discarded.
pub trait SpanExporter: Send + Sync + fmt::Debug {
    /// Export the given batch.
    ///
    /// Called with non-empty batches only. The processor awaits the returned
    /// future under its configured export timeout; on overrun the batch is
    /// treated as failed and the future is dropped, which cannot abort an
    /// in-flight network call the exporter already handed off.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult>;

    /// Release resources held by the exporter. No `export` calls follow.
    fn shutdown(&mut self) {}
}
