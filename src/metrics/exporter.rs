//! The contract between the metrics reader and metric exporters.

use crate::error::SdkResult;
use crate::metrics::ResourceMetrics;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Exporter handling the delivery of metric data.
///
/// The reader calls `export` from a single thread, so calls never overlap.
/// Retrying a failed export is the exporter's own business; the reader only
/// logs the failure and carries on with the next interval.
#[async_trait]
pub trait MetricExporter: Send + Sync + fmt::Debug {
    /// Export the given batch of cumulative metric points.
    ///
    /// The reader awaits this under its configured export timeout.
    async fn export(&self, metrics: &ResourceMetrics) -> SdkResult;

    /// Flush anything the exporter buffers itself.
    fn force_flush(&self) -> SdkResult {
        Ok(())
    }

    /// Release resources held by the exporter. No `export` calls follow.
    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult;

    /// Shutdown with a 5 second default timeout.
    fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(Duration::from_secs(5))
    }
}
