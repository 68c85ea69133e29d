//! A metric exporter that keeps collected batches in memory, for tests and
//! debugging.

use crate::error::{SdkError, SdkResult};
use crate::metrics::{MetricExporter, ResourceMetrics};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Stores exported metric batches in memory; cheap clones share the same
/// storage.
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetricExporter {
    metrics: Arc<Mutex<Vec<ResourceMetrics>>>,
}

impl InMemoryMetricExporter {
    /// Returns a copy of the batches exported so far, one entry per
    /// collection pass.
    pub fn get_finished_metrics(&self) -> Result<Vec<ResourceMetrics>, SdkError> {
        let metrics = self.metrics.lock().map(|metrics| metrics.clone())?;
        Ok(metrics)
    }

    /// Clears the stored batches.
    pub fn reset(&self) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.clear();
        }
    }
}

#[async_trait]
impl MetricExporter for InMemoryMetricExporter {
    async fn export(&self, metrics: &ResourceMetrics) -> SdkResult {
        self.metrics
            .lock()
            .map(|mut stored| stored.push(metrics.clone()))
            .map_err(SdkError::from)
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
        Ok(())
    }
}
