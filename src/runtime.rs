//! Coordinated lifecycle for the telemetry pipelines of a process.
//!
//! Applications usually run a tracer and a metrics reader side by side and
//! want one place to flush and stop both at exit. [`TelemetryPipeline`]
//! holds every component and tears them all down even when one of them
//! fails.

use crate::error::{SdkError, SdkResult};
use crate::metrics::PeriodicReader;
use crate::trace::Tracer;
use std::fmt;

/// A telemetry component with a flush-and-stop lifecycle.
pub trait PipelineComponent: Send + Sync + fmt::Debug {
    /// Export everything buffered so far.
    fn force_flush(&self) -> SdkResult;

    /// Flush remaining data and release resources.
    fn shutdown(&self) -> SdkResult;
}

impl PipelineComponent for Tracer {
    fn force_flush(&self) -> SdkResult {
        Tracer::force_flush(self)
    }

    fn shutdown(&self) -> SdkResult {
        Tracer::shutdown(self)
    }
}

impl PipelineComponent for PeriodicReader {
    fn force_flush(&self) -> SdkResult {
        PeriodicReader::force_flush(self)
    }

    fn shutdown(&self) -> SdkResult {
        PeriodicReader::shutdown(self)
    }
}

/// Owns the telemetry components of a process and shuts them down together.
///
/// Every operation visits all components even when an earlier one fails; the
/// first error is returned after the rest have run.
#[derive(Debug, Default)]
pub struct TelemetryPipeline {
    components: Vec<Box<dyn PipelineComponent>>,
}

impl TelemetryPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        TelemetryPipeline::default()
    }

    /// Add a component. Components are shut down in the order they were
    /// registered.
    pub fn with_component(mut self, component: impl PipelineComponent + 'static) -> Self {
        self.components.push(Box::new(component));
        self
    }

    /// Flush every component.
    pub fn force_flush(&self) -> SdkResult {
        self.visit_all(|component| component.force_flush())
    }

    /// Shut every component down. Components already shut down individually
    /// are skipped rather than treated as failures.
    pub fn shutdown(&self) -> SdkResult {
        self.visit_all(|component| match component.shutdown() {
            Err(SdkError::AlreadyShutdown) => Ok(()),
            result => result,
        })
    }

    fn visit_all(&self, operation: impl Fn(&dyn PipelineComponent) -> SdkResult) -> SdkResult {
        let mut result = Ok(());
        for component in &self.components {
            if let Err(err) = operation(component.as_ref()) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}
