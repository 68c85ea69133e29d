//! A span exporter that keeps finished spans in memory, for tests and
//! debugging.

use crate::error::SdkError;
use crate::trace::{ExportResult, SpanData, SpanExporter};
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};

/// Stores finished spans in memory; cheap clones share the same storage.
///
/// ```
/// use otelkit::trace::InMemorySpanExporter;
///
/// let exporter = InMemorySpanExporter::default();
/// // hand a clone to the processor, keep one to inspect
/// let for_processor = exporter.clone();
/// assert!(exporter.get_finished_spans().unwrap().is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl InMemorySpanExporter {
    /// Returns a copy of the finished spans exported so far, in export order.
    pub fn get_finished_spans(&self) -> Result<Vec<SpanData>, SdkError> {
        let spans = self.spans.lock().map(|spans| spans.clone())?;
        Ok(spans)
    }

    /// Clears the stored spans.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear();
        }
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = self
            .spans
            .lock()
            .map(|mut spans| spans.extend(batch))
            .map_err(SdkError::from);
        Box::pin(std::future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SimpleSpanProcessor, SpanProcessor};
    use crate::trace::{SpanContext, SpanId, SpanKind, Status, TraceFlags, TraceId, TraceState};
    use crate::{InstrumentationScope, Resource};
    use std::time::SystemTime;

    #[test]
    fn spans_survive_processor_shutdown() {
        let exporter = InMemorySpanExporter::default();
        let processor = SimpleSpanProcessor::new(exporter.clone());

        let now = SystemTime::now();
        processor.on_end(SpanData {
            span_context: SpanContext::new(
                TraceId::from(1u128),
                SpanId::from(1u64),
                TraceFlags::SAMPLED,
                false,
                TraceState::default(),
            ),
            parent_span_id: SpanId::INVALID,
            span_kind: SpanKind::Internal,
            name: "kept".into(),
            start_time: now,
            end_time: now,
            attributes: Vec::new(),
            events: Vec::new(),
            status: Status::Unset,
            resource: Resource::empty(),
            instrumentation_scope: InstrumentationScope::default(),
        });
        processor.shutdown().expect("shutdown should succeed");

        // Shutting the pipeline down must not erase what was captured.
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);

        exporter.reset();
        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }
}
