//! The tracer: creates spans, applies sampling, and fans finished spans out
//! to the configured processors.
//!
//! A `Tracer` owns its whole pipeline: id generator, sampler, propagator,
//! processors, and resource are all supplied at build time, so everything a
//! span touches is reachable from the tracer that created it. Clones share
//! the same pipeline.

use crate::error::{SdkError, SdkResult};
use crate::otel_debug;
use crate::propagation::{Extractor, Injector, TextMapPropagator, TraceContextPropagator};
use crate::trace::{
    IdGenerator, RandomIdGenerator, Sampler, SamplingDecision, ShouldSample, Span, SpanContext,
    SpanData, SpanId, SpanKind, SpanProcessor, Status, TraceFlags,
};
use crate::{InstrumentationScope, KeyValue, Resource};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// Creates and ends spans. Cheap to clone; clones share the pipeline.
#[derive(Clone, Debug)]
pub struct Tracer {
    scope: InstrumentationScope,
    inner: Arc<TracerInner>,
}

#[derive(Debug)]
struct TracerInner {
    sampler: Box<dyn ShouldSample>,
    id_generator: Box<dyn IdGenerator>,
    propagator: Box<dyn TextMapPropagator>,
    processors: Vec<Box<dyn SpanProcessor>>,
    resource: Resource,
    is_shutdown: AtomicBool,
}

impl Tracer {
    /// Start building a tracer.
    pub fn builder(scope_name: impl Into<Cow<'static, str>>) -> TracerBuilder {
        TracerBuilder {
            scope: InstrumentationScope::builder(scope_name).build(),
            sampler: Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn))),
            id_generator: Box::new(RandomIdGenerator::default()),
            propagator: Box::new(TraceContextPropagator::new()),
            processors: Vec::new(),
            resource: Resource::empty(),
        }
    }

    /// Start building a root span with the given name.
    pub fn span_builder(&self, name: impl Into<Cow<'static, str>>) -> SpanBuilder {
        SpanBuilder::from_name(name)
    }

    /// Start a root span with default options.
    pub fn start(&self, name: impl Into<Cow<'static, str>>) -> Span {
        self.span_builder(name).start(self)
    }

    /// Start a child span of the given parent with default options.
    pub fn start_with_parent(&self, name: impl Into<Cow<'static, str>>, parent: &SpanContext) -> Span {
        self.span_builder(name).start_with_parent(self, parent)
    }

    /// The resource all spans from this tracer carry.
    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    /// Write the given span context into an outgoing carrier using the
    /// tracer's propagator.
    pub fn inject_context(&self, span_context: &SpanContext, injector: &mut dyn Injector) {
        self.inner.propagator.inject(span_context, injector);
    }

    /// Read a remote span context from an incoming carrier using the
    /// tracer's propagator. `None` when the carrier has no valid context.
    pub fn extract_context(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        self.inner.propagator.extract(extractor)
    }

    /// Export all finished spans buffered in the processors.
    pub fn force_flush(&self) -> SdkResult {
        let mut result = Ok(());
        for processor in &self.inner.processors {
            if let Err(err) = processor.force_flush() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    /// Flush and shut down every processor. Spans ending afterwards are
    /// dropped by the processors; spans started afterwards do not record.
    pub fn shutdown(&self) -> SdkResult {
        if self.inner.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
        otel_debug!(name: "Tracer.ShutdownInvoked");

        let mut result = Ok(());
        for processor in &self.inner.processors {
            if let Err(err) = processor.shutdown() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    fn build_span(&self, builder: SpanBuilder, parent: Option<&SpanContext>) -> Span {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Span::new(SpanContext::empty_context(), None, self.clone());
        }

        let parent = parent.filter(|ctx| ctx.is_valid());
        let trace_id = match parent {
            Some(ctx) => ctx.trace_id(),
            None => self.inner.id_generator.new_trace_id(),
        };
        let span_id = self.inner.id_generator.new_span_id();

        let sampling = self.inner.sampler.should_sample(
            parent,
            trace_id,
            &builder.name,
            &builder.span_kind,
            &builder.attributes,
        );
        let sampled = sampling.decision == SamplingDecision::RecordAndSample;
        let span_context = SpanContext::new(
            trace_id,
            span_id,
            TraceFlags::default().with_sampled(sampled),
            false,
            sampling.trace_state,
        );

        if sampling.decision == SamplingDecision::Drop {
            return Span::new(span_context, None, self.clone());
        }

        let start_time = builder.start_time.unwrap_or_else(SystemTime::now);
        let mut attributes = builder.attributes;
        attributes.extend(sampling.attributes);
        let data = SpanData {
            span_context: span_context.clone(),
            parent_span_id: parent.map(SpanContext::span_id).unwrap_or(SpanId::INVALID),
            span_kind: builder.span_kind,
            name: builder.name,
            start_time,
            end_time: start_time,
            attributes,
            events: Vec::new(),
            status: Status::Unset,
            resource: self.inner.resource.clone(),
            instrumentation_scope: self.scope.clone(),
        };

        Span::new(span_context, Some(data), self.clone())
    }

    pub(crate) fn on_span_end(&self, data: SpanData) {
        for processor in &self.inner.processors {
            processor.on_end(data.clone());
        }
    }
}

/// Configuration for building a [`Tracer`].
#[derive(Debug)]
pub struct TracerBuilder {
    scope: InstrumentationScope,
    sampler: Box<dyn ShouldSample>,
    id_generator: Box<dyn IdGenerator>,
    propagator: Box<dyn TextMapPropagator>,
    processors: Vec<Box<dyn SpanProcessor>>,
    resource: Resource,
}

impl TracerBuilder {
    /// Use the given instrumentation scope instead of a name-only one.
    pub fn with_scope(mut self, scope: InstrumentationScope) -> Self {
        self.scope = scope;
        self
    }

    /// The sampler deciding which spans record and export. Defaults to
    /// parent-based always-on.
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// The id generator for new trace and span ids. Defaults to the random
    /// generator.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// The propagator used by `inject_context` and `extract_context`.
    /// Defaults to W3C trace context.
    pub fn with_propagator<P: TextMapPropagator + 'static>(mut self, propagator: P) -> Self {
        self.propagator = Box::new(propagator);
        self
    }

    /// Add a span processor. Finished spans visit processors in the order
    /// they were added.
    pub fn with_span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// The resource describing the process, attached to every span.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = resource;
        self
    }

    /// Build the tracer.
    pub fn build(self) -> Tracer {
        Tracer {
            scope: self.scope,
            inner: Arc::new(TracerInner {
                sampler: self.sampler,
                id_generator: self.id_generator,
                propagator: self.propagator,
                processors: self.processors,
                resource: self.resource,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}

/// Options for a span before it starts.
#[derive(Debug)]
pub struct SpanBuilder {
    name: Cow<'static, str>,
    span_kind: SpanKind,
    attributes: Vec<KeyValue>,
    start_time: Option<SystemTime>,
}

impl SpanBuilder {
    fn from_name(name: impl Into<Cow<'static, str>>) -> Self {
        SpanBuilder {
            name: name.into(),
            span_kind: SpanKind::Internal,
            attributes: Vec::new(),
            start_time: None,
        }
    }

    /// Set the span kind. Defaults to [`SpanKind::Internal`].
    pub fn with_kind(mut self, span_kind: SpanKind) -> Self {
        self.span_kind = span_kind;
        self
    }

    /// Attributes known at creation time. Visible to the sampler.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, attributes: T) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }

    /// Explicit start time instead of now.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Start a root span.
    pub fn start(self, tracer: &Tracer) -> Span {
        tracer.build_span(self, None)
    }

    /// Start a span as a child of the given parent context, typically one
    /// extracted from an incoming request.
    pub fn start_with_parent(self, tracer: &Tracer, parent: &SpanContext) -> Span {
        tracer.build_span(self, Some(parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{
        BatchConfigBuilder, BatchSpanProcessor, InMemorySpanExporter, SimpleSpanProcessor, TraceId,
    };
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    /// Deterministic generator so tests can predict ids.
    #[derive(Debug, Default)]
    struct SequentialIdGenerator {
        next: AtomicU64,
    }

    impl IdGenerator for SequentialIdGenerator {
        fn new_trace_id(&self) -> TraceId {
            TraceId::from(u128::from(self.next.fetch_add(1, Ordering::Relaxed)) + 1)
        }

        fn new_span_id(&self) -> SpanId {
            SpanId::from(self.next.fetch_add(1, Ordering::Relaxed) + 1)
        }
    }

    fn test_tracer(exporter: InMemorySpanExporter) -> Tracer {
        Tracer::builder("test")
            .with_span_processor(SimpleSpanProcessor::new(exporter))
            .build()
    }

    #[test]
    fn span_records_and_exports_on_end() {
        let exporter = InMemorySpanExporter::default();
        let tracer = test_tracer(exporter.clone());

        let mut span = tracer
            .span_builder("operation")
            .with_kind(SpanKind::Server)
            .with_attributes(vec![KeyValue::new("initial", true)])
            .start(&tracer);
        assert!(span.is_recording());
        span.set_attribute(KeyValue::new("later", 1_i64));
        span.add_event("something happened", vec![]);
        span.set_status(Status::Ok);
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "operation");
        assert_eq!(span.span_kind, SpanKind::Server);
        assert_eq!(span.attributes.len(), 2);
        assert_eq!(span.events.len(), 1);
        assert_eq!(span.status, Status::Ok);
        assert_eq!(span.parent_span_id, SpanId::INVALID);
        assert_eq!(span.instrumentation_scope.name(), "test");
    }

    #[test]
    fn attribute_last_write_wins() {
        let exporter = InMemorySpanExporter::default();
        let tracer = test_tracer(exporter.clone());

        let mut span = tracer.start("attrs");
        span.set_attribute(KeyValue::new("retries", 1_i64));
        span.set_attribute(KeyValue::new("retries", 2_i64));
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].attributes, vec![KeyValue::new("retries", 2_i64)]);
    }

    #[test]
    fn end_is_idempotent() {
        let exporter = InMemorySpanExporter::default();
        let tracer = test_tracer(exporter.clone());

        let mut span = tracer.start("once");
        span.end();
        span.end();
        drop(span);

        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn drop_ends_span() {
        let exporter = InMemorySpanExporter::default();
        let tracer = test_tracer(exporter.clone());

        {
            let _span = tracer.start("scoped");
        }
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn operations_after_end_are_ignored() {
        let exporter = InMemorySpanExporter::default();
        let tracer = test_tracer(exporter.clone());

        let mut span = tracer.start("done");
        span.end();
        assert!(!span.is_recording());
        span.set_attribute(KeyValue::new("late", true));
        span.add_event("late", vec![]);
        span.set_status(Status::Ok);
        drop(span);

        let spans = exporter.get_finished_spans().unwrap();
        assert!(spans[0].attributes.is_empty());
        assert!(spans[0].events.is_empty());
        assert_eq!(spans[0].status, Status::Unset);
    }

    #[test]
    fn child_span_joins_parent_trace() {
        let exporter = InMemorySpanExporter::default();
        let tracer = test_tracer(exporter.clone());

        let parent = tracer.start("parent");
        let parent_context = parent.span_context().clone();
        let child = tracer.start_with_parent("child", &parent_context);

        assert_eq!(child.span_context().trace_id(), parent_context.trace_id());
        assert_ne!(child.span_context().span_id(), parent_context.span_id());
        drop(child);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].parent_span_id, parent_context.span_id());
    }

    #[test]
    fn dropped_spans_do_not_record_or_export() {
        let exporter = InMemorySpanExporter::default();
        let tracer = Tracer::builder("test")
            .with_sampler(Sampler::AlwaysOff)
            .with_span_processor(SimpleSpanProcessor::new(exporter.clone()))
            .build();

        let mut span = tracer.start("invisible");
        assert!(!span.is_recording());
        assert!(!span.span_context().is_sampled());
        // Identity still exists so it can propagate downstream.
        assert!(span.span_context().is_valid());
        span.end();

        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }

    #[test]
    fn shutdown_stops_span_creation() {
        let exporter = InMemorySpanExporter::default();
        let tracer = test_tracer(exporter.clone());

        tracer.start("before").end();
        tracer.shutdown().expect("shutdown should succeed");
        assert_eq!(tracer.shutdown(), Err(SdkError::AlreadyShutdown));

        let span = tracer.start("after");
        assert!(!span.is_recording());
        drop(span);

        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn sequential_generator_is_used() {
        let exporter = InMemorySpanExporter::default();
        let tracer = Tracer::builder("test")
            .with_id_generator(SequentialIdGenerator::default())
            .with_span_processor(SimpleSpanProcessor::new(exporter))
            .build();

        let first = tracer.start("a");
        let second = tracer.start("b");
        assert_ne!(
            first.span_context().trace_id(),
            second.span_context().trace_id()
        );
    }

    #[test]
    fn context_round_trips_through_carrier() {
        let exporter = InMemorySpanExporter::default();
        let tracer = test_tracer(exporter);

        let span = tracer.start("outgoing");
        let mut carrier: HashMap<String, String> = HashMap::new();
        tracer.inject_context(span.span_context(), &mut carrier);

        let extracted = tracer.extract_context(&carrier).expect("valid context");
        assert_eq!(extracted.trace_id(), span.span_context().trace_id());
        assert!(extracted.is_remote());

        let child = tracer.start_with_parent("incoming", &extracted);
        assert_eq!(child.span_context().trace_id(), span.span_context().trace_id());
    }

    #[test]
    fn batched_end_to_end() {
        let exporter = InMemorySpanExporter::default();
        let processor = BatchSpanProcessor::new(
            exporter.clone(),
            BatchConfigBuilder::default()
                .with_max_export_batch_size(2)
                .with_scheduled_delay(Duration::from_secs(60))
                .build(),
        );
        let tracer = Tracer::builder("test").with_span_processor(processor).build();

        for name in ["a", "b", "c"] {
            tracer.start(name).end();
        }
        tracer.force_flush().expect("flush should succeed");

        let names: Vec<String> = exporter
            .get_finished_spans()
            .unwrap()
            .iter()
            .map(|span| span.name.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        tracer.shutdown().expect("shutdown should succeed");
    }
}
