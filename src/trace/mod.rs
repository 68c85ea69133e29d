//! Distributed tracing: span creation, sampling, and batched export.
//!
//! The pieces assemble into a pipeline owned by a single [`Tracer`]:
//!
//! ```
//! use otelkit::trace::{BatchSpanProcessor, BatchConfig, InMemorySpanExporter, Tracer};
//! use otelkit::Resource;
//!
//! let exporter = InMemorySpanExporter::default();
//! let tracer = Tracer::builder("my-library")
//!     .with_resource(Resource::builder().with_service_name("my-service").build())
//!     .with_span_processor(BatchSpanProcessor::new(exporter, BatchConfig::default()))
//!     .build();
//!
//! let mut span = tracer.start("operation");
//! span.end();
//! # tracer.shutdown().unwrap();
//! ```

mod export;
mod id_generator;
mod in_memory_exporter;
mod sampler;
mod span;
mod span_context;
mod span_processor;
mod tracer;

pub use export::{ExportResult, SpanExporter};
pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use in_memory_exporter::InMemorySpanExporter;
pub use sampler::{CloneShouldSample, Sampler, SamplingDecision, SamplingResult, ShouldSample};
pub use span::{Event, Span, SpanData, SpanKind, Status};
pub use span_context::{SpanContext, SpanId, TraceFlags, TraceId, TraceState, TraceStateError};
pub use span_processor::{
    BatchConfig, BatchConfigBuilder, BatchSpanProcessor, BatchSpanProcessorBuilder,
    SimpleSpanProcessor, SpanProcessor,
};
pub use tracer::{SpanBuilder, Tracer, TracerBuilder};
