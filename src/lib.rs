//! A self-contained telemetry SDK: tracing with sampled, batched span
//! export, and metrics with periodic cumulative export.
//!
//! Everything is wired explicitly. A [`trace::Tracer`] owns its id
//! generator, sampler, propagator, span processors, and resource; a
//! [`metrics::PeriodicReader`] owns its producer and exporter. There is no
//! global registry and no ambient context: parent spans and carriers are
//! passed by hand, which keeps the data flow visible and the components
//! independently testable.
//!
//! ## Getting started
//!
//! ```
//! use otelkit::trace::{BatchConfig, BatchSpanProcessor, InMemorySpanExporter, Tracer};
//! use otelkit::runtime::TelemetryPipeline;
//! use otelkit::{KeyValue, Resource};
//!
//! let exporter = InMemorySpanExporter::default();
//! let tracer = Tracer::builder("example")
//!     .with_resource(Resource::builder().with_service_name("example-service").build())
//!     .with_span_processor(BatchSpanProcessor::new(exporter, BatchConfig::default()))
//!     .build();
//!
//! let mut span = tracer.start("handle-request");
//! span.set_attribute(KeyValue::new("request.size", 42_i64));
//! span.end();
//!
//! let pipeline = TelemetryPipeline::new().with_component(tracer);
//! pipeline.shutdown().unwrap();
//! ```
//!
//! ## Feature flags
//!
//! - `internal-logs` (default): route the SDK's self-diagnostics through
//!   [`tracing`](https://docs.rs/tracing).

#![warn(missing_debug_implementations, missing_docs, unreachable_pub)]

pub mod metrics;
pub mod propagation;
pub mod runtime;
pub mod trace;

mod common;
mod error;
mod internal_logging;
mod resource;

pub use common::{
    InstrumentationScope, InstrumentationScopeBuilder, Key, KeyValue, Value,
};
pub use error::{SdkError, SdkResult};
pub use resource::{Resource, ResourceBuilder};

#[cfg(feature = "internal-logs")]
#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
