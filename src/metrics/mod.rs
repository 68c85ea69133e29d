//! Metrics: instruments, aggregation, and periodic export.
//!
//! Measurements flow from instruments into the [`MetricRegistry`], and a
//! [`PeriodicReader`] snapshots the registry on an interval and pushes the
//! cumulative points to an exporter:
//!
//! ```
//! use otelkit::metrics::{InMemoryMetricExporter, MetricRegistry, PeriodicReader};
//! use std::time::Duration;
//!
//! let registry = MetricRegistry::new();
//! let reader = PeriodicReader::builder(InMemoryMetricExporter::default(), registry.clone())
//!     .with_interval(Duration::from_secs(60))
//!     .build();
//!
//! let requests = registry.u64_counter("requests").with_unit("1").build();
//! requests.add(1);
//! # reader.shutdown().unwrap();
//! ```

mod data;
mod exporter;
mod in_memory_exporter;
mod periodic_reader;
mod registry;

pub use data::{HistogramSnapshot, MetricPoint, MetricValue, ResourceMetrics};
pub use exporter::MetricExporter;
pub use in_memory_exporter::InMemoryMetricExporter;
pub use periodic_reader::{PeriodicReader, PeriodicReaderBuilder};
pub use registry::{
    Counter, Gauge, Histogram, InstrumentBuilder, MetricProducer, MetricRegistry,
};
