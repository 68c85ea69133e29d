//! The data produced by a metrics collection pass.

use crate::{InstrumentationScope, KeyValue, Resource};
use std::borrow::Cow;
use std::time::SystemTime;

/// A single time series value at collection time.
///
/// Points are cumulative: a sum carries everything recorded since
/// `start_time`, never a delta. Each point is a fresh snapshot copy; the
/// live aggregation state stays with the producer.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricPoint {
    /// The library that created the instrument.
    pub scope: InstrumentationScope,
    /// The instrument name.
    pub name: Cow<'static, str>,
    /// Human-readable description of the instrument.
    pub description: Cow<'static, str>,
    /// The unit of measure.
    pub unit: Cow<'static, str>,
    /// The attribute set identifying this time series.
    pub attributes: Vec<KeyValue>,
    /// When the instrument started accumulating.
    pub start_time: SystemTime,
    /// When this snapshot was taken.
    pub time: SystemTime,
    /// The value at collection time.
    pub value: MetricValue,
}

/// The value of a [`MetricPoint`].
#[derive(Clone, Debug, PartialEq)]
pub enum MetricValue {
    /// A monotonic cumulative sum.
    Sum(u64),
    /// The last recorded value.
    Gauge(f64),
    /// A cumulative distribution of recorded values.
    Histogram(HistogramSnapshot),
}

/// Cumulative histogram state at collection time.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramSnapshot {
    /// Upper bounds of the buckets, sorted ascending.
    pub bounds: Vec<f64>,
    /// Per-bucket counts; one more entry than `bounds` for the overflow
    /// bucket.
    pub bucket_counts: Vec<u64>,
    /// Total number of recorded values.
    pub count: u64,
    /// Sum of all recorded values.
    pub sum: f64,
    /// Smallest recorded value, `None` until something is recorded.
    pub min: Option<f64>,
    /// Largest recorded value, `None` until something is recorded.
    pub max: Option<f64>,
}

/// A batch of metric points together with the resource that produced them,
/// handed to the exporter as one unit.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceMetrics {
    /// The entity these metrics describe.
    pub resource: Resource,
    /// The points collected in this pass.
    pub points: Vec<MetricPoint>,
}
