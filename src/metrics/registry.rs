//! Instrument registration and measurement aggregation.
//!
//! The registry is the write side of the metrics pipeline: application code
//! creates instruments from it and records measurements through them; the
//! periodic reader pulls cumulative snapshots from it through the
//! [`MetricProducer`] interface. Counter and gauge hot paths are single
//! atomic operations and never block on the registry.

use crate::metrics::{HistogramSnapshot, MetricPoint, MetricValue};
use crate::{InstrumentationScope, KeyValue};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Default histogram bucket boundaries, in line with the conventional
/// latency-oriented buckets.
const DEFAULT_HISTOGRAM_BOUNDARIES: &[f64] = &[
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];

/// A source of metric points for a metrics reader.
///
/// `produce` returns the cumulative state of every known time series; it
/// never resets anything, so two consecutive calls without intervening
/// measurements return the same points.
pub trait MetricProducer: Send + Sync + fmt::Debug {
    /// Snapshot all current time series.
    fn produce(&self) -> Vec<MetricPoint>;
}

/// Creates instruments and aggregates their measurements.
///
/// Cheap to clone; clones share the same instruments. Registering an
/// instrument with a name, unit, and attribute set that already exist
/// returns a handle to the existing time series.
#[derive(Clone, Debug, Default)]
pub struct MetricRegistry {
    scope: InstrumentationScope,
    inner: Arc<Mutex<RegistryInner>>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    instruments: Vec<InstrumentEntry>,
    index: HashMap<InstrumentId, usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct InstrumentId {
    kind: InstrumentKind,
    name: Cow<'static, str>,
    unit: Cow<'static, str>,
    /// Attribute pairs in canonical order, so attribute order at
    /// registration does not create distinct series.
    attributes: Vec<(String, String)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum InstrumentKind {
    Counter,
    Gauge,
    Histogram,
}

#[derive(Debug)]
struct InstrumentEntry {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    attributes: Vec<KeyValue>,
    start_time: SystemTime,
    state: InstrumentState,
}

#[derive(Debug)]
enum InstrumentState {
    Sum(Arc<AtomicU64>),
    Gauge(Arc<GaugeState>),
    Histogram(Arc<Mutex<HistogramState>>),
}

#[derive(Debug, Default)]
struct GaugeState {
    bits: AtomicU64,
    set: AtomicBool,
}

#[derive(Debug)]
struct HistogramState {
    bounds: Vec<f64>,
    bucket_counts: Vec<u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl HistogramState {
    fn new(bounds: Vec<f64>) -> Self {
        let bucket_count = bounds.len() + 1;
        HistogramState {
            bounds,
            bucket_counts: vec![0; bucket_count],
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl MetricRegistry {
    /// Create an empty registry with the default scope.
    pub fn new() -> Self {
        MetricRegistry::default()
    }

    /// Create an empty registry whose instruments carry the given scope.
    pub fn with_scope(scope: InstrumentationScope) -> Self {
        MetricRegistry {
            scope,
            inner: Arc::default(),
        }
    }

    /// Start building a monotonic counter.
    pub fn u64_counter(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Counter> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Start building a gauge holding the last recorded value.
    pub fn f64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Gauge> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Start building a histogram of recorded values.
    pub fn f64_histogram(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Histogram> {
        InstrumentBuilder::new(self, name.into())
    }

    fn register<S>(
        &self,
        kind: InstrumentKind,
        builder: InstrumentFields,
        make_state: impl FnOnce() -> InstrumentState,
        get_state: impl Fn(&InstrumentState) -> Option<S>,
    ) -> Option<S> {
        let mut canonical: Vec<(String, String)> = builder
            .attributes
            .iter()
            .map(|kv| (kv.key.to_string(), kv.value.as_string()))
            .collect();
        canonical.sort();
        let id = InstrumentId {
            kind,
            name: builder.name.clone(),
            unit: builder.unit.clone(),
            attributes: canonical,
        };

        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(&index) = inner.index.get(&id) {
            return get_state(&inner.instruments[index].state);
        }

        let entry = InstrumentEntry {
            name: builder.name,
            description: builder.description,
            unit: builder.unit,
            attributes: builder.attributes,
            start_time: SystemTime::now(),
            state: make_state(),
        };
        let state = get_state(&entry.state);
        let index = inner.instruments.len();
        inner.instruments.push(entry);
        inner.index.insert(id, index);
        state
    }
}

impl MetricProducer for MetricRegistry {
    fn produce(&self) -> Vec<MetricPoint> {
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        let now = SystemTime::now();
        let mut points = Vec::with_capacity(inner.instruments.len());
        for entry in &inner.instruments {
            let value = match &entry.state {
                InstrumentState::Sum(state) => MetricValue::Sum(state.load(Ordering::Relaxed)),
                InstrumentState::Gauge(state) => {
                    // A gauge that was never recorded has no point to report.
                    if !state.set.load(Ordering::Acquire) {
                        continue;
                    }
                    MetricValue::Gauge(f64::from_bits(state.bits.load(Ordering::Relaxed)))
                }
                InstrumentState::Histogram(state) => {
                    let state = match state.lock() {
                        Ok(state) => state,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    MetricValue::Histogram(HistogramSnapshot {
                        bounds: state.bounds.clone(),
                        bucket_counts: state.bucket_counts.clone(),
                        count: state.count,
                        sum: state.sum,
                        min: (state.count > 0).then_some(state.min),
                        max: (state.count > 0).then_some(state.max),
                    })
                }
            };
            points.push(MetricPoint {
                scope: self.scope.clone(),
                name: entry.name.clone(),
                description: entry.description.clone(),
                unit: entry.unit.clone(),
                attributes: entry.attributes.clone(),
                start_time: entry.start_time,
                time: now,
                value,
            });
        }
        points
    }
}

/// A monotonically increasing counter.
#[derive(Clone, Debug)]
pub struct Counter {
    state: Arc<AtomicU64>,
}

impl Counter {
    /// Add to the counter. Safe to call from any thread; concurrent adds
    /// never lose increments.
    pub fn add(&self, value: u64) {
        self.state.fetch_add(value, Ordering::Relaxed);
    }
}

/// An instrument holding the most recently recorded value.
#[derive(Clone, Debug)]
pub struct Gauge {
    state: Arc<GaugeState>,
}

impl Gauge {
    /// Record the current value, replacing the previous one.
    pub fn record(&self, value: f64) {
        self.state.bits.store(value.to_bits(), Ordering::Relaxed);
        self.state.set.store(true, Ordering::Release);
    }
}

/// An instrument aggregating recorded values into a distribution.
#[derive(Clone, Debug)]
pub struct Histogram {
    state: Arc<Mutex<HistogramState>>,
}

impl Histogram {
    /// Record a value into the distribution.
    pub fn record(&self, value: f64) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        let index = state.bounds.partition_point(|bound| value > *bound);
        state.bucket_counts[index] += 1;
        state.count += 1;
        state.sum += value;
        state.min = state.min.min(value);
        state.max = state.max.max(value);
    }
}

struct InstrumentFields {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    attributes: Vec<KeyValue>,
}

/// Configuration for an instrument before it is registered.
#[derive(Debug)]
pub struct InstrumentBuilder<'a, T> {
    registry: &'a MetricRegistry,
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    unit: Cow<'static, str>,
    attributes: Vec<KeyValue>,
    boundaries: Option<Vec<f64>>,
    _instrument: PhantomData<T>,
}

impl<'a, T> InstrumentBuilder<'a, T> {
    fn new(registry: &'a MetricRegistry, name: Cow<'static, str>) -> Self {
        InstrumentBuilder {
            registry,
            name,
            description: Cow::Borrowed(""),
            unit: Cow::Borrowed(""),
            attributes: Vec::new(),
            boundaries: None,
            _instrument: PhantomData,
        }
    }

    /// Describe the instrument for human readers.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    /// The unit of measure, part of the instrument's identity.
    pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
        self.unit = unit.into();
        self
    }

    /// The attribute set identifying this time series.
    pub fn with_attributes<I: IntoIterator<Item = KeyValue>>(mut self, attributes: I) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }

    fn into_fields(self) -> (&'a MetricRegistry, InstrumentFields, Option<Vec<f64>>) {
        (
            self.registry,
            InstrumentFields {
                name: self.name,
                description: self.description,
                unit: self.unit,
                attributes: self.attributes,
            },
            self.boundaries,
        )
    }
}

impl InstrumentBuilder<'_, Counter> {
    /// Register the counter, or fetch the existing series with the same
    /// identity.
    pub fn build(self) -> Counter {
        let (registry, fields, _) = self.into_fields();
        registry
            .register(
                InstrumentKind::Counter,
                fields,
                || InstrumentState::Sum(Arc::new(AtomicU64::new(0))),
                |state| match state {
                    InstrumentState::Sum(sum) => Some(Counter { state: sum.clone() }),
                    _ => None,
                },
            )
            .expect("counter registration returns counter state")
    }
}

impl InstrumentBuilder<'_, Gauge> {
    /// Register the gauge, or fetch the existing series with the same
    /// identity.
    pub fn build(self) -> Gauge {
        let (registry, fields, _) = self.into_fields();
        registry
            .register(
                InstrumentKind::Gauge,
                fields,
                || InstrumentState::Gauge(Arc::new(GaugeState::default())),
                |state| match state {
                    InstrumentState::Gauge(gauge) => Some(Gauge { state: gauge.clone() }),
                    _ => None,
                },
            )
            .expect("gauge registration returns gauge state")
    }
}

impl InstrumentBuilder<'_, Histogram> {
    /// Bucket upper bounds, sorted ascending. Defaults to the conventional
    /// latency buckets.
    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    /// Register the histogram, or fetch the existing series with the same
    /// identity.
    pub fn build(self) -> Histogram {
        let (registry, fields, boundaries) = self.into_fields();
        let bounds = boundaries.unwrap_or_else(|| DEFAULT_HISTOGRAM_BOUNDARIES.to_vec());
        registry
            .register(
                InstrumentKind::Histogram,
                fields,
                || InstrumentState::Histogram(Arc::new(Mutex::new(HistogramState::new(bounds)))),
                |state| match state {
                    InstrumentState::Histogram(histogram) => Some(Histogram {
                        state: histogram.clone(),
                    }),
                    _ => None,
                },
            )
            .expect("histogram registration returns histogram state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn counter_accumulates_cumulatively() {
        let registry = MetricRegistry::new();
        let counter = registry
            .u64_counter("requests")
            .with_unit("1")
            .with_description("handled requests")
            .build();

        counter.add(2);
        counter.add(3);

        let points = registry.produce();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].name, "requests");
        assert_eq!(points[0].value, MetricValue::Sum(5));

        // No reset between collections.
        assert_eq!(registry.produce()[0].value, MetricValue::Sum(5));
        counter.add(1);
        assert_eq!(registry.produce()[0].value, MetricValue::Sum(6));
    }

    #[test]
    fn concurrent_counter_adds_are_not_lost() {
        let registry = MetricRegistry::new();
        let counter = registry.u64_counter("hits").build();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        counter.add(1);
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }

        assert_eq!(registry.produce()[0].value, MetricValue::Sum(8_000));
    }

    #[test]
    fn same_identity_shares_the_series() {
        let registry = MetricRegistry::new();
        let attrs = vec![KeyValue::new("route", "/health"), KeyValue::new("code", 200_i64)];
        let reversed: Vec<KeyValue> = attrs.iter().rev().cloned().collect();

        let first = registry.u64_counter("requests").with_attributes(attrs).build();
        let second = registry.u64_counter("requests").with_attributes(reversed).build();
        first.add(1);
        second.add(1);

        let points = registry.produce();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, MetricValue::Sum(2));
    }

    #[test]
    fn different_attributes_are_distinct_series() {
        let registry = MetricRegistry::new();
        registry
            .u64_counter("requests")
            .with_attributes(vec![KeyValue::new("code", 200_i64)])
            .build()
            .add(1);
        registry
            .u64_counter("requests")
            .with_attributes(vec![KeyValue::new("code", 500_i64)])
            .build()
            .add(2);

        assert_eq!(registry.produce().len(), 2);
    }

    #[test]
    fn gauge_reports_last_value_only_after_first_record() {
        let registry = MetricRegistry::new();
        let gauge = registry.f64_gauge("temperature").build();

        assert!(registry.produce().is_empty(), "unset gauge produces nothing");

        gauge.record(20.5);
        gauge.record(21.0);
        assert_eq!(registry.produce()[0].value, MetricValue::Gauge(21.0));
    }

    #[test]
    fn histogram_buckets_and_stats() {
        let registry = MetricRegistry::new();
        let histogram = registry
            .f64_histogram("latency")
            .with_unit("ms")
            .with_boundaries(vec![1.0, 5.0, 10.0])
            .build();

        for value in [0.5, 1.0, 3.0, 7.0, 100.0] {
            histogram.record(value);
        }

        let points = registry.produce();
        let MetricValue::Histogram(snapshot) = &points[0].value else {
            panic!("expected histogram point");
        };
        // Values at a bound fall into that bound's bucket.
        assert_eq!(snapshot.bucket_counts, vec![2, 1, 1, 1]);
        assert_eq!(snapshot.count, 5);
        assert_eq!(snapshot.sum, 111.5);
        assert_eq!(snapshot.min, Some(0.5));
        assert_eq!(snapshot.max, Some(100.0));
    }

    #[test]
    fn empty_histogram_has_no_min_max() {
        let registry = MetricRegistry::new();
        let _histogram = registry.f64_histogram("latency").build();

        let points = registry.produce();
        let MetricValue::Histogram(snapshot) = &points[0].value else {
            panic!("expected histogram point");
        };
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.min, None);
        assert_eq!(snapshot.max, None);
    }
}
