//! Periodic collection and export of metrics on a dedicated thread.

use crate::error::{SdkError, SdkResult};
use crate::metrics::{MetricExporter, MetricProducer, ResourceMetrics};
use crate::{otel_debug, otel_error};
use crate::Resource;
use futures_util::future::{self, Either};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

/// Delay interval between two consecutive collections, in milliseconds.
const OTEL_METRIC_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";
/// Default collection interval.
const DEFAULT_INTERVAL_MS: u64 = 60_000;
/// Maximum allowed time for one collect-and-export pass, in milliseconds.
const OTEL_METRIC_EXPORT_TIMEOUT: &str = "OTEL_METRIC_EXPORT_TIMEOUT";
/// Default export timeout.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug)]
enum ReaderMessage {
    Flush(SyncSender<SdkResult>),
    Shutdown(SyncSender<SdkResult>),
}

/// Collects from a [`MetricProducer`] and pushes to a [`MetricExporter`] on
/// a fixed interval, from its own thread.
///
/// Collection passes are serialized on that one thread: a slow export delays
/// the next tick instead of overlapping it. Flush triggers an immediate
/// pass; shutdown runs one final pass before stopping the thread.
pub struct PeriodicReader {
    message_sender: mpsc::Sender<ReaderMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    is_shutdown: AtomicBool,
    reply_timeout: Duration,
}

impl fmt::Debug for PeriodicReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicReader")
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl PeriodicReader {
    /// Start building a reader pulling from `producer` and pushing to
    /// `exporter`.
    pub fn builder<E: MetricExporter + 'static>(
        exporter: E,
        producer: impl MetricProducer + 'static,
    ) -> PeriodicReaderBuilder<E> {
        PeriodicReaderBuilder {
            exporter,
            producer: Box::new(producer),
            resource: Resource::empty(),
            interval: env_duration_ms(OTEL_METRIC_EXPORT_INTERVAL, DEFAULT_INTERVAL_MS),
            timeout: env_duration_ms(OTEL_METRIC_EXPORT_TIMEOUT, DEFAULT_TIMEOUT_MS),
        }
    }

    fn new<E: MetricExporter + 'static>(builder: PeriodicReaderBuilder<E>) -> Self {
        let PeriodicReaderBuilder {
            exporter,
            producer,
            resource,
            interval,
            timeout,
        } = builder;
        let (message_sender, message_receiver) = mpsc::channel::<ReaderMessage>();

        let handle = thread::Builder::new()
            .name("OtelPeriodicReader".to_string())
            .spawn(move || {
                otel_debug!(name: "PeriodicReader.ThreadStarted", interval_millis = interval.as_millis() as u64);
                let mut last_collect = Instant::now();
                loop {
                    let remaining = interval.saturating_sub(last_collect.elapsed());
                    match message_receiver.recv_timeout(remaining) {
                        Ok(ReaderMessage::Flush(sender)) => {
                            let result = collect_and_export(&exporter, producer.as_ref(), &resource, timeout);
                            let _ = sender.send(result);
                        }
                        Ok(ReaderMessage::Shutdown(sender)) => {
                            let mut result = collect_and_export(&exporter, producer.as_ref(), &resource, timeout);
                            if let Err(err) = exporter.shutdown() {
                                if result.is_ok() {
                                    result = Err(err);
                                }
                            }
                            let _ = sender.send(result);
                            otel_debug!(name: "PeriodicReader.ThreadStopped");
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            let _ = collect_and_export(&exporter, producer.as_ref(), &resource, timeout);
                            last_collect = Instant::now();
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            otel_error!(name: "PeriodicReader.ThreadExitedUnexpectedly");
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn thread");

        PeriodicReader {
            message_sender,
            handle: Mutex::new(Some(handle)),
            is_shutdown: AtomicBool::new(false),
            reply_timeout: timeout,
        }
    }

    /// Run a collection pass now and wait for the export to finish.
    pub fn force_flush(&self) -> SdkResult {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
        let (sender, receiver) = mpsc::sync_channel(1);
        self.message_sender
            .send(ReaderMessage::Flush(sender))
            .map_err(|err| SdkError::InternalFailure(format!("flush message failed: {err}")))?;

        receiver
            .recv_timeout(self.reply_timeout)
            .map_err(|_| SdkError::Timeout(self.reply_timeout))?
    }

    /// Run one final collection pass, shut the exporter down, and stop the
    /// thread. Second and later calls return [`SdkError::AlreadyShutdown`].
    pub fn shutdown(&self) -> SdkResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
        let (sender, receiver) = mpsc::sync_channel(1);
        self.message_sender
            .send(ReaderMessage::Shutdown(sender))
            .map_err(|err| SdkError::InternalFailure(format!("shutdown message failed: {err}")))?;

        let result = receiver
            .recv_timeout(self.reply_timeout)
            .map_err(|_| SdkError::Timeout(self.reply_timeout))?;

        if let Some(handle) = self.handle.lock()?.take() {
            if handle.join().is_err() {
                return Err(SdkError::InternalFailure("worker thread panicked".to_string()));
            }
        }
        result
    }
}

impl Drop for PeriodicReader {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Relaxed) {
            if let Err(err) = self.shutdown() {
                otel_error!(name: "PeriodicReader.ShutdownOnDropFailed", error = format!("{err}"));
            }
        }
    }
}

/// One collection pass: snapshot the producer, export under the timeout.
fn collect_and_export(
    exporter: &impl MetricExporter,
    producer: &dyn MetricProducer,
    resource: &Resource,
    timeout: Duration,
) -> SdkResult {
    let points = producer.produce();
    let point_count = points.len();
    let metrics = ResourceMetrics {
        resource: resource.clone(),
        points,
    };

    let result = futures_executor::block_on(async {
        let export = exporter.export(&metrics);
        let deadline = Box::pin(futures_timer::Delay::new(timeout));
        match future::select(export, deadline).await {
            Either::Left((result, _)) => result,
            Either::Right(_) => Err(SdkError::Timeout(timeout)),
        }
    });
    match &result {
        Ok(()) => {
            otel_debug!(name: "PeriodicReader.ExportCompleted", point_count = point_count);
        }
        Err(err) => {
            otel_error!(name: "PeriodicReader.ExportFailed", error = format!("{err}"));
        }
    }
    result
}

fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map_or(Duration::from_millis(default_ms), Duration::from_millis)
}

/// Builder returned by [`PeriodicReader::builder`].
pub struct PeriodicReaderBuilder<E> {
    exporter: E,
    producer: Box<dyn MetricProducer>,
    resource: Resource,
    interval: Duration,
    timeout: Duration,
}

impl<E: MetricExporter + 'static> PeriodicReaderBuilder<E> {
    /// The interval between collection passes. The default value is 60s,
    /// overridden by `OTEL_METRIC_EXPORT_INTERVAL` (ms).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The deadline for one collect-and-export pass. The default value is
    /// 30s, overridden by `OTEL_METRIC_EXPORT_TIMEOUT` (ms).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The resource attached to every exported batch.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = resource;
        self
    }

    /// Build the reader, spawning its collection thread.
    pub fn build(self) -> PeriodicReader {
        PeriodicReader::new(self)
    }
}
