//! Span processors sit between span creation and span export.
//!
//! [`SimpleSpanProcessor`] exports each finished span inline on the calling
//! thread, for tests and short-lived tools. [`BatchSpanProcessor`] queues
//! finished spans on a bounded channel and exports them in batches from a
//! dedicated background thread, so ending a span never blocks on export.

use crate::error::{SdkError, SdkResult};
use crate::trace::{SpanData, SpanExporter};
use crate::{otel_debug, otel_error, otel_warn};
use futures_util::future::{self, Either};
use std::cmp;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Interface for processing finished spans.
///
/// Processors receive every ended span from the tracer; implementations
/// decide whether to forward it (the built-in processors skip unsampled
/// spans).
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    /// Called when a span ends. Must not block.
    fn on_end(&self, span: SpanData);

    /// Export all spans received but not yet exported. Returns when the
    /// export finished or the processor's flush deadline passed.
    fn force_flush(&self) -> SdkResult;

    /// Flush remaining spans and release resources. Spans ending after
    /// shutdown are dropped. Second and later calls return
    /// [`SdkError::AlreadyShutdown`].
    fn shutdown(&self) -> SdkResult;
}

/// A [`SpanProcessor`] that exports each sampled span as soon as it ends,
/// blocking the ending thread.
#[derive(Debug)]
pub struct SimpleSpanProcessor {
    exporter: Mutex<Box<dyn SpanExporter>>,
    is_shutdown: AtomicBool,
}

impl SimpleSpanProcessor {
    /// Create a new simple processor wrapping the given exporter.
    pub fn new(exporter: impl SpanExporter + 'static) -> Self {
        SimpleSpanProcessor {
            exporter: Mutex::new(Box::new(exporter)),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return;
        }
        if !span.span_context.is_sampled() {
            return;
        }

        let result = self
            .exporter
            .lock()
            .map_err(SdkError::from)
            .and_then(|mut exporter| futures_executor::block_on(exporter.export(vec![span])));
        if let Err(err) = result {
            otel_error!(name: "SimpleSpanProcessor.ExportFailed", error = format!("{err}"));
        }
    }

    fn force_flush(&self) -> SdkResult {
        // Every span was exported inline already.
        Ok(())
    }

    fn shutdown(&self) -> SdkResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
        let mut exporter = self.exporter.lock()?;
        exporter.shutdown();
        Ok(())
    }
}

/// Messages exchanged between the batch processor handle and its worker
/// thread over the same bounded channel as spans, so control messages keep
/// FIFO order with the spans queued before them.
#[derive(Debug)]
enum BatchMessage {
    ExportSpan(SpanData),
    ForceFlush(SyncSender<SdkResult>),
    Shutdown(SyncSender<SdkResult>),
}

/// A [`SpanProcessor`] that batches finished spans and exports them from a
/// dedicated background thread.
///
/// Finished sampled spans are pushed onto a bounded queue; when the queue is
/// full the span is dropped and counted, never blocking the caller. The
/// worker exports a batch when `max_export_batch_size` spans are buffered,
/// when `scheduled_delay` elapses, and on flush or shutdown. Batches preserve
/// the order spans finished in and each span is exported at most once.
pub struct BatchSpanProcessor {
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    forceflush_timeout: Duration,
    shutdown_timeout: Duration,
    is_shutdown: AtomicBool,
    dropped_spans_count: Arc<AtomicUsize>,
    max_queue_size: usize,
}

impl fmt::Debug for BatchSpanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSpanProcessor")
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .field("max_queue_size", &self.max_queue_size)
            .finish()
    }
}

impl BatchSpanProcessor {
    /// Create a new batch processor with the given exporter and config,
    /// spawning the worker thread.
    pub fn new(mut exporter: impl SpanExporter + 'static, config: BatchConfig) -> Self {
        let (message_sender, message_receiver) = mpsc::sync_channel::<BatchMessage>(config.max_queue_size);
        let max_export_batch_size = config.max_export_batch_size;
        let scheduled_delay = config.scheduled_delay;
        let export_timeout = config.export_timeout;

        let handle = thread::Builder::new()
            .name("OtelBatchSpanProcessor".to_string())
            .spawn(move || {
                otel_debug!(
                    name: "BatchSpanProcessor.ThreadStarted",
                    max_export_batch_size = max_export_batch_size,
                );
                let mut spans: Vec<SpanData> = Vec::with_capacity(max_export_batch_size);
                let mut last_export_time = Instant::now();

                loop {
                    let remaining = scheduled_delay.saturating_sub(last_export_time.elapsed());
                    match message_receiver.recv_timeout(remaining) {
                        Ok(BatchMessage::ExportSpan(span)) => {
                            spans.push(span);
                            if spans.len() >= max_export_batch_size {
                                let _ = export_batch(&mut exporter, spans.split_off(0), export_timeout);
                                last_export_time = Instant::now();
                            }
                        }
                        Ok(BatchMessage::ForceFlush(sender)) => {
                            let result = export_all(
                                &mut exporter,
                                &mut spans,
                                max_export_batch_size,
                                export_timeout,
                            );
                            let _ = sender.send(result);
                            last_export_time = Instant::now();
                        }
                        Ok(BatchMessage::Shutdown(sender)) => {
                            // The channel is FIFO, so every span queued before
                            // the shutdown request was received above.
                            let result = export_all(
                                &mut exporter,
                                &mut spans,
                                max_export_batch_size,
                                export_timeout,
                            );
                            exporter.shutdown();
                            let _ = sender.send(result);
                            otel_debug!(name: "BatchSpanProcessor.ThreadStopped");
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            if !spans.is_empty() {
                                let _ = export_batch(&mut exporter, spans.split_off(0), export_timeout);
                            }
                            last_export_time = Instant::now();
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            otel_error!(name: "BatchSpanProcessor.ThreadExitedUnexpectedly");
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn thread");

        BatchSpanProcessor {
            message_sender,
            handle: Mutex::new(Some(handle)),
            forceflush_timeout: config.force_flush_timeout,
            shutdown_timeout: config.shutdown_timeout,
            is_shutdown: AtomicBool::new(false),
            dropped_spans_count: Arc::new(AtomicUsize::new(0)),
            max_queue_size: config.max_queue_size,
        }
    }

    /// Create a builder for a batch processor wrapping the given exporter.
    pub fn builder<E: SpanExporter + 'static>(exporter: E) -> BatchSpanProcessorBuilder<E> {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }

    /// Number of spans dropped because the queue was full or the processor
    /// was already shut down.
    pub fn dropped_span_count(&self) -> usize {
        self.dropped_spans_count.load(Ordering::Relaxed)
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }
        if self.is_shutdown.load(Ordering::Relaxed) {
            self.count_dropped_span();
            return;
        }

        if self
            .message_sender
            .try_send(BatchMessage::ExportSpan(span))
            .is_err()
        {
            self.count_dropped_span();
        }
    }

    fn force_flush(&self) -> SdkResult {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
        let (sender, receiver) = mpsc::sync_channel(1);
        self.message_sender
            .try_send(BatchMessage::ForceFlush(sender))
            .map_err(|err| SdkError::InternalFailure(format!("flush message failed: {err}")))?;

        receiver
            .recv_timeout(self.forceflush_timeout)
            .map_err(|_| SdkError::Timeout(self.forceflush_timeout))?
    }

    fn shutdown(&self) -> SdkResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }

        let dropped_spans = self.dropped_spans_count.load(Ordering::Relaxed);
        if dropped_spans > 0 {
            otel_warn!(
                name: "BatchSpanProcessor.SpansDropped",
                dropped_spans = dropped_spans,
                max_queue_size = self.max_queue_size,
            );
        }

        // A full queue must not strand the worker with spans still buffered:
        // keep retrying until the worker drains a slot or the deadline passes.
        let deadline = Instant::now() + self.shutdown_timeout;
        let (sender, receiver) = mpsc::sync_channel(1);
        let mut message = BatchMessage::Shutdown(sender);
        loop {
            match self.message_sender.try_send(message) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    if Instant::now() >= deadline {
                        return Err(SdkError::Timeout(self.shutdown_timeout));
                    }
                    message = returned;
                    thread::sleep(Duration::from_millis(10));
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(SdkError::InternalFailure(
                        "shutdown message failed: worker thread is gone".to_string(),
                    ));
                }
            }
        }

        let result = receiver
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .map_err(|_| SdkError::Timeout(self.shutdown_timeout))?;

        if let Some(handle) = self.handle.lock()?.take() {
            if handle.join().is_err() {
                return Err(SdkError::InternalFailure("worker thread panicked".to_string()));
            }
        }
        result
    }
}

impl BatchSpanProcessor {
    fn count_dropped_span(&self) {
        // Logged once; the total is reported again at shutdown.
        if self.dropped_spans_count.fetch_add(1, Ordering::Relaxed) == 0 {
            otel_warn!(
                name: "BatchSpanProcessor.SpanDroppingStarted",
                message = "Batch span processor queue full, dropping spans. No further log will be emitted for dropped spans until shutdown."
            );
        }
    }
}

impl Drop for BatchSpanProcessor {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Relaxed) {
            if let Err(err) = self.shutdown() {
                otel_error!(name: "BatchSpanProcessor.ShutdownOnDropFailed", error = format!("{err}"));
            }
        }
    }
}

/// Export a single batch, bounded by `timeout`. Failures are logged and the
/// batch is discarded; the worker keeps running.
fn export_batch(exporter: &mut impl SpanExporter, batch: Vec<SpanData>, timeout: Duration) -> SdkResult {
    if batch.is_empty() {
        return Ok(());
    }
    let count = batch.len();
    let result = futures_executor::block_on(async {
        let export = exporter.export(batch);
        let deadline = Box::pin(futures_timer::Delay::new(timeout));
        match future::select(export, deadline).await {
            Either::Left((result, _)) => result,
            Either::Right(_) => Err(SdkError::Timeout(timeout)),
        }
    });
    match &result {
        Ok(()) => {
            otel_debug!(name: "BatchSpanProcessor.ExportCompleted", batch_size = count);
        }
        Err(err) => {
            otel_error!(name: "BatchSpanProcessor.ExportFailed", error = format!("{err}"));
        }
    }
    result
}

/// Drain the buffer in batches of `max_export_batch_size`, keeping span
/// order. Returns the first error but exports the remaining batches anyway.
fn export_all(
    exporter: &mut impl SpanExporter,
    spans: &mut Vec<SpanData>,
    max_export_batch_size: usize,
    timeout: Duration,
) -> SdkResult {
    let mut result = Ok(());
    while !spans.is_empty() {
        let batch: Vec<SpanData> = spans.drain(..cmp::min(max_export_batch_size, spans.len())).collect();
        let batch_result = export_batch(exporter, batch, timeout);
        if result.is_ok() {
            result = batch_result;
        }
    }
    result
}

/// Delay interval between two consecutive exports.
const OTEL_BSP_SCHEDULE_DELAY: &str = "OTEL_BSP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive exports.
const OTEL_BSP_SCHEDULE_DELAY_DEFAULT: u64 = 5_000;
/// Maximum queue size.
const OTEL_BSP_MAX_QUEUE_SIZE: &str = "OTEL_BSP_MAX_QUEUE_SIZE";
/// Default maximum queue size.
const OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Maximum batch size, must be less than or equal to `OTEL_BSP_MAX_QUEUE_SIZE`.
const OTEL_BSP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE";
/// Default maximum batch size.
const OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;
/// Maximum allowed time to export data.
const OTEL_BSP_EXPORT_TIMEOUT: &str = "OTEL_BSP_EXPORT_TIMEOUT";
/// Default maximum allowed time to export data.
const OTEL_BSP_EXPORT_TIMEOUT_DEFAULT: u64 = 30_000;

/// Batch span processor configuration. Use [`BatchConfigBuilder`] to
/// construct.
#[derive(Debug)]
pub struct BatchConfig {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    export_timeout: Duration,
    force_flush_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

/// Builder for [`BatchConfig`]. Defaults come from the `OTEL_BSP_*`
/// environment variables where set; explicit `with_*` calls take precedence
/// over the environment.
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    export_timeout: Duration,
    force_flush_timeout: Duration,
    shutdown_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    /// Create a new [`BatchConfigBuilder`] with default values.
    ///
    /// The values are overridden by the `OTEL_BSP_MAX_QUEUE_SIZE`,
    /// `OTEL_BSP_SCHEDULE_DELAY` (ms), `OTEL_BSP_MAX_EXPORT_BATCH_SIZE` and
    /// `OTEL_BSP_EXPORT_TIMEOUT` (ms) environment variables where set.
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT,
            scheduled_delay: Duration::from_millis(OTEL_BSP_SCHEDULE_DELAY_DEFAULT),
            max_export_batch_size: OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT,
            export_timeout: Duration::from_millis(OTEL_BSP_EXPORT_TIMEOUT_DEFAULT),
            force_flush_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
        .init_from_env_vars()
    }
}

impl BatchConfigBuilder {
    /// Set `max_queue_size`: spans finishing while the queue is full are
    /// dropped and counted. The default value is 2048.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set `max_export_batch_size`: spans per export call. Clamped to
    /// `max_queue_size` at build. The default value is 512.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set `scheduled_delay`: the interval between two consecutive exports
    /// when the batch size trigger does not fire. The default value is 5000ms.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set `export_timeout`: the hard deadline for a single export call; a
    /// timed out batch is discarded. The default value is 30000ms.
    pub fn with_export_timeout(mut self, export_timeout: Duration) -> Self {
        self.export_timeout = export_timeout;
        self
    }

    /// Set how long `force_flush` waits for the worker's reply. The default
    /// value is 5s.
    pub fn with_force_flush_timeout(mut self, force_flush_timeout: Duration) -> Self {
        self.force_flush_timeout = force_flush_timeout;
        self
    }

    /// Set how long `shutdown` waits for the worker's reply. The default
    /// value is 5s.
    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Build a [`BatchConfig`] from the current configuration.
    pub fn build(self) -> BatchConfig {
        // Graceful handling of the degenerate combination: never export more
        // than fits in the queue.
        let max_export_batch_size = cmp::min(self.max_export_batch_size, self.max_queue_size);

        BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size,
            export_timeout: self.export_timeout,
            force_flush_timeout: self.force_flush_timeout,
            shutdown_timeout: self.shutdown_timeout,
        }
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(max_queue_size) = std::env::var(OTEL_BSP_MAX_QUEUE_SIZE)
            .ok()
            .and_then(|queue_size| queue_size.parse::<usize>().ok())
        {
            self.max_queue_size = max_queue_size;
        }

        if let Some(scheduled_delay) = std::env::var(OTEL_BSP_SCHEDULE_DELAY)
            .ok()
            .and_then(|delay| delay.parse::<u64>().ok())
        {
            self.scheduled_delay = Duration::from_millis(scheduled_delay);
        }

        if let Some(max_export_batch_size) = std::env::var(OTEL_BSP_MAX_EXPORT_BATCH_SIZE)
            .ok()
            .and_then(|batch_size| batch_size.parse::<usize>().ok())
        {
            self.max_export_batch_size = max_export_batch_size;
        }

        if let Some(export_timeout) = std::env::var(OTEL_BSP_EXPORT_TIMEOUT)
            .ok()
            .and_then(|timeout| timeout.parse::<u64>().ok())
        {
            self.export_timeout = Duration::from_millis(export_timeout);
        }

        self
    }
}

/// Builder returned by [`BatchSpanProcessor::builder`].
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E: SpanExporter + 'static> BatchSpanProcessorBuilder<E> {
    /// Use the given [`BatchConfig`].
    pub fn with_batch_config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the [`BatchSpanProcessor`], spawning its worker thread.
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(self.exporter, self.config)
    }
}
