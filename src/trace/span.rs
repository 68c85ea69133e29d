//! The recording span and the finished span data handed to processors.

use crate::trace::{SpanContext, SpanId, Tracer};
use crate::{InstrumentationScope, KeyValue, Resource};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::time::SystemTime;

/// Describes the relationship between the span and its caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// Outgoing synchronous request.
    Client,
    /// Incoming synchronous request handling.
    Server,
    /// Message sent to a broker.
    Producer,
    /// Message received from a broker.
    Consumer,
    /// Internal operation within an application.
    Internal,
}

/// The status of a finished span.
///
/// Status can only be upgraded: `Unset` < `Error` < `Ok`, and `Ok` is final.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,
    /// The operation contains an error.
    Error {
        /// The description of the error.
        description: Cow<'static, str>,
    },
    /// The operation completed successfully.
    Ok,
}

impl Status {
    /// Create an error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }

    fn priority(&self) -> u8 {
        match self {
            Status::Unset => 0,
            Status::Error { .. } => 1,
            Status::Ok => 2,
        }
    }
}

impl PartialOrd for Status {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.priority().cmp(&other.priority()))
    }
}

/// A timestamped annotation on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,
    /// The wall clock time at which the event occurred.
    pub timestamp: SystemTime,
    /// Attributes describing the event.
    pub attributes: Vec<KeyValue>,
}

impl Event {
    /// Create a new event.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
        }
    }
}

/// Everything a finished span carries into the export pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// The identity of this span on the wire.
    pub span_context: SpanContext,
    /// Span id of the parent, `SpanId::INVALID` for root spans.
    pub parent_span_id: SpanId,
    /// The kind of span.
    pub span_kind: SpanKind,
    /// The operation name.
    pub name: Cow<'static, str>,
    /// Start wall clock time.
    pub start_time: SystemTime,
    /// End wall clock time.
    pub end_time: SystemTime,
    /// Attributes recorded on the span.
    pub attributes: Vec<KeyValue>,
    /// Events recorded on the span, in recording order.
    pub events: Vec<Event>,
    /// The final status.
    pub status: Status,
    /// The resource of the pipeline that produced the span.
    pub resource: Resource,
    /// The library that produced the span.
    pub instrumentation_scope: InstrumentationScope,
}

/// A live span.
///
/// Recording spans hold their in-progress data; non-recording spans (dropped
/// by the sampler) hold only the span context so it can still propagate. A
/// span ends at most once: the first `end` hands the data to the tracer's
/// processors and later calls do nothing. Going out of scope without an
/// explicit `end` ends the span with the drop time.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Option<SpanData>,
    tracer: Tracer,
}

impl Span {
    pub(crate) fn new(span_context: SpanContext, data: Option<SpanData>, tracer: Tracer) -> Self {
        Span {
            span_context,
            data,
            tracer,
        }
    }

    /// The immutable wire identity of this span.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns true if this span records data and has not ended yet.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Set an attribute on the span, replacing any earlier value recorded
    /// under the same key. No-op after end.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if let Some(data) = self.data.as_mut() {
            match data.attributes.iter_mut().find(|kv| kv.key == attribute.key) {
                Some(existing) => existing.value = attribute.value,
                None => data.attributes.push(attribute),
            }
        }
    }

    /// Record an event at the current time. No-op after end.
    pub fn add_event(&mut self, name: impl Into<Cow<'static, str>>, attributes: Vec<KeyValue>) {
        self.add_event_with_timestamp(name, SystemTime::now(), attributes)
    }

    /// Record an event with the given timestamp. No-op after end.
    pub fn add_event_with_timestamp(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) {
        if let Some(data) = self.data.as_mut() {
            data.events.push(Event::new(name, timestamp, attributes));
        }
    }

    /// Set the status. Only upgrades are applied: `Unset` never replaces
    /// anything and `Ok` is final.
    pub fn set_status(&mut self, status: Status) {
        if let Some(data) = self.data.as_mut() {
            if status > data.status {
                data.status = status;
            }
        }
    }

    /// Update the operation name. No-op after end.
    pub fn update_name(&mut self, name: impl Into<Cow<'static, str>>) {
        if let Some(data) = self.data.as_mut() {
            data.name = name.into();
        }
    }

    /// End the span with the current time.
    pub fn end(&mut self) {
        self.end_with_timestamp(SystemTime::now());
    }

    /// End the span with the given timestamp.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        // Takes the data, so a second end finds nothing to do.
        if let Some(mut data) = self.data.take() {
            data.end_time = timestamp;
            self.tracer.on_span_end(data);
        }
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        if self.data.is_some() {
            self.end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_order_only_upgrades() {
        assert!(Status::error("boom") > Status::Unset);
        assert!(Status::Ok > Status::error("boom"));
        assert!(!(Status::Unset > Status::error("boom")));
        // Two errors compare equal in priority, so a later error does not
        // replace an earlier one.
        assert!(!(Status::error("b") > Status::error("a")));
    }
}
