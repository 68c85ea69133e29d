//! The W3C `traceparent` / `tracestate` propagator.

use crate::propagation::{Extractor, Injector, TextMapPropagator};
use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;
const TRACEPARENT_HEADER: &str = "traceparent";
const TRACESTATE_HEADER: &str = "tracestate";

const TRACE_CONTEXT_HEADER_FIELDS: [&str; 2] = [TRACEPARENT_HEADER, TRACESTATE_HEADER];

/// Propagates span identity using the
/// [W3C TraceContext](https://www.w3.org/TR/trace-context/) format.
///
/// A `traceparent` header looks like
/// `00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01`: version, trace
/// id, parent span id, and flags, all lowercase hex. Extracted contexts are
/// marked remote; anything malformed extracts as `None` so tracing degrades
/// to a new root rather than failing the request.
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Create a new `TraceContextPropagator`.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    fn extract_span_context(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let header_value = extractor.get(TRACEPARENT_HEADER).map(str::trim).ok_or(())?;
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        // Ensure parts are not out of range.
        if parts.len() < 4 {
            return Err(());
        }

        // Ensure version is within range, for version 0 there must be 4 parts.
        let version: u8 = u8::from_str_radix(parts[0], 16).map_err(|_| ())?;
        if version > MAX_VERSION || (version == 0 && parts.len() != 4) {
            return Err(());
        }

        // Ensure the fields have the right length.
        if parts[0].len() != 2 || parts[1].len() != 32 || parts[2].len() != 16 || parts[3].len() != 2 {
            return Err(());
        }

        // Ensure the hex encodings are lowercase.
        if parts
            .iter()
            .any(|part| part.chars().any(|c| c.is_ascii_uppercase()))
        {
            return Err(());
        }

        // Parse trace id section
        let trace_id = TraceId::from_hex(parts[1]).map_err(|_| ())?;

        // Parse span id section
        let span_id = SpanId::from_hex(parts[2]).map_err(|_| ())?;

        // Parse trace flags section
        let opts = u8::from_str_radix(parts[3], 16).map_err(|_| ())?;

        // Ensure opts are valid for version 0
        if version == 0 && opts > 2 {
            return Err(());
        }

        // Build trace flags, clearing all flags other than the trace-context
        // supported sampling bit.
        let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        let trace_state = extractor
            .get(TRACESTATE_HEADER)
            .and_then(|state| state.parse::<TraceState>().ok())
            .unwrap_or_default();

        // create context
        let span_context = SpanContext::new(trace_id, span_id, trace_flags, true, trace_state);

        // Ensure span is valid
        if !span_context.is_valid() {
            return Err(());
        }

        Ok(span_context)
    }
}

impl TextMapPropagator for TraceContextPropagator {
    /// Writes the `traceparent` and `tracestate` headers for a valid span
    /// context; writes nothing for an invalid one.
    fn inject(&self, span_context: &SpanContext, injector: &mut dyn Injector) {
        if !span_context.is_valid() {
            return;
        }

        let header_value = format!(
            "{:02x}-{}-{}-{:02x}",
            SUPPORTED_VERSION,
            span_context.trace_id(),
            span_context.span_id(),
            span_context.trace_flags() & TraceFlags::SAMPLED,
        );
        injector.set(TRACEPARENT_HEADER, header_value);
        injector.set(TRACESTATE_HEADER, span_context.trace_state().header());
    }

    /// Reads a remote span context from the carrier; `None` when the
    /// `traceparent` header is absent or malformed.
    fn extract(&self, extractor: &dyn Extractor) -> Option<SpanContext> {
        self.extract_span_context(extractor).ok()
    }

    fn fields(&self) -> &[&'static str] {
        &TRACE_CONTEXT_HEADER_FIELDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn extract_data() -> Vec<(&'static str, &'static str, SpanContext)> {
        vec![
            (
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00",
                "foo=bar",
                SpanContext::new(
                    TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
                    SpanId::from_hex("00f067aa0ba902b7").unwrap(),
                    TraceFlags::default(),
                    true,
                    "foo=bar".parse().unwrap(),
                ),
            ),
            (
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
                "foo=bar",
                SpanContext::new(
                    TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
                    SpanId::from_hex("00f067aa0ba902b7").unwrap(),
                    TraceFlags::SAMPLED,
                    true,
                    "foo=bar".parse().unwrap(),
                ),
            ),
            (
                "02-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-what-the-future-will-be-like",
                "foo=bar",
                SpanContext::new(
                    TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
                    SpanId::from_hex("00f067aa0ba902b7").unwrap(),
                    TraceFlags::SAMPLED,
                    true,
                    "foo=bar".parse().unwrap(),
                ),
            ),
        ]
    }

    fn extract_data_invalid() -> Vec<(&'static str, &'static str)> {
        vec![
            ("0000-00000000000000000000000000000000-0000000000000000-00", "wrong version length"),
            ("00-ab00000000000000000000000000000000-cd00000000000000-01", "wrong trace ID length"),
            ("00-ab000000000000000000000000000000-cd0000000000000000-01", "wrong span ID length"),
            ("00-ab000000000000000000000000000000-cd00000000000000-0100", "wrong trace flag length"),
            ("qw-00000000000000000000000000000000-cd00000000000000-01", "bogus version"),
            ("00-qw000000000000000000000000000000-cd00000000000000-01", "bogus trace ID"),
            ("00-ab000000000000000000000000000000-qw00000000000000-01", "bogus span ID"),
            ("00-ab000000000000000000000000000000-cd00000000000000-qw", "bogus trace flag"),
            ("A0-00000000000000000000000000000000-0000000000000000-01", "upper case version"),
            ("00-AB000000000000000000000000000000-cd00000000000000-01", "upper case trace ID"),
            ("00-ab000000000000000000000000000000-CD00000000000000-01", "upper case span ID"),
            ("00-ab000000000000000000000000000000-cd00000000000000-A1", "upper case trace flag"),
            ("00-00000000000000000000000000000000-0000000000000000-01", "zero trace ID and span ID"),
            ("00-ab000000000000000000000000000000-cd00000000000000-09", "bogus trace flag"),
            ("01-ab000000000000000000000000000000-cd00000000000000-what-the-future-will-be-like", "missing options"),
            ("00-ab000000000000000000000000000000-cd00000000000000-01-wrong-trailing", "trailing data in version 0"),
        ]
    }

    fn inject_data() -> Vec<(&'static str, &'static str, SpanContext)> {
        vec![
            (
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
                "foo=bar",
                SpanContext::new(
                    TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
                    SpanId::from_hex("00f067aa0ba902b7").unwrap(),
                    TraceFlags::SAMPLED,
                    true,
                    "foo=bar".parse().unwrap(),
                ),
            ),
            (
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00",
                "foo=bar",
                SpanContext::new(
                    TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
                    SpanId::from_hex("00f067aa0ba902b7").unwrap(),
                    TraceFlags::default(),
                    true,
                    "foo=bar".parse().unwrap(),
                ),
            ),
            (
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
                "",
                SpanContext::new(
                    TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
                    SpanId::from_hex("00f067aa0ba902b7").unwrap(),
                    // Other bits of the flags byte are not propagated.
                    TraceFlags::new(0xff),
                    true,
                    TraceState::default(),
                ),
            ),
        ]
    }

    #[test]
    fn extract_w3c() {
        let propagator = TraceContextPropagator::new();

        for (trace_parent, trace_state, expected_context) in extract_data() {
            let mut extractor = HashMap::new();
            extractor.insert(TRACEPARENT_HEADER.to_string(), trace_parent.to_string());
            extractor.insert(TRACESTATE_HEADER.to_string(), trace_state.to_string());

            assert_eq!(propagator.extract(&extractor), Some(expected_context));
        }
    }

    #[test]
    fn extract_w3c_tracestate() {
        let propagator = TraceContextPropagator::new();
        let state = "foo=bar".to_string();
        let parent = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string();

        let mut extractor = HashMap::new();
        extractor.insert(TRACEPARENT_HEADER.to_string(), parent);
        extractor.insert(TRACESTATE_HEADER.to_string(), state.clone());

        let context = propagator.extract(&extractor).expect("valid context");
        assert_eq!(context.trace_state().header(), state);
        assert!(context.is_remote());
    }

    #[test]
    fn extract_w3c_reject_invalid() {
        let propagator = TraceContextPropagator::new();

        for (invalid_header, reason) in extract_data_invalid() {
            let mut extractor = HashMap::new();
            extractor.insert(TRACEPARENT_HEADER.to_string(), invalid_header.to_string());

            assert_eq!(propagator.extract(&extractor), None, "{reason}");
        }
    }

    #[test]
    fn inject_w3c() {
        let propagator = TraceContextPropagator::new();

        for (expected_trace_parent, expected_trace_state, context) in inject_data() {
            let mut injector = HashMap::new();
            propagator.inject(&context, &mut injector);

            assert_eq!(
                Extractor::get(&injector, TRACEPARENT_HEADER).unwrap_or(""),
                expected_trace_parent
            );
            assert_eq!(
                Extractor::get(&injector, TRACESTATE_HEADER).unwrap_or(""),
                expected_trace_state
            );
        }
    }

    #[test]
    fn inject_w3c_skips_invalid_context() {
        let propagator = TraceContextPropagator::new();
        let mut injector = HashMap::new();
        propagator.inject(&SpanContext::empty_context(), &mut injector);
        assert!(injector.is_empty());
    }

    #[test]
    fn round_trip_preserves_identity() {
        let propagator = TraceContextPropagator::new();
        let context = SpanContext::new(
            TraceId::from(0x4bf9_2f35_77b3_4da6_a3ce_929d_0e0e_4736_u128),
            SpanId::from(0x00f0_67aa_0ba9_02b7_u64),
            TraceFlags::SAMPLED,
            false,
            TraceState::from_key_value(vec![("foo", "bar")]).unwrap(),
        );

        let mut carrier = HashMap::new();
        propagator.inject(&context, &mut carrier);
        let extracted = propagator.extract(&carrier).expect("valid context");

        assert_eq!(extracted.trace_id(), context.trace_id());
        assert_eq!(extracted.span_id(), context.span_id());
        assert_eq!(extracted.trace_flags(), context.trace_flags());
        assert_eq!(extracted.trace_state(), context.trace_state());
        assert!(extracted.is_remote());
    }
}
