//! Sampling decisions made at span creation time.
//!
//! Samplers run before a span exists, so they receive the would-be span's
//! identity and metadata directly instead of a span reference. Their decision
//! controls both whether the span records data locally and whether the
//! sampled flag is set on the wire.

use crate::trace::{SpanContext, SpanKind, TraceId, TraceState};
use crate::KeyValue;
use std::fmt;

/// The decision produced by a [`ShouldSample`] implementation.
#[derive(Clone, Debug, PartialEq, Eq, Copy)]
pub enum SamplingDecision {
    /// The span is neither recorded nor exported.
    Drop,
    /// The span is recorded locally but the sampled flag stays unset, so it
    /// is never handed to processors.
    RecordOnly,
    /// The span is recorded and the sampled flag is set; it will be exported.
    RecordAndSample,
}

/// The result of a sampling decision.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingResult {
    /// The sampling decision for the span in question.
    pub decision: SamplingDecision,
    /// Extra attributes the sampler wants added to the span.
    pub attributes: Vec<KeyValue>,
    /// The trace state to be used for the span, usually the parent's.
    pub trace_state: TraceState,
}

/// The interface for plugging custom sampling into span creation.
///
/// `parent` is the context the new span descends from, `None` for root spans.
/// Spans in this crate carry no links to other traces, so the decision inputs
/// end at the initial attributes.
pub trait ShouldSample: CloneShouldSample + Send + Sync + fmt::Debug {
    /// Returns the [`SamplingDecision`] for a span to be created.
    fn should_sample(
        &self,
        parent: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
    ) -> SamplingResult;
}

/// Helper so `Box<dyn ShouldSample>` can be cloned when tracer state is shared.
pub trait CloneShouldSample {
    /// Clone into a new boxed trait object.
    fn box_clone(&self) -> Box<dyn ShouldSample>;
}

impl<T> CloneShouldSample for T
where
    T: ShouldSample + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn ShouldSample> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ShouldSample> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Built-in samplers.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Always sample the trace.
    AlwaysOn,
    /// Never sample the trace.
    AlwaysOff,
    /// Respect the parent span's sampling decision, falling back to the
    /// delegate sampler for root spans.
    ParentBased(Box<dyn ShouldSample>),
    /// Sample a given fraction of traces, deterministically in the trace id
    /// so all spans of one trace share the decision. Fractions >= 1 always
    /// sample.
    TraceIdRatioBased(f64),
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
    ) -> SamplingResult {
        let decision = match self {
            Sampler::AlwaysOn => SamplingDecision::RecordAndSample,
            Sampler::AlwaysOff => SamplingDecision::Drop,
            Sampler::ParentBased(delegate) => match parent {
                Some(parent_context) if parent_context.is_valid() => {
                    if parent_context.is_sampled() {
                        SamplingDecision::RecordAndSample
                    } else {
                        SamplingDecision::Drop
                    }
                }
                _ => {
                    return delegate.should_sample(parent, trace_id, name, span_kind, attributes);
                }
            },
            Sampler::TraceIdRatioBased(prob) => {
                if *prob >= 1.0 {
                    SamplingDecision::RecordAndSample
                } else {
                    let prob_upper_bound = (prob.max(0.0) * (1u64 << 63) as f64) as u64;
                    // The lower 64 bits of the trace id, shifted so the
                    // comparison stays within the 63-bit threshold space.
                    let bytes = trace_id.to_bytes();
                    let (_, low) = bytes.split_at(8);
                    let trace_id_low = u64::from_be_bytes(low.try_into().unwrap());
                    let rnd_from_trace_id = trace_id_low >> 1;

                    if rnd_from_trace_id < prob_upper_bound {
                        SamplingDecision::RecordAndSample
                    } else {
                        SamplingDecision::Drop
                    }
                }
            }
        };

        SamplingResult {
            decision,
            attributes: Vec::new(),
            trace_state: match parent {
                Some(ctx) => ctx.trace_state().clone(),
                None => TraceState::default(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{RandomIdGenerator, IdGenerator, SpanId, TraceFlags};

    fn sampled_parent(sampled: bool) -> SpanContext {
        SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(1u64),
            TraceFlags::default().with_sampled(sampled),
            true,
            TraceState::default(),
        )
    }

    fn sample(sampler: &Sampler, parent: Option<&SpanContext>, trace_id: TraceId) -> SamplingDecision {
        sampler
            .should_sample(parent, trace_id, "test", &SpanKind::Internal, &[])
            .decision
    }

    #[test]
    fn always_on_and_off() {
        let id = TraceId::from(0x1234_u128);
        assert_eq!(sample(&Sampler::AlwaysOn, None, id), SamplingDecision::RecordAndSample);
        assert_eq!(sample(&Sampler::AlwaysOff, None, id), SamplingDecision::Drop);
    }

    #[test]
    fn parent_based_follows_parent() {
        let sampler = Sampler::ParentBased(Box::new(Sampler::AlwaysOff));
        let id = TraceId::from(0x1234_u128);

        assert_eq!(
            sample(&sampler, Some(&sampled_parent(true)), id),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(
            sample(&sampler, Some(&sampled_parent(false)), id),
            SamplingDecision::Drop
        );
        // Root spans defer to the delegate.
        assert_eq!(sample(&sampler, None, id), SamplingDecision::Drop);
    }

    #[test]
    fn ratio_sampler_is_deterministic_in_trace_id() {
        let sampler = Sampler::TraceIdRatioBased(0.5);
        let generator = RandomIdGenerator::default();
        for _ in 0..32 {
            let trace_id = generator.new_trace_id();
            let first = sample(&sampler, None, trace_id);
            for _ in 0..8 {
                assert_eq!(sample(&sampler, None, trace_id), first);
            }
        }
    }

    #[test]
    fn ratio_sampler_extremes() {
        let id = TraceId::from(u128::MAX);
        assert_eq!(
            sample(&Sampler::TraceIdRatioBased(1.0), None, id),
            SamplingDecision::RecordAndSample
        );
        assert_eq!(sample(&Sampler::TraceIdRatioBased(0.0), None, id), SamplingDecision::Drop);
    }

    #[test]
    fn ratio_sampler_converges() {
        let generator = RandomIdGenerator::default();
        for &prob in &[0.01, 0.1, 0.5, 0.9] {
            let sampler = Sampler::TraceIdRatioBased(prob);
            let total = 10_000;
            let sampled = (0..total)
                .filter(|_| {
                    sample(&sampler, None, generator.new_trace_id()) == SamplingDecision::RecordAndSample
                })
                .count();

            // Binomial confidence interval, z chosen so the test flakes less
            // than one time in a million runs.
            let tolerance = 4.75342 * (prob * (1.0 - prob) / total as f64).sqrt();
            let observed = sampled as f64 / total as f64;
            assert!(
                (observed - prob).abs() <= tolerance,
                "prob {prob}: observed {observed} outside tolerance {tolerance}"
            );
        }
    }
}
