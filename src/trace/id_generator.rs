//! Interface and default implementation for generating span and trace ids.

use crate::trace::{SpanId, TraceId};
use rand::{rngs, Rng, SeedableRng};
use std::cell::RefCell;
use std::fmt;

/// Interface for generating ids for new spans.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new `TraceId`.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new `SpanId`.
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`] generating random ids from a fast, thread-local
/// non-cryptographic generator.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        CURRENT_RNG.with(|rng| rng.borrow_mut().random::<u128>()).into()
    }

    fn new_span_id(&self) -> SpanId {
        CURRENT_RNG.with(|rng| rng.borrow_mut().random::<u64>()).into()
    }
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<rngs::SmallRng> = RefCell::new(rngs::SmallRng::from_os_rng());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_valid_and_distinct() {
        let generator = RandomIdGenerator::default();
        let trace_ids: Vec<_> = (0..64).map(|_| generator.new_trace_id()).collect();
        let span_ids: Vec<_> = (0..64).map(|_| generator.new_span_id()).collect();

        assert!(trace_ids.iter().all(TraceId::is_valid));
        assert!(span_ids.iter().all(SpanId::is_valid));
        assert_ne!(trace_ids[0], trace_ids[1]);
        assert_ne!(span_ids[0], span_ids[1]);
    }
}
