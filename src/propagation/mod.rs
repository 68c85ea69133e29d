//! Carrying span identity across process boundaries via text headers.

use crate::trace::SpanContext;
use std::collections::HashMap;
use std::fmt;

mod trace_context;

pub use trace_context::TraceContextPropagator;

/// Injector provides an interface for adding fields to an outgoing carrier,
/// such as an HTTP header map.
pub trait Injector {
    /// Add a key and value to the carrier.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an incoming
/// carrier.
pub trait Extractor {
    /// Get a value for a key from the carrier.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the carrier.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }
}

/// Serializes and deserializes span identity to and from text carriers.
///
/// Extraction never fails loudly: a missing or malformed carrier yields
/// `None` and the caller starts a new root trace.
pub trait TextMapPropagator: Send + Sync + fmt::Debug {
    /// Write the given span context into the carrier.
    fn inject(&self, span_context: &SpanContext, injector: &mut dyn Injector);

    /// Read a span context out of the carrier, marking it remote.
    fn extract(&self, extractor: &dyn Extractor) -> Option<SpanContext>;

    /// The header names this propagator reads and writes.
    fn fields(&self) -> &[&'static str];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_map_get() {
        let mut carrier = HashMap::new();
        carrier.set("headerName", "value".to_string());

        assert_eq!(
            Extractor::get(&carrier, "HEADERNAME"),
            Some("value"),
            "should extract lowercase-normalized values"
        );
    }

    #[test]
    fn hash_map_keys() {
        let mut carrier = HashMap::new();
        carrier.set("headerName1", "value1".to_string());
        carrier.set("headerName2", "value2".to_string());

        let mut keys = Extractor::keys(&carrier);
        keys.sort_unstable();
        assert_eq!(keys, vec!["headername1", "headername2"]);
    }
}
