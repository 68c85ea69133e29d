//! Resource: an immutable set of attributes describing the reporting process.
//!
//! Resources are produced outside the pipeline (by detection code or manual
//! configuration) and supplied at construction of the tracer and metrics
//! reader; every exported span and metric batch carries the resource of the
//! pipeline that produced it.

use crate::{Key, KeyValue, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// An immutable representation of the entity producing telemetry as attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resource {
    attrs: Arc<HashMap<Key, Value>>,
}

impl Resource {
    /// A resource with no attributes.
    pub fn empty() -> Self {
        Resource::default()
    }

    /// Create a resource from the given key-value pairs. Later values win on
    /// duplicate keys.
    pub fn new<T: IntoIterator<Item = KeyValue>>(kvs: T) -> Self {
        let mut attrs = HashMap::new();
        for kv in kvs {
            attrs.insert(kv.key, kv.value);
        }
        Resource { attrs: Arc::new(attrs) }
    }

    /// Start building a resource.
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder { attrs: Vec::new() }
    }

    /// Retrieve the attribute value for the given key, if present.
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Iterate over the resource attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.attrs.iter()
    }

    /// Number of attributes in this resource.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Whether the resource carries no attributes.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

/// Builder for [`Resource`].
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    attrs: Vec<KeyValue>,
}

impl ResourceBuilder {
    /// Add the conventional `service.name` attribute.
    pub fn with_service_name(self, name: impl Into<Value>) -> Self {
        self.with_attribute(KeyValue {
            key: Key::from_static_str("service.name"),
            value: name.into(),
        })
    }

    /// Add a single attribute.
    pub fn with_attribute(mut self, kv: KeyValue) -> Self {
        self.attrs.push(kv);
        self
    }

    /// Add multiple attributes.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, kvs: T) -> Self {
        self.attrs.extend(kvs);
        self
    }

    /// Create the [`Resource`].
    pub fn build(self) -> Resource {
        Resource::new(self.attrs)
    }
}
