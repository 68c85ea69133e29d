//! Common attribute types shared by the trace and metrics pipelines.

use std::borrow::Cow;
use std::fmt;

/// The key part of attribute [`KeyValue`] pairs.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Cow<'static, str>);

impl Key {
    /// Create a new `Key`.
    pub fn new(value: impl Into<Cow<'static, str>>) -> Self {
        Key(value.into())
    }

    /// Create a new const `Key`.
    pub const fn from_static_str(value: &'static str) -> Self {
        Key(Cow::Borrowed(value))
    }

    /// Returns a reference to the underlying key name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Key {
    fn from(value: &'static str) -> Self {
        Key(Cow::Borrowed(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key(Cow::Owned(value))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The value part of attribute [`KeyValue`] pairs.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// bool values
    Bool(bool),
    /// i64 values
    I64(i64),
    /// f64 values
    F64(f64),
    /// String values
    String(Cow<'static, str>),
}

impl Value {
    /// String representation of the `Value`, used for canonical attribute keys.
    pub fn as_string(&self) -> String {
        match self {
            Value::Bool(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::F64(v) => v.to_string(),
            Value::String(v) => v.to_string(),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<&'static str> for Value {
    fn from(value: &'static str) -> Self {
        Value::String(Cow::Borrowed(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Cow::Owned(value))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => v.fmt(f),
            Value::I64(v) => v.fmt(f),
            Value::F64(v) => v.fmt(f),
            Value::String(v) => f.write_str(v),
        }
    }
}

/// A key-value pair describing an aspect of a span, metric point, or resource.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    /// The attribute name
    pub key: Key,
    /// The attribute value
    pub value: Value,
}

impl KeyValue {
    /// Create a new `KeyValue` pair.
    pub fn new<K, V>(key: K, value: V) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Information about the library producing telemetry, attached to every span
/// and metric point it emits.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstrumentationScope {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
}

impl Default for InstrumentationScope {
    fn default() -> Self {
        InstrumentationScope {
            name: Cow::Borrowed(""),
            version: None,
        }
    }
}

impl InstrumentationScope {
    /// Create a new builder with the given instrumentation library name.
    pub fn builder(name: impl Into<Cow<'static, str>>) -> InstrumentationScopeBuilder {
        InstrumentationScopeBuilder {
            name: name.into(),
            version: None,
        }
    }

    /// The instrumentation library name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The instrumentation library version, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

/// Configuration options for [`InstrumentationScope`].
#[derive(Debug)]
pub struct InstrumentationScopeBuilder {
    name: Cow<'static, str>,
    version: Option<Cow<'static, str>>,
}

impl InstrumentationScopeBuilder {
    /// Configure the version of the instrumentation library.
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Create the [`InstrumentationScope`] from this builder.
    pub fn build(self) -> InstrumentationScope {
        InstrumentationScope {
            name: self.name,
            version: self.version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_conversions() {
        let kv = KeyValue::new("enabled", true);
        assert_eq!(kv.key.as_str(), "enabled");
        assert_eq!(kv.value, Value::Bool(true));

        let kv = KeyValue::new("count".to_string(), 42_i64);
        assert_eq!(kv.value.as_string(), "42");

        let kv = KeyValue::new("ratio", 0.5);
        assert_eq!(kv.value, Value::F64(0.5));
    }

    #[test]
    fn scope_builder() {
        let scope = InstrumentationScope::builder("otelkit").with_version("0.1.0").build();
        assert_eq!(scope.name(), "otelkit");
        assert_eq!(scope.version(), Some("0.1.0"));

        let default = InstrumentationScope::default();
        assert_eq!(default.name(), "");
        assert!(default.version().is_none());
    }
}
