//! Immutable span identity: trace/span ids, flags, and W3C trace state.

use std::collections::VecDeque;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use thiserror::Error;

/// A 16-byte value which identifies a given trace.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// Invalid trace id, all zeroes.
    pub const INVALID: TraceId = TraceId(0);

    /// Construct a `TraceId` from its representation as a byte array in big endian.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        TraceId(u128::from_be_bytes(bytes))
    }

    /// Return the representation of this `TraceId` as a byte array in big endian.
    pub const fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a trace id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u128::from_str_radix(hex, 16).map(TraceId)
    }

    /// Whether this id contains at least one non-zero byte.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<u128> for TraceId {
    fn from(value: u128) -> Self {
        TraceId(value)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:032x}", self.0))
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// An 8-byte value which identifies a given span.
///
/// The id is valid if it contains at least one non-zero byte.
#[derive(Clone, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// Invalid span id, all zeroes.
    pub const INVALID: SpanId = SpanId(0);

    /// Construct a `SpanId` from its representation as a byte array in big endian.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        SpanId(u64::from_be_bytes(bytes))
    }

    /// Return the representation of this `SpanId` as a byte array in big endian.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to a span id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(hex, 16).map(SpanId)
    }

    /// Whether this id contains at least one non-zero byte.
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl From<u64> for SpanId {
    fn from(value: u64) -> Self {
        SpanId(value)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Flags that can be set on a [`SpanContext`].
///
/// Only the sampling bit of the W3C trace context flags byte is interpreted;
/// the remaining bits are carried through unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash, PartialOrd, Ord)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// Trace flags with the sampled flag set.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Trace flags with the sampled flag cleared.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);

    /// Construct new trace flags.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Returns `true` if the sampled flag is set.
    pub fn is_sampled(&self) -> bool {
        (self.0 & TraceFlags::SAMPLED.0) == TraceFlags::SAMPLED.0
    }

    /// Returns a copy of these flags with the sampled flag set.
    pub fn with_sampled(&self, sampled: bool) -> Self {
        if sampled {
            TraceFlags(self.0 | TraceFlags::SAMPLED.0)
        } else {
            TraceFlags(self.0 & !TraceFlags::SAMPLED.0)
        }
    }

    /// The flags byte.
    pub fn to_u8(self) -> u8 {
        self.0
    }
}

impl std::ops::BitAnd for TraceFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl std::ops::BitOr for TraceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl fmt::LowerHex for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Error returned by operations on [`TraceState`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceStateError {
    /// The key is invalid per the W3C `tracestate` grammar.
    #[error("{0} is not a valid tracestate key")]
    Key(String),

    /// The value is invalid per the W3C `tracestate` grammar.
    #[error("{0} is not a valid tracestate value")]
    Value(String),
}

/// Vendor-specific trace identification data carried alongside a trace.
///
/// Stored as an ordered list of key-value pairs; updates move the touched key
/// to the front as the W3C spec requires.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceState(Option<VecDeque<(String, String)>>);

impl TraceState {
    /// The default, empty trace state.
    pub const NONE: TraceState = TraceState(None);

    /// Validates that the given `TraceState` list-member key is valid per the
    /// [W3C spec](https://www.w3.org/TR/trace-context/#key).
    ///
    /// A key is either a plain identifier or, for multi-tenant vendors, a
    /// `tenant@system` pair where the system part is at most 14 characters.
    fn valid_key(key: &str) -> bool {
        fn valid_ident(ident: &str, max_len: usize, digit_start: bool) -> bool {
            let bytes = ident.as_bytes();
            let head_ok = match bytes.first() {
                Some(&b) => b.is_ascii_lowercase() || (digit_start && b.is_ascii_digit()),
                None => return false,
            };
            head_ok
                && bytes.len() <= max_len
                && bytes[1..].iter().all(|&b| {
                    b.is_ascii_lowercase()
                        || b.is_ascii_digit()
                        || matches!(b, b'_' | b'-' | b'*' | b'/')
                })
        }

        if key.len() > 256 {
            return false;
        }
        match key.split_once('@') {
            Some((tenant, system)) => {
                !system.contains('@')
                    && valid_ident(tenant, 241, true)
                    && valid_ident(system, 14, false)
            }
            None => valid_ident(key, 256, true),
        }
    }

    /// Validates that the given `TraceState` list-member value is valid per the
    /// [W3C spec](https://www.w3.org/TR/trace-context/#value).
    fn valid_value(value: &str) -> bool {
        if value.len() > 256 {
            return false;
        }

        !(value.contains(',') || value.contains('='))
    }

    /// Creates a `TraceState` from the given key-value collection.
    pub fn from_key_value<T, K, V>(trace_state: T) -> Result<Self, TraceStateError>
    where
        T: IntoIterator<Item = (K, V)>,
        K: ToString,
        V: ToString,
    {
        let ordered_data = trace_state
            .into_iter()
            .map(|(key, value)| {
                let (key, value) = (key.to_string(), value.to_string());
                if !TraceState::valid_key(key.as_str()) {
                    return Err(TraceStateError::Key(key));
                }
                if !TraceState::valid_value(value.as_str()) {
                    return Err(TraceStateError::Value(value));
                }

                Ok((key, value))
            })
            .collect::<Result<VecDeque<_>, TraceStateError>>()?;

        if ordered_data.is_empty() {
            Ok(TraceState(None))
        } else {
            Ok(TraceState(Some(ordered_data)))
        }
    }

    /// Retrieves a value for a given key from the `TraceState` if it exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.as_ref().and_then(|kvs| {
            kvs.iter()
                .find(|(entry_key, _)| entry_key == key)
                .map(|(_, value)| value.as_str())
        })
    }

    /// Returns a copy of the current `TraceState` that contains the new
    /// key-value pair, moved to the front of the list.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) -> Result<TraceState, TraceStateError> {
        let (key, value) = (key.into(), value.into());
        if !TraceState::valid_key(key.as_str()) {
            return Err(TraceStateError::Key(key));
        }
        if !TraceState::valid_value(value.as_str()) {
            return Err(TraceStateError::Value(value));
        }

        let mut trace_state = self.delete_from_deque(&key);
        let kvs = trace_state.0.get_or_insert(VecDeque::with_capacity(1));
        kvs.push_front((key, value));

        Ok(trace_state)
    }

    /// Returns a copy of the current `TraceState` with the given key removed.
    pub fn delete(&self, key: &str) -> Result<TraceState, TraceStateError> {
        if !TraceState::valid_key(key) {
            return Err(TraceStateError::Key(key.to_string()));
        }

        Ok(self.delete_from_deque(key))
    }

    fn delete_from_deque(&self, key: &str) -> TraceState {
        let mut copy = self.clone();
        if let Some(kvs) = copy.0.as_mut() {
            if let Some(index) = kvs.iter().position(|(entry_key, _)| entry_key == key) {
                kvs.remove(index);
            }
        }
        copy
    }

    /// Creates a new `TraceState` header string, delimiting each key-value
    /// pair with a `,`.
    pub fn header(&self) -> String {
        self.header_delimited("=", ",")
    }

    /// Creates a new `TraceState` header string with the given delimiters.
    pub fn header_delimited(&self, entry_delimiter: &str, list_delimiter: &str) -> String {
        self.0
            .as_ref()
            .map(|kvs| {
                kvs.iter()
                    .map(|(key, value)| format!("{key}{entry_delimiter}{value}"))
                    .collect::<Vec<String>>()
                    .join(list_delimiter)
            })
            .unwrap_or_default()
    }
}

impl FromStr for TraceState {
    type Err = TraceStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let list_members: Vec<&str> = s.split_terminator(',').map(str::trim).collect();
        let mut key_value_pairs: Vec<(String, String)> = Vec::with_capacity(list_members.len());

        for list_member in list_members {
            match list_member.find('=') {
                None => return Err(TraceStateError::Value(list_member.to_string())),
                Some(separator_index) => {
                    let (key, value) = list_member.split_at(separator_index);
                    key_value_pairs.push((key.to_string(), value.trim_start_matches('=').to_string()));
                }
            }
        }

        TraceState::from_key_value(key_value_pairs)
    }
}

/// The portion of a span bound to the wire format: identity, sampling
/// decision, remote origin, and vendor trace state.
///
/// Spans store one of these; propagators serialize and deserialize them.
#[derive(Clone, Debug, PartialEq, Hash, Eq)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
    trace_state: TraceState,
}

impl SpanContext {
    /// An invalid span context, used as the parent of root spans.
    pub fn empty_context() -> Self {
        SpanContext::new(
            TraceId::INVALID,
            SpanId::INVALID,
            TraceFlags::default(),
            false,
            TraceState::default(),
        )
    }

    /// Construct a new `SpanContext`.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: TraceFlags,
        is_remote: bool,
        trace_state: TraceState,
    ) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
            trace_state,
        }
    }

    /// The trace id of this context.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The span id of this context.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The flags of this context.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Whether this context was received from a remote peer rather than
    /// created locally.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Whether the sampled flag is set.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// The vendor trace state of this context.
    pub fn trace_state(&self) -> &TraceState {
        &self.trace_state
    }

    /// Whether both trace id and span id contain at least one non-zero byte.
    pub fn is_valid(&self) -> bool {
        self.trace_id.is_valid() && self.span_id.is_valid()
    }
}
