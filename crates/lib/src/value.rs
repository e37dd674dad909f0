//! Plain values carried by documents.
//!
//! This module provides the [`Value`] enum, the leaf data that can be stored in a
//! map slot or an array element without becoming a binding of its own. Nested
//! [`Value::List`] and [`Value::Record`] values are opaque to the engine: they are
//! replaced wholesale, never addressed by key path.
//!
//! Typed numeric buffers ([`TypedBuffer`]) are atomic leaves. The codec never
//! descends into them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::doc::CrdtError;

/// Element type of a [`TypedBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferKind {
    U8,
    U16,
    U32,
    I8,
    I16,
    I32,
    F32,
    F64,
}

impl BufferKind {
    /// Width of one element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            BufferKind::U8 | BufferKind::I8 => 1,
            BufferKind::U16 | BufferKind::I16 => 2,
            BufferKind::U32 | BufferKind::I32 | BufferKind::F32 => 4,
            BufferKind::F64 => 8,
        }
    }
}

/// A typed numeric buffer, stored as little-endian bytes.
///
/// # Examples
///
/// ```
/// use zdoc::value::{BufferKind, TypedBuffer};
///
/// let buf = TypedBuffer::from_f32(&[1.0, 2.5]);
/// assert_eq!(buf.kind(), BufferKind::F32);
/// assert_eq!(buf.len(), 2);
/// assert_eq!(buf.bytes().len(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedBuffer {
    kind: BufferKind,
    #[serde(with = "serde_bytes")]
    bytes: Vec<u8>,
}

macro_rules! typed_constructor {
    ($name:ident, $ty:ty, $kind:expr) => {
        /// Builds a buffer from a slice of native elements.
        pub fn $name(values: &[$ty]) -> Self {
            let mut bytes = Vec::with_capacity(values.len() * std::mem::size_of::<$ty>());
            for v in values {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            Self { kind: $kind, bytes }
        }
    };
}

impl TypedBuffer {
    typed_constructor!(from_u8, u8, BufferKind::U8);
    typed_constructor!(from_u16, u16, BufferKind::U16);
    typed_constructor!(from_u32, u32, BufferKind::U32);
    typed_constructor!(from_i8, i8, BufferKind::I8);
    typed_constructor!(from_i16, i16, BufferKind::I16);
    typed_constructor!(from_i32, i32, BufferKind::I32);
    typed_constructor!(from_f32, f32, BufferKind::F32);
    typed_constructor!(from_f64, f64, BufferKind::F64);

    /// Wraps raw little-endian bytes. Trailing bytes that do not fill a whole
    /// element are kept but ignored by [`TypedBuffer::len`].
    pub fn from_raw(kind: BufferKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of whole elements in the buffer.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.kind.element_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the elements as a JSON array of numbers.
    pub fn to_json(&self) -> serde_json::Value {
        let size = self.kind.element_size();
        let numbers = self.bytes.chunks_exact(size).map(|c| match self.kind {
            BufferKind::U8 => serde_json::Value::from(c[0]),
            BufferKind::I8 => serde_json::Value::from(c[0] as i8),
            BufferKind::U16 => serde_json::Value::from(u16::from_le_bytes([c[0], c[1]])),
            BufferKind::I16 => serde_json::Value::from(i16::from_le_bytes([c[0], c[1]])),
            BufferKind::U32 => serde_json::Value::from(u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            BufferKind::I32 => serde_json::Value::from(i32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            BufferKind::F32 => float_json(f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64),
            BufferKind::F64 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(c);
                float_json(f64::from_le_bytes(raw))
            }
        });
        serde_json::Value::Array(numbers.collect())
    }
}

fn float_json(f: f64) -> serde_json::Value {
    serde_json::Number::from_f64(f)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Values that can be stored in a map slot or an array element.
///
/// # Direct Comparisons
///
/// ```
/// # use zdoc::Value;
/// let text = Value::Text("hello".to_string());
/// let number = Value::Int(42);
///
/// assert!(text == "hello");
/// assert!(number == 42);
/// assert!(!(number == "hello"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null/empty value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text string value
    Text(String),
    /// Typed numeric buffer
    Buffer(TypedBuffer),
    /// Opaque ordered collection
    List(Vec<Value>),
    /// Opaque keyed record
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Buffer(_) => "buffer",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Integers widen to floats; everything else is `None`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&TypedBuffer> {
        match self {
            Value::Buffer(b) => Some(b),
            _ => None,
        }
    }

    /// Converts to a `serde_json::Value` for display and export.
    ///
    /// Non-finite floats become `null`; buffers become numeric arrays.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => float_json(*f),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Buffer(b) => b.to_json(),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

// Convenient From implementations for common types
impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<TypedBuffer> for Value {
    fn from(value: TypedBuffer) -> Self {
        Value::Buffer(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Record(value)
    }
}

impl TryFrom<&Value> for i64 {
    type Error = CrdtError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        value.as_int().ok_or_else(|| CrdtError::TypeMismatch {
            expected: "int".to_string(),
            actual: value.type_name().to_string(),
        })
    }
}

impl TryFrom<&Value> for String {
    type Error = CrdtError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            _ => Err(CrdtError::TypeMismatch {
                expected: "text".to_string(),
                actual: value.type_name().to_string(),
            }),
        }
    }
}

// PartialEq implementations for comparing Value with other types
impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        matches!(self, Value::Text(s) if s == other)
    }
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl PartialEq<i64> for Value {
    fn eq(&self, other: &i64) -> bool {
        matches!(self, Value::Int(n) if n == other)
    }
}

impl PartialEq<i32> for Value {
    fn eq(&self, other: &i32) -> bool {
        matches!(self, Value::Int(n) if *n == *other as i64)
    }
}

impl PartialEq<bool> for Value {
    fn eq(&self, other: &bool) -> bool {
        matches!(self, Value::Bool(b) if b == other)
    }
}
