//! Serialized map keys and values.
//!
//! Map operations return values in the cluster's serialized form: a 4-byte
//! partition hash, a 4-byte type id (both big-endian) and the payload. Only
//! the primitive encodings are decoded here. Generic records (the compact
//! format) and every other encoding render as a placeholder; there is no
//! schema service in this client to resolve them.

use std::fmt;

const HEADER_SIZE: usize = 8;

const TYPE_NULL: i32 = 0;
const TYPE_BOOLEAN: i32 = -4;
const TYPE_INTEGER: i32 = -7;
const TYPE_LONG: i32 = -8;
const TYPE_STRING: i32 = -11;
const TYPE_COMPACT: i32 = -55;
const TYPE_COMPACT_WITH_SCHEMA: i32 = -56;
const TYPE_JSON: i32 = -130;

/// A serialized value as received from the cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct Data(Vec<u8>);

impl Data {
    /// Wrap raw serialized bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Serialize a string the way the cluster does.
    pub fn from_string(value: &str) -> Self {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + 4 + value.len());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&TYPE_STRING.to_be_bytes());
        bytes.extend_from_slice(&(value.len() as i32).to_be_bytes());
        bytes.extend_from_slice(value.as_bytes());
        Self(bytes)
    }

    /// Serialize a long the way the cluster does.
    pub fn from_long(value: i64) -> Self {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + 8);
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&TYPE_LONG.to_be_bytes());
        bytes.extend_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Serializer type id, or the null type for empty data.
    pub fn type_id(&self) -> i32 {
        match self.0.get(4..HEADER_SIZE) {
            Some(b) => i32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            None => TYPE_NULL,
        }
    }

    /// Payload after the header.
    pub fn payload(&self) -> &[u8] {
        self.0.get(HEADER_SIZE..).unwrap_or_default()
    }

    /// Decode into a printable value.
    pub fn decode(&self) -> RecordValue {
        let payload = self.payload();
        let unsupported = || RecordValue::Unsupported { type_id: self.type_id(), len: payload.len() };

        match self.type_id() {
            TYPE_NULL => RecordValue::Null,
            TYPE_BOOLEAN => payload.first().map_or_else(unsupported, |b| RecordValue::Boolean(*b != 0)),
            TYPE_INTEGER => be_array::<4>(payload)
                .map_or_else(unsupported, |b| RecordValue::Integer(i32::from_be_bytes(b))),
            TYPE_LONG => be_array::<8>(payload)
                .map_or_else(unsupported, |b| RecordValue::Long(i64::from_be_bytes(b))),
            TYPE_STRING => read_string(payload).map_or_else(unsupported, RecordValue::Text),
            TYPE_JSON => read_string(payload).map_or_else(unsupported, RecordValue::Json),
            TYPE_COMPACT | TYPE_COMPACT_WITH_SCHEMA => {
                RecordValue::GenericRecord { len: payload.len() }
            }
            _ => unsupported(),
        }
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data").field("type_id", &self.type_id()).field("len", &self.0.len()).finish()
    }
}

fn be_array<const N: usize>(payload: &[u8]) -> Option<[u8; N]> {
    payload.get(..N)?.try_into().ok()
}

fn read_string(payload: &[u8]) -> Option<String> {
    let len = i32::from_be_bytes(be_array::<4>(payload)?);
    if len < 0 {
        return None;
    }
    let bytes = payload.get(4..4 + len as usize)?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// A map key or value in degraded, printable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordValue {
    /// Serialized null
    Null,
    /// Boolean
    Boolean(bool),
    /// 32-bit integer
    Integer(i32),
    /// 64-bit integer
    Long(i64),
    /// String
    Text(String),
    /// JSON document
    Json(String),
    /// Generic record (compact format), not decoded
    GenericRecord {
        /// Payload size in bytes
        len: usize,
    },
    /// Any other serializer
    Unsupported {
        /// Serializer type id
        type_id: i32,
        /// Payload size in bytes
        len: usize,
    },
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Long(n) => write!(f, "{n}"),
            Self::Text(s) | Self::Json(s) => f.write_str(s),
            Self::GenericRecord { len } => write!(f, "<generic record, {len} bytes>"),
            Self::Unsupported { type_id, len } => {
                write!(f, "<unsupported type {type_id}, {len} bytes>")
            }
        }
    }
}
