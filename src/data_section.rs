//! Data section decoding
//!
//! Decodes values stored in the MaxMind DB data section format.
//! Covers every MaxMind DB data type.
//!
//! # Supported Types
//!
//! - **Pointer**: Reference to another value in the same section
//! - **String**: UTF-8 text data
//! - **Double**: 64-bit floating point (IEEE 754)
//! - **Bytes**: Raw byte arrays
//! - **Uint16**: Unsigned 16-bit integers
//! - **Uint32**: Unsigned 32-bit integers
//! - **Map**: Key-value pairs (string keys)
//! - **Int32**: Signed 32-bit integers
//! - **Uint64**: Unsigned 64-bit integers
//! - **Uint128**: Unsigned 128-bit integers
//! - **Array**: Ordered lists of values
//! - **Bool**: Boolean values
//! - **Float**: 32-bit floating point (IEEE 754)
//!
//! # Format
//!
//! Control byte(s) followed by data. The control byte encodes the type
//! (3 bits) and size/payload (5 bits); type 0 means the real type is in
//! the next byte, offset by 7.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::de::ValueDeserializer;
use crate::error::{MmdbError, Result};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Maximum number of pointers followed to reach a value
pub const MAX_POINTER_DEPTH: usize = 512;

/// Maximum nesting depth of maps and arrays
///
/// Decoding recurses once per level through several serde frames, so this
/// stays well below what a 2 MiB thread stack holds in an unoptimised
/// build. Real databases nest a handful of levels.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Data value decoded from the data section
///
/// The generic shape used when the caller has no schema: maps become
/// `HashMap<String, DataValue>` and every scalar keeps its wire type.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map; keys are always strings
    Map(HashMap<String, DataValue>),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// The string, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any unsigned or non-negative integer that fits in a `u64`
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            DataValue::Uint16(n) => Some(n as u64),
            DataValue::Uint32(n) => Some(n as u64),
            DataValue::Uint64(n) => Some(n),
            DataValue::Uint128(n) => u64::try_from(n).ok(),
            DataValue::Int32(n) => u64::try_from(n).ok(),
            _ => None,
        }
    }

    /// Either float type, widened to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            DataValue::Double(n) => Some(n),
            DataValue::Float(n) => Some(n as f64),
            _ => None,
        }
    }

    /// Member of a map value
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        match self {
            DataValue::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Element of an array value
    pub fn index(&self, index: usize) -> Option<&DataValue> {
        match self {
            DataValue::Array(items) => items.get(index),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for DataValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(DataValueVisitor)
    }
}

struct DataValueVisitor;

impl<'de> Visitor<'de> for DataValueVisitor {
    type Value = DataValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any MaxMind DB value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<DataValue, E> {
        Ok(DataValue::Bool(v))
    }

    fn visit_i32<E: de::Error>(self, v: i32) -> std::result::Result<DataValue, E> {
        Ok(DataValue::Int32(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<DataValue, E> {
        if let Ok(n) = i32::try_from(v) {
            Ok(DataValue::Int32(n))
        } else if let Ok(n) = u64::try_from(v) {
            Ok(DataValue::Uint64(n))
        } else {
            Err(E::invalid_value(de::Unexpected::Signed(v), &self))
        }
    }

    fn visit_u16<E: de::Error>(self, v: u16) -> std::result::Result<DataValue, E> {
        Ok(DataValue::Uint16(v))
    }

    fn visit_u32<E: de::Error>(self, v: u32) -> std::result::Result<DataValue, E> {
        Ok(DataValue::Uint32(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<DataValue, E> {
        Ok(DataValue::Uint64(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<DataValue, E> {
        Ok(DataValue::Uint128(v))
    }

    fn visit_f32<E: de::Error>(self, v: f32) -> std::result::Result<DataValue, E> {
        Ok(DataValue::Float(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<DataValue, E> {
        Ok(DataValue::Double(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<DataValue, E> {
        Ok(DataValue::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<DataValue, E> {
        Ok(DataValue::String(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<DataValue, E> {
        Ok(DataValue::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<DataValue, E> {
        Ok(DataValue::Bytes(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<DataValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(DataValue::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<DataValue, A::Error> {
        let mut map = HashMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, DataValue>()? {
            map.insert(key, value);
        }
        Ok(DataValue::Map(map))
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DataValue::String(s) => serializer.serialize_str(s),
            DataValue::Double(n) => serializer.serialize_f64(*n),
            DataValue::Bytes(b) => {
                let mut seq = serializer.serialize_seq(Some(b.len()))?;
                for byte in b {
                    seq.serialize_element(byte)?;
                }
                seq.end()
            }
            DataValue::Uint16(n) => serializer.serialize_u16(*n),
            DataValue::Uint32(n) => serializer.serialize_u32(*n),
            DataValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
            DataValue::Int32(n) => serializer.serialize_i32(*n),
            DataValue::Uint64(n) => serializer.serialize_u64(*n),
            DataValue::Uint128(n) => serializer.serialize_u128(*n),
            DataValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            DataValue::Bool(b) => serializer.serialize_bool(*b),
            DataValue::Float(n) => serializer.serialize_f32(*n),
        }
    }
}

/// Wire type of an encoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Pointer to another value (type 1)
    Pointer,
    /// UTF-8 string (type 2)
    String,
    /// Big-endian IEEE 754 double (type 3)
    Double,
    /// Opaque bytes (type 4)
    Bytes,
    /// Unsigned 16-bit integer (type 5)
    Uint16,
    /// Unsigned 32-bit integer (type 6)
    Uint32,
    /// Map with string keys (type 7)
    Map,
    /// Signed 32-bit integer (type 8)
    Int32,
    /// Unsigned 64-bit integer (type 9)
    Uint64,
    /// Unsigned 128-bit integer (type 10)
    Uint128,
    /// Array (type 11)
    Array,
    /// Data cache container, reserved (type 12)
    Container,
    /// End marker, reserved (type 13)
    EndMarker,
    /// Boolean stored in the size field (type 14)
    Bool,
    /// Big-endian IEEE 754 single (type 15)
    Float,
}

impl DataType {
    fn from_id(id: u8) -> Option<Self> {
        Some(match id {
            1 => DataType::Pointer,
            2 => DataType::String,
            3 => DataType::Double,
            4 => DataType::Bytes,
            5 => DataType::Uint16,
            6 => DataType::Uint32,
            7 => DataType::Map,
            8 => DataType::Int32,
            9 => DataType::Uint64,
            10 => DataType::Uint128,
            11 => DataType::Array,
            12 => DataType::Container,
            13 => DataType::EndMarker,
            14 => DataType::Bool,
            15 => DataType::Float,
            _ => return None,
        })
    }

    /// Name used in error messages
    pub fn name(self) -> &'static str {
        match self {
            DataType::Pointer => "pointer",
            DataType::String => "utf8_string",
            DataType::Double => "double",
            DataType::Bytes => "bytes",
            DataType::Uint16 => "uint16",
            DataType::Uint32 => "uint32",
            DataType::Map => "map",
            DataType::Int32 => "int32",
            DataType::Uint64 => "uint64",
            DataType::Uint128 => "uint128",
            DataType::Array => "array",
            DataType::Container => "data cache container",
            DataType::EndMarker => "end marker",
            DataType::Bool => "boolean",
            DataType::Float => "float",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Control information for a value, with pointers already followed
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub data_type: DataType,
    /// Size field: byte length for scalars, entry count for containers,
    /// the value itself for booleans
    pub size: usize,
    /// Offset of the first payload byte
    pub payload: usize,
    /// Offset of the control byte of the resolved value
    pub start: usize,
    /// Offset just past the first pointer when the value was reached
    /// through one
    pub after_pointer: Option<usize>,
}

impl Header {
    /// Offset following a scalar value
    pub fn scalar_end(&self) -> usize {
        match self.data_type {
            DataType::Bool => self.payload,
            _ => self.payload + self.size,
        }
    }

    /// Offset where decoding continues once the value ending at `end` has
    /// been consumed
    pub fn next(&self, end: usize) -> usize {
        self.after_pointer.unwrap_or(end)
    }
}

/// Data section decoder
///
/// Decodes values from an encoded data section buffer. All offsets are
/// relative to the start of the buffer, which is also the base for
/// pointers. Strings and byte arrays are borrowed from the buffer.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'de> {
    buffer: &'de [u8],
}

impl<'de> Decoder<'de> {
    /// Create a decoder for a data section
    pub fn new(buffer: &'de [u8]) -> Self {
        Self { buffer }
    }

    /// Length of the data section in bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the data section is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bind the value at `offset` into `T`
    pub fn decode<T: Deserialize<'de>>(&self, offset: usize) -> Result<T> {
        self.decode_with_next(offset).map(|(value, _)| value)
    }

    /// Bind the value at `offset` into `T`, also returning the offset of
    /// the next value
    pub fn decode_with_next<T: Deserialize<'de>>(&self, offset: usize) -> Result<(T, usize)> {
        let mut deserializer = ValueDeserializer::new(*self, offset);
        let value = T::deserialize(&mut deserializer)?;
        Ok((value, deserializer.offset()))
    }

    /// Decode the value at `offset` into its generic shape
    pub fn decode_value(&self, offset: usize) -> Result<(DataValue, usize)> {
        self.decode_with_next(offset)
    }

    fn byte(&self, offset: usize) -> Result<u8> {
        self.buffer.get(offset).copied().ok_or_else(|| {
            MmdbError::bad_data(format!("unexpected end of data at offset {}", offset))
        })
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'de [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.buffer.get(offset..end))
            .ok_or_else(|| {
                MmdbError::bad_data(format!(
                    "{} bytes at offset {} exceed the data section",
                    len, offset
                ))
            })
    }

    fn read_be(&self, offset: usize, len: usize) -> Result<usize> {
        Ok(self
            .slice(offset, len)?
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize))
    }

    /// Read the control byte(s) at `offset` without following pointers
    ///
    /// Returns the type, the size field and the offset of the payload.
    /// For pointers the size field is the raw low five bits.
    pub fn decode_control(&self, offset: usize) -> Result<(DataType, usize, usize)> {
        let ctrl = self.byte(offset)?;
        let mut cursor = offset + 1;

        let mut type_id = ctrl >> 5;
        if type_id == 0 {
            let ext = self.byte(cursor)?;
            cursor += 1;
            // Extended types are 8..=15
            if ext == 0 || ext > 8 {
                return Err(MmdbError::bad_data(format!(
                    "invalid extended type {} at offset {}",
                    ext as u16 + 7,
                    offset
                )));
            }
            type_id = ext + 7;
        }
        let data_type = DataType::from_id(type_id).ok_or_else(|| {
            MmdbError::bad_data(format!("unknown type {} at offset {}", type_id, offset))
        })?;

        let size_bits = (ctrl & 0x1f) as usize;
        if data_type == DataType::Pointer {
            return Ok((data_type, size_bits, cursor));
        }

        let (size, cursor) = match size_bits {
            0..=28 => (size_bits, cursor),
            29 => (29 + self.read_be(cursor, 1)?, cursor + 1),
            30 => (285 + self.read_be(cursor, 2)?, cursor + 2),
            _ => (65_821 + self.read_be(cursor, 3)?, cursor + 3),
        };
        Ok((data_type, size, cursor))
    }

    /// Decode the pointer whose low control bits are `size_bits` and whose
    /// payload starts at `cursor`
    ///
    /// Returns the target offset and the offset just after the pointer.
    fn decode_pointer(&self, size_bits: usize, cursor: usize) -> Result<(usize, usize)> {
        let ss = (size_bits >> 3) & 0x3;
        let high = size_bits & 0x7;
        let len = ss + 1;
        let raw = self.read_be(cursor, len)?;

        let target = match ss {
            0 => (high << 8) | raw,
            1 => ((high << 16) | raw) + 2048,
            2 => ((high << 24) | raw) + 526_336,
            _ => raw,
        };
        if target >= self.buffer.len() {
            return Err(MmdbError::bad_data(format!(
                "pointer at offset {} to offset {} is outside the data section",
                cursor - 1,
                target
            )));
        }
        Ok((target, cursor + len))
    }

    /// Follow any pointers at `offset`
    ///
    /// Returns the offset of the pointee and, when at least one pointer was
    /// followed, the offset just after the first pointer.
    pub fn follow_pointers(&self, offset: usize) -> Result<(usize, Option<usize>)> {
        let header = self.header(offset)?;
        Ok((header.start, header.after_pointer))
    }

    pub(crate) fn header(&self, offset: usize) -> Result<Header> {
        let mut current = offset;
        let mut after_pointer = None;

        for _ in 0..=MAX_POINTER_DEPTH {
            let (data_type, size, payload) = self.decode_control(current)?;
            if data_type != DataType::Pointer {
                return Ok(Header {
                    data_type,
                    size,
                    payload,
                    start: current,
                    after_pointer,
                });
            }
            let (target, next) = self.decode_pointer(size, payload)?;
            after_pointer.get_or_insert(next);
            current = target;
        }

        Err(MmdbError::invalid_database(format!(
            "exceeded maximum pointer depth of {} at offset {}",
            MAX_POINTER_DEPTH, offset
        )))
    }

    /// Return the offset immediately after the value at `offset`
    ///
    /// Nothing is materialised. A pointer is stepped over without visiting
    /// its target.
    pub fn skip(&self, offset: usize) -> Result<usize> {
        self.skip_at(offset, 0)
    }

    fn skip_at(&self, offset: usize, depth: usize) -> Result<usize> {
        let header = self.header(offset)?;
        if let Some(next) = header.after_pointer {
            return Ok(next);
        }

        match header.data_type {
            DataType::Map | DataType::Array => {
                check_depth(depth, header.start)?;
                let count = if header.data_type == DataType::Map {
                    header.size * 2
                } else {
                    header.size
                };
                let mut cursor = header.payload;
                for _ in 0..count {
                    cursor = self.skip_at(cursor, depth + 1)?;
                }
                Ok(cursor)
            }
            DataType::Container | DataType::EndMarker => Err(unexpected_type(&header)),
            _ => {
                let end = header.scalar_end();
                if end > self.buffer.len() {
                    return Err(MmdbError::bad_data(format!(
                        "{} at offset {} runs past the end of the data section",
                        header.data_type, header.start
                    )));
                }
                Ok(end)
            }
        }
    }

    /// Read a map key at `offset`, returning it and the offset of its value
    pub(crate) fn read_key(&self, offset: usize) -> Result<(&'de str, usize)> {
        let header = self.header(offset)?;
        if header.data_type != DataType::String {
            return Err(MmdbError::bad_data(format!(
                "unexpected type for map key: {} at offset {}",
                header.data_type, header.start
            )));
        }
        let bytes = self.slice(header.payload, header.size)?;
        let key = std::str::from_utf8(bytes)
            .map_err(|_| MmdbError::decoding("invalid UTF-8 in map key", header.start))?;
        Ok((key, header.next(header.scalar_end())))
    }

    pub(crate) fn read_str(&self, header: &Header) -> Result<&'de str> {
        let bytes = self.slice(header.payload, header.size)?;
        std::str::from_utf8(bytes)
            .map_err(|_| MmdbError::decoding("invalid UTF-8 in string", header.start))
    }

    pub(crate) fn read_bytes(&self, header: &Header) -> Result<&'de [u8]> {
        self.slice(header.payload, header.size)
    }

    /// Big-endian unsigned integer of at most `max_size` bytes (≤ 8)
    pub(crate) fn read_uint(&self, header: &Header, max_size: usize) -> Result<u64> {
        if header.size > max_size {
            return Err(MmdbError::bad_data(format!(
                "invalid size of {}: {}",
                header.data_type, header.size
            )));
        }
        Ok(self
            .slice(header.payload, header.size)?
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    pub(crate) fn read_u128(&self, header: &Header) -> Result<u128> {
        if header.size > 16 {
            return Err(MmdbError::bad_data(format!(
                "invalid size of uint128: {}",
                header.size
            )));
        }
        Ok(self
            .slice(header.payload, header.size)?
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    /// Widths below 4 are zero-extended, width 4 is two's complement
    pub(crate) fn read_i32(&self, header: &Header) -> Result<i32> {
        Ok(self.read_uint(header, 4)? as u32 as i32)
    }

    pub(crate) fn read_f64(&self, header: &Header) -> Result<f64> {
        if header.size != 8 {
            return Err(MmdbError::bad_data(format!("float 64 size of {}", header.size)));
        }
        let bytes = self.slice(header.payload, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_be_bytes(raw))
    }

    pub(crate) fn read_f32(&self, header: &Header) -> Result<f32> {
        if header.size != 4 {
            return Err(MmdbError::bad_data(format!("float 32 size of {}", header.size)));
        }
        let bytes = self.slice(header.payload, 4)?;
        Ok(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_bool(&self, header: &Header) -> Result<bool> {
        match header.size {
            0 => Ok(false),
            1 => Ok(true),
            size => Err(MmdbError::bad_data(format!("bool size of {}", size))),
        }
    }
}

pub(crate) fn check_depth(depth: usize, offset: usize) -> Result<()> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(MmdbError::invalid_database(format!(
            "exceeded maximum data structure depth of {} at offset {}",
            MAX_NESTING_DEPTH, offset
        )));
    }
    Ok(())
}

pub(crate) fn unexpected_type(header: &Header) -> MmdbError {
    MmdbError::bad_data(format!(
        "unexpected {} at offset {}",
        header.data_type, header.start
    ))
}
