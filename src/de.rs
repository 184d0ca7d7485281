//! serde integration
//!
//! [`ValueDeserializer`] walks the data section directly: the target type
//! drives what is read, unknown map keys are stepped over with
//! [`Decoder::skip`], and strings/bytes are handed out borrowed from the
//! buffer so `&'de str` fields cost nothing.
//!
//! [`Offset`] is the escape hatch for lazy decoding: a field of that type
//! receives the data-section offset of its value instead of the value.

use crate::data_section::{check_depth, unexpected_type, DataType, Decoder, Header};
use crate::error::{MmdbError, Result};
use serde::de::value::{BorrowedStrDeserializer, U8Deserializer};
use serde::de::{self, Deserialize, DeserializeSeed, MapAccess, SeqAccess, Unexpected, Visitor};
use serde::forward_to_deserialize_any;
use std::fmt;

/// Newtype name the deserializer recognises as a request for an offset
const OFFSET_TOKEN: &str = "$mmdb_reader::private::Offset";

/// Offset of a value in the data section
///
/// Deserializing into `Offset` records where the value lives without
/// decoding it. Pass the offset to
/// [`Reader::lookup_offset`](crate::Reader::lookup_offset) to decode it
/// later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(pub usize);

impl Offset {
    /// The raw offset
    pub fn get(self) -> usize {
        self.0
    }
}

impl<'de> Deserialize<'de> for Offset {
    fn deserialize<D: de::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(OFFSET_TOKEN, OffsetVisitor)
    }
}

struct OffsetVisitor;

impl<'de> Visitor<'de> for OffsetVisitor {
    type Value = Offset;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a data section offset")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Offset, E> {
        usize::try_from(v)
            .map(Offset)
            .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_newtype_struct<D: de::Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<Offset, D::Error> {
        let v = u64::deserialize(deserializer)?;
        self.visit_u64(v)
    }
}

/// Which visitor call the target asked for, where the wire type alone is
/// ambiguous
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hint {
    Any,
    /// Target is a primitive integer of at most 64 bits
    Integer,
    /// Target is a sequence, so bytes are presented element by element
    Seq,
}

/// Deserializer positioned at one value of a data section
pub(crate) struct ValueDeserializer<'de> {
    decoder: Decoder<'de>,
    offset: usize,
    depth: usize,
}

impl<'de> ValueDeserializer<'de> {
    pub(crate) fn new(decoder: Decoder<'de>, offset: usize) -> Self {
        Self {
            decoder,
            offset,
            depth: 0,
        }
    }

    /// Offset of the next unread value
    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    fn decode<V: Visitor<'de>>(&mut self, visitor: V, hint: Hint) -> Result<V::Value> {
        let header = self.decoder.header(self.offset)?;
        let start = header.start;
        self.visit(header, visitor, hint)
            .map_err(|e| e.at_offset(start))
    }

    fn finish(&mut self, header: &Header) {
        self.offset = header.next(header.scalar_end());
    }

    fn visit<V: Visitor<'de>>(&mut self, header: Header, visitor: V, hint: Hint) -> Result<V::Value> {
        let decoder = self.decoder;
        match header.data_type {
            DataType::String => {
                let v = decoder.read_str(&header)?;
                self.finish(&header);
                visitor.visit_borrowed_str(v)
            }
            DataType::Double => {
                let v = decoder.read_f64(&header)?;
                self.finish(&header);
                visitor.visit_f64(v)
            }
            DataType::Bytes => {
                let v = decoder.read_bytes(&header)?;
                self.finish(&header);
                if hint == Hint::Seq {
                    visitor.visit_seq(BytesAccess { bytes: v.iter() })
                } else {
                    visitor.visit_borrowed_bytes(v)
                }
            }
            DataType::Uint16 => {
                let v = decoder.read_uint(&header, 2)? as u16;
                self.finish(&header);
                visitor.visit_u16(v)
            }
            DataType::Uint32 => {
                let v = decoder.read_uint(&header, 4)? as u32;
                self.finish(&header);
                visitor.visit_u32(v)
            }
            DataType::Int32 => {
                let v = decoder.read_i32(&header)?;
                self.finish(&header);
                visitor.visit_i32(v)
            }
            DataType::Uint64 => {
                let v = decoder.read_uint(&header, 8)?;
                self.finish(&header);
                visitor.visit_u64(v)
            }
            DataType::Uint128 => {
                let v = decoder.read_u128(&header)?;
                self.finish(&header);
                match u64::try_from(v) {
                    Ok(small) if hint == Hint::Integer => visitor.visit_u64(small),
                    _ => visitor.visit_u128(v),
                }
            }
            DataType::Bool => {
                let v = decoder.read_bool(&header)?;
                self.finish(&header);
                visitor.visit_bool(v)
            }
            DataType::Float => {
                let v = decoder.read_f32(&header)?;
                self.finish(&header);
                visitor.visit_f32(v)
            }
            DataType::Map => self.visit_container(header, |de, remaining| {
                visitor.visit_map(MapAccessor { de, remaining })
            }),
            DataType::Array => self.visit_container(header, |de, remaining| {
                visitor.visit_seq(ArrayAccessor { de, remaining })
            }),
            DataType::Pointer | DataType::Container | DataType::EndMarker => {
                Err(unexpected_type(&header))
            }
        }
    }

    /// Run `visit` over the entries of a map or array, then step over
    /// whatever the visitor left unread
    fn visit_container<T>(
        &mut self,
        header: Header,
        visit: impl FnOnce(&mut Self, &mut usize) -> Result<T>,
    ) -> Result<T> {
        check_depth(self.depth, header.start)?;
        self.depth += 1;
        self.offset = header.payload;

        let mut remaining = match header.data_type {
            DataType::Map => header.size * 2,
            _ => header.size,
        };
        let value = visit(self, &mut remaining)?;
        for _ in 0..remaining {
            self.offset = self.decoder.skip(self.offset)?;
        }

        self.depth -= 1;
        self.offset = header.next(self.offset);
        Ok(value)
    }
}

impl<'de, 'a> de::Deserializer<'de> for &'a mut ValueDeserializer<'de> {
    type Error = MmdbError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.decode(visitor, Hint::Any)
    }

    fn deserialize_i8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.decode(visitor, Hint::Integer)
    }

    fn deserialize_i16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.decode(visitor, Hint::Integer)
    }

    fn deserialize_i32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.decode(visitor, Hint::Integer)
    }

    fn deserialize_i64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.decode(visitor, Hint::Integer)
    }

    fn deserialize_u8<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.decode(visitor, Hint::Integer)
    }

    fn deserialize_u16<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.decode(visitor, Hint::Integer)
    }

    fn deserialize_u32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.decode(visitor, Hint::Integer)
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.decode(visitor, Hint::Integer)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.decode(visitor, Hint::Seq)
    }

    // There is no null on the wire: a value being present means Some.
    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name == OFFSET_TOKEN {
            let header = self.decoder.header(self.offset)?;
            self.offset = self.decoder.skip(self.offset)?;
            return visitor.visit_u64(header.start as u64);
        }
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let header = self.decoder.header(self.offset)?;
        if header.data_type != DataType::String {
            return Err(MmdbError::decoding(
                format!("cannot unmarshal {} into enum", header.data_type),
                header.start,
            ));
        }
        let variant = self.decoder.read_str(&header)?;
        self.finish(&header);
        visitor
            .visit_enum(BorrowedStrDeserializer::<MmdbError>::new(variant))
            .map_err(|e| e.at_offset(header.start))
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.offset = self.decoder.skip(self.offset)?;
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        bool i128 u128 f32 f64 char str string bytes byte_buf unit unit_struct
        tuple tuple_struct map struct identifier
    }
}

struct MapAccessor<'a, 'de> {
    de: &'a mut ValueDeserializer<'de>,
    /// Keys plus values still unread
    remaining: &'a mut usize,
}

impl<'de, 'a> MapAccess<'de> for MapAccessor<'a, 'de> {
    type Error = MmdbError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        if *self.remaining == 0 {
            return Ok(None);
        }
        *self.remaining -= 1;

        let (key, next) = self.de.decoder.read_key(self.de.offset)?;
        self.de.offset = next;
        seed.deserialize(BorrowedStrDeserializer::<MmdbError>::new(key))
            .map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        *self.remaining = self.remaining.saturating_sub(1);
        seed.deserialize(&mut *self.de)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(*self.remaining / 2)
    }
}

struct ArrayAccessor<'a, 'de> {
    de: &'a mut ValueDeserializer<'de>,
    remaining: &'a mut usize,
}

impl<'de, 'a> SeqAccess<'de> for ArrayAccessor<'a, 'de> {
    type Error = MmdbError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if *self.remaining == 0 {
            return Ok(None);
        }
        *self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(*self.remaining)
    }
}

/// Presents a bytes value as a sequence of `u8` for `Vec<u8>` targets
struct BytesAccess<'de> {
    bytes: std::slice::Iter<'de, u8>,
}

impl<'de> SeqAccess<'de> for BytesAccess<'de> {
    type Error = MmdbError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        match self.bytes.next() {
            Some(&byte) => seed.deserialize(U8Deserializer::<MmdbError>::new(byte)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.bytes.len())
    }
}
