//! Callback-driven decoding
//!
//! [`RecordVisitor`] receives a record as a stream of events instead of
//! being bound to a type. It is the low-level alternative to serde for
//! callers that build their own structures or only want part of a record:
//! [`RecordVisitor::should_skip`] can prune any subtree before it is
//! decoded.

use crate::data_section::{check_depth, unexpected_type, DataType, Decoder};
use crate::error::Result;

/// Receiver for the values of one record, in encoding order
///
/// Maps produce `start_map`, then for each entry a `string` event for the
/// key followed by the events of the value, then `end`. Arrays produce
/// `start_slice`, the element events, then `end`.
pub trait RecordVisitor<'de> {
    /// Called before each value is decoded; return `true` to step over it
    fn should_skip(&mut self, _offset: usize) -> Result<bool> {
        Ok(false)
    }

    /// A map with `size` entries begins
    fn start_map(&mut self, size: usize) -> Result<()>;

    /// An array with `size` elements begins
    fn start_slice(&mut self, size: usize) -> Result<()>;

    /// The innermost open map or array is complete
    fn end(&mut self) -> Result<()>;

    /// A string value or map key
    fn string(&mut self, value: &'de str) -> Result<()>;

    /// A bytes value
    fn bytes(&mut self, value: &'de [u8]) -> Result<()>;

    /// A double value
    fn float64(&mut self, value: f64) -> Result<()>;

    /// A float value
    fn float32(&mut self, value: f32) -> Result<()>;

    /// A uint16 value
    fn uint16(&mut self, value: u16) -> Result<()>;

    /// A uint32 value
    fn uint32(&mut self, value: u32) -> Result<()>;

    /// An int32 value
    fn int32(&mut self, value: i32) -> Result<()>;

    /// A uint64 value
    fn uint64(&mut self, value: u64) -> Result<()>;

    /// A uint128 value
    fn uint128(&mut self, value: u128) -> Result<()>;

    /// A boolean value
    fn boolean(&mut self, value: bool) -> Result<()>;
}

impl<'de> Decoder<'de> {
    /// Feed the value at `offset` to `visitor`, returning the offset of the
    /// next value
    pub fn walk<V>(&self, offset: usize, visitor: &mut V) -> Result<usize>
    where
        V: RecordVisitor<'de> + ?Sized,
    {
        self.walk_at(offset, visitor, 0)
    }

    fn walk_at<V>(&self, offset: usize, visitor: &mut V, depth: usize) -> Result<usize>
    where
        V: RecordVisitor<'de> + ?Sized,
    {
        if visitor.should_skip(offset)? {
            return self.skip(offset);
        }

        let header = self.header(offset)?;
        let end = match header.data_type {
            DataType::Map => {
                check_depth(depth, header.start)?;
                visitor.start_map(header.size)?;
                let mut cursor = header.payload;
                for _ in 0..header.size {
                    let (key, value) = self.read_key(cursor)?;
                    visitor.string(key)?;
                    cursor = self.walk_at(value, visitor, depth + 1)?;
                }
                visitor.end()?;
                cursor
            }
            DataType::Array => {
                check_depth(depth, header.start)?;
                visitor.start_slice(header.size)?;
                let mut cursor = header.payload;
                for _ in 0..header.size {
                    cursor = self.walk_at(cursor, visitor, depth + 1)?;
                }
                visitor.end()?;
                cursor
            }
            DataType::String => {
                visitor.string(self.read_str(&header)?)?;
                header.scalar_end()
            }
            DataType::Bytes => {
                visitor.bytes(self.read_bytes(&header)?)?;
                header.scalar_end()
            }
            DataType::Double => {
                visitor.float64(self.read_f64(&header)?)?;
                header.scalar_end()
            }
            DataType::Float => {
                visitor.float32(self.read_f32(&header)?)?;
                header.scalar_end()
            }
            DataType::Uint16 => {
                visitor.uint16(self.read_uint(&header, 2)? as u16)?;
                header.scalar_end()
            }
            DataType::Uint32 => {
                visitor.uint32(self.read_uint(&header, 4)? as u32)?;
                header.scalar_end()
            }
            DataType::Int32 => {
                visitor.int32(self.read_i32(&header)?)?;
                header.scalar_end()
            }
            DataType::Uint64 => {
                visitor.uint64(self.read_uint(&header, 8)?)?;
                header.scalar_end()
            }
            DataType::Uint128 => {
                visitor.uint128(self.read_u128(&header)?)?;
                header.scalar_end()
            }
            DataType::Bool => {
                visitor.boolean(self.read_bool(&header)?)?;
                header.scalar_end()
            }
            DataType::Pointer | DataType::Container | DataType::EndMarker => {
                return Err(unexpected_type(&header));
            }
        };

        Ok(header.next(end))
    }
}
