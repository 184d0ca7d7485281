//! Path-based partial decoding
//!
//! A path selects one value deep inside a record without decoding anything
//! else: keys select map members, indices select array elements.

use crate::data_section::{DataType, Decoder};
use crate::error::Result;

/// One step of a path into a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathElement<'a> {
    /// Select a member of a map
    Key(&'a str),
    /// Select an element of an array; negative indices count from the end
    Index(isize),
}

impl<'a> From<&'a str> for PathElement<'a> {
    fn from(key: &'a str) -> Self {
        PathElement::Key(key)
    }
}

impl From<isize> for PathElement<'_> {
    fn from(index: isize) -> Self {
        PathElement::Index(index)
    }
}

impl From<i32> for PathElement<'_> {
    fn from(index: i32) -> Self {
        PathElement::Index(index as isize)
    }
}

impl<'de> Decoder<'de> {
    /// Offset of the value that `path` selects from the value at `offset`
    ///
    /// Returns `None` when a key is missing, an index is out of range, or a
    /// step does not match the container it is applied to.
    pub fn locate(&self, offset: usize, path: &[PathElement<'_>]) -> Result<Option<usize>> {
        let mut offset = offset;

        for element in path {
            let header = self.header(offset)?;
            match (*element, header.data_type) {
                (PathElement::Key(wanted), DataType::Map) => {
                    let mut cursor = header.payload;
                    let mut found = None;
                    for _ in 0..header.size {
                        let (key, value) = self.read_key(cursor)?;
                        if key == wanted {
                            found = Some(value);
                            break;
                        }
                        cursor = self.skip(value)?;
                    }
                    match found {
                        Some(value) => offset = value,
                        None => return Ok(None),
                    }
                }
                (PathElement::Index(index), DataType::Array) => {
                    let len = header.size as isize;
                    let index = if index < 0 { len + index } else { index };
                    if index < 0 || index >= len {
                        return Ok(None);
                    }
                    let mut cursor = header.payload;
                    for _ in 0..index {
                        cursor = self.skip(cursor)?;
                    }
                    offset = cursor;
                }
                _ => return Ok(None),
            }
        }

        Ok(Some(offset))
    }
}
