//! HPACK header block decompression (RFC 7541).
//!
//! A [`HeaderDecoder`] owns one dynamic table. Create one per decode session
//! and feed it every header block of that session in order: later blocks may
//! reference entries inserted while decoding earlier ones.

use std::fmt;

use bytes::{Buf, Bytes, BytesMut};

mod error;
mod huffman;
mod table;

pub use error::HpackError;
use table::{DynamicTable, ENTRY_OVERHEAD};

/// Default dynamic table bound in bytes.
pub const DEFAULT_MAX_TABLE_SIZE: usize = 2048;

// representation prefixes, RFC 7541 section 6
const INDEXED: u8 = 0b1000_0000;
const LITERAL_INDEXED: u8 = 0b0100_0000;
const SIZE_UPDATE: u8 = 0b0010_0000;
const HUFFMAN: u8 = 0b1000_0000;

/// One decoded `(name, value)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HeaderField {
    name: Bytes,
    value: Bytes,
}

impl HeaderField {
    /// Construct a field from raw name and value bytes.
    #[must_use]
    pub fn new(name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Header name as sent on the wire.
    #[must_use]
    pub fn name(&self) -> &Bytes { &self.name }

    /// Header value as sent on the wire.
    #[must_use]
    pub fn value(&self) -> &Bytes { &self.value }

    /// Size charged against the dynamic table: name, value and 32 bytes.
    #[must_use]
    pub fn size(&self) -> usize { self.name.len() + self.value.len() + ENTRY_OVERHEAD }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            String::from_utf8_lossy(&self.name),
            String::from_utf8_lossy(&self.value)
        )
    }
}

/// Stateful HPACK decoder scoped to one decode session.
#[derive(Debug)]
pub struct HeaderDecoder {
    table: DynamicTable,
    max_table_size: usize,
}

impl Default for HeaderDecoder {
    fn default() -> Self { Self::new(DEFAULT_MAX_TABLE_SIZE) }
}

impl HeaderDecoder {
    /// Create a decoder whose dynamic table never exceeds `max_table_size`.
    #[must_use]
    pub const fn new(max_table_size: usize) -> Self {
        Self {
            table: DynamicTable::new(max_table_size),
            max_table_size,
        }
    }

    /// Decode one complete header block.
    ///
    /// # Errors
    ///
    /// Returns an [`HpackError`] for a malformed representation, an index
    /// that is in neither table, a string or integer running past the end
    /// of the block, an invalid Huffman string, or a table size update that
    /// is misplaced or above the configured bound. The dynamic table should
    /// not be used again after an error.
    pub fn decode(&mut self, mut block: Bytes) -> Result<Vec<HeaderField>, HpackError> {
        let mut fields = Vec::new();

        while let Some(&prefix) = block.first() {
            if prefix & INDEXED == INDEXED {
                let index = decode_int(&mut block, 7)?;
                if index == 0 {
                    return Err(HpackError::ZeroIndex);
                }
                fields.push(self.lookup(index)?);
            } else if prefix & LITERAL_INDEXED == LITERAL_INDEXED {
                let field = self.decode_literal(&mut block, 6)?;
                self.table.insert(field.clone());
                fields.push(field);
            } else if prefix & SIZE_UPDATE == SIZE_UPDATE {
                if !fields.is_empty() {
                    return Err(HpackError::MisplacedSizeUpdate);
                }
                let size = decode_int(&mut block, 5)?;
                if size > self.max_table_size {
                    return Err(HpackError::SizeUpdateTooLarge {
                        size,
                        max: self.max_table_size,
                    });
                }
                self.table.set_max_size(size);
            } else {
                // without indexing (0000) and never indexed (0001)
                fields.push(self.decode_literal(&mut block, 4)?);
            }
        }

        Ok(fields)
    }

    /// Current dynamic table size in bytes.
    #[must_use]
    pub fn table_size(&self) -> usize { self.table.size() }

    /// Number of entries in the dynamic table.
    #[must_use]
    pub fn table_len(&self) -> usize { self.table.len() }

    fn lookup(&self, index: usize) -> Result<HeaderField, HpackError> {
        self.table.get(index).ok_or(HpackError::IndexNotFound(index))
    }

    fn decode_literal(&self, block: &mut Bytes, prefix_bits: u8) -> Result<HeaderField, HpackError> {
        let name = match decode_int(block, prefix_bits)? {
            0 => decode_string(block)?,
            index => self.lookup(index)?.name,
        };
        let value = decode_string(block)?;
        Ok(HeaderField { name, value })
    }
}

#[cfg(test)]
impl HeaderDecoder {
    pub(crate) fn table_fields(&self) -> Vec<HeaderField> {
        self.table.fields().iter().cloned().collect()
    }
}

/// Decode a prefixed integer (RFC 7541 section 5.1), consuming its bytes.
fn decode_int(block: &mut Bytes, prefix_bits: u8) -> Result<usize, HpackError> {
    let mask = u8::MAX >> (8 - prefix_bits);
    let first = block.try_get_u8().map_err(|_| HpackError::UnexpectedEnd)? & mask;
    if first < mask {
        return Ok(usize::from(first));
    }

    let mut value = u32::from(mask);
    let mut shift = 0_u32;
    loop {
        let byte = block.try_get_u8().map_err(|_| HpackError::UnexpectedEnd)?;
        let part = u32::from(byte & 0x7f)
            .checked_shl(shift)
            .filter(|part| part >> shift == u32::from(byte & 0x7f))
            .ok_or(HpackError::IntegerOverflow)?;
        value = value.checked_add(part).ok_or(HpackError::IntegerOverflow)?;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 28 {
            return Err(HpackError::IntegerOverflow);
        }
    }
    usize::try_from(value).map_err(|_| HpackError::IntegerOverflow)
}

/// Decode a string literal (RFC 7541 section 5.2), consuming its bytes.
fn decode_string(block: &mut Bytes) -> Result<Bytes, HpackError> {
    let huffman = block.first().is_some_and(|&b| b & HUFFMAN == HUFFMAN);
    let declared = decode_int(block, 7)?;
    if declared > block.len() {
        return Err(HpackError::LengthMismatch {
            declared,
            available: block.len(),
        });
    }

    let raw = block.split_to(declared);
    if !huffman {
        return Ok(raw);
    }
    let mut decoded = BytesMut::with_capacity(declared * 8 / 5);
    huffman::decode(&raw, &mut decoded)?;
    Ok(decoded.freeze())
}

#[cfg(test)]
mod tests;
