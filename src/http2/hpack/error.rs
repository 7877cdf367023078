//! Errors raised while decompressing an HPACK header block.

use thiserror::Error;

/// HPACK decoding failure.
///
/// Any of these leaves the dynamic table in an unknown state, so the decode
/// session that raised it must stop using the table.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum HpackError {
    /// The block ended inside a header representation.
    #[error("header block ended mid representation")]
    UnexpectedEnd,
    /// An indexed representation used index 0.
    #[error("invalid 0 index")]
    ZeroIndex,
    /// An index referenced neither the static nor the dynamic table.
    #[error("table index {0} not found")]
    IndexNotFound(usize),
    /// A prefixed integer did not fit in 32 bits.
    #[error("integer overflow")]
    IntegerOverflow,
    /// A string length prefix claimed more bytes than the fragment holds.
    #[error("string length mismatch: declared {declared}, available {available}")]
    LengthMismatch {
        /// Length announced by the prefix.
        declared: usize,
        /// Bytes remaining in the fragment.
        available: usize,
    },
    /// A Huffman-coded string was malformed or padded incorrectly.
    #[error("huffman coding error")]
    Huffman,
    /// A dynamic table size update exceeded the negotiated bound.
    #[error("table size update {size} exceeds bound {max}")]
    SizeUpdateTooLarge {
        /// Requested table size.
        size: usize,
        /// Configured upper bound.
        max: usize,
    },
    /// A dynamic table size update followed a header field.
    #[error("table size update not at start of block")]
    MisplacedSizeUpdate,
}
