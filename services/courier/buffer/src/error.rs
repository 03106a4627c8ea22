//! Buffer codec error types.

use thiserror::Error;

/// VLQ encoding and decoding errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlqError {
    /// Value does not fit in 28 bits
    #[error("vlq overflow: {0} exceeds 28 bits")]
    Overflow(u64),

    /// Continuation bit still set after the maximum byte count
    #[error("vlq longer than {0} bytes")]
    TooLong(usize),

    /// Input ended before the terminating byte
    #[error("vlq truncated")]
    Truncated,
}

/// Array aliasing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArrayError {
    /// Array or byte block was empty
    #[error("array must not be empty")]
    Empty,

    /// Element type has no size
    #[error("element type {0} has no size")]
    ZeroSized(&'static str),

    /// Byte length is not a whole number of elements
    #[error("{len} bytes is not a multiple of element size {element_size}")]
    LengthMismatch {
        /// Byte length supplied
        len: usize,
        /// Size of one element
        element_size: usize,
    },

    /// Converter used with a different element type
    #[error("converter for {expected} used with {found}")]
    TagMismatch {
        /// Type the converter was built for
        expected: &'static str,
        /// Type it was called with
        found: &'static str,
    },
}

/// Segmented reader errors
#[derive(Error, Debug)]
pub enum ReaderError {
    /// No segments were supplied
    #[error("no buffer segments supplied")]
    NoSegments,

    /// Tried to read beyond the last segment
    #[error("unable to read past end of buffer: needed {needed} bytes, {available} available")]
    ReadPastEnd {
        /// Bytes the read required
        needed: usize,
        /// Bytes that were left
        available: usize,
    },

    /// Not enough data for a single character
    #[error("no character available")]
    NoChar,

    /// Fewer characters were available than requested
    #[error("requested {requested} characters, only {available} available")]
    NotEnoughChars {
        /// Characters requested
        requested: usize,
        /// Characters that could be decoded
        available: usize,
    },

    /// Decimal flags carry an invalid scale
    #[error("invalid decimal scale {0}")]
    DecimalScale(u32),

    /// Length prefix could not be read
    #[error("length prefix: {0}")]
    Vlq(#[from] VlqError),
}
