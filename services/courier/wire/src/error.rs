//! Envelope and codec error types.

use courier_buffer::VlqError;
use thiserror::Error;

/// Envelope protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Header length prefix was malformed
    #[error("header length: {0}")]
    Vlq(#[from] VlqError),

    /// Header length points past the end of the input
    #[error("truncated envelope: header needs {expected} bytes, {available} available")]
    Truncated {
        /// Header length announced by the prefix
        expected: usize,
        /// Bytes present after the prefix
        available: usize,
    },

    /// Structured codec failure
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    /// Header carries no endpoint, or the payload type declares none
    #[error("missing endpoint for {0}")]
    MissingEndpoint(&'static str),

    /// Cached payload was decoded as a different type
    #[error("payload already decoded as {cached}, requested {requested}")]
    TypeMismatch {
        /// Type held in the cache
        cached: &'static str,
        /// Type asked for
        requested: &'static str,
    },
}

/// Structured codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    /// Value could not be encoded
    #[error("encode failed: {0}")]
    Encode(String),

    /// Bytes could not be decoded
    #[error("decode failed: {0}")]
    Decode(String),

    /// Warm-up for a type failed
    #[error("prepare failed for {type_name}: {reason}")]
    Prepare {
        /// Type being prepared
        type_name: &'static str,
        /// Failure detail
        reason: String,
    },
}
