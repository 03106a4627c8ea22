//! Low-level buffer handling for courier envelopes.
//!
//! This crate holds the pieces that touch raw bytes directly: the VLQ length
//! codec used by envelope framing, typed array aliasing over byte buffers,
//! and a cursor-based reader that walks primitives, byte ranges and text
//! across one or more non-contiguous memory segments.
//!
//! ## Features
//!
//! - **VLQ Lengths**: 7-bit, most-significant-group-first, at most 4 bytes
//! - **Array Aliasing**: view `[T]` as `[u8]` and back without copying when
//!   alignment allows, with a copying fallback behind the same interface
//! - **Segmented Reader**: values and characters may straddle segment
//!   boundaries; the reader stitches them together transparently
//! - **Stateful Text Decoding**: UTF-8 and UTF-16LE decoders keep partial
//!   characters in a scratch buffer across segment switches
//!
//! ## Example
//!
//! ```rust
//! use courier_buffer::{BufferSegment, SegmentedReader, TextEncoding};
//!
//! let first = [0x2A, 0x00];
//! let second = [0x00, 0x00, b'o', b'k'];
//!
//! let mut reader = SegmentedReader::new(TextEncoding::Utf8);
//! reader
//!     .set_buffers(vec![BufferSegment::new(&first), BufferSegment::new(&second)])
//!     .unwrap();
//!
//! assert_eq!(reader.read_u32().unwrap(), 42);
//! assert_eq!(reader.read_chars(2).unwrap(), "ok");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod array;
pub mod error;
pub mod reader;
pub mod segment;
pub mod text;
pub mod vlq;

// Re-export main types
pub use array::{ArrayConverter, ArrayIo, ConverterCache, Element, ElementTag};
pub use error::{ArrayError, ReaderError, VlqError};
pub use reader::{Primitive, SegmentedReader};
pub use segment::BufferSegment;
pub use text::{TextDecoder, TextEncoding};
pub use vlq::{decode_vlq, encode_vlq, encode_vlq_to_vec, encoded_len, MAX_VLQ_BYTES, MAX_VLQ_VALUE};
