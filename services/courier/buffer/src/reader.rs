//! Cursor over an ordered sequence of buffer segments.
//!
//! The reader treats its segments as one logical byte stream. Primitive reads
//! take a single copy when the value fits inside the active segment and fall
//! back to assembling it byte by byte when it straddles a boundary. Character
//! reads go through a stateful [`TextDecoder`] so multi-byte characters may
//! also span segments.

use std::io::{self, Read};
use std::mem::size_of;

use rust_decimal::Decimal;

use crate::error::ReaderError;
use crate::segment::BufferSegment;
use crate::text::{TextDecoder, TextEncoding};
use crate::vlq;

/// Largest decimal scale the 128-bit layout can carry
const MAX_DECIMAL_SCALE: u32 = 28;

/// Fixed-width value readable in little-endian order
pub trait Primitive: Sized + Copy {
    /// Encoded width in bytes
    const WIDTH: usize;

    /// Build the value from exactly `WIDTH` little-endian bytes
    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_primitive {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Primitive for $ty {
                const WIDTH: usize = size_of::<$ty>();

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(raw)
                }
            }
        )*
    };
}

impl_primitive!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl Primitive for bool {
    const WIDTH: usize = 1;

    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    index: usize,
    offset: usize,
    consumed: usize,
}

/// Reader over a list of non-owning buffer segments
#[derive(Debug, Clone)]
pub struct SegmentedReader<'a> {
    segments: Vec<BufferSegment<'a>>,
    index: usize,
    offset: usize,
    consumed: usize,
    decoder: TextDecoder,
}

impl<'a> SegmentedReader<'a> {
    /// Create a reader with no segments, decoding text as `encoding`
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            segments: Vec::new(),
            index: 0,
            offset: 0,
            consumed: 0,
            decoder: TextDecoder::new(encoding),
        }
    }

    /// Create a reader positioned at the start of `segments`
    pub fn with_segments(
        segments: Vec<BufferSegment<'a>>,
        encoding: TextEncoding,
    ) -> Result<Self, ReaderError> {
        let mut reader = Self::new(encoding);
        reader.set_buffers(segments)?;
        Ok(reader)
    }

    /// Replace the input with a single contiguous buffer
    pub fn set_buffer(&mut self, data: &'a [u8]) {
        self.segments = vec![BufferSegment::new(data)];
        self.rewind_to_start();
    }

    /// Replace the input with an ordered list of segments
    pub fn set_buffers(&mut self, segments: Vec<BufferSegment<'a>>) -> Result<(), ReaderError> {
        if segments.is_empty() {
            return Err(ReaderError::NoSegments);
        }
        self.segments = segments;
        self.rewind_to_start();
        Ok(())
    }

    /// Text encoding used by character reads
    pub fn encoding(&self) -> TextEncoding {
        self.decoder.encoding()
    }

    /// Bytes left in the active segment
    pub fn available_in_segment(&self) -> usize {
        self.current().len() - self.offset
    }

    /// Bytes left across all segments
    pub fn remaining(&self) -> usize {
        let later: usize = self
            .segments
            .iter()
            .skip(self.index + 1)
            .map(BufferSegment::len)
            .sum();
        self.available_in_segment() + later
    }

    /// Total bytes consumed since the input was set
    pub fn position(&self) -> usize {
        self.consumed
    }

    /// Read any fixed-width value
    pub fn read_primitive<P: Primitive>(&mut self) -> Result<P, ReaderError> {
        let mut raw = [0u8; 16];
        let raw = &mut raw[..P::WIDTH];
        self.read_exact_into(raw)?;
        Ok(P::from_le_slice(raw))
    }

    /// Read a one-byte boolean; any non-zero byte is `true`
    pub fn read_bool(&mut self) -> Result<bool, ReaderError> {
        self.read_primitive()
    }

    /// Read an unsigned byte
    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        self.read_primitive()
    }

    /// Read a signed byte
    pub fn read_i8(&mut self) -> Result<i8, ReaderError> {
        self.read_primitive()
    }

    /// Read a little-endian u16
    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        self.read_primitive()
    }

    /// Read a little-endian i16
    pub fn read_i16(&mut self) -> Result<i16, ReaderError> {
        self.read_primitive()
    }

    /// Read a little-endian u32
    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        self.read_primitive()
    }

    /// Read a little-endian i32
    pub fn read_i32(&mut self) -> Result<i32, ReaderError> {
        self.read_primitive()
    }

    /// Read a little-endian u64
    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        self.read_primitive()
    }

    /// Read a little-endian i64
    pub fn read_i64(&mut self) -> Result<i64, ReaderError> {
        self.read_primitive()
    }

    /// Read a little-endian f32
    pub fn read_f32(&mut self) -> Result<f32, ReaderError> {
        self.read_primitive()
    }

    /// Read a little-endian f64
    pub fn read_f64(&mut self) -> Result<f64, ReaderError> {
        self.read_primitive()
    }

    /// Read a 128-bit decimal laid out as four little-endian 32-bit words:
    /// low, mid and high mantissa followed by flags.
    ///
    /// Flags carry the scale in bits 16..24 and the sign in bit 31.
    pub fn read_decimal(&mut self) -> Result<Decimal, ReaderError> {
        let start = self.cursor();
        let mut raw = [0u8; 16];
        self.read_exact_into(&mut raw)?;

        let word = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
        let (lo, mid, hi, flags) = (word(0), word(4), word(8), word(12));

        let scale = (flags >> 16) & 0xFF;
        if scale > MAX_DECIMAL_SCALE {
            self.restore(start);
            return Err(ReaderError::DecimalScale(scale));
        }
        let negative = flags & 0x8000_0000 != 0;

        Ok(Decimal::from_parts(lo, mid, hi, negative, scale))
    }

    /// Read exactly `count` bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, ReaderError> {
        let available = self.remaining();
        if count > available {
            return Err(ReaderError::ReadPastEnd {
                needed: count,
                available,
            });
        }
        let mut out = vec![0u8; count];
        self.read_exact_into(&mut out)?;
        Ok(out)
    }

    /// Read everything left in the input
    pub fn read_remaining_bytes(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.remaining());
        for segment in self.segments.iter().skip(self.index) {
            out.extend_from_slice(segment.data());
        }
        out.drain(..self.offset);
        self.consumed += out.len();
        self.index = self.segments.len().saturating_sub(1);
        self.offset = self.current().len();
        out
    }

    /// Read one VLQ-encoded value; the cursor is unchanged on failure
    pub fn read_vlq(&mut self) -> Result<u32, ReaderError> {
        let start = self.cursor();
        match vlq::decode_from_fn(|| self.next_byte()) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.restore(start);
                Err(err.into())
            }
        }
    }

    /// Read a VLQ length prefix followed by that many bytes of text.
    ///
    /// Malformed text decodes to U+FFFD.
    pub fn read_string(&mut self) -> Result<String, ReaderError> {
        let start = self.cursor();
        let len = self.read_vlq()? as usize;
        match self.read_bytes(len) {
            Ok(bytes) => Ok(self.encoding().decode(&bytes)),
            Err(err) => {
                self.restore(start);
                Err(err)
            }
        }
    }

    /// Read a single character
    pub fn read_char(&mut self) -> Result<char, ReaderError> {
        self.next_char().ok_or(ReaderError::NoChar)
    }

    /// Read one character, or `None` once the input is exhausted
    pub fn read(&mut self) -> Option<char> {
        self.next_char()
    }

    /// Decode the next character without consuming it
    pub fn peek_char(&mut self) -> Option<char> {
        let start = self.cursor();
        let decoder = self.decoder.clone();
        let c = self.next_char();
        self.restore(start);
        self.decoder = decoder;
        c
    }

    /// Read exactly `count` characters.
    ///
    /// On failure the reader is left where it was.
    pub fn read_chars(&mut self, count: usize) -> Result<String, ReaderError> {
        let start = self.cursor();
        let decoder = self.decoder.clone();

        let mut out = String::with_capacity(count);
        let read = self.read_chars_into(&mut out, count);
        if read < count {
            self.restore(start);
            self.decoder = decoder;
            return Err(ReaderError::NotEnoughChars {
                requested: count,
                available: read,
            });
        }
        Ok(out)
    }

    /// Append up to `count` characters to `out`, returning how many were read.
    ///
    /// Bytes of a trailing partial character stay unread.
    pub fn read_chars_into(&mut self, out: &mut String, count: usize) -> usize {
        let mut read = 0;
        while read < count {
            match self.next_char() {
                Some(c) => {
                    out.push(c);
                    read += 1;
                }
                None => break,
            }
        }
        read
    }

    fn next_char(&mut self) -> Option<char> {
        loop {
            if let Some(c) = self.decoder.take_char() {
                return Some(c);
            }
            match self.next_byte() {
                Some(byte) => {
                    let returned = self.decoder.feed(byte);
                    self.step_back(returned);
                }
                None => {
                    let pending = self.decoder.pending_bytes();
                    if pending > 0 {
                        self.step_back(pending);
                        self.decoder.reset();
                    }
                    return None;
                }
            }
        }
    }

    fn current(&self) -> &'a [u8] {
        self.segments
            .get(self.index)
            .map(BufferSegment::data)
            .unwrap_or(&[])
    }

    fn advance_segment(&mut self) -> bool {
        if self.index + 1 < self.segments.len() {
            self.index += 1;
            self.offset = 0;
            true
        } else {
            false
        }
    }

    fn next_byte(&mut self) -> Option<u8> {
        loop {
            let segment = self.current();
            if self.offset < segment.len() {
                let byte = segment[self.offset];
                self.offset += 1;
                self.consumed += 1;
                return Some(byte);
            }
            if !self.advance_segment() {
                return None;
            }
        }
    }

    fn read_exact_into(&mut self, out: &mut [u8]) -> Result<(), ReaderError> {
        let needed = out.len();
        let segment = self.current();
        if segment.len() - self.offset >= needed {
            out.copy_from_slice(&segment[self.offset..self.offset + needed]);
            self.offset += needed;
            self.consumed += needed;
            return Ok(());
        }

        let start = self.cursor();
        for slot in out.iter_mut() {
            match self.next_byte() {
                Some(byte) => *slot = byte,
                None => {
                    let available = self.consumed - start.consumed;
                    self.restore(start);
                    return Err(ReaderError::ReadPastEnd { needed, available });
                }
            }
        }
        Ok(())
    }

    fn step_back(&mut self, mut count: usize) {
        while count > 0 {
            if self.offset >= count {
                self.offset -= count;
                self.consumed -= count;
                return;
            }
            count -= self.offset;
            self.consumed -= self.offset;
            self.offset = 0;
            if self.index == 0 {
                return;
            }
            self.index -= 1;
            self.offset = self.current().len();
        }
    }

    fn cursor(&self) -> Cursor {
        Cursor {
            index: self.index,
            offset: self.offset,
            consumed: self.consumed,
        }
    }

    fn restore(&mut self, cursor: Cursor) {
        self.index = cursor.index;
        self.offset = cursor.offset;
        self.consumed = cursor.consumed;
    }

    fn rewind_to_start(&mut self) {
        self.index = 0;
        self.offset = 0;
        self.consumed = 0;
        self.decoder.reset();
    }
}

impl Read for SegmentedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            let segment = self.current();
            let available = segment.len() - self.offset;
            if available == 0 {
                if !self.advance_segment() {
                    break;
                }
                continue;
            }
            let n = available.min(buf.len() - written);
            buf[written..written + n].copy_from_slice(&segment[self.offset..self.offset + n]);
            self.offset += n;
            self.consumed += n;
            written += n;
        }
        Ok(written)
    }
}
