//! Stateful text decoding for segmented input.
//!
//! A [`TextDecoder`] is fed one byte at a time. Bytes that do not yet form a
//! complete character stay in a small scratch buffer, so a character split
//! across two segments decodes the same as one that is not. Malformed input
//! decodes to U+FFFD. A byte that breaks an unfinished sequence is handed
//! back to the caller rather than kept, so the caller's position always
//! matches the characters produced.

use smallvec::SmallVec;

const REPLACEMENT: char = char::REPLACEMENT_CHARACTER;

/// Supported text encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    /// UTF-8, one to four bytes per character
    #[default]
    Utf8,
    /// UTF-16 little-endian, two or four bytes per character
    Utf16Le,
}

impl TextEncoding {
    /// Smallest number of bytes a character occupies
    pub fn min_bytes_per_char(self) -> usize {
        match self {
            TextEncoding::Utf8 => 1,
            TextEncoding::Utf16Le => 2,
        }
    }

    /// Decode a complete byte string, replacing malformed or trailing partial
    /// sequences with U+FFFD
    pub fn decode(self, bytes: &[u8]) -> String {
        let mut decoder = TextDecoder::new(self);
        let mut out = String::with_capacity(bytes.len() / self.min_bytes_per_char());
        let mut i = 0;
        while i < bytes.len() {
            let returned = decoder.feed(bytes[i]);
            i = i + 1 - returned;
            while let Some(c) = decoder.take_char() {
                out.push(c);
            }
        }
        if decoder.has_state() {
            out.push(REPLACEMENT);
        }
        out
    }
}

/// Byte-at-a-time decoder carrying partial characters between calls
#[derive(Debug, Clone)]
pub struct TextDecoder {
    encoding: TextEncoding,
    scratch: [u8; 4],
    pending: usize,
    needed: usize,
    high_surrogate: Option<u16>,
    ready: SmallVec<[char; 2]>,
}

impl TextDecoder {
    /// Create a decoder for `encoding`
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            scratch: [0; 4],
            pending: 0,
            needed: 0,
            high_surrogate: None,
            ready: SmallVec::new(),
        }
    }

    /// Encoding this decoder handles
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Feed one byte; a completed character becomes available through
    /// [`TextDecoder::take_char`].
    ///
    /// Returns how many of the most recently fed bytes were handed back
    /// unconsumed. This is non-zero only when the byte (or UTF-16 unit) broke
    /// an unfinished sequence: U+FFFD is produced for the broken sequence and
    /// the returned bytes must be fed again.
    pub fn feed(&mut self, byte: u8) -> usize {
        match self.encoding {
            TextEncoding::Utf8 => self.feed_utf8(byte),
            TextEncoding::Utf16Le => self.feed_utf16(byte),
        }
    }

    /// Next decoded character, if one is ready
    pub fn take_char(&mut self) -> Option<char> {
        if self.ready.is_empty() {
            None
        } else {
            Some(self.ready.remove(0))
        }
    }

    /// Whether bytes of an unfinished character are held
    pub fn has_state(&self) -> bool {
        self.pending > 0 || self.high_surrogate.is_some()
    }

    /// Number of consumed bytes not yet turned into a character
    pub fn pending_bytes(&self) -> usize {
        self.pending + if self.high_surrogate.is_some() { 2 } else { 0 }
    }

    /// Drop all partial and ready state
    pub fn reset(&mut self) {
        self.pending = 0;
        self.needed = 0;
        self.high_surrogate = None;
        self.ready.clear();
    }

    fn feed_utf8(&mut self, byte: u8) -> usize {
        if self.pending == 0 {
            match byte {
                0x00..=0x7F => self.ready.push(byte as char),
                0xC2..=0xDF => self.start_sequence(byte, 2),
                0xE0..=0xEF => self.start_sequence(byte, 3),
                0xF0..=0xF4 => self.start_sequence(byte, 4),
                _ => self.ready.push(REPLACEMENT),
            }
            return 0;
        }

        if !utf8_continuation_valid(self.scratch[0], self.pending, byte) {
            self.pending = 0;
            self.needed = 0;
            self.ready.push(REPLACEMENT);
            return 1;
        }

        self.scratch[self.pending] = byte;
        self.pending += 1;
        if self.pending == self.needed {
            let decoded = std::str::from_utf8(&self.scratch[..self.needed])
                .ok()
                .and_then(|s| s.chars().next())
                .unwrap_or(REPLACEMENT);
            self.ready.push(decoded);
            self.pending = 0;
            self.needed = 0;
        }
        0
    }

    fn start_sequence(&mut self, lead: u8, len: usize) {
        self.scratch[0] = lead;
        self.pending = 1;
        self.needed = len;
    }

    fn feed_utf16(&mut self, byte: u8) -> usize {
        self.scratch[self.pending] = byte;
        self.pending += 1;
        if self.pending < 2 {
            return 0;
        }
        self.pending = 0;

        let unit = u16::from_le_bytes([self.scratch[0], self.scratch[1]]);
        match (self.high_surrogate.take(), unit) {
            (None, 0xD800..=0xDBFF) => self.high_surrogate = Some(unit),
            (None, 0xDC00..=0xDFFF) => self.ready.push(REPLACEMENT),
            (None, _) => self.ready.push(char::from_u32(unit as u32).unwrap_or(REPLACEMENT)),
            (Some(high), 0xDC00..=0xDFFF) => {
                let code = 0x10000 + (((high - 0xD800) as u32) << 10) + (unit - 0xDC00) as u32;
                self.ready.push(char::from_u32(code).unwrap_or(REPLACEMENT));
            }
            (Some(_), _) => {
                // Unpaired high surrogate; the unit is handed back.
                self.ready.push(REPLACEMENT);
                return 2;
            }
        }
        0
    }
}

fn utf8_continuation_valid(lead: u8, index: usize, byte: u8) -> bool {
    let (lo, hi) = match (index, lead) {
        (1, 0xE0) => (0xA0, 0xBF),
        (1, 0xED) => (0x80, 0x9F),
        (1, 0xF0) => (0x90, 0xBF),
        (1, 0xF4) => (0x80, 0x8F),
        _ => (0x80, 0xBF),
    };
    (lo..=hi).contains(&byte)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
    }

    #[test]
    fn test_utf8_decode() {
        let text = "a€😀é";
        assert_eq!(TextEncoding::Utf8.decode(text.as_bytes()), text);
    }

    #[test]
    fn test_utf8_invalid_sequences() {
        // Truncated 3-byte sequence followed by ASCII
        assert_eq!(TextEncoding::Utf8.decode(&[0xE2, 0x82, b'x']), "\u{FFFD}x");
        // Stray continuation byte and invalid lead
        assert_eq!(TextEncoding::Utf8.decode(&[0x80, 0xFF, b'y']), "\u{FFFD}\u{FFFD}y");
        // Encoded surrogate is rejected at the second byte
        assert_eq!(
            TextEncoding::Utf8.decode(&[0xED, 0xA0, 0x80]),
            "\u{FFFD}\u{FFFD}\u{FFFD}"
        );
        // Trailing partial sequence
        assert_eq!(TextEncoding::Utf8.decode(&[b'z', 0xF0, 0x9F]), "z\u{FFFD}");
    }

    #[test]
    fn test_utf16_decode() {
        let text = "hi😀ü";
        assert_eq!(TextEncoding::Utf16Le.decode(&utf16le(text)), text);
    }

    #[test]
    fn test_utf16_unpaired_surrogates() {
        // High surrogate followed by a plain unit yields two characters
        let bytes = [0x3D, 0xD8, b'A', 0x00];
        assert_eq!(TextEncoding::Utf16Le.decode(&bytes), "\u{FFFD}A");

        // Two high surrogates in a row, the second one paired
        let mut bytes = vec![0x3D, 0xD8];
        bytes.extend_from_slice(&utf16le("😀"));
        assert_eq!(TextEncoding::Utf16Le.decode(&bytes), "\u{FFFD}😀");

        // Lone low surrogate
        let bytes = [0x00, 0xDE];
        assert_eq!(TextEncoding::Utf16Le.decode(&bytes), "\u{FFFD}");
    }

    #[test]
    fn test_breaking_byte_handed_back() {
        let mut decoder = TextDecoder::new(TextEncoding::Utf8);
        assert_eq!(decoder.feed(0xE2), 0);
        assert_eq!(decoder.feed(b'x'), 1);
        assert_eq!(decoder.take_char(), Some('\u{FFFD}'));
        assert!(decoder.take_char().is_none());
        assert!(!decoder.has_state());

        let mut decoder = TextDecoder::new(TextEncoding::Utf16Le);
        for byte in [0x3D, 0xD8, b'A'] {
            assert_eq!(decoder.feed(byte), 0);
        }
        assert_eq!(decoder.feed(0x00), 2);
        assert_eq!(decoder.take_char(), Some('\u{FFFD}'));
        assert!(!decoder.has_state());
    }

    #[test]
    fn test_pending_bytes_tracking() {
        let mut decoder = TextDecoder::new(TextEncoding::Utf16Le);
        decoder.feed(0x3D);
        assert_eq!(decoder.pending_bytes(), 1);
        decoder.feed(0xD8);
        assert_eq!(decoder.pending_bytes(), 2);
        decoder.feed(0x00);
        assert_eq!(decoder.pending_bytes(), 3);
        assert!(decoder.take_char().is_none());
        decoder.feed(0xDE);
        assert_eq!(decoder.take_char(), Some('😀'));
        assert!(!decoder.has_state());

        assert_eq!(decoder.feed(0x41), 0);
        decoder.reset();
        assert_eq!(decoder.pending_bytes(), 0);
    }
}
