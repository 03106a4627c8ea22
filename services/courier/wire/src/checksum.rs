//! CRC32 checksums over envelope bytes.

/// CRC32 of `data`
pub fn compute(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Whether `data` hashes to `expected`
pub fn verify(data: &[u8], expected: u32) -> bool {
    compute(data) == expected
}

/// Incremental checksum for data arriving in pieces
#[derive(Clone, Default)]
pub struct Checksum {
    hasher: crc32fast::Hasher,
}

impl Checksum {
    /// Start a new checksum
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed more bytes
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finish and return the checksum
    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }

    /// Discard everything fed so far
    pub fn reset(&mut self) {
        self.hasher.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_value() {
        assert_eq!(compute(b"123456789"), 0xCBF4_3926);
        assert!(verify(b"123456789", 0xCBF4_3926));
        assert!(!verify(b"123456780", 0xCBF4_3926));
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data = b"courier envelope payload";
        let mut checksum = Checksum::new();
        for chunk in data.chunks(5) {
            checksum.update(chunk);
        }
        assert_eq!(checksum.finalize(), compute(data));
    }

    #[test]
    fn test_reset() {
        let mut checksum = Checksum::new();
        checksum.update(b"junk");
        checksum.reset();
        checksum.update(b"123456789");
        assert_eq!(checksum.finalize(), 0xCBF4_3926);
    }
}
