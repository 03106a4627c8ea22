//! Non-owning views over contiguous memory regions.

/// One contiguous region of a segmented input.
///
/// Segments borrow their bytes; the reader that holds them never reaches
/// past `len()` of the active segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSegment<'a> {
    data: &'a [u8],
}

impl<'a> BufferSegment<'a> {
    /// Wrap a byte region
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Underlying bytes
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the segment holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Split `data` into consecutive segments ending at each of `cuts`.
    ///
    /// Cut points are clamped to the data length and may repeat, producing
    /// empty segments.
    pub fn split_at_offsets(data: &'a [u8], cuts: &[usize]) -> Vec<BufferSegment<'a>> {
        let mut segments = Vec::with_capacity(cuts.len() + 1);
        let mut start = 0;
        for &cut in cuts {
            let end = cut.clamp(start, data.len());
            segments.push(BufferSegment::new(&data[start..end]));
            start = end;
        }
        segments.push(BufferSegment::new(&data[start..]));
        segments
    }
}

impl<'a> From<&'a [u8]> for BufferSegment<'a> {
    fn from(data: &'a [u8]) -> Self {
        Self::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_at_offsets() {
        let data = [1u8, 2, 3, 4, 5];
        let segments = BufferSegment::split_at_offsets(&data, &[2, 2, 4, 9]);

        let lens: Vec<usize> = segments.iter().map(|s| s.len()).collect();
        assert_eq!(lens, vec![2, 0, 2, 1, 0]);
        assert_eq!(segments[2].data(), &[3, 4]);
        assert!(segments[1].is_empty());
    }
}
