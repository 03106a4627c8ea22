//! Variable-length quantity codec for envelope framing.
//!
//! Values are written most-significant group first, seven payload bits per
//! byte, with the high bit set on every byte except the last. At most four
//! bytes are used, which caps encodable values at 28 bits (256 MiB header
//! lengths).
//!
//! ```text
//! 0x00000000 -> 00
//! 0x0000007F -> 7F
//! 0x00000080 -> 81 00
//! 0x00003FFF -> FF 7F
//! 0x0FFFFFFF -> FF FF FF 7F
//! ```

use crate::error::VlqError;
use bytes::{Buf, BufMut};

/// Maximum number of encoded bytes
pub const MAX_VLQ_BYTES: usize = 4;

/// Largest encodable value (2^28 - 1)
pub const MAX_VLQ_VALUE: u32 = (1 << 28) - 1;

/// Number of bytes `value` occupies once encoded
pub fn encoded_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        _ => 4,
    }
}

/// Encode `value` into `buf`, returning the number of bytes written
pub fn encode_vlq<B: BufMut>(value: u32, buf: &mut B) -> Result<usize, VlqError> {
    if value > MAX_VLQ_VALUE {
        return Err(VlqError::Overflow(value as u64));
    }

    let len = encoded_len(value);
    for group in (0..len).rev() {
        let mut byte = ((value >> (group * 7)) & 0x7F) as u8;
        if group > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
    }

    Ok(len)
}

/// Encode `value` into a freshly allocated vector
pub fn encode_vlq_to_vec(value: u32) -> Result<Vec<u8>, VlqError> {
    let mut out = Vec::with_capacity(MAX_VLQ_BYTES);
    encode_vlq(value, &mut out)?;
    Ok(out)
}

/// Decode one value from the front of `buf`
pub fn decode_vlq<B: Buf>(buf: &mut B) -> Result<u32, VlqError> {
    decode_from_fn(|| {
        if buf.has_remaining() {
            Some(buf.get_u8())
        } else {
            None
        }
    })
}

/// Decode one value pulling bytes from `next` until the terminating byte.
///
/// `next` returning `None` means the input ran out.
pub(crate) fn decode_from_fn<F>(mut next: F) -> Result<u32, VlqError>
where
    F: FnMut() -> Option<u8>,
{
    let mut value = 0u32;
    for _ in 0..MAX_VLQ_BYTES {
        let byte = next().ok_or(VlqError::Truncated)?;
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(VlqError::TooLong(MAX_VLQ_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_encodings() {
        assert_eq!(encode_vlq_to_vec(0).unwrap(), vec![0x00]);
        assert_eq!(encode_vlq_to_vec(0x7F).unwrap(), vec![0x7F]);
        assert_eq!(encode_vlq_to_vec(0x80).unwrap(), vec![0x81, 0x00]);
        assert_eq!(encode_vlq_to_vec(0x2000).unwrap(), vec![0xC0, 0x00]);
        assert_eq!(encode_vlq_to_vec(0x3FFF).unwrap(), vec![0xFF, 0x7F]);
        assert_eq!(encode_vlq_to_vec(0x4000).unwrap(), vec![0x81, 0x80, 0x00]);
        assert_eq!(
            encode_vlq_to_vec(MAX_VLQ_VALUE).unwrap(),
            vec![0xFF, 0xFF, 0xFF, 0x7F]
        );
    }

    #[test]
    fn test_overflow_rejected() {
        assert_eq!(
            encode_vlq_to_vec(1 << 28),
            Err(VlqError::Overflow(1 << 28))
        );
        assert!(encode_vlq_to_vec(u32::MAX).is_err());
    }

    #[test]
    fn test_too_long_rejected() {
        let mut input: &[u8] = &[0x81, 0x81, 0x81, 0x81, 0x00];
        assert_eq!(decode_vlq(&mut input), Err(VlqError::TooLong(4)));
    }

    #[test]
    fn test_truncated_rejected() {
        let mut input: &[u8] = &[0x81, 0x81];
        assert_eq!(decode_vlq(&mut input), Err(VlqError::Truncated));

        let mut empty: &[u8] = &[];
        assert_eq!(decode_vlq(&mut empty), Err(VlqError::Truncated));
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let mut input: &[u8] = &[0x81, 0x00, 0xAA, 0xBB];
        assert_eq!(decode_vlq(&mut input).unwrap(), 0x80);
        assert_eq!(input, &[0xAA, 0xBB]);
    }

    proptest! {
        #[test]
        fn prop_round_trip(value in 0u32..(1 << 28)) {
            let encoded = encode_vlq_to_vec(value).unwrap();
            prop_assert_eq!(encoded.len(), encoded_len(value));
            let mut slice = encoded.as_slice();
            prop_assert_eq!(decode_vlq(&mut slice).unwrap(), value);
            prop_assert!(slice.is_empty());
        }

        #[test]
        fn prop_overflow(value in (1u32 << 28)..=u32::MAX) {
            prop_assert_eq!(encode_vlq_to_vec(value), Err(VlqError::Overflow(value as u64)));
        }
    }
}
