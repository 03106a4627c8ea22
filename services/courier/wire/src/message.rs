//! Envelope message.
//!
//! Wire layout of one envelope:
//!
//! ```text
//! +-----------------+----------------------+------------------------+
//! | VLQ header len  | header (codec bytes) | payload (codec bytes)  |
//! +-----------------+----------------------+------------------------+
//! ```
//!
//! A parsed message keeps its payload as raw bytes and decodes it lazily. The
//! first typed decode is cached; later decodes of the same type return the
//! cached value.

use crate::codec::StructuredCodec;
use crate::error::WireError;
use crate::header::Header;
use crate::model::EnvelopeModel;
use bytes::Bytes;
use courier_buffer::{decode_vlq, encode_vlq, VlqError};
use once_cell::sync::OnceCell;
use std::any::{type_name, Any};
use std::fmt;

struct Source {
    type_name: &'static str,
    value: Box<dyn Any + Send + Sync>,
}

impl Source {
    fn new<T: EnvelopeModel>(value: T) -> Self {
        Self {
            type_name: type_name::<T>(),
            value: Box::new(value),
        }
    }

    fn downcast<T: EnvelopeModel>(&self) -> Result<&T, WireError> {
        self.value
            .downcast_ref::<T>()
            .ok_or(WireError::TypeMismatch {
                cached: self.type_name,
                requested: type_name::<T>(),
            })
    }
}

/// Header plus payload, either parsed from bytes or built from a typed value
pub struct Message {
    header: Header,
    payload: Bytes,
    source: OnceCell<Source>,
}

impl Message {
    /// Parse one envelope from `data`.
    ///
    /// The payload is copied out of `data`.
    pub fn parse<C: StructuredCodec>(data: &[u8], codec: &C) -> Result<Self, WireError> {
        let mut cursor = data;
        let header_len = decode_vlq(&mut cursor)? as usize;
        if cursor.len() < header_len {
            return Err(WireError::Truncated {
                expected: header_len,
                available: cursor.len(),
            });
        }

        let (header_bytes, payload) = cursor.split_at(header_len);
        let header: Header = codec.decode(header_bytes)?;

        Ok(Self {
            header,
            payload: Bytes::copy_from_slice(payload),
            source: OnceCell::new(),
        })
    }

    /// Build a message around a typed value
    pub fn from_source<T: EnvelopeModel>(header: Header, source: T) -> Self {
        Self {
            header,
            payload: Bytes::new(),
            source: OnceCell::with_value(Source::new(source)),
        }
    }

    /// Build a message for `endpoint` around a typed value
    pub fn instance<T: EnvelopeModel>(
        endpoint: impl Into<String>,
        sync_key: impl Into<String>,
        source: T,
    ) -> Self {
        Self::from_source(Header::new(endpoint, sync_key), source)
    }

    /// Build a message whose endpoint comes from the payload type
    pub fn stamped<T: EnvelopeModel>(
        sync_key: impl Into<String>,
        source: T,
    ) -> Result<Self, WireError> {
        let endpoint = T::endpoint().ok_or(WireError::MissingEndpoint(type_name::<T>()))?;
        Ok(Self::instance(endpoint, sync_key, source))
    }

    /// Build and serialize a message in one step
    pub fn serialized<T: EnvelopeModel, C: StructuredCodec>(
        endpoint: impl Into<String>,
        sync_key: impl Into<String>,
        source: T,
        codec: &C,
    ) -> Result<Bytes, WireError> {
        Self::instance(endpoint, sync_key, source).serialize::<T, C>(codec)
    }

    /// Envelope header
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Raw payload bytes; empty for messages built from a typed value
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Typed value, if one is attached or has been decoded
    pub fn source<T: EnvelopeModel>(&self) -> Option<&T> {
        self.source.get().and_then(|s| s.value.downcast_ref::<T>())
    }

    /// Whether a typed value is attached or cached
    pub fn has_source(&self) -> bool {
        self.source.get().is_some()
    }

    /// Decode the payload as `T`, caching the result.
    ///
    /// Asking for a different type than the cached one fails with
    /// [`WireError::TypeMismatch`].
    pub fn deserialize<T: EnvelopeModel, C: StructuredCodec>(
        &self,
        codec: &C,
    ) -> Result<&T, WireError> {
        let source = self
            .source
            .get_or_try_init(|| -> Result<Source, WireError> {
                let value: T = codec.decode(&self.payload)?;
                Ok(Source::new(value))
            })?;
        source.downcast::<T>()
    }

    /// Write the envelope.
    ///
    /// The attached value is encoded when present; a parsed message with no
    /// decoded value writes its raw payload unchanged.
    pub fn serialize<T: EnvelopeModel, C: StructuredCodec>(
        &self,
        codec: &C,
    ) -> Result<Bytes, WireError> {
        self.header.validate()?;

        let mut header_bytes = Vec::new();
        codec.encode(&self.header, &mut header_bytes)?;
        let header_len = u32::try_from(header_bytes.len())
            .map_err(|_| VlqError::Overflow(header_bytes.len() as u64))?;

        let mut out = Vec::with_capacity(4 + header_bytes.len() + self.payload.len());
        encode_vlq(header_len, &mut out)?;
        out.extend_from_slice(&header_bytes);

        match self.source.get() {
            Some(source) => codec.encode(source.downcast::<T>()?, &mut out)?,
            None => out.extend_from_slice(&self.payload),
        }

        Ok(Bytes::from(out))
    }

    /// Schema text for `T` as rendered by `codec`
    pub fn schema<T: EnvelopeModel, C: StructuredCodec>(codec: &C) -> String {
        codec.schema_text::<T>()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .field("source", &self.source.get().map(|s| s.type_name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CborCodec;
    use crate::error::CodecError;
    use courier_buffer::encode_vlq_to_vec;
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    impl EnvelopeModel for Ping {
        fn endpoint() -> Option<&'static str> {
            Some("Ping")
        }

        fn cddl() -> String {
            "{ seq: uint }".to_string()
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    impl EnvelopeModel for Note {}

    #[test]
    fn test_envelope_round_trip() {
        let codec = CborCodec::new();
        let bytes = Message::serialized("Ping", "abc", Ping { seq: 42 }, &codec).unwrap();

        let message = Message::parse(&bytes, &codec).unwrap();
        assert_eq!(message.header().endpoint(), "Ping");
        assert_eq!(message.header().sync_key(), "abc");
        assert!(!message.has_source());

        let ping: &Ping = message.deserialize(&codec).unwrap();
        assert_eq!(ping.seq, 42);
        assert_eq!(message.source::<Ping>(), Some(&Ping { seq: 42 }));
    }

    #[test]
    fn test_layout_starts_with_header_length() {
        let codec = CborCodec::new();
        let bytes = Message::serialized("Ping", "abc", Ping { seq: 1 }, &codec).unwrap();

        let mut header = Vec::new();
        codec.encode(&Header::new("Ping", "abc"), &mut header).unwrap();
        let prefix = encode_vlq_to_vec(header.len() as u32).unwrap();

        assert_eq!(&bytes[..prefix.len()], prefix.as_slice());
        assert_eq!(&bytes[prefix.len()..prefix.len() + header.len()], header.as_slice());
    }

    #[test]
    fn test_truncated_header_rejected() {
        let codec = CborCodec::new();
        let data = [0x10, 0xA0, 0x01];
        match Message::parse(&data, &codec) {
            Err(WireError::Truncated { expected, available }) => {
                assert_eq!(expected, 16);
                assert_eq!(available, 2);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        let codec = CborCodec::new();
        assert!(matches!(
            Message::parse(&[], &codec),
            Err(WireError::Vlq(VlqError::Truncated))
        ));
    }

    #[test]
    fn test_missing_endpoint() {
        let codec = CborCodec::new();
        let note = Note {
            text: "hi".to_string(),
        };
        assert!(matches!(
            Message::stamped("k", note.clone()),
            Err(WireError::MissingEndpoint(_))
        ));
        assert!(matches!(
            Message::serialized("", "k", note, &codec),
            Err(WireError::MissingEndpoint(_))
        ));
    }

    #[test]
    fn test_stamped_uses_type_endpoint() {
        let message = Message::stamped("k", Ping { seq: 7 }).unwrap();
        assert_eq!(message.header().endpoint(), "Ping");
        assert_eq!(message.source::<Ping>().map(|p| p.seq), Some(7));
    }

    #[test]
    fn test_second_decode_with_other_type_fails() {
        let codec = CborCodec::new();
        let bytes = Message::serialized("Ping", "abc", Ping { seq: 3 }, &codec).unwrap();
        let message = Message::parse(&bytes, &codec).unwrap();

        assert!(message.deserialize::<Ping, _>(&codec).is_ok());
        assert!(message.deserialize::<Ping, _>(&codec).is_ok());
        assert!(matches!(
            message.deserialize::<Note, _>(&codec),
            Err(WireError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_raw_payload_forwarded_unchanged() {
        let codec = CborCodec::new();
        let bytes = Message::serialized("Ping", "abc", Ping { seq: 9 }, &codec).unwrap();
        let message = Message::parse(&bytes, &codec).unwrap();

        let forwarded = message.serialize::<Ping, _>(&codec).unwrap();
        assert_eq!(forwarded, bytes);
    }

    #[test]
    fn test_junk_inside_header_rejected() {
        let codec = CborCodec::new();
        let mut header = Vec::new();
        codec.encode(&Header::new("Ping", "k"), &mut header).unwrap();
        header.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

        let mut data = encode_vlq_to_vec(header.len() as u32).unwrap();
        data.extend_from_slice(&header);
        data.push(0x01);

        assert!(matches!(
            Message::parse(&data, &codec),
            Err(WireError::Codec(CodecError::Decode(_)))
        ));
    }

    #[test]
    fn test_junk_after_payload_rejected() {
        let codec = CborCodec::new();
        let mut data = Message::serialized("Ping", "k", Ping { seq: 3 }, &codec)
            .unwrap()
            .to_vec();
        data.extend_from_slice(&[0xAA, 0xBB]);

        let message = Message::parse(&data, &codec).unwrap();
        assert!(matches!(
            message.deserialize::<Ping, _>(&codec),
            Err(WireError::Codec(CodecError::Decode(_)))
        ));
        assert!(!message.has_source());
    }

    #[test]
    fn test_collection_payload() {
        let codec = CborCodec::new();
        let notes = vec![
            Note {
                text: "a".to_string(),
            },
            Note {
                text: "b".to_string(),
            },
        ];
        let bytes = Message::serialized("Notes", "k", notes.clone(), &codec).unwrap();
        let message = Message::parse(&bytes, &codec).unwrap();
        assert_eq!(message.deserialize::<Vec<Note>, _>(&codec).unwrap(), &notes);
    }

    proptest! {
        #[test]
        fn prop_envelope_round_trip(
            endpoint in "[A-Za-z][A-Za-z0-9]{0,15}",
            sync_key in ".{0,24}",
            seq in any::<u32>(),
        ) {
            let codec = CborCodec::new();
            let bytes =
                Message::serialized(endpoint.clone(), sync_key.clone(), Ping { seq }, &codec)
                    .unwrap();
            let message = Message::parse(&bytes, &codec).unwrap();
            prop_assert_eq!(message.header().endpoint(), endpoint.as_str());
            prop_assert_eq!(message.header().sync_key(), sync_key.as_str());
            prop_assert_eq!(message.deserialize::<Ping, _>(&codec).unwrap().seq, seq);
        }
    }
}
