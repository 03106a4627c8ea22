//! Structured payload codecs.
//!
//! Headers and payloads are encoded with a [`StructuredCodec`]. The shipped
//! implementation is [`CborCodec`], which also renders CDDL schema text for
//! registered models.

use crate::error::CodecError;
use crate::model::EnvelopeModel;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Serializer seam for headers and payloads
pub trait StructuredCodec: Send + Sync + 'static {
    /// Short codec name used in logs
    fn name(&self) -> &'static str;

    /// Append the encoding of `value` to `out`
    fn encode<T: Serialize + ?Sized>(&self, value: &T, out: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decode a value that spans all of `bytes`
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;

    /// Schema text describing `T`
    fn schema_text<T: EnvelopeModel>(&self) -> String;

    /// Warm up any per-type state ahead of first use
    fn prepare<T: EnvelopeModel>(&self) -> Result<(), CodecError> {
        Ok(())
    }
}

/// CBOR codec backed by `ciborium`
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl CborCodec {
    /// Create the codec
    pub fn new() -> Self {
        Self
    }
}

impl StructuredCodec for CborCodec {
    fn name(&self) -> &'static str {
        "cbor"
    }

    fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
        out: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        ciborium::into_writer(value, &mut *out).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let mut rest = bytes;
        let value =
            ciborium::from_reader(&mut rest).map_err(|e| CodecError::Decode(e.to_string()))?;
        if !rest.is_empty() {
            return Err(CodecError::Decode(format!("{} trailing bytes", rest.len())));
        }
        Ok(value)
    }

    fn schema_text<T: EnvelopeModel>(&self) -> String {
        let package = T::schema_package();
        let rule = format!("{} = {}\n", T::schema_name(), T::cddl());
        if package.is_empty() {
            rule
        } else {
            format!("package {};\n\n{}", package, rule)
        }
    }

    fn prepare<T: EnvelopeModel>(&self) -> Result<(), CodecError> {
        // No per-type CBOR state; only the model metadata is checked.
        let text = self.schema_text::<T>();
        if text.trim().is_empty() {
            return Err(CodecError::Prepare {
                type_name: std::any::type_name::<T>(),
                reason: "empty schema".to_string(),
            });
        }
        debug!("Prepared {} for {}", std::any::type_name::<T>(), self.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Reading {
        sensor: String,
        value: f64,
    }

    impl EnvelopeModel for Reading {
        fn cddl() -> String {
            "{ sensor: tstr, value: float }".to_string()
        }
    }

    #[test]
    fn test_cbor_round_trip() {
        let codec = CborCodec::new();
        let reading = Reading {
            sensor: "t1".to_string(),
            value: 21.5,
        };

        let mut buf = Vec::new();
        codec.encode(&reading, &mut buf).unwrap();
        let decoded: Reading = codec.decode(&buf).unwrap();
        assert_eq!(decoded, reading);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let codec = CborCodec::new();
        let result: Result<Reading, _> = codec.decode(&[0xFF, 0x00]);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_decode_trailing_bytes_fails() {
        let codec = CborCodec::new();
        let mut buf = Vec::new();
        codec
            .encode(
                &Reading {
                    sensor: "t1".to_string(),
                    value: 1.0,
                },
                &mut buf,
            )
            .unwrap();
        buf.push(0x00);

        match codec.decode::<Reading>(&buf) {
            Err(CodecError::Decode(reason)) => assert_eq!(reason, "1 trailing bytes"),
            other => panic!("expected Decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_text() {
        let codec = CborCodec::new();
        let text = codec.schema_text::<Reading>();
        assert!(text.starts_with("package courier_wire.codec.tests;"));
        assert!(text.contains("Reading = { sensor: tstr, value: float }"));
        assert!(codec.prepare::<Reading>().is_ok());
    }
}
