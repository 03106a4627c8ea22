//! Envelope protocol for courier.
//!
//! An envelope is a VLQ header length, a structured header naming the
//! endpoint and sync key, and a structured payload:
//!
//! ```text
//! [VLQ headerLength][header bytes][payload bytes]
//! ```
//!
//! ## Features
//!
//! - **Header**: endpoint plus sync key, serialized as `endpoint`/`syncKey`
//! - **Lazy Payloads**: parsed payloads stay raw until first typed decode,
//!   which is cached on the message
//! - **Codec Seam**: [`StructuredCodec`] with a CBOR implementation
//! - **Schema Text**: CDDL rules rendered per payload model
//!
//! ## Example
//!
//! ```rust
//! use courier_wire::{CborCodec, EnvelopeModel, Message};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping {
//!     seq: u32,
//! }
//!
//! impl EnvelopeModel for Ping {
//!     fn endpoint() -> Option<&'static str> {
//!         Some("Ping")
//!     }
//! }
//!
//! let codec = CborCodec::new();
//! let bytes = Message::stamped("abc", Ping { seq: 42 })
//!     .unwrap()
//!     .serialize::<Ping, _>(&codec)
//!     .unwrap();
//!
//! let message = Message::parse(&bytes, &codec).unwrap();
//! assert_eq!(message.header().endpoint(), "Ping");
//! assert_eq!(message.deserialize::<Ping, _>(&codec).unwrap().seq, 42);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checksum;
pub mod codec;
pub mod error;
pub mod header;
pub mod message;
pub mod model;

// Re-export main types
pub use checksum::Checksum;
pub use codec::{CborCodec, StructuredCodec};
pub use error::{CodecError, WireError};
pub use header::Header;
pub use message::Message;
pub use model::{split_type_path, EnvelopeModel};
