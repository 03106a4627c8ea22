//! Endpoint registry and packet dispatch for courier.
//!
//! Incoming envelopes are matched to a registered endpoint, their payload is
//! decoded into the registered model type, and a fresh handler processes the
//! resulting [`Packet`] on a worker thread.
//!
//! ## Features
//!
//! - **Registry**: endpoint name to payload type and handler factory,
//!   frozen after build and shared behind an `Arc`
//! - **Isolation**: endpoints marked expensive run on a dedicated named
//!   thread instead of the shared pool
//! - **Fault Containment**: handler errors and panics are logged on the
//!   worker and never reach the caller
//! - **Manifests**: registrations can be saved as a `Packets` envelope and
//!   loaded back against a catalog of compiled types
//! - **Schemas**: per-endpoint schema files for requests and responses
//!
//! ## Example
//!
//! ```rust,no_run
//! use courier_dispatch::{
//!     Consumer, DispatchConfig, Dispatcher, EndpointRegistry, HandlerError, Packet, PacketHandler,
//! };
//! use courier_wire::{CborCodec, EnvelopeModel};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping {
//!     seq: u32,
//! }
//!
//! impl EnvelopeModel for Ping {}
//!
//! #[derive(Serialize, Deserialize)]
//! struct Pong {
//!     seq: u32,
//! }
//!
//! impl EnvelopeModel for Pong {
//!     fn endpoint() -> Option<&'static str> {
//!         Some("Pong")
//!     }
//! }
//!
//! #[derive(Default)]
//! struct PingHandler;
//!
//! impl PacketHandler for PingHandler {
//!     fn handle_packet(
//!         &mut self,
//!         consumer: &dyn Consumer,
//!         packet: Packet,
//!     ) -> Result<(), HandlerError> {
//!         let seq = packet.payload::<Ping>()?.seq;
//!         consumer.reply(packet.reply(Pong { seq })?);
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> Result<(), courier_dispatch::DispatchError> {
//! let registry = EndpointRegistry::builder()
//!     .register::<Ping, PingHandler>("Ping")
//!     .response::<Pong>()
//!     .build()?;
//! let dispatcher = Dispatcher::new(
//!     Arc::new(registry),
//!     Arc::new(CborCodec::new()),
//!     DispatchConfig::default(),
//! )?;
//! # let _ = dispatcher;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod handler;
pub mod packet;
pub mod registry;
pub mod schema;

// Re-export main types
pub use catalog::{
    EndpointCatalog, HandlerBinding, ManifestEntry, PayloadBinding, MANIFEST_ENDPOINT,
};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, HandlerError};
pub use executor::DispatchConfig;
pub use handler::{Consumer, Endpoint, HandlerFactory, PacketCallback, PacketHandler};
pub use packet::Packet;
pub use registry::{EndpointInfo, EndpointRegistry, EndpointRegistryBuilder, ResponseInfo};
pub use schema::{dump_schemas, SchemaKind, SchemaOptions};
