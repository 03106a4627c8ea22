//! Handler and consumer traits.

use crate::error::HandlerError;
use crate::packet::Packet;
use bytes::Bytes;
use courier_wire::{CborCodec, EnvelopeModel, StructuredCodec};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Serialized response produced by a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketCallback {
    /// Endpoint of the response
    pub endpoint: String,
    /// Complete response envelope
    pub response: Bytes,
}

/// Receiver of handler responses.
///
/// Implementations must tolerate calls from several worker threads at once.
pub trait Consumer: Send + Sync {
    /// Deliver one response
    fn reply(&self, callback: PacketCallback);
}

impl<F> Consumer for F
where
    F: Fn(PacketCallback) + Send + Sync,
{
    fn reply(&self, callback: PacketCallback) {
        self(callback)
    }
}

impl Consumer for mpsc::UnboundedSender<PacketCallback> {
    fn reply(&self, callback: PacketCallback) {
        if let Err(e) = self.send(callback) {
            warn!("Dropping response for {}: receiver closed", e.0.endpoint);
        }
    }
}

/// Processes one packet.
///
/// A fresh handler is built for every packet, so `&mut self` state lives for
/// a single invocation.
pub trait PacketHandler<C: StructuredCodec = CborCodec>: Send + 'static {
    /// Handle the packet, replying through `consumer` as needed
    fn handle_packet(
        &mut self,
        consumer: &dyn Consumer,
        packet: Packet<C>,
    ) -> Result<(), HandlerError>;
}

/// Builds a handler for one packet
pub type HandlerFactory<C = CborCodec> = Arc<dyn Fn() -> Box<dyn PacketHandler<C>> + Send + Sync>;

/// Compile-time description of an endpoint
pub trait Endpoint {
    /// Endpoint name on the wire
    const NAME: &'static str;

    /// Whether handlers run on a dedicated thread
    const EXPENSIVE: bool = false;

    /// Request payload type
    type Payload: EnvelopeModel;

    /// Handler type, built with `Default`
    type Handler: Default + 'static;
}

/// Factory building `H` with `Default`
pub fn default_factory<H, C>() -> HandlerFactory<C>
where
    H: PacketHandler<C> + Default,
    C: StructuredCodec,
{
    Arc::new(|| Box::new(H::default()) as Box<dyn PacketHandler<C>>)
}
