//! Decoded packet ready for a handler.

use crate::handler::{HandlerFactory, PacketCallback};
use courier_wire::{CborCodec, EnvelopeModel, Header, Message, StructuredCodec, WireError};
use std::fmt;
use std::sync::Arc;

/// A message matched to its endpoint registration.
///
/// Moved into exactly one handler invocation.
pub struct Packet<C: StructuredCodec = CborCodec> {
    pub(crate) handler_type: &'static str,
    pub(crate) factory: HandlerFactory<C>,
    pub(crate) message: Message,
    pub(crate) expensive: bool,
    pub(crate) codec: Arc<C>,
}

impl<C: StructuredCodec> Packet<C> {
    /// Type name of the registered handler
    pub fn handler_type(&self) -> &'static str {
        self.handler_type
    }

    /// Whether the packet runs on a dedicated thread
    pub fn is_expensive(&self) -> bool {
        self.expensive
    }

    /// Envelope header
    pub fn header(&self) -> &Header {
        self.message.header()
    }

    /// Underlying message
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Codec the packet was decoded with
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Typed payload
    pub fn payload<T: EnvelopeModel>(&self) -> Result<&T, WireError> {
        self.message.deserialize::<T, C>(&self.codec)
    }

    /// Serialize `response` as a reply carrying this packet's sync key.
    ///
    /// The endpoint comes from the response type.
    pub fn reply<R: EnvelopeModel>(&self, response: R) -> Result<PacketCallback, WireError> {
        let endpoint = R::endpoint().ok_or(WireError::MissingEndpoint(std::any::type_name::<R>()))?;
        self.reply_on(endpoint, response)
    }

    /// Serialize `response` for an explicit endpoint
    pub fn reply_on<R: EnvelopeModel>(
        &self,
        endpoint: &str,
        response: R,
    ) -> Result<PacketCallback, WireError> {
        let header = self.header().reply(endpoint);
        let bytes = Message::from_source(header, response).serialize::<R, C>(&self.codec)?;
        Ok(PacketCallback {
            endpoint: endpoint.to_string(),
            response: bytes,
        })
    }

    /// Take the message out of the packet
    pub fn into_message(self) -> Message {
        self.message
    }
}

impl<C: StructuredCodec> fmt::Debug for Packet<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("handler_type", &self.handler_type)
            .field("expensive", &self.expensive)
            .field("message", &self.message)
            .finish()
    }
}
