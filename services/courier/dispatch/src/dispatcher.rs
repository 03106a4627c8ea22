//! Packet dispatch.
//!
//! The dispatcher turns raw envelopes into [`Packet`]s using the registry,
//! then hands each packet to a freshly built handler on a worker thread.
//! `handle_packet` returns as soon as the work is scheduled.

use crate::error::DispatchError;
use crate::executor::{DispatchConfig, Executor};
use crate::handler::Consumer;
use crate::packet::Packet;
use crate::registry::EndpointRegistry;
use courier_wire::{CborCodec, Message, StructuredCodec};
use std::sync::Arc;
use tracing::debug;

/// Routes envelopes to handlers
pub struct Dispatcher<C: StructuredCodec = CborCodec> {
    registry: Arc<EndpointRegistry<C>>,
    codec: Arc<C>,
    executor: Executor,
}

impl<C: StructuredCodec> Dispatcher<C> {
    /// Create a dispatcher with its own worker runtime
    pub fn new(
        registry: Arc<EndpointRegistry<C>>,
        codec: Arc<C>,
        config: DispatchConfig,
    ) -> Result<Self, DispatchError> {
        let executor = Executor::new(config)?;
        Ok(Self {
            registry,
            codec,
            executor,
        })
    }

    /// Endpoint registry
    pub fn registry(&self) -> &Arc<EndpointRegistry<C>> {
        &self.registry
    }

    /// Codec used for headers and payloads
    pub fn codec(&self) -> &Arc<C> {
        &self.codec
    }

    /// Thread configuration
    pub fn config(&self) -> &DispatchConfig {
        self.executor.config()
    }

    /// Decode an envelope into a packet.
    ///
    /// Empty input and unknown endpoints yield `None`. Malformed envelopes
    /// and payloads that do not decode as the registered type are errors.
    pub fn get_packet(&self, data: &[u8]) -> Result<Option<Packet<C>>, DispatchError> {
        if data.is_empty() {
            return Ok(None);
        }

        let message = Message::parse(data, self.codec.as_ref())?;
        let info = match self.registry.get(message.header().endpoint()) {
            Some(info) => info,
            None => {
                debug!("No endpoint registered for {}", message.header());
                return Ok(None);
            }
        };

        info.decode(&message, &self.codec)?;
        debug!("Decoded {} as {}", message.header(), info.payload_type());

        Ok(Some(Packet {
            handler_type: info.handler_type(),
            factory: info.factory().clone(),
            message,
            expensive: info.is_expensive(),
            codec: self.codec.clone(),
        }))
    }

    /// Schedule a packet on the shared pool, or on a dedicated thread when
    /// its endpoint is expensive.
    ///
    /// Handler errors and panics are logged on the worker and never returned.
    pub fn handle_packet(
        &self,
        packet: Packet<C>,
        consumer: Arc<dyn Consumer>,
    ) -> Result<(), DispatchError> {
        let label = format!("{} ({})", packet.header(), packet.handler_type());
        let expensive = packet.is_expensive();
        let factory = packet.factory.clone();

        let job = move || {
            let mut handler = factory();
            handler.handle_packet(consumer.as_ref(), packet)
        };

        if expensive {
            self.executor.spawn_dedicated(label, job)
        } else {
            self.executor.spawn_shared(label, job);
            Ok(())
        }
    }

    /// Decode and schedule one envelope; `false` when nothing was dispatched
    pub fn dispatch(
        &self,
        data: &[u8],
        consumer: Arc<dyn Consumer>,
    ) -> Result<bool, DispatchError> {
        match self.get_packet(data)? {
            Some(packet) => {
                self.handle_packet(packet, consumer)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
