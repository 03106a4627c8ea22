//! Endpoints served by the courier binary.

use courier_dispatch::{
    Consumer, DispatchError, Endpoint, EndpointCatalog, EndpointRegistry, HandlerError, Packet,
    PacketHandler,
};
use courier_wire::{checksum::Checksum, EnvelopeModel};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Bytes fed to the checksum per step
const DIGEST_CHUNK: usize = 64 * 1024;

/// Liveness probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    /// Caller-chosen sequence number
    pub seq: u32,
}

impl EnvelopeModel for Ping {
    fn endpoint() -> Option<&'static str> {
        Some(PingEndpoint::NAME)
    }

    fn cddl() -> String {
        "{ seq: uint }".to_string()
    }
}

/// Reply to [`Ping`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pong {
    /// Sequence number echoed from the ping
    pub seq: u32,
}

impl EnvelopeModel for Pong {
    fn endpoint() -> Option<&'static str> {
        Some("Pong")
    }

    fn cddl() -> String {
        "{ seq: uint }".to_string()
    }
}

/// Request for a CRC32 over a blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestRequest {
    /// Bytes to checksum
    pub data: Vec<u8>,
}

impl EnvelopeModel for DigestRequest {
    fn endpoint() -> Option<&'static str> {
        Some(DigestEndpoint::NAME)
    }

    fn cddl() -> String {
        "{ data: [* uint] }".to_string()
    }
}

/// Result of a [`DigestRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestResponse {
    /// CRC32 of the data
    pub crc: u32,
    /// Number of bytes covered
    pub len: u64,
}

impl EnvelopeModel for DigestResponse {
    fn endpoint() -> Option<&'static str> {
        Some("DigestResult")
    }

    fn cddl() -> String {
        "{ crc: uint, len: uint }".to_string()
    }
}

/// Answers pings on the shared pool
#[derive(Default)]
pub struct PingHandler;

impl PacketHandler for PingHandler {
    fn handle_packet(
        &mut self,
        consumer: &dyn Consumer,
        packet: Packet,
    ) -> Result<(), HandlerError> {
        let seq = packet.payload::<Ping>()?.seq;
        debug!("Ping {} from {}", seq, packet.header().sync_key());
        consumer.reply(packet.reply(Pong { seq })?);
        Ok(())
    }
}

/// Checksums blobs on a dedicated thread
#[derive(Default)]
pub struct DigestHandler {
    checksum: Checksum,
}

impl PacketHandler for DigestHandler {
    fn handle_packet(
        &mut self,
        consumer: &dyn Consumer,
        packet: Packet,
    ) -> Result<(), HandlerError> {
        let request = packet.payload::<DigestRequest>()?;
        for chunk in request.data.chunks(DIGEST_CHUNK) {
            self.checksum.update(chunk);
        }
        let response = DigestResponse {
            crc: std::mem::take(&mut self.checksum).finalize(),
            len: request.data.len() as u64,
        };
        consumer.reply(packet.reply(response)?);
        Ok(())
    }
}

/// `Ping` endpoint
pub struct PingEndpoint;

impl Endpoint for PingEndpoint {
    const NAME: &'static str = "Ping";
    type Payload = Ping;
    type Handler = PingHandler;
}

/// `Digest` endpoint
pub struct DigestEndpoint;

impl Endpoint for DigestEndpoint {
    const NAME: &'static str = "Digest";
    const EXPENSIVE: bool = true;
    type Payload = DigestRequest;
    type Handler = DigestHandler;
}

/// Registry with every built-in endpoint
pub fn registry() -> Result<EndpointRegistry, DispatchError> {
    EndpointRegistry::builder()
        .declare::<PingEndpoint>()
        .declare::<DigestEndpoint>()
        .response::<Pong>()
        .response::<DigestResponse>()
        .build()
}

/// Types a stored manifest may refer to
pub fn catalog() -> EndpointCatalog {
    EndpointCatalog::new()
        .payload::<Ping>()
        .payload::<DigestRequest>()
        .handler::<PingHandler>()
        .handler::<DigestHandler>()
}

/// Registry built from a stored manifest plus the built-in responses
pub fn registry_from_manifest(
    data: &[u8],
    codec: &courier_wire::CborCodec,
) -> Result<EndpointRegistry, DispatchError> {
    EndpointRegistry::builder()
        .load_manifest(data, &catalog(), codec)?
        .response::<Pong>()
        .response::<DigestResponse>()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_dispatch::{DispatchConfig, Dispatcher, PacketCallback};
    use courier_wire::{checksum, CborCodec, Message};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn dispatcher(registry: EndpointRegistry) -> Dispatcher {
        let config = DispatchConfig::default().with_max_pool_threads(2);
        Dispatcher::new(Arc::new(registry), Arc::new(CborCodec::new()), config).unwrap()
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<PacketCallback>) -> PacketCallback {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_ping_replies_with_same_sync_key() {
        let codec = CborCodec::new();
        let dispatcher = dispatcher(registry().unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let request = Message::serialized("Ping", "abc", Ping { seq: 42 }, &codec).unwrap();
        dispatcher.dispatch(&request, Arc::new(tx)).unwrap();

        let reply = next(&mut rx).await;
        let message = Message::parse(&reply.response, &codec).unwrap();
        assert_eq!(message.header().endpoint(), "Pong");
        assert_eq!(message.header().sync_key(), "abc");
        assert_eq!(message.deserialize::<Pong, _>(&codec).unwrap().seq, 42);
    }

    #[tokio::test]
    async fn test_digest_matches_checksum() {
        let codec = CborCodec::new();
        let dispatcher = dispatcher(registry().unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let expected = checksum::compute(&data);
        let request = Message::stamped("d1", DigestRequest { data }).unwrap();
        let bytes = request.serialize::<DigestRequest, _>(&codec).unwrap();
        dispatcher.dispatch(&bytes, Arc::new(tx)).unwrap();

        let reply = next(&mut rx).await;
        assert_eq!(reply.endpoint, "DigestResult");
        let message = Message::parse(&reply.response, &codec).unwrap();
        let response = message.deserialize::<DigestResponse, _>(&codec).unwrap();
        assert_eq!(response.crc, expected);
        assert_eq!(response.len, 200_000);
    }

    #[test]
    fn test_manifest_rebuilds_registry() {
        let codec = CborCodec::new();
        let registry = registry().unwrap();
        let saved = registry.save_manifest(&codec).unwrap();

        let rebuilt = registry_from_manifest(&saved, &codec).unwrap();
        assert_eq!(rebuilt.manifest(), registry.manifest());
        assert!(rebuilt.get("Digest").unwrap().is_expensive());
        assert_eq!(rebuilt.responses().len(), 2);
    }
}
