//! Endpoint registry.
//!
//! The registry maps endpoint names to payload decoders and handler
//! factories. It is assembled once through [`EndpointRegistryBuilder`] and is
//! read-only afterwards, so it can be shared behind an `Arc` by any number of
//! dispatchers.

use crate::catalog::{
    decode_payload, prepare_for, schema_for, DecodeFn, EndpointCatalog, ManifestEntry, PrepareFn,
    SchemaFn, MANIFEST_ENDPOINT,
};
use crate::error::DispatchError;
use crate::handler::{default_factory, Endpoint, HandlerFactory, PacketHandler};
use bytes::Bytes;
use courier_wire::{CborCodec, EnvelopeModel, Message, StructuredCodec, WireError};
use once_cell::sync::OnceCell;
use std::any::type_name;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Registration of one endpoint
pub struct EndpointInfo<C: StructuredCodec = CborCodec> {
    endpoint: String,
    payload_type: &'static str,
    handler_type: &'static str,
    expensive: bool,
    decode: DecodeFn<C>,
    schema: SchemaFn<C>,
    prepare: PrepareFn<C>,
    factory: HandlerFactory<C>,
    schema_cache: OnceCell<String>,
}

impl<C: StructuredCodec> EndpointInfo<C> {
    /// Endpoint name
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Payload type name
    pub fn payload_type(&self) -> &'static str {
        self.payload_type
    }

    /// Handler type name
    pub fn handler_type(&self) -> &'static str {
        self.handler_type
    }

    /// Whether handlers run on a dedicated thread
    pub fn is_expensive(&self) -> bool {
        self.expensive
    }

    /// Handler factory
    pub fn factory(&self) -> &HandlerFactory<C> {
        &self.factory
    }

    /// Decode the message payload into its cache
    pub fn decode(&self, message: &Message, codec: &C) -> Result<(), WireError> {
        (self.decode)(message, codec)
    }

    /// Schema text for the payload, rendered once
    pub fn schema_text(&self, codec: &C) -> &str {
        self.schema_cache.get_or_init(|| (self.schema)(codec))
    }

    fn manifest_entry(&self) -> ManifestEntry {
        ManifestEntry {
            endpoint: self.endpoint.clone(),
            payload_type: self.payload_type.to_string(),
            handler_type: self.handler_type.to_string(),
            expensive: self.expensive,
        }
    }
}

impl<C: StructuredCodec> fmt::Debug for EndpointInfo<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointInfo")
            .field("endpoint", &self.endpoint)
            .field("payload_type", &self.payload_type)
            .field("handler_type", &self.handler_type)
            .field("expensive", &self.expensive)
            .finish()
    }
}

/// Declared response type
pub struct ResponseInfo<C: StructuredCodec = CborCodec> {
    endpoint: &'static str,
    type_name: &'static str,
    schema: SchemaFn<C>,
    prepare: PrepareFn<C>,
}

impl<C: StructuredCodec> ResponseInfo<C> {
    /// Endpoint the response is sent on
    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }

    /// Response type name
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Schema text for the response
    pub fn schema_text(&self, codec: &C) -> String {
        (self.schema)(codec)
    }
}

impl<C: StructuredCodec> fmt::Debug for ResponseInfo<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseInfo")
            .field("endpoint", &self.endpoint)
            .field("type_name", &self.type_name)
            .finish()
    }
}

struct PendingResponse<C: StructuredCodec> {
    endpoint: Option<&'static str>,
    type_name: &'static str,
    schema: SchemaFn<C>,
    prepare: PrepareFn<C>,
}

/// Collects registrations before freezing them into an [`EndpointRegistry`]
pub struct EndpointRegistryBuilder<C: StructuredCodec = CborCodec> {
    endpoints: Vec<EndpointInfo<C>>,
    responses: Vec<PendingResponse<C>>,
}

impl<C: StructuredCodec> EndpointRegistryBuilder<C> {
    /// Create an empty builder
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            responses: Vec::new(),
        }
    }

    /// Register a cheap endpoint handled on the shared pool
    pub fn register<P, H>(self, endpoint: impl Into<String>) -> Self
    where
        P: EnvelopeModel,
        H: PacketHandler<C> + Default,
    {
        self.push::<P>(endpoint.into(), type_name::<H>(), false, default_factory::<H, C>())
    }

    /// Register an endpoint whose handlers get a dedicated thread
    pub fn register_expensive<P, H>(self, endpoint: impl Into<String>) -> Self
    where
        P: EnvelopeModel,
        H: PacketHandler<C> + Default,
    {
        self.push::<P>(endpoint.into(), type_name::<H>(), true, default_factory::<H, C>())
    }

    /// Register an endpoint with a custom handler factory
    pub fn register_with<P, H, F>(
        self,
        endpoint: impl Into<String>,
        expensive: bool,
        factory: F,
    ) -> Self
    where
        P: EnvelopeModel,
        H: PacketHandler<C>,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let factory: HandlerFactory<C> =
            Arc::new(move || Box::new(factory()) as Box<dyn PacketHandler<C>>);
        self.push::<P>(endpoint.into(), type_name::<H>(), expensive, factory)
    }

    /// Register an endpoint described by an [`Endpoint`] marker
    pub fn declare<E>(self) -> Self
    where
        E: Endpoint,
        E::Handler: PacketHandler<C>,
    {
        self.push::<E::Payload>(
            E::NAME.to_string(),
            type_name::<E::Handler>(),
            E::EXPENSIVE,
            default_factory::<E::Handler, C>(),
        )
    }

    /// Declare a response type for schema output and warm-up
    pub fn response<R: EnvelopeModel>(mut self) -> Self {
        self.responses.push(PendingResponse {
            endpoint: R::endpoint(),
            type_name: type_name::<R>(),
            schema: schema_for::<R, C>,
            prepare: prepare_for::<R, C>,
        });
        self
    }

    /// Add every endpoint listed in a stored manifest.
    ///
    /// Type names are resolved against `catalog`.
    pub fn load_manifest(
        mut self,
        data: &[u8],
        catalog: &EndpointCatalog<C>,
        codec: &C,
    ) -> Result<Self, DispatchError> {
        let message = Message::parse(data, codec)?;
        let entries = message.deserialize::<Vec<ManifestEntry>, C>(codec)?;

        for entry in entries {
            let payload = catalog
                .resolve_payload(&entry.payload_type)
                .ok_or_else(|| DispatchError::UnresolvedType(entry.payload_type.clone()))?;
            let handler = catalog
                .resolve_handler(&entry.handler_type)
                .ok_or_else(|| DispatchError::UnresolvedType(entry.handler_type.clone()))?;

            debug!(
                "Loaded endpoint {} ({} -> {})",
                entry.endpoint, payload.type_name, handler.type_name
            );
            self.endpoints.push(EndpointInfo {
                endpoint: entry.endpoint.clone(),
                payload_type: payload.type_name,
                handler_type: handler.type_name,
                expensive: entry.expensive,
                decode: payload.decode,
                schema: payload.schema,
                prepare: payload.prepare,
                factory: handler.factory.clone(),
                schema_cache: OnceCell::new(),
            });
        }

        Ok(self)
    }

    /// Freeze the registrations
    pub fn build(self) -> Result<EndpointRegistry<C>, DispatchError> {
        let mut endpoints = BTreeMap::new();
        for info in self.endpoints {
            if endpoints.contains_key(&info.endpoint) {
                return Err(DispatchError::DuplicateEndpoint(info.endpoint));
            }
            endpoints.insert(info.endpoint.clone(), info);
        }

        let mut seen = HashSet::new();
        let mut responses = Vec::with_capacity(self.responses.len());
        for pending in self.responses {
            let endpoint = pending
                .endpoint
                .ok_or(DispatchError::MissingResponseEndpoint(pending.type_name))?;
            if !seen.insert(pending.type_name) {
                continue;
            }
            responses.push(ResponseInfo {
                endpoint,
                type_name: pending.type_name,
                schema: pending.schema,
                prepare: pending.prepare,
            });
        }

        info!(
            "Endpoint registry built with {} endpoints and {} responses",
            endpoints.len(),
            responses.len()
        );
        Ok(EndpointRegistry { endpoints, responses })
    }

    fn push<P: EnvelopeModel>(
        mut self,
        endpoint: String,
        handler_type: &'static str,
        expensive: bool,
        factory: HandlerFactory<C>,
    ) -> Self {
        self.endpoints.push(EndpointInfo {
            endpoint,
            payload_type: type_name::<P>(),
            handler_type,
            expensive,
            decode: decode_payload::<P, C>,
            schema: schema_for::<P, C>,
            prepare: prepare_for::<P, C>,
            factory,
            schema_cache: OnceCell::new(),
        });
        self
    }
}

impl<C: StructuredCodec> Default for EndpointRegistryBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable endpoint table
pub struct EndpointRegistry<C: StructuredCodec = CborCodec> {
    endpoints: BTreeMap<String, EndpointInfo<C>>,
    responses: Vec<ResponseInfo<C>>,
}

impl<C: StructuredCodec> EndpointRegistry<C> {
    /// Start building a registry
    pub fn builder() -> EndpointRegistryBuilder<C> {
        EndpointRegistryBuilder::new()
    }

    /// Look up an endpoint
    pub fn get(&self, endpoint: &str) -> Option<&EndpointInfo<C>> {
        self.endpoints.get(endpoint)
    }

    /// Whether `endpoint` is registered
    pub fn contains(&self, endpoint: &str) -> bool {
        self.endpoints.contains_key(endpoint)
    }

    /// Number of endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether no endpoints are registered
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Endpoints in name order
    pub fn endpoints(&self) -> impl Iterator<Item = &EndpointInfo<C>> {
        self.endpoints.values()
    }

    /// Declared response types
    pub fn responses(&self) -> &[ResponseInfo<C>] {
        &self.responses
    }

    /// Manifest entries for every endpoint
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.endpoints.values().map(EndpointInfo::manifest_entry).collect()
    }

    /// Serialize the manifest as a `Packets` envelope
    pub fn save_manifest(&self, codec: &C) -> Result<Bytes, DispatchError> {
        let bytes = Message::serialized(MANIFEST_ENDPOINT, "manifest", self.manifest(), codec)?;
        Ok(bytes)
    }

    /// Warm the codec and schema cache for every payload and response type
    pub fn precompile(&self, codec: &C) -> Result<(), DispatchError> {
        for info in self.endpoints.values() {
            (info.prepare)(codec).map_err(WireError::from)?;
            info.schema_text(codec);
        }
        for response in &self.responses {
            (response.prepare)(codec).map_err(WireError::from)?;
        }
        debug!(
            "Precompiled {} endpoint and {} response types with {}",
            self.endpoints.len(),
            self.responses.len(),
            codec.name()
        );
        Ok(())
    }
}

impl<C: StructuredCodec> fmt::Debug for EndpointRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .field("responses", &self.responses)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handler::Consumer;
    use crate::packet::Packet;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Upload {
        blob: Vec<u8>,
    }

    impl EnvelopeModel for Upload {
        fn cddl() -> String {
            "{ blob: bstr }".to_string()
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Uploaded {
        size: u64,
    }

    impl EnvelopeModel for Uploaded {
        fn endpoint() -> Option<&'static str> {
            Some("Uploaded")
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Orphan;

    impl EnvelopeModel for Orphan {}

    #[derive(Default)]
    struct UploadHandler;

    impl PacketHandler for UploadHandler {
        fn handle_packet(
            &mut self,
            _consumer: &dyn Consumer,
            _packet: Packet,
        ) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    struct UploadEndpoint;

    impl Endpoint for UploadEndpoint {
        const NAME: &'static str = "Upload";
        const EXPENSIVE: bool = true;
        type Payload = Upload;
        type Handler = UploadHandler;
    }

    #[test]
    fn test_register_and_lookup() {
        let registry: EndpointRegistry = EndpointRegistry::builder()
            .register::<Upload, UploadHandler>("Cheap")
            .declare::<UploadEndpoint>()
            .response::<Uploaded>()
            .build()
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("Cheap"));
        assert!(!registry.get("Cheap").unwrap().is_expensive());
        assert!(registry.get("Upload").unwrap().is_expensive());
        assert!(registry.get("Missing").is_none());
        assert_eq!(registry.responses()[0].endpoint(), "Uploaded");
    }

    #[test]
    fn test_duplicate_endpoint_rejected() {
        let result = EndpointRegistry::<CborCodec>::builder()
            .register::<Upload, UploadHandler>("Upload")
            .register_expensive::<Upload, UploadHandler>("Upload")
            .build();
        assert!(matches!(result, Err(DispatchError::DuplicateEndpoint(name)) if name == "Upload"));
    }

    #[test]
    fn test_response_without_endpoint_rejected() {
        let result = EndpointRegistry::<CborCodec>::builder().response::<Orphan>().build();
        assert!(matches!(result, Err(DispatchError::MissingResponseEndpoint(_))));
    }

    #[test]
    fn test_manifest_round_trip() {
        let codec = CborCodec::new();
        let registry: EndpointRegistry = EndpointRegistry::builder()
            .register::<Upload, UploadHandler>("Cheap")
            .declare::<UploadEndpoint>()
            .build()
            .unwrap();
        let saved = registry.save_manifest(&codec).unwrap();

        let catalog = EndpointCatalog::new().payload::<Upload>().handler::<UploadHandler>();
        let loaded = EndpointRegistry::builder()
            .load_manifest(&saved, &catalog, &codec)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(loaded.manifest(), registry.manifest());
        assert!(loaded.get("Upload").unwrap().is_expensive());
    }

    #[test]
    fn test_manifest_with_unknown_type() {
        let codec = CborCodec::new();
        let entries = vec![ManifestEntry {
            endpoint: "Ghost".to_string(),
            payload_type: "gone::Ghost".to_string(),
            handler_type: "gone::GhostHandler".to_string(),
            expensive: false,
        }];
        let saved = Message::serialized(MANIFEST_ENDPOINT, "k", entries, &codec).unwrap();
        let catalog = EndpointCatalog::new().payload::<Upload>().handler::<UploadHandler>();

        let result = EndpointRegistry::builder().load_manifest(&saved, &catalog, &codec);
        assert!(matches!(
            result,
            Err(DispatchError::UnresolvedType(name)) if name == "gone::Ghost"
        ));
    }

    #[test]
    fn test_precompile_caches_schema() {
        let codec = CborCodec::new();
        let registry: EndpointRegistry = EndpointRegistry::builder()
            .declare::<UploadEndpoint>()
            .response::<Uploaded>()
            .build()
            .unwrap();

        registry.precompile(&codec).unwrap();
        let info = registry.get("Upload").unwrap();
        assert!(info.schema_text(&codec).contains("Upload = { blob: bstr }"));
    }
}
