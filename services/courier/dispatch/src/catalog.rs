//! Stored endpoint manifests and the type catalog used to resolve them.
//!
//! A manifest records endpoints by type name only. Loading one needs an
//! [`EndpointCatalog`] listing the payload and handler types the binary was
//! compiled with; names are matched by full type path first and then by
//! bare type name when that is unambiguous.

use crate::handler::{default_factory, HandlerFactory, PacketHandler};
use courier_wire::{
    split_type_path, CborCodec, CodecError, EnvelopeModel, Message, StructuredCodec, WireError,
};
use serde::{Deserialize, Serialize};
use std::any::type_name;

/// Endpoint name of a manifest envelope
pub const MANIFEST_ENDPOINT: &str = "Packets";

/// One endpoint in a stored manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Endpoint name
    pub endpoint: String,
    /// Payload type name
    #[serde(rename = "payloadType")]
    pub payload_type: String,
    /// Handler type name
    #[serde(rename = "handlerType")]
    pub handler_type: String,
    /// Whether the endpoint runs on a dedicated thread
    pub expensive: bool,
}

impl EnvelopeModel for ManifestEntry {
    fn cddl() -> String {
        "{ endpoint: tstr, payloadType: tstr, handlerType: tstr, expensive: bool }".to_string()
    }
}

pub(crate) type DecodeFn<C> = fn(&Message, &C) -> Result<(), WireError>;
pub(crate) type SchemaFn<C> = fn(&C) -> String;
pub(crate) type PrepareFn<C> = fn(&C) -> Result<(), CodecError>;

pub(crate) fn decode_payload<P: EnvelopeModel, C: StructuredCodec>(
    message: &Message,
    codec: &C,
) -> Result<(), WireError> {
    message.deserialize::<P, C>(codec).map(|_| ())
}

pub(crate) fn schema_for<P: EnvelopeModel, C: StructuredCodec>(codec: &C) -> String {
    codec.schema_text::<P>()
}

pub(crate) fn prepare_for<P: EnvelopeModel, C: StructuredCodec>(
    codec: &C,
) -> Result<(), CodecError> {
    codec.prepare::<P>()
}

/// Type-erased operations for one payload type
pub struct PayloadBinding<C: StructuredCodec = CborCodec> {
    pub(crate) type_name: &'static str,
    pub(crate) decode: DecodeFn<C>,
    pub(crate) schema: SchemaFn<C>,
    pub(crate) prepare: PrepareFn<C>,
}

impl<C: StructuredCodec> PayloadBinding<C> {
    /// Binding for `P`
    pub fn of<P: EnvelopeModel>() -> Self {
        Self {
            type_name: type_name::<P>(),
            decode: decode_payload::<P, C>,
            schema: schema_for::<P, C>,
            prepare: prepare_for::<P, C>,
        }
    }

    /// Full type name
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl<C: StructuredCodec> Clone for PayloadBinding<C> {
    fn clone(&self) -> Self {
        Self {
            type_name: self.type_name,
            decode: self.decode,
            schema: self.schema,
            prepare: self.prepare,
        }
    }
}

/// Factory for one handler type
pub struct HandlerBinding<C: StructuredCodec = CborCodec> {
    pub(crate) type_name: &'static str,
    pub(crate) factory: HandlerFactory<C>,
}

impl<C: StructuredCodec> HandlerBinding<C> {
    /// Binding for `H`, built with `Default`
    pub fn of<H: PacketHandler<C> + Default>() -> Self {
        Self {
            type_name: type_name::<H>(),
            factory: default_factory::<H, C>(),
        }
    }

    /// Full type name
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl<C: StructuredCodec> Clone for HandlerBinding<C> {
    fn clone(&self) -> Self {
        Self {
            type_name: self.type_name,
            factory: self.factory.clone(),
        }
    }
}

/// Payload and handler types available for manifest resolution
pub struct EndpointCatalog<C: StructuredCodec = CborCodec> {
    payloads: Vec<PayloadBinding<C>>,
    handlers: Vec<HandlerBinding<C>>,
}

impl<C: StructuredCodec> EndpointCatalog<C> {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self {
            payloads: Vec::new(),
            handlers: Vec::new(),
        }
    }

    /// Add a payload type
    pub fn payload<P: EnvelopeModel>(mut self) -> Self {
        self.payloads.push(PayloadBinding::of::<P>());
        self
    }

    /// Add a handler type
    pub fn handler<H: PacketHandler<C> + Default>(mut self) -> Self {
        self.handlers.push(HandlerBinding::of::<H>());
        self
    }

    /// Find a payload type by full or bare name
    pub fn resolve_payload(&self, name: &str) -> Option<&PayloadBinding<C>> {
        resolve(&self.payloads, name, |b| b.type_name)
    }

    /// Find a handler type by full or bare name
    pub fn resolve_handler(&self, name: &str) -> Option<&HandlerBinding<C>> {
        resolve(&self.handlers, name, |b| b.type_name)
    }
}

impl<C: StructuredCodec> Default for EndpointCatalog<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve<'a, B>(
    bindings: &'a [B],
    name: &str,
    type_name: impl Fn(&B) -> &'static str,
) -> Option<&'a B> {
    if let Some(exact) = bindings.iter().find(|b| type_name(*b) == name) {
        return Some(exact);
    }

    let (_, short) = split_type_path(name);
    let mut matches = bindings
        .iter()
        .filter(|b| split_type_path(type_name(*b)).1 == short);
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}
