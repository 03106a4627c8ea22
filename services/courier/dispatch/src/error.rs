//! Dispatch error types.

use courier_wire::WireError;
use thiserror::Error;

/// Registry and dispatcher errors
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Two registrations share an endpoint name
    #[error("duplicate endpoint: {0}")]
    DuplicateEndpoint(String),

    /// Manifest names a type the catalog does not know
    #[error("unresolved type: {0}")]
    UnresolvedType(String),

    /// Response type declares no endpoint
    #[error("response type {0} has no endpoint")]
    MissingResponseEndpoint(&'static str),

    /// Envelope error
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Worker runtime or thread could not be started
    #[error("spawn failed: {0}")]
    Spawn(std::io::Error),

    /// Schema output failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by packet handlers
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Handler-specific failure
    #[error("handler failed: {0}")]
    Failed(String),

    /// Payload decode or reply encode failure
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
}

impl HandlerError {
    /// Failure with a message
    pub fn failed(reason: impl Into<String>) -> Self {
        HandlerError::Failed(reason.into())
    }
}
