//! Envelope header.

use crate::error::WireError;
use crate::model::EnvelopeModel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing metadata at the front of every envelope.
///
/// `endpoint` selects the handler; `sync_key` correlates a request with its
/// responses and is echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    endpoint: String,
    #[serde(rename = "syncKey")]
    sync_key: String,
}

impl Header {
    /// Create a header
    pub fn new(endpoint: impl Into<String>, sync_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            sync_key: sync_key.into(),
        }
    }

    /// Create a header with a fresh random sync key
    pub fn with_random_sync_key(endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, uuid::Uuid::new_v4().to_string())
    }

    /// Header for a reply on `endpoint` carrying this header's sync key
    pub fn reply(&self, endpoint: impl Into<String>) -> Self {
        Self::new(endpoint, self.sync_key.clone())
    }

    /// Endpoint name
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Correlation key
    pub fn sync_key(&self) -> &str {
        &self.sync_key
    }

    /// Check the header can be written
    pub fn validate(&self) -> Result<(), WireError> {
        if self.endpoint.is_empty() {
            return Err(WireError::MissingEndpoint("Header"));
        }
        Ok(())
    }
}

impl EnvelopeModel for Header {
    fn cddl() -> String {
        "{ endpoint: tstr, syncKey: tstr }".to_string()
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.endpoint, self.sync_key)
    }
}
