//! Protocol-agnostic request shape shared by both adapters.

use anyhow::Error as AnyError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::rpc::dto::JsonRpcError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolVersion {
    V1,
    V2,
}

/// Identity of the remote peer, as advertised during pairing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequesterMetadata {
    pub name: String,
    pub url: String,
    pub description: String,
    pub icons: Vec<String>,
}

/// One inbound session request, normalized away from its wire protocol.
/// Everything downstream of translation is version-agnostic; only response
/// posting branches on [`ProtocolVersion`] again.
#[derive(Clone, Debug, PartialEq)]
pub struct TranslatedRequest {
    pub protocol: ProtocolVersion,
    pub topic: String,
    pub request_id: u64,
    pub method: String,
    pub params: Value,
    pub requester: RequesterMetadata,
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("malformed session request: {0}")]
    Malformed(String),
}

/// Adapter from one protocol's session-request wire shape to
/// [`TranslatedRequest`].
pub trait SessionAdapter: Send + Sync {
    fn version(&self) -> ProtocolVersion;

    fn translate(
        &self,
        topic: &str,
        requester: &RequesterMetadata,
        raw: &Value,
    ) -> Result<TranslatedRequest, TranslateError>;
}

/// Response routed back to the peer after the approval branch settles.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionResponse {
    Result(Value),
    Error(JsonRpcError),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("relay transport failure: {0}")]
    Transport(#[from] AnyError),
    #[error("relay refused the call: {0}")]
    Refused(String),
}

impl TransportError {
    pub fn transport(error: impl Into<AnyError>) -> Self {
        Self::Transport(error.into())
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        Self::Refused(reason.into())
    }
}
