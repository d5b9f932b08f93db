//! Legacy (v1) protocol adapter and transport seam.
//!
//! v1 pairs through a bridge server and answers call requests directly to
//! the waiting callback keyed by the request id; there are no topics on the
//! response path.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::translate::{
    ProtocolVersion, RequesterMetadata, SessionAdapter, TranslateError, TranslatedRequest,
    TransportError,
};
use super::uri::PairingUri;
use crate::rpc::dto::JsonRpcError;

/// Handshake offer produced by a legacy `wc:...@1` pairing.
#[derive(Clone, Debug, PartialEq)]
pub struct LegacySessionProposal {
    pub handshake_id: u64,
    pub peer_meta: RequesterMetadata,
    /// Chain requested by the peer; absent means "wallet's choice".
    pub chain_id: Option<u64>,
}

/// Callback surface of the legacy bridge connection.
#[async_trait]
pub trait LegacyTransport: Send + Sync {
    /// Open the bridge connection and wait for the peer's handshake offer.
    async fn connect(&self, uri: &PairingUri) -> Result<LegacySessionProposal, TransportError>;

    async fn approve_session(
        &self,
        handshake_id: u64,
        accounts: &[String],
        chain_id: u64,
    ) -> Result<(), TransportError>;

    async fn reject_session(&self, handshake_id: u64) -> Result<(), TransportError>;

    /// Answer the callback waiting on `request_id` with a result.
    async fn respond_result(&self, request_id: u64, result: Value) -> Result<(), TransportError>;

    /// Answer the callback waiting on `request_id` with an error.
    async fn respond_error(
        &self,
        request_id: u64,
        error: JsonRpcError,
    ) -> Result<(), TransportError>;
}

/// Legacy call request exactly as the bridge delivers it.
#[derive(Clone, Debug, Deserialize)]
struct LegacyCallRequest {
    id: u64,
    method: String,
    #[serde(default)]
    params: Value,
}

pub struct LegacySessionAdapter;

impl SessionAdapter for LegacySessionAdapter {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V1
    }

    fn translate(
        &self,
        topic: &str,
        requester: &RequesterMetadata,
        raw: &Value,
    ) -> Result<TranslatedRequest, TranslateError> {
        let request: LegacyCallRequest = serde_json::from_value(raw.clone())
            .map_err(|error| TranslateError::Malformed(error.to_string()))?;
        if request.method.is_empty() {
            return Err(TranslateError::Malformed("empty method name".into()));
        }
        Ok(TranslatedRequest {
            protocol: ProtocolVersion::V1,
            topic: topic.to_string(),
            request_id: request.id,
            method: request.method,
            params: request.params,
            requester: requester.clone(),
        })
    }
}

/// Record of one response posted through the legacy callback path.
#[derive(Clone, Debug, PartialEq)]
pub enum LegacyPostedResponse {
    Result { request_id: u64, result: Value },
    Error { request_id: u64, error: JsonRpcError },
}

/// In-memory transport used in tests and local development harnesses.
#[derive(Default)]
pub struct StubLegacyTransport {
    proposal: Mutex<Option<LegacySessionProposal>>,
    approved: Mutex<Vec<(u64, Vec<String>, u64)>>,
    rejected: Mutex<Vec<u64>>,
    responses: Mutex<Vec<LegacyPostedResponse>>,
}

impl StubLegacyTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proposal(proposal: LegacySessionProposal) -> Self {
        Self {
            proposal: Mutex::new(Some(proposal)),
            ..Self::default()
        }
    }

    pub fn approved_sessions(&self) -> Vec<(u64, Vec<String>, u64)> {
        lock(&self.approved).clone()
    }

    pub fn rejected_sessions(&self) -> Vec<u64> {
        lock(&self.rejected).clone()
    }

    pub fn responses(&self) -> Vec<LegacyPostedResponse> {
        lock(&self.responses).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LegacyTransport for StubLegacyTransport {
    async fn connect(&self, _uri: &PairingUri) -> Result<LegacySessionProposal, TransportError> {
        lock(&self.proposal)
            .clone()
            .ok_or_else(|| TransportError::refused("no handshake offer"))
    }

    async fn approve_session(
        &self,
        handshake_id: u64,
        accounts: &[String],
        chain_id: u64,
    ) -> Result<(), TransportError> {
        lock(&self.approved).push((handshake_id, accounts.to_vec(), chain_id));
        Ok(())
    }

    async fn reject_session(&self, handshake_id: u64) -> Result<(), TransportError> {
        lock(&self.rejected).push(handshake_id);
        Ok(())
    }

    async fn respond_result(&self, request_id: u64, result: Value) -> Result<(), TransportError> {
        lock(&self.responses).push(LegacyPostedResponse::Result { request_id, result });
        Ok(())
    }

    async fn respond_error(
        &self,
        request_id: u64,
        error: JsonRpcError,
    ) -> Result<(), TransportError> {
        lock(&self.responses).push(LegacyPostedResponse::Error { request_id, error });
        Ok(())
    }
}
