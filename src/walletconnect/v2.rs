//! WalletConnect v2 protocol adapter and relay seam.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::translate::{
    ProtocolVersion, RequesterMetadata, SessionAdapter, SessionResponse, TranslateError,
    TranslatedRequest, TransportError,
};
use super::uri::PairingUri;

pub const EIP155_NAMESPACE: &str = "eip155";

/// Namespace requirements carried by a session proposal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalNamespace {
    pub chains: Vec<String>,
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionProposer {
    pub public_key: String,
    pub metadata: RequesterMetadata,
}

/// `wc_sessionPropose` payload.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProposal {
    pub id: u64,
    pub proposer: SessionProposer,
    #[serde(default)]
    pub required_namespaces: HashMap<String, ProposalNamespace>,
    #[serde(default)]
    pub optional_namespaces: HashMap<String, ProposalNamespace>,
}

impl SessionProposal {
    /// CAIP-2 chain references (`eip155:<id>`) parsed to chain ids,
    /// skipping entries from other namespaces or with mangled ids.
    pub fn requested_chain_ids(&self) -> Vec<u64> {
        self.required_namespaces
            .get(EIP155_NAMESPACE)
            .map(|namespace| {
                namespace
                    .chains
                    .iter()
                    .filter_map(|chain| chain.strip_prefix("eip155:"))
                    .filter_map(|id| id.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Namespace grant returned with an acknowledged session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionNamespace {
    pub accounts: Vec<String>,
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

/// Relay surface of the v2 stack.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Run the pairing handshake for `uri` and wait for the peer's session
    /// proposal.
    async fn pair(&self, uri: &PairingUri) -> Result<SessionProposal, TransportError>;

    /// Approve a proposal with the granted namespaces; resolves with the
    /// settled session topic once the peer acknowledges.
    async fn approve_session(
        &self,
        proposal_id: u64,
        namespaces: HashMap<String, SessionNamespace>,
    ) -> Result<String, TransportError>;

    async fn reject_session(&self, proposal_id: u64, reason: &str) -> Result<(), TransportError>;

    /// Topic-addressed response to a session request.
    async fn respond(
        &self,
        topic: &str,
        request_id: u64,
        response: SessionResponse,
    ) -> Result<(), TransportError>;
}

/// `wc_sessionRequest` payload.
#[derive(Clone, Debug, Deserialize)]
struct SessionRequestEnvelope {
    id: u64,
    params: SessionRequestParams,
}

#[derive(Clone, Debug, Deserialize)]
struct SessionRequestParams {
    request: SessionRequestBody,
    #[serde(default, rename = "chainId")]
    _chain_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct SessionRequestBody {
    method: String,
    #[serde(default)]
    params: Value,
}

pub struct V2SessionAdapter;

impl SessionAdapter for V2SessionAdapter {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V2
    }

    fn translate(
        &self,
        topic: &str,
        requester: &RequesterMetadata,
        raw: &Value,
    ) -> Result<TranslatedRequest, TranslateError> {
        let envelope: SessionRequestEnvelope = serde_json::from_value(raw.clone())
            .map_err(|error| TranslateError::Malformed(error.to_string()))?;
        if envelope.params.request.method.is_empty() {
            return Err(TranslateError::Malformed("empty method name".into()));
        }
        Ok(TranslatedRequest {
            protocol: ProtocolVersion::V2,
            topic: topic.to_string(),
            request_id: envelope.id,
            method: envelope.params.request.method,
            params: envelope.params.request.params,
            requester: requester.clone(),
        })
    }
}

/// Record of one topic-addressed response.
#[derive(Clone, Debug, PartialEq)]
pub struct RelayedResponse {
    pub topic: String,
    pub request_id: u64,
    pub response: SessionResponse,
}

/// In-memory relay used in tests and local development harnesses.
#[derive(Default)]
pub struct StubRelayTransport {
    proposal: Mutex<Option<SessionProposal>>,
    approved: Mutex<Vec<(u64, HashMap<String, SessionNamespace>)>>,
    rejected: Mutex<Vec<(u64, String)>>,
    responses: Mutex<Vec<RelayedResponse>>,
    next_topic: AtomicU64,
}

impl StubRelayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proposal(proposal: SessionProposal) -> Self {
        Self {
            proposal: Mutex::new(Some(proposal)),
            ..Self::default()
        }
    }

    pub fn approved_sessions(&self) -> Vec<(u64, HashMap<String, SessionNamespace>)> {
        lock(&self.approved).clone()
    }

    pub fn rejected_sessions(&self) -> Vec<(u64, String)> {
        lock(&self.rejected).clone()
    }

    pub fn responses(&self) -> Vec<RelayedResponse> {
        lock(&self.responses).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RelayTransport for StubRelayTransport {
    async fn pair(&self, _uri: &PairingUri) -> Result<SessionProposal, TransportError> {
        lock(&self.proposal)
            .clone()
            .ok_or_else(|| TransportError::refused("no session proposal"))
    }

    async fn approve_session(
        &self,
        proposal_id: u64,
        namespaces: HashMap<String, SessionNamespace>,
    ) -> Result<String, TransportError> {
        lock(&self.approved).push((proposal_id, namespaces));
        let topic = self.next_topic.fetch_add(1, Ordering::SeqCst);
        Ok(format!("settled-{topic:08x}"))
    }

    async fn reject_session(&self, proposal_id: u64, reason: &str) -> Result<(), TransportError> {
        lock(&self.rejected).push((proposal_id, reason.to_string()));
        Ok(())
    }

    async fn respond(
        &self,
        topic: &str,
        request_id: u64,
        response: SessionResponse,
    ) -> Result<(), TransportError> {
        lock(&self.responses).push(RelayedResponse {
            topic: topic.to_string(),
            request_id,
            response,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requester() -> RequesterMetadata {
        RequesterMetadata {
            name: "V2 DApp".into(),
            url: "https://v2.example".into(),
            ..RequesterMetadata::default()
        }
    }

    #[test]
    fn translates_a_session_request() {
        let adapter = V2SessionAdapter;
        let raw = json!({
            "id": 1743510684985985u64,
            "params": {
                "request": {
                    "method": "eth_sendTransaction",
                    "params": [{ "from": "0xsender", "to": "0xrecipient" }]
                },
                "chainId": "eip155:1"
            }
        });
        let translated = adapter
            .translate("settled-topic", &requester(), &raw)
            .expect("translate");
        assert_eq!(translated.protocol, ProtocolVersion::V2);
        assert_eq!(translated.request_id, 1_743_510_684_985_985);
        assert_eq!(translated.method, "eth_sendTransaction");
        assert_eq!(translated.topic, "settled-topic");
    }

    #[test]
    fn malformed_envelopes_do_not_translate() {
        let adapter = V2SessionAdapter;
        assert!(adapter
            .translate("topic", &requester(), &json!({ "id": 1 }))
            .is_err());
        assert!(adapter
            .translate(
                "topic",
                &requester(),
                &json!({ "id": 1, "params": { "request": { "method": "" } } })
            )
            .is_err());
    }

    #[test]
    fn proposal_chain_ids_skip_foreign_namespaces() {
        let proposal: SessionProposal = serde_json::from_value(json!({
            "id": 7,
            "proposer": { "publicKey": "04f1", "metadata": { "name": "dapp", "url": "https://dapp.example" } },
            "requiredNamespaces": {
                "eip155": { "chains": ["eip155:1", "eip155:137", "cosmos:cosmoshub-4", "eip155:bad"] }
            }
        }))
        .expect("deserialize");
        assert_eq!(proposal.requested_chain_ids(), vec![1, 137]);
    }
}
