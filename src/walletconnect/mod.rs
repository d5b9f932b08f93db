//! WalletConnect pairing and session lifecycle for both protocol
//! generations.
//!
//! The version tag embedded in the pairing URI picks the stack: v1 speaks
//! through a bridge server with callback-addressed responses, v2 through a
//! relay with topic-addressed responses. Translation converges on one
//! internal request shape, so approval and routing never branch on the
//! protocol; only [`WalletConnectBridge::post_response`] does.

pub mod translate;
pub mod uri;
pub mod v1;
pub mod v2;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::approvals::{ApprovalDecision, ApprovalPayload, ApprovalRegistry, SessionApprovalSummary};
use crate::config::WalletConnectConfig;
use crate::network::{Network, NetworkResolver};
use crate::origin::Origin;
use crate::rpc::MethodRouter;
use crate::telemetry::{BrokerAction, BrokerTelemetry, TelemetryOutcome};
use translate::{
    ProtocolVersion, RequesterMetadata, SessionAdapter, SessionResponse, TransportError,
};
use uri::{PairingUri, UriError};
use v1::{LegacySessionAdapter, LegacySessionProposal, LegacyTransport};
use v2::{RelayTransport, SessionNamespace, V2SessionAdapter, EIP155_NAMESPACE};

/// Terminal outcome of a pairing attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PairingOutcome {
    Acknowledged { topic: String },
    Rejected,
    /// The URI carried a version this bridge does not speak; logged and
    /// dropped.
    Ignored,
}

/// One settled session, either protocol generation.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionRecord {
    pub topic: String,
    pub version: ProtocolVersion,
    pub requester: RequesterMetadata,
    pub accounts: Vec<String>,
    pub network: Network,
    /// v1 handshake id assigned during pairing; absent for v2 sessions.
    pub handshake_id: Option<u64>,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("invalid pairing uri: {0}")]
    Uri(#[from] UriError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct WalletConnectBridge {
    router: Arc<MethodRouter>,
    approvals: Arc<ApprovalRegistry>,
    resolver: Arc<NetworkResolver>,
    legacy: Arc<dyn LegacyTransport>,
    relay: Arc<dyn RelayTransport>,
    sessions: Mutex<HashMap<String, SessionRecord>>,
    networks: Vec<Network>,
    settings: WalletConnectConfig,
    approval_timeout: Option<Duration>,
    telemetry: Arc<BrokerTelemetry>,
}

impl WalletConnectBridge {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<MethodRouter>,
        approvals: Arc<ApprovalRegistry>,
        resolver: Arc<NetworkResolver>,
        legacy: Arc<dyn LegacyTransport>,
        relay: Arc<dyn RelayTransport>,
        networks: Vec<Network>,
        settings: WalletConnectConfig,
        approval_timeout: Option<Duration>,
        telemetry: Arc<BrokerTelemetry>,
    ) -> Self {
        Self {
            router,
            approvals,
            resolver,
            legacy,
            relay,
            sessions: Mutex::new(HashMap::new()),
            networks,
            settings,
            approval_timeout,
            telemetry,
        }
    }

    /// Bootstrap a pairing from a `wc:` URI. The embedded version tag
    /// selects the protocol stack; an unrecognized version is logged and
    /// dropped, never fatal to the bridge.
    pub async fn pair(&self, uri: &str) -> Result<PairingOutcome, BridgeError> {
        let uri: PairingUri = uri.parse()?;
        let outcome = match uri.version {
            1 => self.pair_legacy(&uri).await,
            2 => self.pair_v2(&uri).await,
            other => {
                warn!(version = other, topic = %uri.topic, "unsupported pairing version, dropping");
                Ok(PairingOutcome::Ignored)
            }
        };
        let telemetry_outcome = match &outcome {
            Ok(PairingOutcome::Acknowledged { .. }) => TelemetryOutcome::Success,
            Ok(_) => TelemetryOutcome::Rejected,
            Err(_) => TelemetryOutcome::Error,
        };
        self.telemetry
            .record(BrokerAction::WcPairing, telemetry_outcome);
        outcome
    }

    async fn pair_v2(&self, uri: &PairingUri) -> Result<PairingOutcome, BridgeError> {
        let proposal = self.relay.pair(uri).await?;
        debug!(proposal = proposal.id, peer = %proposal.proposer.metadata.url, "session proposal received");

        // ProposalReceived → Rejected when the EVM namespace is absent.
        if !proposal
            .required_namespaces
            .contains_key(EIP155_NAMESPACE)
        {
            debug!(proposal = proposal.id, "proposal lacks the eip155 namespace, rejecting");
            self.relay
                .reject_session(proposal.id, "unsupported namespaces")
                .await?;
            return Ok(PairingOutcome::Rejected);
        }

        // NamespaceValidated: the requested chains must intersect the
        // supported table.
        let requested = proposal.requested_chain_ids();
        let granted: Vec<Network> = self
            .networks
            .iter()
            .filter(|network| requested.contains(&network.chain_id))
            .cloned()
            .collect();
        let Some(session_network) = granted.first().cloned() else {
            debug!(proposal = proposal.id, ?requested, "no supported chain in proposal, rejecting");
            self.relay
                .reject_session(proposal.id, "unsupported chains")
                .await?;
            return Ok(PairingOutcome::Rejected);
        };

        // AwaitingAccountSelection: hand the proposal to the trusted UI.
        let summary = SessionApprovalSummary {
            peer_name: proposal.proposer.metadata.name.clone(),
            peer_url: proposal.proposer.metadata.url.clone(),
            chain_ids: granted.iter().map(|network| network.chain_id).collect(),
            methods: proposal
                .required_namespaces
                .get(EIP155_NAMESPACE)
                .map(|namespace| namespace.methods.clone())
                .unwrap_or_default(),
        };
        let Some(accounts) = self.select_accounts(summary).await else {
            self.relay
                .reject_session(proposal.id, "user rejected")
                .await?;
            return Ok(PairingOutcome::Rejected);
        };

        let namespaces = self.granted_namespaces(&granted, &accounts);
        let topic = self.relay.approve_session(proposal.id, namespaces).await?;
        debug!(%topic, "session acknowledged");

        self.install_session(SessionRecord {
            topic: topic.clone(),
            version: ProtocolVersion::V2,
            requester: proposal.proposer.metadata.clone(),
            accounts,
            network: session_network,
            handshake_id: None,
        });
        Ok(PairingOutcome::Acknowledged { topic })
    }

    async fn pair_legacy(&self, uri: &PairingUri) -> Result<PairingOutcome, BridgeError> {
        let proposal = self.legacy.connect(uri).await?;
        debug!(handshake = proposal.handshake_id, peer = %proposal.peer_meta.url, "legacy session proposal received");

        let requested_chain = proposal
            .chain_id
            .unwrap_or(self.resolver.default_network().chain_id);
        let Some(session_network) = self
            .networks
            .iter()
            .find(|network| network.chain_id == requested_chain)
            .cloned()
        else {
            debug!(handshake = proposal.handshake_id, requested_chain, "unsupported legacy chain, rejecting");
            self.legacy.reject_session(proposal.handshake_id).await?;
            return Ok(PairingOutcome::Rejected);
        };

        let summary = SessionApprovalSummary {
            peer_name: proposal.peer_meta.name.clone(),
            peer_url: proposal.peer_meta.url.clone(),
            chain_ids: vec![session_network.chain_id],
            methods: Vec::new(),
        };
        let Some(accounts) = self.select_accounts(summary).await else {
            self.legacy.reject_session(proposal.handshake_id).await?;
            return Ok(PairingOutcome::Rejected);
        };

        self.legacy
            .approve_session(proposal.handshake_id, &accounts, session_network.chain_id)
            .await?;
        debug!(topic = %uri.topic, "legacy session acknowledged");

        let LegacySessionProposal {
            handshake_id,
            peer_meta,
            ..
        } = proposal;
        self.install_session(SessionRecord {
            topic: uri.topic.clone(),
            version: ProtocolVersion::V1,
            requester: peer_meta,
            accounts,
            network: session_network,
            handshake_id: Some(handshake_id),
        });
        Ok(PairingOutcome::Acknowledged {
            topic: uri.topic.clone(),
        })
    }

    /// One inbound session request, either protocol. Malformed payloads are
    /// dropped without a response; the peer's own timeout is the accepted
    /// failure mode for garbage input.
    pub async fn on_session_request(&self, topic: &str, raw: &Value) -> Result<(), BridgeError> {
        let Some(session) = self.session(topic) else {
            warn!(%topic, "session request for unknown topic dropped");
            return Ok(());
        };

        let translated = {
            let adapter: &dyn SessionAdapter = match session.version {
                ProtocolVersion::V1 => &LegacySessionAdapter,
                ProtocolVersion::V2 => &V2SessionAdapter,
            };
            match adapter.translate(topic, &session.requester, raw) {
                Ok(translated) => translated,
                Err(error) => {
                    debug!(%topic, %error, "dropping untranslatable session request");
                    self.telemetry
                        .record(BrokerAction::WcSessionRequest, TelemetryOutcome::Error);
                    return Ok(());
                }
            }
        };
        debug!(
            %topic,
            request = translated.request_id,
            method = %translated.method,
            "session request translated"
        );

        // From here the request is protocol-agnostic: the router drives the
        // approval flow exactly as it does for a page-originated call.
        let origin = Origin::new(session.requester.url.clone());
        let outcome = self
            .router
            .route(&translated.method, Some(translated.params.clone()), &origin)
            .await;
        let response = match outcome {
            Ok(result) => SessionResponse::Result(result),
            Err(error) => SessionResponse::Error(error.into_json_error()),
        };
        let telemetry_outcome = match &response {
            SessionResponse::Result(_) => TelemetryOutcome::Success,
            SessionResponse::Error(_) => TelemetryOutcome::Rejected,
        };
        self.post_response(&session, translated.request_id, response)
            .await?;
        self.telemetry
            .record(BrokerAction::WcSessionRequest, telemetry_outcome);
        Ok(())
    }

    /// The single approved/rejected exit shared by both protocol stacks.
    async fn post_response(
        &self,
        session: &SessionRecord,
        request_id: u64,
        response: SessionResponse,
    ) -> Result<(), TransportError> {
        match session.version {
            ProtocolVersion::V2 => self.relay.respond(&session.topic, request_id, response).await,
            ProtocolVersion::V1 => match response {
                SessionResponse::Result(result) => {
                    self.legacy.respond_result(request_id, result).await
                }
                SessionResponse::Error(error) => {
                    self.legacy.respond_error(request_id, error).await
                }
            },
        }
    }

    /// Forget a settled session. Requests arriving on the topic afterwards
    /// are dropped as unknown. Returns false for unknown topics.
    pub fn disconnect(&self, topic: &str) -> bool {
        let removed = self.lock_sessions().remove(topic).is_some();
        if removed {
            debug!(%topic, "session disconnected");
        }
        removed
    }

    pub fn active_sessions(&self) -> Vec<SessionRecord> {
        let mut sessions: Vec<SessionRecord> = self.lock_sessions().values().cloned().collect();
        sessions.sort_by(|a, b| a.topic.cmp(&b.topic));
        sessions
    }

    async fn select_accounts(&self, summary: SessionApprovalSummary) -> Option<Vec<String>> {
        let (id, rx) = self
            .approvals
            .open(ApprovalPayload::SessionProposal(summary));
        match self
            .approvals
            .await_decision(&id, rx, self.approval_timeout)
            .await
        {
            ApprovalDecision::Approved(value) => {
                match serde_json::from_value::<Vec<String>>(value) {
                    Ok(accounts) if !accounts.is_empty() => Some(accounts),
                    Ok(_) => {
                        warn!(approval = %id, "empty account selection, treating as rejection");
                        None
                    }
                    Err(error) => {
                        warn!(approval = %id, %error, "malformed account selection, treating as rejection");
                        None
                    }
                }
            }
            ApprovalDecision::Rejected => None,
        }
    }

    fn granted_namespaces(
        &self,
        networks: &[Network],
        accounts: &[String],
    ) -> HashMap<String, SessionNamespace> {
        let mut qualified = Vec::with_capacity(networks.len() * accounts.len());
        for network in networks {
            for account in accounts {
                qualified.push(format!("eip155:{}:{}", network.chain_id, account));
            }
        }
        HashMap::from([(
            EIP155_NAMESPACE.to_string(),
            SessionNamespace {
                accounts: qualified,
                methods: self.settings.methods.clone(),
                events: self.settings.events.clone(),
            },
        )])
    }

    fn install_session(&self, session: SessionRecord) {
        // The session chain becomes the peer origin's active network, so
        // routed requests execute against what was granted at settlement.
        self.resolver.set_active(
            &Origin::new(session.requester.url.clone()),
            session.network.clone(),
        );
        self.lock_sessions()
            .insert(session.topic.clone(), session);
    }

    fn session(&self, topic: &str) -> Option<SessionRecord> {
        self.lock_sessions().get(topic).cloned()
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
