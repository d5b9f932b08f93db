//! Pairing, session lifecycle, and request/response flows across both
//! WalletConnect protocol generations.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use wallet_broker::approvals::{ApprovalEvent, ApprovalRegistry};
use wallet_broker::config::WalletConnectConfig;
use wallet_broker::gateway::StubChainGateway;
use wallet_broker::network::{MemoryNetworkSelectionStore, Network, NetworkResolver};
use wallet_broker::preferences::MemoryAccountPreferences;
use wallet_broker::rpc::MethodRouter;
use wallet_broker::telemetry::BrokerTelemetry;
use wallet_broker::walletconnect::translate::{
    ProtocolVersion, RequesterMetadata, SessionResponse,
};
use wallet_broker::walletconnect::v1::{
    LegacyPostedResponse, LegacySessionProposal, StubLegacyTransport,
};
use wallet_broker::walletconnect::v2::{SessionProposal, StubRelayTransport};
use wallet_broker::walletconnect::{PairingOutcome, WalletConnectBridge};

const ACCOUNT: &str = "0x9fc3da866e7df3a1c57ade1a97c9f00a70f010c8";
const V1_URI: &str = "wc:7f6e504b-fa14@1?bridge=https%3A%2F%2Fbridge.example&key=41c3e1f2";
const V2_URI: &str = "wc:b61b370a99504fa0@2?relay-protocol=irn&symKey=4ef8aa7fff3e8354";

struct Fixture {
    bridge: Arc<WalletConnectBridge>,
    approvals: Arc<ApprovalRegistry>,
    legacy: Arc<StubLegacyTransport>,
    relay: Arc<StubRelayTransport>,
    events: UnboundedReceiver<ApprovalEvent>,
}

fn legacy_proposal() -> LegacySessionProposal {
    LegacySessionProposal {
        handshake_id: 1_647_000_000_000,
        peer_meta: RequesterMetadata {
            name: "Legacy DApp".into(),
            url: "https://legacy.example".into(),
            ..RequesterMetadata::default()
        },
        chain_id: Some(1),
    }
}

fn v2_proposal(namespaces: Value) -> SessionProposal {
    serde_json::from_value(json!({
        "id": 1743510684985985u64,
        "proposer": {
            "publicKey": "04f1c07b7205c273",
            "metadata": {
                "name": "V2 DApp",
                "url": "https://v2.example",
                "description": "test peer",
                "icons": []
            }
        },
        "requiredNamespaces": namespaces
    }))
    .expect("proposal")
}

fn fixture(legacy: StubLegacyTransport, relay: StubRelayTransport) -> Fixture {
    let (approvals, events) = ApprovalRegistry::new();
    let approvals = Arc::new(approvals);
    let gateway = Arc::new(StubChainGateway::new([1, 137]));
    let resolver = Arc::new(NetworkResolver::new(
        Arc::new(MemoryNetworkSelectionStore::new()),
        Network::new(1, "mainnet"),
    ));
    let networks = vec![Network::new(1, "mainnet"), Network::new(137, "polygon")];
    let telemetry = Arc::new(BrokerTelemetry::default());
    let router = Arc::new(MethodRouter::new(
        resolver.clone(),
        gateway,
        approvals.clone(),
        Arc::new(MemoryAccountPreferences::with_account(ACCOUNT)),
        networks.clone(),
        None,
        telemetry.clone(),
    ));
    let legacy = Arc::new(legacy);
    let relay = Arc::new(relay);
    let bridge = Arc::new(WalletConnectBridge::new(
        router,
        approvals.clone(),
        resolver,
        legacy.clone(),
        relay.clone(),
        networks,
        WalletConnectConfig::default(),
        None,
        telemetry,
    ));
    Fixture {
        bridge,
        approvals,
        legacy,
        relay,
        events,
    }
}

/// Drive a pairing to completion, answering the session-proposal approval
/// with `decision` (accounts to grant, or `None` to reject).
async fn pair_with_decision(
    fixture: &mut Fixture,
    uri: &str,
    decision: Option<Value>,
) -> PairingOutcome {
    let bridge = fixture.bridge.clone();
    let uri = uri.to_string();
    let handle = tokio::spawn(async move { bridge.pair(&uri).await });

    let event = fixture.events.recv().await.expect("session proposal event");
    let id = match &event {
        ApprovalEvent::SessionProposalRequest { id, .. } => id.clone(),
        other => panic!("unexpected event: {other:?}"),
    };
    match decision {
        Some(accounts) => fixture.approvals.resolve(&id, accounts).expect("resolve"),
        None => fixture.approvals.reject(&id).expect("reject"),
    }
    handle.await.expect("join").expect("pair")
}

#[tokio::test]
async fn legacy_pairing_acknowledges_through_the_v1_stack() {
    let mut fixture = fixture(
        StubLegacyTransport::with_proposal(legacy_proposal()),
        StubRelayTransport::new(),
    );
    let outcome = pair_with_decision(&mut fixture, V1_URI, Some(json!([ACCOUNT]))).await;
    assert_eq!(
        outcome,
        PairingOutcome::Acknowledged {
            topic: "7f6e504b-fa14".into()
        }
    );

    let approved = fixture.legacy.approved_sessions();
    assert_eq!(approved.len(), 1);
    assert_eq!(approved[0].1, vec![ACCOUNT.to_string()]);
    assert_eq!(approved[0].2, 1);
    // The v2 stack never sees a v1 pairing.
    assert!(fixture.relay.approved_sessions().is_empty());
    assert!(fixture.relay.rejected_sessions().is_empty());

    let sessions = fixture.bridge.active_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].version, ProtocolVersion::V1);
}

#[tokio::test]
async fn v2_pairing_acknowledges_with_granted_namespaces() {
    let proposal = v2_proposal(json!({
        "eip155": {
            "chains": ["eip155:137"],
            "methods": ["eth_sendTransaction", "personal_sign"],
            "events": ["accountsChanged"]
        }
    }));
    let mut fixture = fixture(
        StubLegacyTransport::new(),
        StubRelayTransport::with_proposal(proposal),
    );
    let outcome = pair_with_decision(&mut fixture, V2_URI, Some(json!([ACCOUNT]))).await;
    let topic = match outcome {
        PairingOutcome::Acknowledged { topic } => topic,
        other => panic!("expected acknowledgment, got {other:?}"),
    };

    let approved = fixture.relay.approved_sessions();
    assert_eq!(approved.len(), 1);
    let namespace = approved[0].1.get("eip155").expect("eip155 namespace");
    assert_eq!(namespace.accounts, vec![format!("eip155:137:{ACCOUNT}")]);
    assert!(fixture.legacy.approved_sessions().is_empty());

    let sessions = fixture.bridge.active_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].topic, topic);
    assert_eq!(sessions[0].network.chain_id, 137);
}

#[tokio::test]
async fn proposal_without_the_evm_namespace_is_rejected_outright() {
    let proposal = v2_proposal(json!({
        "cosmos": { "chains": ["cosmos:cosmoshub-4"], "methods": [], "events": [] }
    }));
    let mut fixture = fixture(
        StubLegacyTransport::new(),
        StubRelayTransport::with_proposal(proposal),
    );

    let outcome = fixture.bridge.pair(V2_URI).await.expect("pair");
    assert_eq!(outcome, PairingOutcome::Rejected);
    assert_eq!(fixture.relay.rejected_sessions().len(), 1);
    assert!(fixture.relay.approved_sessions().is_empty());
    // Straight to Rejected: the UI is never consulted.
    assert!(fixture.events.try_recv().is_err());
}

#[tokio::test]
async fn user_rejection_rejects_the_proposal() {
    let proposal = v2_proposal(json!({
        "eip155": { "chains": ["eip155:1"], "methods": [], "events": [] }
    }));
    let mut fixture = fixture(
        StubLegacyTransport::new(),
        StubRelayTransport::with_proposal(proposal),
    );
    let outcome = pair_with_decision(&mut fixture, V2_URI, None).await;
    assert_eq!(outcome, PairingOutcome::Rejected);
    assert_eq!(fixture.relay.rejected_sessions().len(), 1);
}

#[tokio::test]
async fn unrecognized_uri_version_is_dropped_not_fatal() {
    let fixture = fixture(StubLegacyTransport::new(), StubRelayTransport::new());
    let outcome = fixture.bridge.pair("wc:topic@7?x=y").await.expect("pair");
    assert_eq!(outcome, PairingOutcome::Ignored);
    assert!(fixture.legacy.rejected_sessions().is_empty());
    assert!(fixture.relay.rejected_sessions().is_empty());
}

#[tokio::test]
async fn v2_session_request_is_answered_on_its_topic() {
    let proposal = v2_proposal(json!({
        "eip155": { "chains": ["eip155:137"], "methods": ["eth_chainId"], "events": [] }
    }));
    let mut fixture = fixture(
        StubLegacyTransport::new(),
        StubRelayTransport::with_proposal(proposal),
    );
    let outcome = pair_with_decision(&mut fixture, V2_URI, Some(json!([ACCOUNT]))).await;
    let topic = match outcome {
        PairingOutcome::Acknowledged { topic } => topic,
        other => panic!("expected acknowledgment, got {other:?}"),
    };

    // The session chain became the peer's active network at settlement.
    let request = json!({
        "id": 99u64,
        "params": { "request": { "method": "eth_chainId", "params": [] }, "chainId": "eip155:137" }
    });
    fixture
        .bridge
        .on_session_request(&topic, &request)
        .await
        .expect("session request");

    let responses = fixture.relay.responses();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].topic, topic);
    assert_eq!(responses[0].request_id, 99);
    assert_eq!(responses[0].response, SessionResponse::Result(json!("0x89")));
}

#[tokio::test]
async fn v1_signing_request_posts_back_through_the_legacy_callback() {
    let mut fixture = fixture(
        StubLegacyTransport::with_proposal(legacy_proposal()),
        StubRelayTransport::new(),
    );
    let outcome = pair_with_decision(&mut fixture, V1_URI, Some(json!([ACCOUNT]))).await;
    let topic = match outcome {
        PairingOutcome::Acknowledged { topic } => topic,
        other => panic!("expected acknowledgment, got {other:?}"),
    };

    let bridge = fixture.bridge.clone();
    let request_topic = topic.clone();
    let handle = tokio::spawn(async move {
        let request = json!({
            "id": 7u64,
            "method": "personal_sign",
            "params": ["0xdeadbeef", ACCOUNT]
        });
        bridge.on_session_request(&request_topic, &request).await
    });

    let event = fixture.events.recv().await.expect("sign event");
    match &event {
        ApprovalEvent::SignDataRequest { id, address, payload } => {
            assert_eq!(address, ACCOUNT);
            assert_eq!(payload, "0xdeadbeef");
            fixture.approvals.resolve(id, json!("0xsig")).expect("resolve");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    handle.await.expect("join").expect("session request");

    assert_eq!(
        fixture.legacy.responses(),
        vec![LegacyPostedResponse::Result {
            request_id: 7,
            result: json!("0xsig"),
        }]
    );
    assert!(fixture.relay.responses().is_empty());
}

#[tokio::test]
async fn rejected_session_request_posts_the_error_branch() {
    let mut fixture = fixture(
        StubLegacyTransport::with_proposal(legacy_proposal()),
        StubRelayTransport::new(),
    );
    let outcome = pair_with_decision(&mut fixture, V1_URI, Some(json!([ACCOUNT]))).await;
    let topic = match outcome {
        PairingOutcome::Acknowledged { topic } => topic,
        other => panic!("expected acknowledgment, got {other:?}"),
    };

    let bridge = fixture.bridge.clone();
    let request_topic = topic.clone();
    let handle = tokio::spawn(async move {
        let request = json!({
            "id": 8u64,
            "method": "eth_sendTransaction",
            "params": [{ "from": ACCOUNT }]
        });
        bridge.on_session_request(&request_topic, &request).await
    });

    let event = fixture.events.recv().await.expect("approval event");
    fixture.approvals.reject(event.id()).expect("reject");
    handle.await.expect("join").expect("session request");

    let responses = fixture.legacy.responses();
    assert_eq!(responses.len(), 1);
    match &responses[0] {
        LegacyPostedResponse::Error { request_id, error } => {
            assert_eq!(*request_id, 8);
            assert_eq!(error.code, 4001);
        }
        other => panic!("expected error response, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_session_requests_are_dropped_without_a_response() {
    let mut fixture = fixture(
        StubLegacyTransport::with_proposal(legacy_proposal()),
        StubRelayTransport::new(),
    );
    let outcome = pair_with_decision(&mut fixture, V1_URI, Some(json!([ACCOUNT]))).await;
    let topic = match outcome {
        PairingOutcome::Acknowledged { topic } => topic,
        other => panic!("expected acknowledgment, got {other:?}"),
    };

    fixture
        .bridge
        .on_session_request(&topic, &json!({ "method": "eth_call" }))
        .await
        .expect("drop");
    fixture
        .bridge
        .on_session_request("unknown-topic", &json!({ "id": 1, "method": "eth_call" }))
        .await
        .expect("drop");
    assert!(fixture.legacy.responses().is_empty());
    assert!(fixture.relay.responses().is_empty());
}

#[tokio::test]
async fn v1_and_v2_sessions_coexist_without_cross_contamination() {
    let proposal = v2_proposal(json!({
        "eip155": { "chains": ["eip155:1"], "methods": [], "events": [] }
    }));
    let mut fixture = fixture(
        StubLegacyTransport::with_proposal(legacy_proposal()),
        StubRelayTransport::with_proposal(proposal),
    );

    let legacy_outcome = pair_with_decision(&mut fixture, V1_URI, Some(json!([ACCOUNT]))).await;
    let v2_outcome = pair_with_decision(&mut fixture, V2_URI, Some(json!([ACCOUNT]))).await;
    let legacy_topic = match legacy_outcome {
        PairingOutcome::Acknowledged { topic } => topic,
        other => panic!("expected acknowledgment, got {other:?}"),
    };
    let v2_topic = match v2_outcome {
        PairingOutcome::Acknowledged { topic } => topic,
        other => panic!("expected acknowledgment, got {other:?}"),
    };
    assert_ne!(legacy_topic, v2_topic);

    let sessions = fixture.bridge.active_sessions();
    assert_eq!(sessions.len(), 2);

    // Answer one request per session; each response stays on its stack.
    fixture
        .bridge
        .on_session_request(
            &legacy_topic,
            &json!({ "id": 1u64, "method": "eth_chainId", "params": [] }),
        )
        .await
        .expect("legacy request");
    fixture
        .bridge
        .on_session_request(
            &v2_topic,
            &json!({ "id": 2u64, "params": { "request": { "method": "eth_chainId", "params": [] } } }),
        )
        .await
        .expect("v2 request");

    assert_eq!(fixture.legacy.responses().len(), 1);
    assert_eq!(fixture.relay.responses().len(), 1);

    assert!(fixture.bridge.disconnect(&v2_topic));
    assert_eq!(fixture.bridge.active_sessions().len(), 1);
}
