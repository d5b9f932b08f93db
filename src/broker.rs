//! Assembly of the broker from its configuration and collaborator seams.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::approvals::{ApprovalEvent, ApprovalRegistry};
use crate::config::BrokerConfig;
use crate::gateway::ChainGateway;
use crate::network::{NetworkResolver, NetworkSelectionStore};
use crate::preferences::AccountPreferences;
use crate::rpc::MethodRouter;
use crate::telemetry::BrokerTelemetry;
use crate::walletconnect::v1::LegacyTransport;
use crate::walletconnect::v2::RelayTransport;
use crate::walletconnect::WalletConnectBridge;

/// Capabilities the embedder supplies; everything else is built here.
pub struct BrokerSeams {
    pub gateway: Arc<dyn ChainGateway>,
    pub selection_store: Arc<dyn NetworkSelectionStore>,
    pub preferences: Arc<dyn AccountPreferences>,
    pub legacy_transport: Arc<dyn LegacyTransport>,
    pub relay_transport: Arc<dyn RelayTransport>,
}

/// The wired broker: the RPC router for page-originated calls and the
/// WalletConnect bridge for paired peers, sharing one approval correlator.
pub struct Broker {
    pub router: Arc<MethodRouter>,
    pub bridge: Arc<WalletConnectBridge>,
    pub approvals: Arc<ApprovalRegistry>,
    pub telemetry: Arc<BrokerTelemetry>,
}

impl Broker {
    /// Wire the broker. The returned receiver is the trusted UI's approval
    /// event stream; dropping it leaves future approvals pending until the
    /// configured timeout, if any.
    pub fn from_config(
        config: BrokerConfig,
        seams: BrokerSeams,
    ) -> (Self, UnboundedReceiver<ApprovalEvent>) {
        let (approvals, events) = ApprovalRegistry::new();
        let approvals = Arc::new(approvals);
        let telemetry = Arc::new(BrokerTelemetry::new(config.telemetry));
        let resolver = Arc::new(NetworkResolver::new(
            seams.selection_store,
            config.default_network.clone(),
        ));
        let approval_timeout = config.approvals.timeout();

        let router = Arc::new(MethodRouter::new(
            resolver.clone(),
            seams.gateway,
            approvals.clone(),
            seams.preferences,
            config.networks.clone(),
            approval_timeout,
            telemetry.clone(),
        ));
        let bridge = Arc::new(WalletConnectBridge::new(
            router.clone(),
            approvals.clone(),
            resolver,
            seams.legacy_transport,
            seams.relay_transport,
            config.networks,
            config.walletconnect,
            approval_timeout,
            telemetry.clone(),
        ));

        (
            Self {
                router,
                bridge,
                approvals,
                telemetry,
            },
            events,
        )
    }
}
