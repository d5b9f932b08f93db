//! Trust boundary of the wallet.
//!
//! Untrusted contexts — web pages running dApps and WalletConnect peers on
//! either protocol generation — submit JSON-RPC-shaped requests here. The
//! broker classifies each method, forwards safe reads to the chain gateway,
//! correlates anything needing consent with a trusted UI decision, and posts
//! protocol-correct responses back, exactly once per request.
//!
//! Collaborators are consumed through seams: [`gateway::ChainGateway`] for
//! on-chain data and broadcasting, [`network::NetworkSelectionStore`] for
//! durable per-origin network selection, [`preferences::AccountPreferences`]
//! for the selected account. Key custody stays outside this crate: the UI
//! resolves a pending approval with the signed artifact itself.

pub mod approvals;
pub mod broker;
pub mod config;
pub mod gateway;
pub mod network;
pub mod origin;
pub mod preferences;
pub mod rpc;
pub mod telemetry;
pub mod tx;
pub mod walletconnect;

pub use approvals::{ApprovalDecision, ApprovalEvent, ApprovalRegistry};
pub use broker::{Broker, BrokerSeams};
pub use config::BrokerConfig;
pub use gateway::ChainGateway;
pub use network::{Network, NetworkResolver, NetworkSelectionStore};
pub use origin::Origin;
pub use rpc::MethodRouter;
pub use tx::{normalize, CanonicalTransaction, WireTransaction};
pub use walletconnect::WalletConnectBridge;
