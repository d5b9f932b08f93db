//! Abstraction over the blockchain gateway consumed by the broker.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::Error as AnyError;
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::network::Network;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failures such as networking errors or RPC timeouts.
    #[error("transport error: {0}")]
    Transport(#[from] AnyError),
    /// The requested chain is not reachable through this gateway.
    #[error("chain 0x{chain_id:x} is not available")]
    ChainUnavailable { chain_id: u64 },
    /// The gateway refused the request for application-level reasons.
    #[error("request rejected: {reason}")]
    Rejected { reason: String },
}

impl GatewayError {
    pub fn transport(error: impl Into<AnyError>) -> Self {
        Self::Transport(error.into())
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// On-chain data and broadcast surface consumed by the broker.
///
/// The broker never retries gateway calls; resilience is the gateway's
/// concern.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Forward a pass-through RPC call bound to `network`.
    async fn send(&self, method: &str, params: &Value, network: &Network) -> GatewayResult<Value>;

    /// Broadcast an already-signed transaction, returning its hash.
    async fn broadcast_signed_transaction(
        &self,
        signed: &str,
        network: &Network,
    ) -> GatewayResult<String>;

    /// Make sure the gateway can serve `chain_id`, failing when it cannot.
    async fn activate_network(&self, chain_id: u64) -> GatewayResult<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
    pub chain_id: u64,
}

/// In-memory gateway used in tests and local development harnesses.
#[derive(Default)]
pub struct StubChainGateway {
    available_chains: HashSet<u64>,
    responses: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<RecordedCall>>,
    broadcasts: Mutex<Vec<String>>,
}

impl StubChainGateway {
    pub fn new(available_chains: impl IntoIterator<Item = u64>) -> Self {
        Self {
            available_chains: available_chains.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Canned response returned for `method` instead of the default echo.
    pub fn set_response(&self, method: impl Into<String>, response: Value) {
        lock(&self.responses).insert(method.into(), response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn broadcasts(&self) -> Vec<String> {
        lock(&self.broadcasts).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ChainGateway for StubChainGateway {
    async fn send(&self, method: &str, params: &Value, network: &Network) -> GatewayResult<Value> {
        if !self.available_chains.contains(&network.chain_id) {
            return Err(GatewayError::ChainUnavailable {
                chain_id: network.chain_id,
            });
        }
        lock(&self.calls).push(RecordedCall {
            method: method.to_string(),
            params: params.clone(),
            chain_id: network.chain_id,
        });
        if let Some(response) = lock(&self.responses).get(method) {
            return Ok(response.clone());
        }
        Ok(json!({ "method": method, "chainId": network.chain_id_hex() }))
    }

    async fn broadcast_signed_transaction(
        &self,
        signed: &str,
        network: &Network,
    ) -> GatewayResult<String> {
        if !self.available_chains.contains(&network.chain_id) {
            return Err(GatewayError::ChainUnavailable {
                chain_id: network.chain_id,
            });
        }
        lock(&self.broadcasts).push(signed.to_string());
        Ok(format!("0x{:064x}", lock(&self.broadcasts).len()))
    }

    async fn activate_network(&self, chain_id: u64) -> GatewayResult<()> {
        if self.available_chains.contains(&chain_id) {
            Ok(())
        } else {
            Err(GatewayError::ChainUnavailable { chain_id })
        }
    }
}
