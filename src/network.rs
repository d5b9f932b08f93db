//! Per-origin active-network tracking.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::origin::Origin;

/// A chain this wallet can be pointed at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub chain_id: u64,
    pub name: String,
}

impl Network {
    pub fn new(chain_id: u64, name: impl Into<String>) -> Self {
        Self {
            chain_id,
            name: name.into(),
        }
    }

    /// Chain id in the `0x`-prefixed hex form used on the RPC surface.
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.chain_id_hex())
    }
}

/// Storage seam for the per-origin network selection table.
///
/// One entry per origin, last-writer-wins. Durable implementations live
/// outside this crate; the in-memory store below serves tests and embedders
/// that do not persist selections.
pub trait NetworkSelectionStore: Send + Sync {
    fn get(&self, origin: &Origin) -> Option<Network>;
    fn set(&self, origin: &Origin, network: Network);
}

#[derive(Default)]
pub struct MemoryNetworkSelectionStore {
    entries: Mutex<HashMap<Origin, Network>>,
}

impl MemoryNetworkSelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Origin, Network>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NetworkSelectionStore for MemoryNetworkSelectionStore {
    fn get(&self, origin: &Origin) -> Option<Network> {
        self.lock().get(origin).cloned()
    }

    fn set(&self, origin: &Origin, network: Network) {
        self.lock().insert(origin.clone(), network);
    }
}

/// Resolves which network an origin's requests execute against.
pub struct NetworkResolver {
    store: Arc<dyn NetworkSelectionStore>,
    default_network: Network,
}

impl NetworkResolver {
    pub fn new(store: Arc<dyn NetworkSelectionStore>, default_network: Network) -> Self {
        Self {
            store,
            default_network,
        }
    }

    /// Active network for `origin`. Absence is a valid state: fall back to
    /// the internal origin's selection, then to the configured default.
    pub fn resolve(&self, origin: &Origin) -> Network {
        if let Some(network) = self.store.get(origin) {
            return network;
        }
        if !origin.is_internal() {
            if let Some(network) = self.store.get(&Origin::internal()) {
                return network;
            }
        }
        self.default_network.clone()
    }

    /// Idempotent upsert of `origin`'s selection. Callers are responsible
    /// for having validated the network against the supported set first.
    pub fn set_active(&self, origin: &Origin, network: Network) {
        self.store.set(origin, network);
    }

    pub fn default_network(&self) -> &Network {
        &self.default_network
    }
}
