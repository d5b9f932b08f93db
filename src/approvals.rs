//! Correlation between untrusted requests and trusted UI decisions.
//!
//! Every action needing user consent opens a pending approval here. The UI
//! observes an event carrying the payload and the approval id, and settles
//! it through [`ApprovalRegistry::resolve`] or [`ApprovalRegistry::reject`]
//! exactly once. The record is discarded on the first settle; later settles
//! are a no-op error, never a crash.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::tx::CanonicalTransaction;

pub type ApprovalId = String;

/// What the user is being asked to approve.
#[derive(Clone, Debug, PartialEq)]
pub enum ApprovalPayload {
    Transaction(CanonicalTransaction),
    TypedData { address: String, payload: Value },
    Data { address: String, payload: String },
    SessionProposal(SessionApprovalSummary),
}

/// Pairing proposal summary shown to the user before account selection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionApprovalSummary {
    pub peer_name: String,
    pub peer_url: String,
    pub chain_ids: Vec<u64>,
    pub methods: Vec<String>,
}

/// Event emitted towards the trusted UI when an approval opens.
#[derive(Clone, Debug, PartialEq)]
pub enum ApprovalEvent {
    TransactionSignatureRequest {
        id: ApprovalId,
        request: CanonicalTransaction,
    },
    SignTypedDataRequest {
        id: ApprovalId,
        address: String,
        payload: Value,
    },
    SignDataRequest {
        id: ApprovalId,
        address: String,
        payload: String,
    },
    SessionProposalRequest {
        id: ApprovalId,
        summary: SessionApprovalSummary,
    },
}

impl ApprovalEvent {
    fn from_payload(id: ApprovalId, payload: ApprovalPayload) -> Self {
        match payload {
            ApprovalPayload::Transaction(request) => {
                Self::TransactionSignatureRequest { id, request }
            }
            ApprovalPayload::TypedData { address, payload } => Self::SignTypedDataRequest {
                id,
                address,
                payload,
            },
            ApprovalPayload::Data { address, payload } => Self::SignDataRequest {
                id,
                address,
                payload,
            },
            ApprovalPayload::SessionProposal(summary) => {
                Self::SessionProposalRequest { id, summary }
            }
        }
    }

    pub fn id(&self) -> &ApprovalId {
        match self {
            Self::TransactionSignatureRequest { id, .. }
            | Self::SignTypedDataRequest { id, .. }
            | Self::SignDataRequest { id, .. }
            | Self::SessionProposalRequest { id, .. } => id,
        }
    }
}

/// Outcome of a pending approval as observed by the suspended caller.
#[derive(Clone, Debug, PartialEq)]
pub enum ApprovalDecision {
    /// The user approved; the value carries whatever the action produces
    /// (a signed artifact, a signature, selected accounts).
    Approved(Value),
    Rejected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("unknown or already settled approval `{0}`")]
    Unknown(String),
}

/// One correlator instance serves the whole broker; approvals from any
/// number of origins are open concurrently and settle independently.
pub struct ApprovalRegistry {
    pending: Mutex<HashMap<ApprovalId, oneshot::Sender<ApprovalDecision>>>,
    next_id: AtomicU64,
    events: mpsc::UnboundedSender<ApprovalEvent>,
}

impl ApprovalRegistry {
    /// Build the registry and the event stream consumed by the trusted UI.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ApprovalEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let registry = Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            events,
        };
        (registry, receiver)
    }

    /// Open a pending approval, notify the UI, and hand back the receiver
    /// the caller suspends on.
    pub fn open(&self, payload: ApprovalPayload) -> (ApprovalId, oneshot::Receiver<ApprovalDecision>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("{id:016x}");
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(id.clone(), tx);
        if self
            .events
            .send(ApprovalEvent::from_payload(id.clone(), payload))
            .is_err()
        {
            // UI torn down: the approval stays pending until the caller's
            // timeout (if configured) discards it.
            warn!(approval = %id, "approval event listener is gone");
        }
        (id, rx)
    }

    /// Settle an approval with the user's result. No-op error if the id is
    /// unknown or already settled.
    pub fn resolve(&self, id: &str, result: Value) -> Result<(), ApprovalError> {
        self.settle(id, ApprovalDecision::Approved(result))
    }

    /// Decline an approval. No-op error if the id is unknown or already
    /// settled.
    pub fn reject(&self, id: &str) -> Result<(), ApprovalError> {
        self.settle(id, ApprovalDecision::Rejected)
    }

    /// Await the decision for an open approval. A configured timeout
    /// discards the pending record and reads as a rejection.
    pub async fn await_decision(
        &self,
        id: &ApprovalId,
        rx: oneshot::Receiver<ApprovalDecision>,
        timeout: Option<Duration>,
    ) -> ApprovalDecision {
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    debug!(approval = %id, timeout_secs = limit.as_secs(), "approval timed out");
                    self.discard(id);
                    return ApprovalDecision::Rejected;
                }
            },
            None => rx.await,
        };
        // A dropped sender means the registry discarded the record without
        // a decision; treat it as a rejection.
        outcome.unwrap_or(ApprovalDecision::Rejected)
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    fn settle(&self, id: &str, decision: ApprovalDecision) -> Result<(), ApprovalError> {
        let sender = self
            .lock_pending()
            .remove(id)
            .ok_or_else(|| ApprovalError::Unknown(id.to_string()))?;
        // The caller may have stopped waiting (timeout); the decision is
        // still consumed exactly once either way.
        let _ = sender.send(decision);
        Ok(())
    }

    fn discard(&self, id: &str) {
        self.lock_pending().remove(id);
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<ApprovalId, oneshot::Sender<ApprovalDecision>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
