//! Lightweight action counters for the broker.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Broker activity buckets surfaced through telemetry counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerAction {
    Route,
    Approval,
    ChainSwitch,
    Broadcast,
    WcPairing,
    WcSessionRequest,
}

impl BrokerAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Route => "rpc.route",
            Self::Approval => "approval.decision",
            Self::ChainSwitch => "rpc.chain_switch",
            Self::Broadcast => "rpc.broadcast",
            Self::WcPairing => "wc.pairing",
            Self::WcSessionRequest => "wc.session_request",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TelemetryOutcome {
    Success,
    Rejected,
    Error,
}

impl TelemetryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "ok",
            Self::Rejected => "rejected",
            Self::Error => "err",
        }
    }
}

/// In-memory `action.outcome` counters, disabled by default.
#[derive(Debug, Default)]
pub struct BrokerTelemetry {
    enabled: bool,
    counters: Mutex<HashMap<String, u64>>,
}

impl BrokerTelemetry {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, action: BrokerAction, outcome: TelemetryOutcome) {
        if !self.enabled {
            return;
        }
        let key = format!("{}.{}", action.label(), outcome.label());
        *self.lock().entry(key).or_insert(0) += 1;
    }

    /// Snapshot of the counters, sorted by key for stable output.
    pub fn counters(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .lock()
            .iter()
            .map(|(key, value)| (key.clone(), *value))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_telemetry_records_nothing() {
        let telemetry = BrokerTelemetry::new(false);
        telemetry.record(BrokerAction::Route, TelemetryOutcome::Success);
        assert!(telemetry.counters().is_empty());
    }

    #[test]
    fn counters_accumulate_per_action_and_outcome() {
        let telemetry = BrokerTelemetry::new(true);
        telemetry.record(BrokerAction::Route, TelemetryOutcome::Success);
        telemetry.record(BrokerAction::Route, TelemetryOutcome::Success);
        telemetry.record(BrokerAction::Route, TelemetryOutcome::Error);
        assert_eq!(
            telemetry.counters(),
            vec![
                ("rpc.route.err".to_string(), 1),
                ("rpc.route.ok".to_string(), 2),
            ]
        );
    }
}
