//! Translation of wire-shaped transaction requests into the canonical form
//! handed to the approval flow.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::network::Network;

/// Transaction request exactly as it arrives on the RPC surface.
///
/// Callers disagree about field names (`gas` vs the canonical gas limit,
/// `data` vs the aliased `input`), so everything is optional here and the
/// normalizer settles the ambiguity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireTransaction {
    pub from: Option<String>,
    pub to: Option<String>,
    pub value: Option<String>,
    pub data: Option<String>,
    pub input: Option<String>,
    pub gas: Option<String>,
    pub gas_price: Option<String>,
    pub max_fee_per_gas: Option<String>,
    pub max_priority_fee_per_gas: Option<String>,
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<TransactionAnnotation>,
}

/// Pre-computed transaction context attached by the wallet's own flows.
///
/// Untrusted origins may send this field; the router discards it unless the
/// caller is the internal origin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionAnnotation {
    pub kind: String,
    pub payload: Value,
}

/// Normalized, protocol-agnostic transaction shape used internally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalTransaction {
    pub from: String,
    pub to: Option<String>,
    pub value: Option<String>,
    pub data: Option<String>,
    pub gas_limit: Option<String>,
    pub gas_price: Option<String>,
    pub max_fee_per_gas: Option<String>,
    pub max_priority_fee_per_gas: Option<String>,
    /// Always `None` after normalization; the nonce is recomputed at
    /// signing time, never taken from the caller.
    pub nonce: Option<String>,
    pub network: Network,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<TransactionAnnotation>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("transaction has no sender address")]
    MissingSender,
    #[error("field `{field}` is not hex data")]
    InvalidHex { field: &'static str },
}

/// Deterministic, pure translation of a wire request.
///
/// `gas` maps to the gas limit, an explicit `data` wins over the aliased
/// `input`, and a caller-supplied nonce is stripped. The annotation passes
/// through untouched; trust gating happens in the router, which knows the
/// caller's origin.
pub fn normalize(
    wire: &WireTransaction,
    network: Network,
) -> Result<CanonicalTransaction, NormalizeError> {
    let from = wire
        .from
        .clone()
        .filter(|from| !from.is_empty())
        .ok_or(NormalizeError::MissingSender)?;

    let data = match (&wire.data, &wire.input) {
        (Some(data), _) => Some(data.clone()),
        (None, Some(input)) => Some(input.clone()),
        (None, None) => None,
    };
    if let Some(payload) = &data {
        require_hex("data", payload)?;
    }
    if let Some(value) = &wire.value {
        require_hex("value", value)?;
    }

    Ok(CanonicalTransaction {
        from,
        to: wire.to.clone(),
        value: wire.value.clone(),
        data,
        gas_limit: wire.gas.clone(),
        gas_price: wire.gas_price.clone(),
        max_fee_per_gas: wire.max_fee_per_gas.clone(),
        max_priority_fee_per_gas: wire.max_priority_fee_per_gas.clone(),
        nonce: None,
        network,
        annotation: wire.annotation.clone(),
    })
}

fn require_hex(field: &'static str, value: &str) -> Result<(), NormalizeError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.bytes().all(|byte| byte.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(NormalizeError::InvalidHex { field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mainnet() -> Network {
        Network::new(1, "mainnet")
    }

    #[test]
    fn gas_maps_to_gas_limit() {
        let wire = WireTransaction {
            from: Some("0xsender".into()),
            gas: Some("0x5208".into()),
            ..WireTransaction::default()
        };
        let canonical = normalize(&wire, mainnet()).expect("normalize");
        assert_eq!(canonical.gas_limit.as_deref(), Some("0x5208"));
    }

    #[test]
    fn explicit_data_wins_over_aliased_input() {
        let wire = WireTransaction {
            from: Some("0xsender".into()),
            data: Some("0x01".into()),
            input: Some("0x02".into()),
            ..WireTransaction::default()
        };
        let canonical = normalize(&wire, mainnet()).expect("normalize");
        assert_eq!(canonical.data.as_deref(), Some("0x01"));
    }

    #[test]
    fn input_is_used_when_data_is_absent() {
        let wire = WireTransaction {
            from: Some("0xsender".into()),
            input: Some("0xabc".into()),
            ..WireTransaction::default()
        };
        let canonical = normalize(&wire, mainnet()).expect("normalize");
        assert_eq!(canonical.data.as_deref(), Some("0xabc"));
    }

    #[test]
    fn caller_nonce_is_always_stripped() {
        let wire = WireTransaction {
            from: Some("0xsender".into()),
            nonce: Some("0x7".into()),
            ..WireTransaction::default()
        };
        let canonical = normalize(&wire, mainnet()).expect("normalize");
        assert_eq!(canonical.nonce, None);
    }

    #[test]
    fn missing_sender_fails() {
        let wire = WireTransaction {
            to: Some("0xrecipient".into()),
            ..WireTransaction::default()
        };
        assert_eq!(normalize(&wire, mainnet()), Err(NormalizeError::MissingSender));
    }

    #[test]
    fn non_hex_data_is_rejected() {
        let wire = WireTransaction {
            from: Some("0xsender".into()),
            data: Some("0xnothex".into()),
            ..WireTransaction::default()
        };
        assert_eq!(
            normalize(&wire, mainnet()),
            Err(NormalizeError::InvalidHex { field: "data" })
        );
    }

    #[test]
    fn wire_shape_deserializes_from_rpc_params() {
        let wire: WireTransaction = serde_json::from_value(json!({
            "from": "0xsender",
            "to": "0xrecipient",
            "gas": "0x5208",
            "maxFeePerGas": "0x77359400",
            "input": "0xabc",
            "nonce": "0x1"
        }))
        .expect("deserialize");
        assert_eq!(wire.gas.as_deref(), Some("0x5208"));
        assert_eq!(wire.max_fee_per_gas.as_deref(), Some("0x77359400"));
        let canonical = normalize(&wire, mainnet()).expect("normalize");
        assert_eq!(canonical.data.as_deref(), Some("0xabc"));
        assert_eq!(canonical.nonce, None);
    }
}
