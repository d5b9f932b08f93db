use std::borrow::Cow;

use serde_json::Value;

/// Stable broker RPC error codes.
///
/// Provider-facing failures use the EIP-1193 numeric space; malformed
/// requests keep the JSON-RPC 2.0 reserved codes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BrokerRpcErrorCode {
    InvalidRequest,
    InvalidParams,
    InternalError,
    UserRejected,
    UnsupportedMethod,
    ChainDisconnected,
}

impl BrokerRpcErrorCode {
    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            BrokerRpcErrorCode::InvalidRequest => Cow::Borrowed("INVALID_REQUEST"),
            BrokerRpcErrorCode::InvalidParams => Cow::Borrowed("INVALID_PARAMS"),
            BrokerRpcErrorCode::InternalError => Cow::Borrowed("INTERNAL_ERROR"),
            BrokerRpcErrorCode::UserRejected => Cow::Borrowed("USER_REJECTED"),
            BrokerRpcErrorCode::UnsupportedMethod => Cow::Borrowed("UNSUPPORTED_METHOD"),
            BrokerRpcErrorCode::ChainDisconnected => Cow::Borrowed("CHAIN_DISCONNECTED"),
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            BrokerRpcErrorCode::InvalidRequest => -32600,
            BrokerRpcErrorCode::InvalidParams => -32602,
            BrokerRpcErrorCode::InternalError => -32603,
            BrokerRpcErrorCode::UserRejected => 4001,
            BrokerRpcErrorCode::UnsupportedMethod => 4200,
            BrokerRpcErrorCode::ChainDisconnected => 4901,
        }
    }

    pub fn data_payload(&self, details: Option<Value>) -> Value {
        let mut payload = serde_json::Map::new();
        payload.insert(
            "code".to_string(),
            Value::String(self.as_str().into_owned()),
        );
        if let Some(details) = details {
            payload.insert("details".to_string(), details);
        }
        Value::Object(payload)
    }
}
