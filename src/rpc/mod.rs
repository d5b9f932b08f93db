//! JSON-RPC method classification and dispatch.

pub mod dto;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::approvals::{ApprovalDecision, ApprovalPayload, ApprovalRegistry};
use crate::gateway::{ChainGateway, GatewayError};
use crate::network::{Network, NetworkResolver};
use crate::origin::Origin;
use crate::preferences::AccountPreferences;
use crate::telemetry::{BrokerAction, BrokerTelemetry, TelemetryOutcome};
use crate::tx::{normalize, WireTransaction};
use dto::{ChainSwitchParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};
use error::BrokerRpcErrorCode;

/// Read-only and broadcast-only calls forwarded verbatim to the gateway.
const PASS_THROUGH_METHODS: &[&str] = &[
    "eth_blockNumber",
    "eth_call",
    "eth_estimateGas",
    "eth_feeHistory",
    "eth_gasPrice",
    "eth_getBalance",
    "eth_getBlockByHash",
    "eth_getBlockByNumber",
    "eth_getCode",
    "eth_getLogs",
    "eth_getStorageAt",
    "eth_getTransactionByHash",
    "eth_getTransactionCount",
    "eth_getTransactionReceipt",
    "eth_maxPriorityFeePerGas",
    "eth_sendRawTransaction",
    "net_version",
    "web3_clientVersion",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SigningMethod {
    SendTransaction,
    SignTransaction,
    Sign,
    PersonalSign,
    TypedData,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MethodClass {
    Signing(SigningMethod),
    ChainSwitch,
    Accounts,
    ChainId,
    PassThrough,
    Unsupported,
}

/// Bucket a method name. Every inbound method lands in exactly one class;
/// signing takes precedence, unknown names are never silently forwarded.
pub(crate) fn classify(method: &str) -> MethodClass {
    match method {
        "eth_sendTransaction" => MethodClass::Signing(SigningMethod::SendTransaction),
        "eth_signTransaction" => MethodClass::Signing(SigningMethod::SignTransaction),
        "eth_sign" => MethodClass::Signing(SigningMethod::Sign),
        "personal_sign" => MethodClass::Signing(SigningMethod::PersonalSign),
        "eth_signTypedData" | "eth_signTypedData_v3" | "eth_signTypedData_v4" => {
            MethodClass::Signing(SigningMethod::TypedData)
        }
        "wallet_switchEthereumChain" | "wallet_addEthereumChain" => MethodClass::ChainSwitch,
        "eth_accounts" | "eth_requestAccounts" => MethodClass::Accounts,
        "eth_chainId" => MethodClass::ChainId,
        method if PASS_THROUGH_METHODS.contains(&method) => MethodClass::PassThrough,
        _ => MethodClass::Unsupported,
    }
}

/// Classifies every inbound JSON-RPC method and drives it to completion:
/// pass-through to the gateway, chain switching, or a user-approved signing
/// flow through the [`ApprovalRegistry`].
pub struct MethodRouter {
    resolver: Arc<NetworkResolver>,
    gateway: Arc<dyn ChainGateway>,
    approvals: Arc<ApprovalRegistry>,
    preferences: Arc<dyn AccountPreferences>,
    networks: Vec<Network>,
    approval_timeout: Option<Duration>,
    telemetry: Arc<BrokerTelemetry>,
}

impl MethodRouter {
    pub fn new(
        resolver: Arc<NetworkResolver>,
        gateway: Arc<dyn ChainGateway>,
        approvals: Arc<ApprovalRegistry>,
        preferences: Arc<dyn AccountPreferences>,
        networks: Vec<Network>,
        approval_timeout: Option<Duration>,
        telemetry: Arc<BrokerTelemetry>,
    ) -> Self {
        Self {
            resolver,
            gateway,
            approvals,
            preferences,
            networks,
            approval_timeout,
            telemetry,
        }
    }

    /// Handle a full JSON-RPC envelope, producing the matching response.
    pub async fn handle(&self, request: JsonRpcRequest, origin: &Origin) -> JsonRpcResponse {
        let JsonRpcRequest {
            jsonrpc,
            id,
            method,
            params,
        } = request;

        if jsonrpc
            .as_deref()
            .map_or(true, |value| value != JSONRPC_VERSION)
        {
            return JsonRpcResponse::error(
                id,
                RouterError::InvalidRequest("unsupported JSON-RPC version").into_json_error(),
            );
        }

        match self.route(&method, params, origin).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error.into_json_error()),
        }
    }

    /// Route a bare method call. This is the entry point shared by the
    /// direct RPC surface and the WalletConnect bridge.
    pub async fn route(
        &self,
        method: &str,
        params: Option<Value>,
        origin: &Origin,
    ) -> Result<Value, RouterError> {
        let outcome = self.dispatch(method, params, origin).await;
        let telemetry_outcome = match &outcome {
            Ok(_) => TelemetryOutcome::Success,
            Err(RouterError::UserRejected) => TelemetryOutcome::Rejected,
            Err(_) => TelemetryOutcome::Error,
        };
        self.telemetry.record(BrokerAction::Route, telemetry_outcome);
        outcome
    }

    async fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
        origin: &Origin,
    ) -> Result<Value, RouterError> {
        match classify(method) {
            MethodClass::Signing(signing) => self.handle_signing(signing, params, origin).await,
            MethodClass::ChainSwitch => self.handle_chain_switch(params, origin).await,
            MethodClass::Accounts => Ok(self.handle_accounts()),
            MethodClass::ChainId => {
                Ok(Value::String(self.resolver.resolve(origin).chain_id_hex()))
            }
            MethodClass::PassThrough => self.handle_pass_through(method, params, origin).await,
            MethodClass::Unsupported => {
                debug!(%method, %origin, "unsupported method");
                Err(RouterError::Unsupported(method.to_string()))
            }
        }
    }

    async fn handle_signing(
        &self,
        method: SigningMethod,
        params: Option<Value>,
        origin: &Origin,
    ) -> Result<Value, RouterError> {
        match method {
            SigningMethod::SendTransaction => self.sign_transaction(params, origin, true).await,
            SigningMethod::SignTransaction => self.sign_transaction(params, origin, false).await,
            SigningMethod::Sign => {
                let (address, payload) = two_string_params(params)?;
                self.sign_data(address, payload).await
            }
            SigningMethod::PersonalSign => {
                // personal_sign flips the order: data first, address second.
                let (payload, address) = two_string_params(params)?;
                self.sign_data(address, payload).await
            }
            SigningMethod::TypedData => {
                let mut values = param_array(params)?.into_iter();
                let address = string_param(values.next(), "address")?;
                let payload = values
                    .next()
                    .ok_or_else(|| RouterError::InvalidParams("missing typed data".into()))?;
                self.sign_typed_data(address, payload).await
            }
        }
    }

    async fn sign_transaction(
        &self,
        params: Option<Value>,
        origin: &Origin,
        broadcast: bool,
    ) -> Result<Value, RouterError> {
        let value = param_array(params)?
            .into_iter()
            .next()
            .ok_or_else(|| RouterError::InvalidParams("missing transaction object".into()))?;
        let wire: WireTransaction = serde_json::from_value(value)
            .map_err(|error| RouterError::InvalidParams(error.to_string()))?;

        // Trust gate: the annotation is honoured only for the internal
        // origin, decided here, before the first suspension point.
        let annotation = if origin.is_internal() {
            wire.annotation.clone()
        } else {
            None
        };

        let network = self.resolver.resolve(origin);
        let mut canonical = normalize(&wire, network.clone())
            .map_err(|error| RouterError::InvalidParams(error.to_string()))?;
        canonical.annotation = annotation;

        let (id, rx) = self.approvals.open(ApprovalPayload::Transaction(canonical));
        match self
            .approvals
            .await_decision(&id, rx, self.approval_timeout)
            .await
        {
            ApprovalDecision::Approved(signed) => {
                self.telemetry
                    .record(BrokerAction::Approval, TelemetryOutcome::Success);
                let artifact = signed
                    .as_str()
                    .ok_or_else(|| {
                        RouterError::Internal("signed artifact is not a string".into())
                    })?
                    .to_string();
                if broadcast {
                    let hash = self
                        .gateway
                        .broadcast_signed_transaction(&artifact, &network)
                        .await
                        .map_err(|error| self.map_gateway_error(error))?;
                    self.telemetry
                        .record(BrokerAction::Broadcast, TelemetryOutcome::Success);
                    Ok(Value::String(hash))
                } else {
                    Ok(signed)
                }
            }
            ApprovalDecision::Rejected => {
                self.telemetry
                    .record(BrokerAction::Approval, TelemetryOutcome::Rejected);
                Err(RouterError::UserRejected)
            }
        }
    }

    async fn sign_data(&self, address: String, payload: String) -> Result<Value, RouterError> {
        let (id, rx) = self
            .approvals
            .open(ApprovalPayload::Data { address, payload });
        self.await_signature(id, rx).await
    }

    async fn sign_typed_data(&self, address: String, payload: Value) -> Result<Value, RouterError> {
        let (id, rx) = self
            .approvals
            .open(ApprovalPayload::TypedData { address, payload });
        self.await_signature(id, rx).await
    }

    async fn await_signature(
        &self,
        id: crate::approvals::ApprovalId,
        rx: tokio::sync::oneshot::Receiver<ApprovalDecision>,
    ) -> Result<Value, RouterError> {
        match self
            .approvals
            .await_decision(&id, rx, self.approval_timeout)
            .await
        {
            ApprovalDecision::Approved(signature) => {
                self.telemetry
                    .record(BrokerAction::Approval, TelemetryOutcome::Success);
                Ok(signature)
            }
            ApprovalDecision::Rejected => {
                self.telemetry
                    .record(BrokerAction::Approval, TelemetryOutcome::Rejected);
                Err(RouterError::UserRejected)
            }
        }
    }

    async fn handle_chain_switch(
        &self,
        params: Option<Value>,
        origin: &Origin,
    ) -> Result<Value, RouterError> {
        let value = param_array(params)?
            .into_iter()
            .next()
            .ok_or_else(|| RouterError::InvalidParams("missing chain descriptor".into()))?;
        let descriptor: ChainSwitchParams = serde_json::from_value(value)
            .map_err(|error| RouterError::InvalidParams(error.to_string()))?;
        let chain_id = parse_chain_id(&descriptor.chain_id)
            .ok_or_else(|| RouterError::InvalidParams("malformed chain id".into()))?;

        // Only chains already in the supported table can be activated; this
        // broker never adds genuinely new chains.
        let network = self
            .networks
            .iter()
            .find(|network| network.chain_id == chain_id)
            .cloned()
            .ok_or_else(|| RouterError::ChainDisconnected {
                chain_id: descriptor.chain_id.clone(),
            })?;

        if let Err(error) = self.gateway.activate_network(chain_id).await {
            warn!(%origin, chain_id, %error, "chain activation failed");
            self.telemetry
                .record(BrokerAction::ChainSwitch, TelemetryOutcome::Error);
            return Err(RouterError::ChainDisconnected {
                chain_id: descriptor.chain_id,
            });
        }

        debug!(%origin, network = %network, "active network switched");
        self.resolver.set_active(origin, network);
        self.telemetry
            .record(BrokerAction::ChainSwitch, TelemetryOutcome::Success);
        Ok(Value::Null)
    }

    fn handle_accounts(&self) -> Value {
        match self.preferences.selected_account() {
            Some(account) => json!([account]),
            None => json!([]),
        }
    }

    async fn handle_pass_through(
        &self,
        method: &str,
        params: Option<Value>,
        origin: &Origin,
    ) -> Result<Value, RouterError> {
        let network = self.resolver.resolve(origin);
        let params = params.unwrap_or(Value::Null);
        self.gateway
            .send(method, &params, &network)
            .await
            .map_err(|error| self.map_gateway_error(error))
    }

    fn map_gateway_error(&self, error: GatewayError) -> RouterError {
        match error {
            GatewayError::ChainUnavailable { chain_id } => RouterError::ChainDisconnected {
                chain_id: format!("0x{chain_id:x}"),
            },
            // Internal detail is logged, not leaked to the caller.
            other => {
                warn!(error = %other, "gateway call failed");
                RouterError::Internal("gateway failure".into())
            }
        }
    }
}

fn param_array(params: Option<Value>) -> Result<Vec<Value>, RouterError> {
    match params.unwrap_or(Value::Null) {
        Value::Array(values) => Ok(values),
        Value::Null => Ok(Vec::new()),
        _ => Err(RouterError::InvalidParams(
            "positional parameter array expected".into(),
        )),
    }
}

fn string_param(value: Option<Value>, field: &str) -> Result<String, RouterError> {
    match value {
        Some(Value::String(value)) => Ok(value),
        _ => Err(RouterError::InvalidParams(format!(
            "missing string parameter `{field}`"
        ))),
    }
}

fn two_string_params(params: Option<Value>) -> Result<(String, String), RouterError> {
    let mut values = param_array(params)?.into_iter();
    let first = string_param(values.next(), "first")?;
    let second = string_param(values.next(), "second")?;
    Ok((first, second))
}

fn parse_chain_id(value: &str) -> Option<u64> {
    if let Some(digits) = value.strip_prefix("0x") {
        u64::from_str_radix(digits, 16).ok()
    } else {
        value.parse().ok()
    }
}

/// Internal routing failure, converted to a structured RPC error at the
/// surface.
#[derive(Debug)]
pub enum RouterError {
    InvalidRequest(&'static str),
    InvalidParams(String),
    Unsupported(String),
    ChainDisconnected { chain_id: String },
    UserRejected,
    Internal(String),
}

impl RouterError {
    pub fn into_json_error(self) -> JsonRpcError {
        match self {
            RouterError::InvalidRequest(message) => {
                json_error(BrokerRpcErrorCode::InvalidRequest, message, None)
            }
            RouterError::InvalidParams(message) => {
                json_error(BrokerRpcErrorCode::InvalidParams, message, None)
            }
            RouterError::Unsupported(method) => json_error(
                BrokerRpcErrorCode::UnsupportedMethod,
                format!("method `{method}` is not supported"),
                Some(json!({ "method": method })),
            ),
            RouterError::ChainDisconnected { chain_id } => json_error(
                BrokerRpcErrorCode::ChainDisconnected,
                "requested chain is not available",
                Some(json!({ "chainId": chain_id })),
            ),
            RouterError::UserRejected => json_error(
                BrokerRpcErrorCode::UserRejected,
                "user rejected the request",
                None,
            ),
            RouterError::Internal(_) => json_error(
                BrokerRpcErrorCode::InternalError,
                "internal broker error",
                None,
            ),
        }
    }
}

fn json_error(
    code: BrokerRpcErrorCode,
    message: impl Into<String>,
    details: Option<Value>,
) -> JsonRpcError {
    let payload = code.data_payload(details);
    JsonRpcError::new(code.as_i32(), message.into(), Some(payload))
}
