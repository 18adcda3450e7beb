//! The central Model Context Protocol engine
//!
//! Provides the primary MCP JSON-RPC decoding, method routing, capabilities
//! negotiation (`initialize`), and tool routing against the registry.

use rust_mcp_sdk::schema::{
    CallToolRequest, Implementation, InitializeRequest, InitializeResult, JsonrpcMessage,
    JsonrpcRequest, ListToolsRequest, PingRequest, ProtocolVersion, ServerCapabilities,
    ServerCapabilitiesTools,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::domain::tools::{build_tools_list, prepare_tool_call, PendingCall};
use crate::mcp::rpc::{
    app_error_to_json_rpc, is_json_rpc_error, json_rpc_error, json_rpc_result,
    request_id_to_value, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
};
use crate::{errors::AppError, AppState};

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

/// Outcome of routing one JSON-RPC message.
#[derive(Debug)]
pub enum Dispatch<'a> {
    /// The response is already known.
    Respond(Value),
    /// Nothing is sent back (notifications).
    Silent,
    /// A tool has been resolved and must be invoked to produce the response.
    Invoke(AuditedCall<'a>),
}

/// A pending tool call together with what the audit log needs once it finishes.
#[derive(Debug)]
pub struct AuditedCall<'a> {
    pub call: PendingCall<'a>,
    method: String,
    audit_params: Value,
}

impl AuditedCall<'_> {
    /// Runs the tool. Returns `None` when the call arrived as a notification.
    pub async fn invoke(self) -> Option<Value> {
        let reply = self.call.id.is_some();
        let response = self.call.invoke().await;
        audit(&self.method, &self.audit_params, &response);
        reply.then_some(response)
    }
}

pub fn route_json_rpc_value(state: &AppState, payload: Value) -> Dispatch<'_> {
    if !payload.is_object() {
        return Dispatch::Respond(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
    }

    let request_id = payload.get("id").cloned();
    let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
        Ok(message) => message,
        Err(_) => {
            return Dispatch::Respond(json_rpc_error(
                request_id,
                INVALID_REQUEST,
                "Invalid Request",
            ))
        }
    };

    match parsed {
        JsonrpcMessage::Request(request) => {
            if let Err(error_response) = validate_request_shape(&request) {
                return Dispatch::Respond(error_response);
            }

            let request_id = request_id_to_value(request.id);
            if request.method.trim().is_empty() {
                return Dispatch::Respond(json_rpc_error(
                    Some(request_id),
                    INVALID_REQUEST,
                    "Invalid Request",
                ));
            }

            route_json_rpc_request(
                state,
                Some(request_id),
                request.method,
                request.params.map(Value::Object),
            )
        }
        // An `id` the SDK cannot hold (null, fractional, beyond i64) still marks a request.
        JsonrpcMessage::Notification(_) if request_id.is_some() => {
            Dispatch::Respond(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"))
        }
        JsonrpcMessage::Notification(notification) => {
            if notification.method.trim().is_empty() {
                return Dispatch::Silent;
            }

            match route_json_rpc_request(
                state,
                None,
                notification.method,
                notification.params.map(Value::Object),
            ) {
                // A tool call sent as a notification still runs; its result is dropped.
                Dispatch::Invoke(call) => Dispatch::Invoke(call),
                Dispatch::Respond(_) | Dispatch::Silent => Dispatch::Silent,
            }
        }
        JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => {
            Dispatch::Respond(json_rpc_error(request_id, INVALID_REQUEST, "Invalid Request"))
        }
    }
}

pub fn validate_request_shape(request: &JsonrpcRequest) -> Result<(), Value> {
    let payload = serde_json::to_value(request).expect("jsonrpc request serialization");
    let request_id = Some(request_id_to_value(request.id.clone()));

    let valid = match request.method.as_str() {
        "tools/call" => serde_json::from_value::<CallToolRequest>(payload).is_ok(),
        "tools/list" => serde_json::from_value::<ListToolsRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(json_rpc_error(request_id, INVALID_PARAMS, "Invalid params"))
    }
}

pub fn route_json_rpc_request(
    state: &AppState,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
) -> Dispatch<'_> {
    let audit_params = redact_audit_params(params.as_ref());

    let response = match method.as_str() {
        "initialize" => match negotiate_protocol_version(params.as_ref()) {
            Ok(version) => json_rpc_result(id, initialize_result(state, version)),
            Err(err) => app_error_to_json_rpc(id, err),
        },
        "ping" => json_rpc_result(id, json!({})),
        "tools/list" => json_rpc_result(id, build_tools_list(&state.registry)),
        "tools/call" => match prepare_tool_call(&state.registry, id, params) {
            Ok(call) => {
                debug!(tool = %call.tool.name, "tool resolved");
                return Dispatch::Invoke(AuditedCall {
                    call,
                    method,
                    audit_params,
                });
            }
            Err(error_response) => error_response,
        },
        _ if method.starts_with("notifications/") => {
            debug!(method = %method, "notification received");
            return Dispatch::Silent;
        }
        _ => json_rpc_error(id, METHOD_NOT_FOUND, "Method not found"),
    };

    audit(&method, &audit_params, &response);
    Dispatch::Respond(response)
}

fn initialize_result(state: &AppState, protocol_version: ProtocolVersion) -> Value {
    let initialize_result = InitializeResult {
        server_info: Implementation {
            name: state.server_name.to_string(),
            version: state.server_version.to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            resources: None,
            prompts: None,
            ..Default::default()
        },
        protocol_version: protocol_version.into(),
        instructions: None,
        meta: None,
    };

    serde_json::to_value(initialize_result).expect("initialize result serialization")
}

pub fn audit(method: &str, audit_params: &Value, response: &Value) {
    info!(
        method = %method,
        params = %audit_params,
        outcome = if is_json_rpc_error(response) { "failure" } else { "success" },
        "mcp action audited"
    );
}

pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<ProtocolVersion, AppError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            AppError::bad_request(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })?;

    if offered_version != SUPPORTED_PROTOCOL_VERSION {
        return Err(AppError::bad_request(
            "unsupported_protocol_version",
            "unsupported initialize protocolVersion",
        ));
    }

    Ok(ProtocolVersion::V2024_11_05)
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "bearer" | "api_key" | "apikey"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
