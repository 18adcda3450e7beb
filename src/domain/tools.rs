//! `tools/list` and `tools/call` handling on top of the [`ToolRegistry`]
//!
//! A call is handled in two steps so the session can observe them separately:
//! [`prepare_tool_call`] resolves the tool and checks its arguments, and
//! [`PendingCall::invoke`] runs the handler and renders the response.

use std::sync::Arc;

use rust_mcp_sdk::schema::{CallToolRequestParams, CallToolResult, ContentBlock, TextContent};
use serde_json::{json, Map, Value};
use tracing::error;

use crate::domain::registry::{ToolDescriptor, ToolRegistry};
use crate::errors::ToolError;
use crate::mcp::rpc::{json_rpc_error, json_rpc_result, tool_error_to_json_rpc, INVALID_PARAMS};

pub fn build_tools_list(registry: &ToolRegistry) -> Value {
    json!({
        "tools": registry
            .descriptors()
            .map(ToolDescriptor::to_listing)
            .collect::<Vec<_>>(),
    })
}

/// A resolved tool call with validated arguments, ready to run.
#[derive(Debug)]
pub struct PendingCall<'a> {
    pub id: Option<Value>,
    pub tool: &'a ToolDescriptor,
    pub arguments: Map<String, Value>,
}

pub fn prepare_tool_call<'a>(
    registry: &'a ToolRegistry,
    id: Option<Value>,
    params: Option<Value>,
) -> Result<PendingCall<'a>, Value> {
    let Some(raw_params) = params else {
        return Err(json_rpc_error(id, INVALID_PARAMS, "Invalid params"));
    };

    let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
        Ok(value) => value,
        Err(_) => return Err(json_rpc_error(id, INVALID_PARAMS, "Invalid params")),
    };

    let tool = match registry.resolve(&tool_call.name) {
        Ok(tool) => tool,
        Err(err) => return Err(tool_error_to_json_rpc(id, err)),
    };

    let arguments = tool_call.arguments.unwrap_or_default();
    if let Err(err) = tool.validate_arguments(&arguments) {
        return Err(tool_error_to_json_rpc(id, err));
    }

    Ok(PendingCall {
        id,
        tool,
        arguments,
    })
}

impl PendingCall<'_> {
    /// Runs the handler to completion. Errors and panics raised by the handler are
    /// turned into an error response here and never escape to the caller.
    pub async fn invoke(self) -> Value {
        let PendingCall {
            id,
            tool,
            arguments,
        } = self;

        let handler = Arc::clone(&tool.handler);
        let outcome = match tokio::spawn(async move { handler.call(arguments).await }).await {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                Err(ToolError::execution("tool handler panicked"))
            }
            Err(join_error) => Err(ToolError::execution(join_error.to_string())),
        };

        match outcome {
            Ok(output) => json_rpc_result(id, call_tool_result(output)),
            Err(err) => {
                if let ToolError::Execution { message } = &err {
                    error!(tool = %tool.name, error = %message, "tool handler failed");
                }
                tool_error_to_json_rpc(id, err)
            }
        }
    }
}

pub fn call_tool_result(output: Value) -> Value {
    let text = output.to_string();
    let structured_content = match output {
        Value::Object(map) => map,
        other => Map::from_iter([("result".to_string(), other)]),
    };

    serde_json::to_value(CallToolResult {
        content: vec![ContentBlock::from(TextContent::new(text, None, None))],
        is_error: None,
        meta: None,
        structured_content: Some(structured_content),
    })
    .expect("tool call result serialization")
}
