//! Tools registered by the `memoh-mcp` binary

use chrono::{SecondsFormat, Utc};
use rust_mcp_sdk::macros;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::registry::{ToolRegistry, ToolRegistryBuilder};
use crate::errors::{RegistryError, ToolError};

pub const ECHO_TOOL: &str = "echo";

#[macros::mcp_tool(
    name = "current_time",
    description = "Return the current UTC time as RFC 3339 and Unix milliseconds"
)]
#[derive(Debug, Deserialize, Serialize, macros::JsonSchema)]
pub struct CurrentTimeTool {
    /// Fractional precision of the RFC 3339 timestamp: "seconds" or "millis" (default).
    pub precision: Option<String>,
}

pub fn build_registry() -> Result<ToolRegistry, RegistryError> {
    let mut builder = ToolRegistry::builder();
    register_builtin_tools(&mut builder)?;
    Ok(builder.build())
}

pub fn register_builtin_tools(builder: &mut ToolRegistryBuilder) -> Result<(), RegistryError> {
    builder.register_fn(
        ECHO_TOOL,
        "Return the call arguments unchanged",
        json!({
            "type": "object",
            "additionalProperties": true
        }),
        echo,
    )?;

    let (name, description, input_schema) = macro_tool_parts(CurrentTimeTool::tool())?;
    builder.register_fn(name, description, input_schema, current_time)?;

    Ok(())
}

fn macro_tool_parts(
    tool: rust_mcp_sdk::schema::Tool,
) -> Result<(String, String, Value), RegistryError> {
    let name = tool.name.clone();
    let description = tool.description.clone().unwrap_or_default();
    let mut input_schema = serde_json::to_value(&tool)
        .ok()
        .and_then(|mut value| value.get_mut("inputSchema").map(Value::take))
        .ok_or_else(|| RegistryError::InvalidSchema {
            name: name.clone(),
            reason: "generated tool definition has no inputSchema".to_string(),
        })?;
    nullable_to_type_union(&mut input_schema);

    Ok((name, description, input_schema))
}

/// Rewrites the OpenAPI-style `"nullable": true` emitted for `Option` fields into a
/// JSON Schema type union, so `null` passes argument validation.
fn nullable_to_type_union(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            if map.get("nullable") == Some(&Value::Bool(true)) {
                map.remove("nullable");
                let widened = match map.remove("type") {
                    Some(Value::String(single)) => Some(json!([single, "null"])),
                    Some(Value::Array(mut many)) => {
                        if !many.contains(&json!("null")) {
                            many.push(json!("null"));
                        }
                        Some(Value::Array(many))
                    }
                    other => other,
                };
                if let Some(widened) = widened {
                    map.insert("type".to_string(), widened);
                }
            }
            map.values_mut().for_each(nullable_to_type_union);
        }
        Value::Array(items) => items.iter_mut().for_each(nullable_to_type_union),
        _ => {}
    }
}

pub fn echo(arguments: Map<String, Value>) -> Result<Value, ToolError> {
    Ok(Value::Object(arguments))
}

pub fn current_time(arguments: Map<String, Value>) -> Result<Value, ToolError> {
    let params: CurrentTimeTool = serde_json::from_value(Value::Object(arguments))
        .map_err(|err| ToolError::invalid_arguments(err.to_string()))?;

    let precision = match params
        .precision
        .as_deref()
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        None | Some("millis") => SecondsFormat::Millis,
        Some("seconds") => SecondsFormat::Secs,
        _ => {
            return Err(ToolError::invalid_arguments(
                "precision must be one of: seconds, millis",
            ))
        }
    };

    let now = Utc::now();
    Ok(json!({
        "now_utc": now.to_rfc3339_opts(precision, true),
        "unix_ms": now.timestamp_millis(),
    }))
}
