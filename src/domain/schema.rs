//! Tool name and JSON Schema checks shared by the registry and the tool call path

use std::{
    fmt,
    sync::{Arc, OnceLock},
};

use jsonschema::{paths::JSONPointer, JSONSchema};
use regex::Regex;
use serde_json::{Map, Value};

use crate::errors::{RegistryError, ToolError};

pub const MAX_TOOL_NAME_LEN: usize = 64;

fn tool_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("tool name pattern"))
}

pub fn validate_tool_name(name: &str) -> Result<(), RegistryError> {
    let invalid = |reason| RegistryError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(invalid("name must be at most 64 characters"));
    }
    if !tool_name_pattern().is_match(name) {
        return Err(invalid(
            "name must contain only alphanumeric characters, dashes, underscores, and dots",
        ));
    }

    Ok(())
}

/// A tool's input schema together with its compiled validator.
#[derive(Clone)]
pub struct InputSchema {
    document: Map<String, Value>,
    validator: Arc<JSONSchema>,
}

impl InputSchema {
    /// Checks that `schema` describes an object-shaped argument list and compiles it.
    pub fn compile(name: &str, schema: Value) -> Result<Self, RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidSchema {
            name: name.to_string(),
            reason,
        };

        let Value::Object(document) = schema else {
            return Err(invalid("schema must be a JSON object".to_string()));
        };

        if document.get("type").and_then(Value::as_str) != Some("object") {
            return Err(invalid("schema type must be \"object\"".to_string()));
        }

        let properties = match document.get("properties") {
            None => None,
            Some(Value::Object(properties)) => Some(properties),
            Some(_) => return Err(invalid("properties must be an object".to_string())),
        };

        if let Some(Value::Array(required)) = document.get("required") {
            for field in required.iter().filter_map(Value::as_str) {
                if !properties.is_some_and(|properties| properties.contains_key(field)) {
                    return Err(invalid(format!(
                        "required property `{field}` is not declared"
                    )));
                }
            }
        }

        let validator = JSONSchema::compile(&Value::Object(document.clone()))
            .map_err(|err| invalid(format!("{}: {err}", pointer_or_root(&err.schema_path))))?;

        Ok(Self {
            document,
            validator: Arc::new(validator),
        })
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Checks call arguments against the compiled schema.
    pub fn validate(&self, arguments: &Map<String, Value>) -> Result<(), ToolError> {
        let instance = Value::Object(arguments.clone());
        let result = self.validator.validate(&instance);
        let Err(errors) = result else {
            return Ok(());
        };

        let message = errors
            .map(|err| format!("{}: {err}", pointer_or_root(&err.instance_path)))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ToolError::invalid_arguments(message))
    }
}

impl fmt::Debug for InputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InputSchema").field(&self.document).finish()
    }
}

fn pointer_or_root(pointer: &JSONPointer) -> String {
    let rendered = pointer.to_string();
    if rendered.is_empty() {
        "/".to_string()
    } else {
        rendered
    }
}
