//! Tool registry
//!
//! Tools are registered on a [`ToolRegistryBuilder`] during startup. `build()` freezes
//! the set into a [`ToolRegistry`], which is read-only and can be shared across tasks.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::domain::schema::{validate_tool_name, InputSchema};
use crate::errors::{RegistryError, ToolError};

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Adapts a plain synchronous function into a [`ToolHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Result<Value, ToolError> + Send + Sync,
{
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        (self.0)(arguments)
    }
}

#[derive(Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn validate_arguments(&self, arguments: &Map<String, Value>) -> Result<(), ToolError> {
        self.input_schema.validate(arguments)
    }

    /// Entry used by `tools/list`.
    pub fn to_listing(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": Value::Object(self.input_schema.document().clone()),
        })
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<&mut Self, RegistryError> {
        let name = name.into();
        validate_tool_name(&name)?;

        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateName { name });
        }

        let input_schema = InputSchema::compile(&name, input_schema)?;

        self.index.insert(name.clone(), self.tools.len());
        self.tools.push(ToolDescriptor {
            name,
            description: description.into(),
            input_schema,
            handler,
        });
        Ok(self)
    }

    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Result<&mut Self, RegistryError>
    where
        F: Fn(Map<String, Value>) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        self.register(name, description, input_schema, Arc::new(FnHandler(handler)))
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            tools: self.tools,
            index: self.index,
        }
    }
}

#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::new()
    }

    pub fn resolve(&self, name: &str) -> Result<&ToolDescriptor, ToolError> {
        self.index
            .get(name)
            .map(|position| &self.tools[*position])
            .ok_or_else(|| ToolError::unknown_tool(name))
    }

    /// Registered tools in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
