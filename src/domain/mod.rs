//! Tool registry, argument schemas and the built-in tool set
//!
//! Provides the tool-serving core exposed over the MCP protocol

pub mod builtins;
pub mod registry;
pub mod schema;
pub mod tools;
