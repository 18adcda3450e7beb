use std::io;

use thiserror::Error;

/// Request-level failures that are not tied to a specific tool.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: &'static str,
    },
}

impl AppError {
    pub fn bad_request(code: &'static str, message: &'static str) -> Self {
        Self::BadRequest { code, message }
    }
}

/// Failures raised while populating the tool registry. All of them abort startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool `{name}` is already registered")]
    DuplicateName { name: String },
    #[error("invalid tool name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("invalid input schema for tool `{name}`: {reason}")]
    InvalidSchema { name: String, reason: String },
}

/// Per-request tool failures. These become error responses; the session keeps going.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{name}`")]
    UnknownTool { name: String },
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },
    #[error("tool execution failed: {message}")]
    Execution { message: String },
}

impl ToolError {
    pub fn unknown_tool(name: impl Into<String>) -> Self {
        Self::UnknownTool { name: name.into() }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The frame could not be decoded. Recoverable: the session answers with a
    /// protocol error and reads the next frame.
    #[error("malformed frame: {message}")]
    Framing { message: String },
    /// Reading or writing the underlying stream failed. Fatal to the session.
    #[error("transport i/o failure: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    pub fn framing(message: impl Into<String>) -> Self {
        Self::Framing {
            message: message.into(),
        }
    }
}
