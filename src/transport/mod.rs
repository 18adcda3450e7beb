//! Byte-stream transport for the Model Context Protocol
//!
//! Frames are newline-delimited JSON values; stdin/stdout in production.

pub mod line;

pub use line::{LineTransport, StdioTransport};
