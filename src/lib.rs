use std::sync::Arc;

pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod mcp;
pub mod transport;

use domain::registry::ToolRegistry;
use errors::TransportError;
use mcp::session::{Session, SessionSummary};
use transport::StdioTransport;

/// Shared, read-only server state handed to every session.
#[derive(Debug, Clone)]
pub struct AppState {
    pub server_name: Arc<str>,
    pub server_version: Arc<str>,
    pub registry: Arc<ToolRegistry>,
}

impl AppState {
    pub fn new(
        server_name: impl Into<String>,
        server_version: impl Into<String>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            server_name: Arc::<str>::from(server_name.into()),
            server_version: Arc::<str>::from(server_version.into()),
            registry,
        }
    }
}

/// Serves a single session over stdin/stdout until stdin closes.
pub async fn serve_stdio(
    state: AppState,
    max_frame_bytes: usize,
) -> Result<SessionSummary, TransportError> {
    let mut session = Session::new(state, StdioTransport::stdio(max_frame_bytes));
    session.run().await
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        pin::Pin,
        sync::Arc,
        task::{Context, Poll},
    };

    use serde_json::{json, Map, Value};
    use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, ReadBuf};

    use crate::domain::{builtins::register_builtin_tools, registry::ToolRegistry};
    use crate::errors::ToolError;
    use crate::mcp::session::{Session, SessionState};
    use crate::transport::LineTransport;

    use super::*;

    fn registry() -> ToolRegistry {
        let mut builder = ToolRegistry::builder();
        register_builtin_tools(&mut builder).expect("builtin tools");
        builder
            .register_fn(
                "fail",
                "Always fails",
                json!({ "type": "object" }),
                |_arguments: Map<String, Value>| {
                    Err(ToolError::execution("backend secret leaked in message"))
                },
            )
            .expect("register fail");
        builder
            .register_fn(
                "panic",
                "Always panics",
                json!({ "type": "object" }),
                |_arguments: Map<String, Value>| -> Result<Value, ToolError> {
                    panic!("handler blew up")
                },
            )
            .expect("register panic");
        builder
            .register_fn(
                "search",
                "Needs a query",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "limit": { "type": "integer" }
                    },
                    "required": ["query"]
                }),
                |arguments: Map<String, Value>| Ok(json!({ "matched": arguments["query"] })),
            )
            .expect("register search");
        builder.build()
    }

    fn state() -> AppState {
        AppState::new("memoh-mcp", "0.0.0-test", Arc::new(registry()))
    }

    async fn run_lines(lines: &[Value]) -> Vec<Value> {
        let input = lines
            .iter()
            .map(|line| format!("{line}\n"))
            .collect::<String>();
        run_raw(&input).await
    }

    async fn run_raw(input: &str) -> Vec<Value> {
        let mut session = Session::new(
            state(),
            LineTransport::new(input.as_bytes(), Vec::new(), 64 * 1024),
        );
        session.run().await.expect("session ends cleanly");
        assert_eq!(session.state(), SessionState::Closed);

        let (_, output) = session.into_transport().into_parts();
        String::from_utf8(output)
            .expect("utf-8 output")
            .lines()
            .map(|line| serde_json::from_str(line).expect("valid json response"))
            .collect()
    }

    fn call(id: i64, name: &str, arguments: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        })
    }

    #[tokio::test]
    async fn echo_then_missing_tool_keeps_session_open() {
        let responses = run_lines(&[
            call(1, "echo", json!({ "x": 1 })),
            call(2, "missing", json!({})),
            call(3, "echo", json!({ "after": true })),
        ])
        .await;

        assert_eq!(responses.len(), 3);

        assert_eq!(responses[0]["jsonrpc"], "2.0");
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["structuredContent"], json!({ "x": 1 }));

        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["error"]["code"], -32601);
        assert_eq!(responses[1]["error"]["data"]["code"], "tool_not_found");
        assert_eq!(responses[1]["error"]["data"]["details"]["name"], "missing");

        assert_eq!(responses[2]["id"], 3);
        assert_eq!(
            responses[2]["result"]["structuredContent"],
            json!({ "after": true })
        );
    }

    #[tokio::test]
    async fn responses_follow_request_order() {
        let requests = (1..=25)
            .map(|id| call(id, "echo", json!({ "seq": id })))
            .collect::<Vec<_>>();

        let responses = run_lines(&requests).await;

        assert_eq!(responses.len(), requests.len());
        for (position, response) in responses.iter().enumerate() {
            let expected = position as i64 + 1;
            assert_eq!(response["id"], expected);
            assert_eq!(response["result"]["structuredContent"]["seq"], expected);
        }
    }

    #[tokio::test]
    async fn failing_handler_yields_one_generic_error() {
        let responses = run_lines(&[
            call(10, "fail", json!({})),
            call(11, "echo", json!({ "ok": 1 })),
        ])
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 10);
        assert_eq!(responses[0]["error"]["code"], -32603);
        assert_eq!(
            responses[0]["error"]["data"]["code"],
            "tool_execution_failed"
        );
        assert!(!responses[0].to_string().contains("secret"));

        assert_eq!(responses[1]["id"], 11);
        assert_eq!(responses[1]["result"]["structuredContent"]["ok"], 1);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_end_session() {
        let responses = run_lines(&[
            call(20, "panic", json!({})),
            call(21, "echo", json!({ "still": "alive" })),
        ])
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 20);
        assert_eq!(
            responses[0]["error"]["data"]["code"],
            "tool_execution_failed"
        );
        assert_eq!(responses[1]["id"], 21);
        assert_eq!(
            responses[1]["result"]["structuredContent"]["still"],
            "alive"
        );
    }

    #[tokio::test]
    async fn malformed_line_yields_parse_error_and_continues() {
        let input = format!("{{\"jsonrpc\":\n{}\n", call(30, "echo", json!({ "v": 1 })));
        let responses = run_raw(&input).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert!(responses[0]["id"].is_null());
        assert_eq!(responses[1]["id"], 30);
    }

    #[tokio::test]
    async fn arguments_are_checked_against_schema() {
        let responses = run_lines(&[
            call(40, "search", json!({ "limit": 5 })),
            call(41, "search", json!({ "query": "rust", "limit": "five" })),
            call(42, "search", json!({ "query": "rust" })),
        ])
        .await;

        assert_eq!(responses[0]["error"]["code"], -32602);
        assert_eq!(responses[0]["error"]["data"]["code"], "invalid_arguments");
        assert_eq!(responses[1]["error"]["code"], -32602);
        assert_eq!(responses[2]["result"]["structuredContent"]["matched"], "rust");
    }

    #[tokio::test]
    async fn non_object_arguments_are_invalid_params() {
        let responses = run_lines(&[json!({
            "jsonrpc": "2.0",
            "id": 50,
            "method": "tools/call",
            "params": { "name": "echo", "arguments": "not-an-object" }
        })])
        .await;

        assert_eq!(responses[0]["id"], 50);
        assert_eq!(responses[0]["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn initialize_list_and_ping_handshake() {
        let responses = run_lines(&[
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "clientInfo": { "name": "test-client", "version": "1.0.0" },
                    "capabilities": {}
                }
            }),
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
            json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list", "params": {} }),
            json!({ "jsonrpc": "2.0", "id": 3, "method": "ping" }),
        ])
        .await;

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(responses[0]["result"]["serverInfo"]["name"], "memoh-mcp");

        let tools = responses[1]["result"]["tools"]
            .as_array()
            .expect("tools array");
        let names = tools
            .iter()
            .filter_map(|tool| tool["name"].as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["echo", "current_time", "fail", "panic", "search"]);
        assert_eq!(tools[4]["inputSchema"]["required"], json!(["query"]));

        assert_eq!(responses[2]["id"], 3);
        assert_eq!(responses[2]["result"], json!({}));
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let responses =
            run_lines(&[json!({ "jsonrpc": "2.0", "id": 1, "method": "unknown" })]).await;

        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["error"]["code"], -32601);
        assert_eq!(responses[0]["error"]["message"], "Method not found");
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn write_failure_closes_session_with_io_error() {
        let input = format!(
            "{}\n{}\n",
            call(1, "echo", json!({})),
            call(2, "echo", json!({}))
        );
        let mut session = Session::new(
            state(),
            LineTransport::new(input.as_bytes(), BrokenPipe, 1024),
        );

        let error = session.run().await.expect_err("write must fail");
        assert!(matches!(error, TransportError::Io(_)));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.summary().frames_received, 1);
        assert_eq!(session.summary().responses_sent, 0);
    }

    struct ResetInput;

    impl AsyncRead for ResetInput {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::ConnectionReset)))
        }
    }

    impl AsyncBufRead for ResetInput {
        fn poll_fill_buf(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::ConnectionReset)))
        }

        fn consume(self: Pin<&mut Self>, _amt: usize) {}
    }

    #[tokio::test]
    async fn read_failure_closes_session_with_io_error() {
        let mut session = Session::new(state(), LineTransport::new(ResetInput, Vec::new(), 1024));

        let error = session.run().await.expect_err("read must fail");
        assert!(
            matches!(&error, TransportError::Io(err) if err.kind() == io::ErrorKind::ConnectionReset)
        );
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.summary(), SessionSummary::default());

        let (_, output) = session.into_transport().into_parts();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn current_time_accepts_null_precision() {
        let responses = run_lines(&[call(1, "current_time", json!({ "precision": null }))]).await;

        assert_eq!(responses[0]["id"], 1);
        assert!(responses[0]["error"].is_null());
        assert!(responses[0]["result"]["structuredContent"]["now_utc"].is_string());
    }

    #[tokio::test]
    async fn request_with_oversized_integer_id_is_rejected_not_dropped() {
        let responses = run_raw(concat!(
            r#"{"jsonrpc":"2.0","id":18446744073709551615,"method":"ping"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], -32600);
        assert!(responses[0]["id"].is_null());
        assert_eq!(responses[1]["id"], 2);
    }
}
