//! Per-session dispatch loop
//!
//! A session reads one frame at a time, routes it, runs at most one tool handler,
//! writes the response, and only then reads the next frame. Responses therefore
//! leave in the order requests arrived.

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::errors::TransportError;
use crate::mcp::rpc::{json_rpc_error, INVALID_REQUEST, PARSE_ERROR};
use crate::mcp::server::{route_json_rpc_value, Dispatch};
use crate::transport::LineTransport;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingRequest,
    Resolving,
    Invoking,
    Responding,
    Closed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_received: u64,
    pub responses_sent: u64,
    pub framing_errors: u64,
    pub tool_invocations: u64,
}

pub struct Session<R, W> {
    app: AppState,
    transport: LineTransport<R, W>,
    state: SessionState,
    summary: SessionSummary,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(app: AppState, transport: LineTransport<R, W>) -> Self {
        Self {
            app,
            transport,
            state: SessionState::AwaitingRequest,
            summary: SessionSummary::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    pub fn into_transport(self) -> LineTransport<R, W> {
        self.transport
    }

    /// Serves requests until the input closes (`Ok`) or the transport fails (`Err`).
    /// Either way the session ends in [`SessionState::Closed`].
    pub async fn run(&mut self) -> Result<SessionSummary, TransportError> {
        info!(tools = self.app.registry.len(), "session started");

        loop {
            self.transition(SessionState::AwaitingRequest);

            let frame = match self.transport.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.transition(SessionState::Closed);
                    info!(
                        frames_received = self.summary.frames_received,
                        responses_sent = self.summary.responses_sent,
                        framing_errors = self.summary.framing_errors,
                        "session closed by peer"
                    );
                    return Ok(self.summary);
                }
                Err(TransportError::Framing { message }) => {
                    self.summary.framing_errors += 1;
                    warn!(error = %message, "discarding malformed frame");
                    self.respond(json_rpc_error(None, PARSE_ERROR, "Parse error"))
                        .await?;
                    continue;
                }
                Err(err) => {
                    self.transition(SessionState::Closed);
                    error!(error = %err, "failed to read request; closing session");
                    return Err(err);
                }
            };

            self.summary.frames_received += 1;
            if let Some(response) = self.serve_payload(frame).await {
                self.respond(response).await?;
            }
        }
    }

    async fn serve_payload(&mut self, payload: Value) -> Option<Value> {
        let Value::Array(batch) = payload else {
            return self.serve_message(payload).await;
        };

        if batch.is_empty() {
            return Some(json_rpc_error(None, INVALID_REQUEST, "Invalid Request"));
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = self.serve_message(item).await {
                responses.push(response);
            }
        }

        (!responses.is_empty()).then_some(Value::Array(responses))
    }

    async fn serve_message(&mut self, message: Value) -> Option<Value> {
        self.transition(SessionState::Resolving);

        let app = self.app.clone();
        match route_json_rpc_value(&app, message) {
            Dispatch::Respond(response) => Some(response),
            Dispatch::Silent => None,
            Dispatch::Invoke(call) => {
                self.transition(SessionState::Invoking);
                self.summary.tool_invocations += 1;
                call.invoke().await
            }
        }
    }

    async fn respond(&mut self, response: Value) -> Result<(), TransportError> {
        self.transition(SessionState::Responding);

        if let Err(err) = self.transport.write_frame(&response).await {
            self.transition(SessionState::Closed);
            error!(error = %err, "failed to write response; closing session");
            return Err(err);
        }

        self.summary.responses_sent += 1;
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "session state");
            self.state = next;
        }
    }
}
