//! [`ServerSession`]: one persistent MCP stdio session to a tool server.
//!
//! Grounded directly on `loom::tool_source::mcp::session::McpSession`: same
//! stdio transport, same initialize handshake, same blocking
//! `send_request`/`wait_for_result` pair. The MCP protocol itself is
//! synchronous-over-a-child-process, so this type stays synchronous too;
//! [`super::ToolClient`] is what bridges it onto the async event loop via
//! `spawn_blocking` (spec.md §4.6).

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use mcp_client::stdio::{JsonRpcMessage, StdioClientTransport, StdioClientTransportError, StdioServerParameters, StdioStream};
use mcp_core::{NotificationMessage, RequestMessage, ResultMessage};
use serde_json::{json, Value};

const PROTOCOL_VERSION: &str = "2025-11-25";
const INITIALIZE_REQUEST_ID: &str = "allen-mcp-initialize";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("transport: {0}")]
    Transport(#[from] StdioClientTransportError),
    #[error("initialize: {0}")]
    Initialize(String),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("remote error: {0}")]
    Remote(String),
}

/// A live stdio session to one tool server. One child process, one
/// connection; same-server calls are naturally serialized by requiring `&mut
/// self` (the caller holds the session behind its own lock).
pub struct ServerSession {
    transport: StdioClientTransport,
    receiver: mpsc::Receiver<JsonRpcMessage>,
    next_id: u64,
}

impl ServerSession {
    pub fn open(command: &str, args: Vec<String>, env: Option<std::collections::HashMap<String, String>>) -> Result<Self, SessionError> {
        let (tx, rx) = mpsc::channel();

        let mut params = StdioServerParameters::new(command).args(args).stderr(StdioStream::Null);
        if let Some(env) = env {
            params = params.env(env);
        }

        let mut transport = StdioClientTransport::new(params);
        transport.on_message(move |msg| {
            let _ = tx.send(msg);
        });
        transport.on_error(|e| {
            tracing::warn!(error = %e, "tool/session transport error");
        });
        transport.start()?;

        let mut session = Self {
            transport,
            receiver: rx,
            next_id: 0,
        };
        session.initialize()?;
        Ok(session)
    }

    fn initialize(&mut self) -> Result<(), SessionError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "clientInfo": { "name": "allen", "version": env!("CARGO_PKG_VERSION") }
        });
        self.send_request(INITIALIZE_REQUEST_ID, "initialize", params)?;
        match self.wait_for_result(INITIALIZE_REQUEST_ID, Duration::from_secs(20))? {
            result if result.error.is_some() => Err(SessionError::Initialize(
                result.error.map(|e| e.message).unwrap_or_else(|| "unknown".into()),
            )),
            _ => {
                let notification = JsonRpcMessage::Notification(NotificationMessage::new("notifications/initialized", Some(json!({}))));
                self.transport.send(&notification)?;
                Ok(())
            }
        }
    }

    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("allen-{}", self.next_id)
    }

    fn send_request(&mut self, id: &str, method: &str, params: Value) -> Result<(), SessionError> {
        let request = RequestMessage::new(id, method, params);
        self.transport.send(&JsonRpcMessage::Request(request)).map_err(SessionError::from)
    }

    /// Blocks until a result matching `request_id` arrives, or `timeout`
    /// elapses. Answers `roots/list` requests with an empty list inline —
    /// tools-only usage needs nothing else from that capability.
    fn wait_for_result(&mut self, request_id: &str, timeout: Duration) -> Result<ResultMessage, SessionError> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now()).min(Duration::from_secs(1));
            match self.receiver.recv_timeout(remaining) {
                Ok(JsonRpcMessage::Result(msg)) if msg.id.as_str() == Some(request_id) => return Ok(msg),
                Ok(JsonRpcMessage::Request(req)) if req.method == "roots/list" => {
                    let result = ResultMessage::success(req.id.clone(), json!({ "roots": [] }));
                    self.transport.send(&JsonRpcMessage::Result(result))?;
                }
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Err(SessionError::Timeout(request_id.to_string()))
    }

    /// `tools/list` — returns the raw JSON result value; [`super::ToolClient`]
    /// parses it into [`super::ToolCapability`]s and caches the outcome.
    pub fn list_tools(&mut self, timeout: Duration) -> Result<Value, SessionError> {
        let id = self.fresh_id();
        self.send_request(&id, "tools/list", json!({}))?;
        let result = self.wait_for_result(&id, timeout)?;
        result.error.map_or_else(|| Ok(result.result.unwrap_or(Value::Null)), |e| Err(SessionError::Remote(e.message)))
    }

    /// `tools/call` — invokes `capability_name` with `arguments`.
    pub fn call_tool(&mut self, capability_name: &str, arguments: Value, timeout: Duration) -> Result<Value, SessionError> {
        let id = self.fresh_id();
        let params = json!({ "name": capability_name, "arguments": arguments });
        self.send_request(&id, "tools/call", params)?;
        let result = self.wait_for_result(&id, timeout)?;
        result.error.map_or_else(|| Ok(result.result.unwrap_or(Value::Null)), |e| Err(SessionError::Remote(e.message)))
    }
}
