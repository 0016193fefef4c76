//! The Tool Client Multiplexer (spec.md §4.6): one process-wide client
//! holding persistent sessions to many external tool servers, exposing
//! synchronous-looking calls backed by a `spawn_blocking` event loop.

pub mod session;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::McpServerSpec;
use session::{ServerSession, SessionError};

#[derive(Debug, Error)]
pub enum ToolClientError {
    #[error("tool/session-open: {0}")]
    SessionOpen(String),
    #[error("tool/invoke: {0}")]
    Invoke(String),
    #[error("tool/timeout: {0}")]
    Timeout(String),
    #[error("tool server '{0}' is marked unavailable")]
    Unavailable(String),
    #[error("unknown tool server '{0}'")]
    UnknownServer(String),
    #[error("tool session worker panicked")]
    WorkerPanicked,
}

impl From<SessionError> for ToolClientError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Timeout(what) => ToolClientError::Timeout(what),
            other => ToolClientError::Invoke(other.to_string()),
        }
    }
}

/// A tool server's advertised capability (spec.md §4.6 `describe`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCapability {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

enum ServerState {
    Session(Arc<AsyncMutex<ServerSession>>),
    /// Persistent per spec.md §4.6: a session that failed to open never
    /// retries automatically; agents with this tool in their permissions
    /// simply stop advertising it.
    Unavailable,
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The single process-wide tool client. Cloneable: every clone shares the
/// same session table and startup config via `Arc`.
#[derive(Clone)]
pub struct ToolClient {
    server_config: Arc<HashMap<String, McpServerSpec>>,
    server_sessions: Arc<DashMap<String, ServerState>>,
    server_descriptions: Arc<DashMap<String, Vec<ToolCapability>>>,
}

impl ToolClient {
    pub fn new(server_config: HashMap<String, McpServerSpec>) -> Self {
        Self {
            server_config: Arc::new(server_config),
            server_sessions: Arc::new(DashMap::new()),
            server_descriptions: Arc::new(DashMap::new()),
        }
    }

    /// Opens (or returns the existing) session for `server_name`. Session
    /// creation failure permanently marks the server `Unavailable`
    /// (spec.md §4.6 "Failure modes").
    pub async fn connect(&self, server_name: &str) -> Result<Arc<AsyncMutex<ServerSession>>, ToolClientError> {
        if let Some(state) = self.server_sessions.get(server_name) {
            return match &*state {
                ServerState::Session(session) => Ok(session.clone()),
                ServerState::Unavailable => Err(ToolClientError::Unavailable(server_name.to_string())),
            };
        }

        let spec = self.server_config.get(server_name).ok_or_else(|| ToolClientError::UnknownServer(server_name.to_string()))?;
        let command = spec.command.clone();
        let args = spec.args.clone();
        let env = spec.env.clone();

        let opened = tokio::task::spawn_blocking(move || ServerSession::open(&command, args, env))
            .await
            .map_err(|_| ToolClientError::WorkerPanicked)?;

        match opened {
            Ok(session) => {
                let session = Arc::new(AsyncMutex::new(session));
                self.server_sessions.insert(server_name.to_string(), ServerState::Session(session.clone()));
                Ok(session)
            }
            Err(err) => {
                self.server_sessions.insert(server_name.to_string(), ServerState::Unavailable);
                Err(ToolClientError::SessionOpen(err.to_string()))
            }
        }
    }

    /// Returns the cached capability list, fetching and caching it on first
    /// use (spec.md §4.6 "fetched once per session; re-fetched on session
    /// reopen").
    pub async fn describe(&self, server_name: &str) -> Result<Vec<ToolCapability>, ToolClientError> {
        if let Some(cached) = self.server_descriptions.get(server_name) {
            return Ok(cached.clone());
        }
        let session = self.connect(server_name).await?;
        let raw = {
            let session = session.clone();
            tokio::task::spawn_blocking(move || {
                let mut session = session.blocking_lock();
                session.list_tools(DEFAULT_TIMEOUT)
            })
            .await
            .map_err(|_| ToolClientError::WorkerPanicked)??
        };
        let capabilities: Vec<ToolCapability> = raw
            .get("tools")
            .and_then(|t| serde_json::from_value(t.clone()).ok())
            .unwrap_or_default();
        self.server_descriptions.insert(server_name.to_string(), capabilities.clone());
        Ok(capabilities)
    }

    /// Invokes one capability with a per-call timeout override, defaulting
    /// to 30s (spec.md §5 "Cancellation & timeouts").
    pub async fn invoke_with_timeout(
        &self,
        server_name: &str,
        capability_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Value, ToolClientError> {
        let session = self.connect(server_name).await?;
        let capability_name = capability_name.to_string();
        tokio::task::spawn_blocking(move || {
            let mut session = session.blocking_lock();
            session.call_tool(&capability_name, arguments, timeout)
        })
        .await
        .map_err(|_| ToolClientError::WorkerPanicked)?
        .map_err(ToolClientError::from)
    }

    pub async fn invoke(&self, server_name: &str, capability_name: &str, arguments: Value) -> Result<Value, ToolClientError> {
        self.invoke_with_timeout(server_name, capability_name, arguments, DEFAULT_TIMEOUT).await
    }

    /// Bulk-invoke primitive: joins on all handles concurrently (spec.md
    /// §4.6 "A single agent issuing parallel invocations within one step is
    /// supported via a bulk-invoke primitive that joins on all handles").
    /// Calls to the same server still serialize on that server's session
    /// lock; calls to different servers run concurrently.
    pub async fn invoke_many(&self, calls: Vec<(String, String, Value)>) -> Vec<Result<Value, ToolClientError>> {
        let futures = calls.into_iter().map(|(server, capability, args)| {
            let client = self.clone();
            async move { client.invoke(&server, &capability, args).await }
        });
        join_all(futures).await
    }

    pub fn is_unavailable(&self, server_name: &str) -> bool {
        matches!(self.server_sessions.get(server_name).as_deref(), Some(ServerState::Unavailable))
    }
}
