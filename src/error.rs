//! Crate-wide error aggregate plus the per-component error types it wraps.
//!
//! Each subsystem (router, synchronizer, dispatcher, tool client, executors,
//! config parsing) defines its own `thiserror`-derived error enum so callers
//! inside that subsystem can match on precise variants; [`AllenError`]
//! aggregates them for call sites that only need to log or surface a single
//! failure (e.g. system startup).

use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::DispatchError;
use crate::executor::{ExecutorError, RouterError};
use crate::sync::SyncError;
use crate::toolclient::ToolClientError;

/// Top-level error returned by system-container-level operations.
#[derive(Debug, Error)]
pub enum AllenError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    ToolClient(#[from] ToolClientError),
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("unknown task: {0}")]
    UnknownTask(String),
}
