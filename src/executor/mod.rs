//! Executor registry, Router, and the executor base contract (spec.md §4.1, §4.2).

pub mod contract;
pub mod registry;
pub mod router;

pub use contract::{error_kind, extract_persistent_memory_fragment, ExecuteOutput, Executor, SharedMessageDraft, UpdateStageAgentState};
pub use registry::{ExecutorRegistry, ExecutorRegistryBuilder};
pub use router::{Router, RouterError};

/// Placeholder error type kept for API symmetry with the other subsystems;
/// executors never raise past their own boundary (spec.md §7), so nothing in
/// this crate constructs one today. A plug-in executor author may still want
/// a named type to `impl From<...>` into for their own fallible helpers.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("{0}")]
    Other(String),
}
