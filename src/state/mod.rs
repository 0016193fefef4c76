//! The four state entities: [`Task`] → [`Stage`] → [`Step`], plus [`AgentState`].
//!
//! See spec.md §3 for the full data model and ownership rules: the system
//! owns the task and agent registries; a task exclusively owns its stages and
//! shared message log; an agent exclusively owns its step queue, LLM client,
//! and dialogue context. Agents reference each other only by id — mutation
//! always goes through the synchronizer ([`crate::sync`]) or the dispatcher
//! ([`crate::dispatch`]), never direct pointer traversal.

pub mod agent_state;
pub mod agent_step;
pub mod ids;
pub mod message;
pub mod persistent_memory;
pub mod stage;
pub mod step;
pub mod task;

pub use agent_state::{AgentKind, AgentState, ApiType, DialogueContext, LlmConfig, PrivateMessage, Turn, WorkingState};
pub use agent_step::{AgentStep, StepFilter, SHUTDOWN_SENTINEL};
pub use ids::{AgentId, StageId, StepId, TaskId};
pub use message::{Message, StageRelative, WaitingId};
pub use persistent_memory::{contains_invalid_heading, sanitize_fragment, PersistentMemory};
pub use stage::{FailurePolicy, ParticipationState, Stage, StageState};
pub use step::{ExecuteResult, Step, StepState, StepType};
pub use task::{RetentionPolicy, SharedMessage, Task, TaskState};
