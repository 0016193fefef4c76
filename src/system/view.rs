//! Read-only state views for external inspection (spec.md §6).
//!
//! The dashboard's REST/WebSocket surface itself is an external
//! collaborator (spec.md §1); this module is the "state accessors" the core
//! commits to exposing. Non-serializable runtime fields are rendered as the
//! placeholders spec.md §6 names: a bounded queue by its current size, a
//! deque by its materialized list. [`Task`]/[`Stage`]/[`Step`] are already
//! `Serialize` end to end, so they need no view wrapper of their own; only
//! [`AgentState`] holds fields (the `todo` channel, the dialogue ring
//! buffer) that aren't directly serializable.

use serde::Serialize;

use crate::state::{AgentId, AgentKind, AgentState, StepFilter, Turn, WorkingState};

/// The four state kinds spec.md §6's `GET /api/states?type=...` lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Task,
    Stage,
    Agent,
    Step,
}

/// `AgentKind` rendered for inspection: the LLM branch's dialogue ring
/// buffer is materialized into its current turn list (spec.md §6 "a deque
/// is represented by its materialized list"); the human branch collapses
/// each peer's private thread to a length rather than echoing content back
/// through a second, duplicate surface (the thread itself is already
/// reachable via `conversation_privates`, which is plain `Serialize` data).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentKindView {
    Llm {
        model: String,
        has_preamble: bool,
        dialogue_turns: Vec<Turn>,
    },
    Human {
        conversation_peer_count: usize,
    },
}

/// A serializable snapshot of one [`AgentState`] at the moment it was read.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStateView {
    pub id: AgentId,
    pub name: String,
    pub role: String,
    pub profile: String,
    pub working_state: WorkingState,
    pub kind: AgentKindView,
    pub persistent_memory: String,
    pub tool_permissions: Vec<String>,
    pub skill_permissions: Vec<String>,
    /// The `todo` queue's current depth (spec.md §6 queue-as-size placeholder).
    pub todo_queue_size: usize,
    pub step_count: usize,
}

impl AgentStateView {
    /// Builds a view from a live `AgentState`. `todo_queue_size` is read
    /// separately by the caller since it requires awaiting the queue's own
    /// lock (see [`crate::state::AgentStep::todo_len`]).
    pub fn from_state(state: &AgentState, todo_queue_size: usize) -> Self {
        let kind = match &state.kind {
            AgentKind::Llm { llm_config, dialogue } => AgentKindView::Llm {
                model: llm_config.model.clone(),
                has_preamble: dialogue.has_preamble(),
                dialogue_turns: dialogue.render(),
            },
            AgentKind::Human { conversation_privates } => AgentKindView::Human {
                conversation_peer_count: conversation_privates.len(),
            },
        };
        Self {
            id: state.id,
            name: state.name.clone(),
            role: state.role.clone(),
            profile: state.profile.clone(),
            working_state: state.working_state,
            kind,
            persistent_memory: state.persistent_memory.as_str().to_string(),
            tool_permissions: state.tool_permissions.clone(),
            skill_permissions: state.skill_permissions.clone(),
            todo_queue_size,
            step_count: state.agent_step.list_steps(StepFilter::default()).len(),
        }
    }
}
