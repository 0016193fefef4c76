//! The executor base contract (spec.md §4.2).

use async_trait::async_trait;

use crate::state::{AgentId, AgentState, ParticipationState, StageId, StepId, StepType, TaskId, TaskState};

/// Well-known error kinds an executor may record in `execute_result.error_kind`
/// (spec.md §7). Not an enum: the kind travels as a plain string in
/// [`crate::state::ExecuteResult`] so plug-in executors can add their own.
pub mod error_kind {
    pub const ROUTER_UNKNOWN_EXECUTOR: &str = "router/unknown-executor";
    pub const EXECUTOR_PARSE: &str = "executor/parse";
    pub const EXECUTOR_LLM_TIMEOUT: &str = "executor/llm-timeout";
    pub const EXECUTOR_LLM_TRANSPORT: &str = "executor/llm-transport";
    pub const TOOL_SESSION_OPEN: &str = "tool/session-open";
    pub const TOOL_INVOKE: &str = "tool/invoke";
    pub const TOOL_TIMEOUT: &str = "tool/timeout";
    pub const DISPATCH_UNKNOWN_RECEIVER: &str = "dispatch/unknown-receiver";
}

/// `{task_id, stage_id, agent_id, state}` — the synchronizer applies this to
/// `stage.per_agent_state` (spec.md §4.4).
#[derive(Debug, Clone)]
pub struct UpdateStageAgentState {
    pub task_id: TaskId,
    pub stage_id: StageId,
    pub agent_id: AgentId,
    pub state: ParticipationState,
}

/// A shared-log line the synchronizer timestamps and appends (spec.md §4.4
/// `send_shared_message`).
#[derive(Debug, Clone)]
pub struct SharedMessageDraft {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub role: String,
    pub stage_id: StageId,
    pub content: String,
}

/// Everything an executor may ask the synchronizer to do on its behalf. Every
/// field is independent and idempotent (spec.md §4.4), with one named
/// exception: `send_shared_message` appends to an append-only log, so
/// re-applying it appends again rather than no-op'ing — see
/// [`crate::sync::SyncState::sync`]. An executor populates only the fields
/// relevant to what it did.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOutput {
    pub update_stage_agent_state: Option<UpdateStageAgentState>,
    pub send_shared_message: Option<SharedMessageDraft>,
    pub add_task: Option<Box<crate::state::Task>>,
    pub add_stage: Option<Box<crate::state::Stage>>,
    pub update_task_state: Option<(TaskId, TaskState)>,
    pub send_message: Option<Box<crate::state::Message>>,
    pub update_agent_tools: Option<(AgentId, Vec<String>)>,
    pub update_agent_skills: Option<(AgentId, Vec<String>)>,
}

/// Every executor exposes a single operation: state in (the step and the
/// agent's live state), structured mutations out.
///
/// Implementors MUST, per spec.md §4.2:
/// 1. Transition the step to `Running` at entry.
/// 2. On exit, set `Finished`/`Failed` and populate `execute_result`.
/// 3. Append any `<persistent_memory>...</persistent_memory>` fragment found
///    in the raw output to `agent_state.persistent_memory`.
/// 4. Populate `update_stage_agent_state`.
/// 5. Populate `send_shared_message`.
///
/// An executor never raises past this boundary: every failure is caught and
/// materialized into the step and into `update_stage_agent_state.state =
/// Failed` (spec.md §7 "Propagation policy").
#[async_trait]
pub trait Executor: Send + Sync {
    /// `skill` or `tool` — half of the registry key.
    fn step_type(&self) -> StepType;

    /// The executor name — the other half of the registry key.
    fn name(&self) -> &str;

    /// Runs the step identified by `step_id`, which must already belong to
    /// `agent_state`. Mutates `agent_state` in place (the caller holds its
    /// lock across the whole call, per spec.md §4.3 step 3).
    async fn execute(&self, step_id: StepId, agent_state: &mut AgentState) -> ExecuteOutput;
}

/// The MAS-wide system preamble — identical across every skill prompt, the
/// `system` segment of spec.md §4.2's prompt-assembly convention.
pub const SYSTEM_PREAMBLE: &str =
    "You are an autonomous agent inside a multi-agent task runtime. Plan and \
     act only within your assigned stage responsibility, and follow the \
     return-format contract given in the rules below exactly.";

/// Renders the `role` segment: the agent's background plus a summary of
/// what it is permitted to invoke (spec.md §4.2 "*role* is the agent's
/// background plus its skill/tool permission summary").
pub fn role_block(agent_state: &AgentState) -> String {
    let skills = if agent_state.skill_permissions.is_empty() {
        "none".to_string()
    } else {
        agent_state.skill_permissions.join(", ")
    };
    let tools = if agent_state.tool_permissions.is_empty() {
        "none".to_string()
    } else {
        agent_state.tool_permissions.join(", ")
    };
    format!(
        "You are {name}, {role}. {profile}\nPermitted skills: {skills}\nPermitted tools: {tools}",
        name = agent_state.name,
        role = agent_state.role,
        profile = agent_state.profile,
    )
}

/// Renders the `rules` segment from a skill's own prompt and return-format
/// schema (spec.md §4.2; §6 "`return_format` MUST specify delimiters"). This
/// is the one segment a skill author supplies — everything else in
/// [`assemble_prompt`] is shared across skills.
pub fn rules_block(skill_prompt: &str, return_format: &str) -> String {
    format!("{skill_prompt}\n\nRespond using exactly this format:\n{return_format}")
}

/// Renders the `memory` segment: the agent's persistent-memory scratchpad,
/// verbatim (spec.md §4.2; empty before the agent has ever appended to it).
pub fn memory_block(agent_state: &AgentState) -> String {
    agent_state.persistent_memory.as_str().to_string()
}

/// Assembles a full skill prompt in the fixed `system → role → (goal →
/// rules) → memory` order spec.md §4.2 mandates: "This ordering is a
/// contract so that skill authors can override only the rules block." A
/// skill executor calls this with its own `rules` (typically built via
/// [`rules_block`] from its [`crate::config::SkillConfig`]) and gets back
/// the prompt body to send to the LLM client; `goal` is the step's own
/// `text_content`. Empty segments (e.g. memory before the agent's first
/// append) are dropped rather than left as blank lines.
pub fn assemble_prompt(agent_state: &AgentState, goal: &str, rules: &str) -> String {
    [
        SYSTEM_PREAMBLE.to_string(),
        role_block(agent_state),
        format!("{goal}\n\n{rules}"),
        memory_block(agent_state),
    ]
    .into_iter()
    .filter(|segment| !segment.is_empty())
    .collect::<Vec<_>>()
    .join("\n\n")
}

/// Extracts the text between `<persistent_memory>` and `</persistent_memory>`
/// markers, if present (spec.md §4.2 guarantee 3).
pub fn extract_persistent_memory_fragment(raw: &str) -> Option<&str> {
    const OPEN: &str = "<persistent_memory>";
    const CLOSE: &str = "</persistent_memory>";
    let start = raw.find(OPEN)? + OPEN.len();
    let end = raw[start..].find(CLOSE)? + start;
    Some(raw[start..end].trim())
}
