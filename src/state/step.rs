//! [`Step`]: the smallest unit of agent execution (spec.md §3.1 "Step").

use serde::{Deserialize, Serialize};

use super::ids::{AgentId, StageId, StepId, TaskId};

/// A step invokes exactly one skill or one tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepType {
    Skill,
    Tool,
}

/// Step lifecycle. `Pending` is tool-only: "awaiting instruction fill from a
/// prior step" (spec.md §3.1 Step Invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepState {
    Init,
    Pending,
    Running,
    Finished,
    Failed,
}

impl StepState {
    /// Terminal iff finished or failed — used by invariant 3 (execute_result
    /// non-empty iff execution_state is terminal).
    pub fn is_terminal(self) -> bool {
        matches!(self, StepState::Finished | StepState::Failed)
    }
}

/// Structured outcome of a step, populated by the executor on exit
/// (spec.md §4.2 guarantee 2).
///
/// On success, `value` carries the parsed instruction/result; on failure,
/// `error_kind` names one of the kinds in spec.md §7 and `raw` preserves the
/// upstream response verbatim for the dashboard's human-readable surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub error_kind: Option<String>,
    pub value: Option<serde_json::Value>,
    pub raw: Option<String>,
}

impl ExecuteResult {
    pub fn success(value: serde_json::Value) -> Self {
        Self {
            error_kind: None,
            value: Some(value),
            raw: None,
        }
    }

    pub fn success_text(text: impl Into<String>) -> Self {
        Self {
            error_kind: None,
            value: Some(serde_json::Value::String(text.into())),
            raw: None,
        }
    }

    pub fn failure(error_kind: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            error_kind: Some(error_kind.into()),
            value: None,
            raw: Some(raw.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error_kind.is_some()
    }
}

/// One unit of agent execution: invokes a skill (LLM-driven) or a tool
/// (external-server-driven) and reports its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub task_id: TaskId,
    pub stage_id: StageId,
    pub agent_id: AgentId,
    pub intention: String,
    pub step_type: StepType,
    pub executor_name: String,
    pub execution_state: StepState,
    /// Request prompt body for skill steps.
    pub text_content: Option<String>,
    /// Structured invocation payload for tool steps; produced by a prior
    /// `instruction_generation` skill step. `None` means not yet filled.
    pub instruction_content: Option<serde_json::Value>,
    pub execute_result: Option<ExecuteResult>,
}

impl Step {
    /// Creates a new skill step in `Init` state.
    pub fn new_skill(
        task_id: TaskId,
        stage_id: StageId,
        agent_id: AgentId,
        executor_name: impl Into<String>,
        intention: impl Into<String>,
        text_content: impl Into<String>,
    ) -> Self {
        Self {
            id: StepId::new(),
            task_id,
            stage_id,
            agent_id,
            intention: intention.into(),
            step_type: StepType::Skill,
            executor_name: executor_name.into(),
            execution_state: StepState::Init,
            text_content: Some(text_content.into()),
            instruction_content: None,
            execute_result: None,
        }
    }

    /// Creates a new tool step. Starts `Pending` when `instruction_content`
    /// is absent (spec.md §3.1 Step invariant), `Init` when already filled.
    pub fn new_tool(
        task_id: TaskId,
        stage_id: StageId,
        agent_id: AgentId,
        executor_name: impl Into<String>,
        intention: impl Into<String>,
        instruction_content: Option<serde_json::Value>,
    ) -> Self {
        let execution_state = if instruction_content.is_some() {
            StepState::Init
        } else {
            StepState::Pending
        };
        Self {
            id: StepId::new(),
            task_id,
            stage_id,
            agent_id,
            intention: intention.into(),
            step_type: StepType::Tool,
            executor_name: executor_name.into(),
            execution_state,
            text_content: None,
            instruction_content,
            execute_result: None,
        }
    }

    /// Fills a pending tool step's instruction and moves it to `Init`,
    /// making it eligible for dispatch.
    pub fn fill_instruction(&mut self, instruction: serde_json::Value) {
        self.instruction_content = Some(instruction);
        if self.execution_state == StepState::Pending {
            self.execution_state = StepState::Init;
        }
    }

    /// Invariant 4: a tool step without an instruction must be `Init` or `Pending`.
    pub fn satisfies_instruction_invariant(&self) -> bool {
        if self.step_type != StepType::Tool || self.instruction_content.is_some() {
            return true;
        }
        matches!(self.execution_state, StepState::Init | StepState::Pending)
    }

    /// Invariant 3: execute_result non-empty iff execution_state is terminal.
    pub fn satisfies_result_invariant(&self) -> bool {
        self.execution_state.is_terminal() == self.execute_result.is_some()
    }
}
