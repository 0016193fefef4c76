//! [`Stage`]: an ordered sub-phase of a task (spec.md §3.1 "Stage").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::{AgentId, StageId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageState {
    Init,
    Running,
    Finished,
    Failed,
}

/// Per-agent participation within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipationState {
    Idle,
    Working,
    Finished,
    Failed,
}

impl ParticipationState {
    fn is_terminal(self) -> bool {
        matches!(self, ParticipationState::Finished | ParticipationState::Failed)
    }
}

/// Whether a single failed agent fails the whole stage.
///
/// spec.md §9 Open Questions selects strict failure as the default; this
/// type makes that a per-stage, overridable choice instead of a hardcoded rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Any participant `Failed` fails the stage.
    Strict,
    /// The stage only fails if every participant ends `Failed`.
    Lenient,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Strict
    }
}

/// An ordered sub-phase of a task with an agent allocation and a completion
/// predicate (spec.md §4.4 "Completion predicate").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub task_id: TaskId,
    pub intention: String,
    /// Mapping from agent id to a human-readable responsibility string.
    pub agent_allocation: HashMap<AgentId, String>,
    pub per_agent_state: HashMap<AgentId, ParticipationState>,
    pub execution_state: StageState,
    pub completion_summary: HashMap<AgentId, String>,
    pub failure_policy: FailurePolicy,
}

impl Stage {
    pub fn new(
        task_id: TaskId,
        intention: impl Into<String>,
        agent_allocation: HashMap<AgentId, String>,
    ) -> Self {
        let per_agent_state = agent_allocation
            .keys()
            .map(|id| (*id, ParticipationState::Idle))
            .collect();
        Self {
            id: StageId::new(),
            task_id,
            intention: intention.into(),
            agent_allocation,
            per_agent_state,
            execution_state: StageState::Init,
            completion_summary: HashMap::new(),
            failure_policy: FailurePolicy::default(),
        }
    }

    /// spec.md §4.4: a stage is finished iff every allocated agent is
    /// terminal (finished or failed). An empty allocation is vacuously
    /// finished the moment it activates (spec.md §8 boundary behavior).
    pub fn is_complete(&self) -> bool {
        self.agent_allocation
            .keys()
            .all(|id| self.per_agent_state.get(id).is_some_and(|s| s.is_terminal()))
    }

    /// True if the stage's failure policy says this completed stage should
    /// be marked `Failed` rather than `Finished`.
    pub fn should_fail(&self) -> bool {
        match self.failure_policy {
            FailurePolicy::Strict => self
                .per_agent_state
                .values()
                .any(|s| *s == ParticipationState::Failed),
            FailurePolicy::Lenient => self
                .agent_allocation
                .keys()
                .all(|id| self.per_agent_state.get(id) == Some(&ParticipationState::Failed)),
        }
    }

    /// Activates the stage, immediately resolving it if its allocation is empty.
    pub fn activate(&mut self) {
        self.execution_state = StageState::Running;
        if self.agent_allocation.is_empty() {
            self.execution_state = StageState::Finished;
        }
    }
}
