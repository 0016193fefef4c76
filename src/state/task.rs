//! [`Task`]: a user-originated unit of work (spec.md §3.1 "Task").

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AgentId, StageId, TaskId};
use super::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Init,
    Running,
    Finished,
    Failed,
}

/// A message appended to a task's shared, append-only log (spec.md §4.4
/// `send_shared_message`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedMessage {
    pub timestamp: DateTime<Utc>,
    pub agent_id: AgentId,
    pub role: String,
    pub stage_id: StageId,
    pub content: String,
}

/// How long the shared log is retained (spec.md §9 Design Notes: "Task-scoped
/// broadcast log"). Does not change the semantics of live operation — only
/// bounds memory for long-running tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetentionPolicy {
    Unbounded,
    KeepLast(usize),
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::Unbounded
    }
}

/// A user-originated unit of work: stages, a group of participating agents,
/// and a shared message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub intention: String,
    pub manager_agent_id: AgentId,
    pub group: HashSet<AgentId>,
    pub stages: Vec<Stage>,
    pub shared_message_log: Vec<SharedMessage>,
    pub retention: RetentionPolicy,
    pub execution_state: TaskState,
    pub summary: String,
}

impl Task {
    pub fn new(intention: impl Into<String>, manager_agent_id: AgentId) -> Self {
        let mut group = HashSet::new();
        group.insert(manager_agent_id);
        Self {
            id: TaskId::new(),
            intention: intention.into(),
            manager_agent_id,
            group,
            stages: Vec::new(),
            shared_message_log: Vec::new(),
            retention: RetentionPolicy::default(),
            execution_state: TaskState::Init,
            summary: String::new(),
        }
    }

    /// Appends a message, trimming the log per `retention`.
    pub fn push_shared_message(&mut self, message: SharedMessage) {
        self.shared_message_log.push(message);
        if let RetentionPolicy::KeepLast(n) = self.retention {
            let len = self.shared_message_log.len();
            if len > n {
                self.shared_message_log.drain(0..len - n);
            }
        }
    }

    /// The single stage currently `Running`, if any (invariant 1: at most one).
    pub fn running_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|s| s.execution_state == super::stage::StageState::Running)
    }

    pub fn running_stage_mut(&mut self) -> Option<&mut Stage> {
        self.stages
            .iter_mut()
            .find(|s| s.execution_state == super::stage::StageState::Running)
    }

    /// Invariant 1: at most one stage in `Running` at any instant.
    pub fn satisfies_single_running_stage_invariant(&self) -> bool {
        self.stages
            .iter()
            .filter(|s| s.execution_state == super::stage::StageState::Running)
            .count()
            <= 1
    }

    /// Invariant 2: every agent referenced in any stage appears in the group.
    pub fn satisfies_group_membership_invariant(&self) -> bool {
        self.stages
            .iter()
            .all(|s| s.agent_allocation.keys().all(|id| self.group.contains(id)))
    }

    /// A task is finished iff every stage is terminal and the last is finished
    /// (spec.md §4.4 "Completion predicate"); zero stages is finished with an
    /// empty summary (spec.md §8 boundary behavior).
    pub fn recompute_completion(&mut self) {
        if self.stages.is_empty() {
            self.execution_state = TaskState::Finished;
            return;
        }
        let all_terminal = self.stages.iter().all(|s| {
            matches!(
                s.execution_state,
                super::stage::StageState::Finished | super::stage::StageState::Failed
            )
        });
        if !all_terminal {
            return;
        }
        let last = self.stages.last().unwrap();
        self.execution_state = if last.execution_state == super::stage::StageState::Finished {
            TaskState::Finished
        } else {
            TaskState::Failed
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// **Scenario**: A task with zero stages is finished with an empty summary.
    #[test]
    fn zero_stage_task_finishes_immediately() {
        let mut task = Task::new("say hello", AgentId::new());
        task.recompute_completion();
        assert_eq!(task.execution_state, TaskState::Finished);
        assert_eq!(task.summary, "");
    }

    /// **Scenario**: retention KeepLast trims old shared messages.
    #[test]
    fn retention_keep_last_trims_log() {
        let mut task = Task::new("chat", AgentId::new());
        task.retention = RetentionPolicy::KeepLast(2);
        for i in 0..5 {
            task.push_shared_message(SharedMessage {
                timestamp: Utc::now(),
                agent_id: task.manager_agent_id,
                role: "manager".into(),
                stage_id: StageId::new(),
                content: format!("msg{i}"),
            });
        }
        assert_eq!(task.shared_message_log.len(), 2);
        assert_eq!(task.shared_message_log[1].content, "msg4");
    }

    /// **Scenario**: group membership invariant fails when a stage allocates
    /// an agent outside the task's group.
    #[test]
    fn group_membership_invariant_detects_violation() {
        let manager = AgentId::new();
        let mut task = Task::new("task", manager);
        let outsider = AgentId::new();
        let mut alloc = HashMap::new();
        alloc.insert(outsider, "helper".to_string());
        task.stages.push(Stage::new(task.id, "s1", alloc));
        assert!(!task.satisfies_group_membership_invariant());
        task.group.insert(outsider);
        assert!(task.satisfies_group_membership_invariant());
    }
}
