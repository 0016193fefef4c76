//! [`Message`]: the unit routed by the dispatcher between agents (spec.md §4.5).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{AgentId, StageId, StepId, TaskId};

/// A message's relation to a stage: a specific stage, or the sentinel
/// "no relative" (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageRelative {
    Stage(StageId),
    NoRelative,
}

/// Opaque correlation id for a waiting send/reply pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaitingId(pub Uuid);

impl WaitingId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WaitingId {
    fn default() -> Self {
        Self::new()
    }
}

/// An inter-agent message. `receivers` may be one agent (private) or several
/// (group); group sends share one `waiting_id` and the first matching reply
/// releases the sender (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender_id: AgentId,
    pub receivers: Vec<AgentId>,
    pub task_id: TaskId,
    pub stage_relative: StageRelative,
    pub content: String,
    pub need_reply: bool,
    pub waiting: bool,
    pub waiting_id: Option<WaitingId>,
    /// Echoes a prior `waiting_id` when this message is itself a reply.
    pub return_waiting_id: Option<WaitingId>,
    /// The sender's step that is blocked on this send, populated whenever
    /// `waiting` is true so the dispatcher knows which step to release on a
    /// matching reply (spec.md §4.5).
    pub origin_step_id: Option<StepId>,
}

impl Message {
    pub fn new(
        sender_id: AgentId,
        receivers: Vec<AgentId>,
        task_id: TaskId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id,
            receivers,
            task_id,
            stage_relative: StageRelative::NoRelative,
            content: content.into(),
            need_reply: false,
            waiting: false,
            waiting_id: None,
            return_waiting_id: None,
            origin_step_id: None,
        }
    }

    /// Marks this message as sender-blocking, minting a fresh `waiting_id`
    /// shared by every receiver and recording the sender's step that is
    /// blocked on the reply.
    pub fn with_waiting(mut self, origin_step_id: StepId) -> Self {
        self.waiting = true;
        self.need_reply = true;
        self.waiting_id = Some(WaitingId::new());
        self.origin_step_id = Some(origin_step_id);
        self
    }

    pub fn with_need_reply(mut self) -> Self {
        self.need_reply = true;
        self
    }

    pub fn with_stage(mut self, stage_id: StageId) -> Self {
        self.stage_relative = StageRelative::Stage(stage_id);
        self
    }

    /// Builds a reply to `waiting_id`, addressed back to `sender_id`.
    pub fn reply_to(waiting_id: WaitingId, from: AgentId, to: AgentId, task_id: TaskId, content: impl Into<String>) -> Self {
        Self {
            sender_id: from,
            receivers: vec![to],
            task_id,
            stage_relative: StageRelative::NoRelative,
            content: content.into(),
            need_reply: false,
            waiting: false,
            waiting_id: None,
            return_waiting_id: Some(waiting_id),
            origin_step_id: None,
        }
    }
}
