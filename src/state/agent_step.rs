//! [`AgentStep`]: an agent's step queue plus its full, randomly-addressable
//! step list (spec.md §3.1 "AgentStep container").

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;

use tokio::sync::{mpsc, Mutex};

use super::ids::{AgentId, StageId, StepId, TaskId};
use super::step::{Step, StepState};

/// A lookup filter for [`AgentStep::get_step`] — any subset of the three
/// keys may be supplied; all supplied keys must match.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepFilter {
    pub step_id: Option<StepId>,
    pub stage_id: Option<StageId>,
    pub task_id: Option<TaskId>,
}

impl StepFilter {
    pub fn by_step(step_id: StepId) -> Self {
        Self {
            step_id: Some(step_id),
            ..Default::default()
        }
    }

    pub fn by_stage(stage_id: StageId) -> Self {
        Self {
            stage_id: Some(stage_id),
            ..Default::default()
        }
    }

    pub fn by_task(task_id: TaskId) -> Self {
        Self {
            task_id: Some(task_id),
            ..Default::default()
        }
    }

    fn matches(&self, step: &Step) -> bool {
        self.step_id.map_or(true, |id| id == step.id)
            && self.stage_id.map_or(true, |id| id == step.stage_id)
            && self.task_id.map_or(true, |id| id == step.task_id)
    }
}

/// An agent's step queue (`todo`) plus its full step list.
///
/// The `todo` queue is modeled as a bounded-in-spirit, FIFO channel: the
/// dispatcher enqueues `reply_message` steps through the same sender used by
/// planning output, preserving FIFO order across producers (spec.md §9
/// Design Notes, "Shared queue between the dispatcher and the agent loop").
pub struct AgentStep {
    pub agent_id: AgentId,
    steps: StdMutex<HashMap<StepId, Step>>,
    todo_tx: mpsc::UnboundedSender<StepId>,
    todo_rx: Mutex<mpsc::UnboundedReceiver<StepId>>,
}

/// Sentinel enqueued to end an agent's action loop (spec.md §4.3).
pub const SHUTDOWN_SENTINEL: StepId = StepId(uuid::Uuid::nil());

impl AgentStep {
    pub fn new(agent_id: AgentId) -> Self {
        let (todo_tx, todo_rx) = mpsc::unbounded_channel();
        Self {
            agent_id,
            steps: StdMutex::new(HashMap::new()),
            todo_tx,
            todo_rx: Mutex::new(todo_rx),
        }
    }

    /// Appends `step` to the step list and, unless it is already past `Init`
    /// (e.g. a `Pending` tool step awaiting instruction fill), enqueues it to
    /// `todo`.
    pub fn add_step(&self, step: Step) {
        let should_enqueue = step.execution_state == StepState::Init;
        let id = step.id;
        self.steps.lock().unwrap().insert(id, step);
        if should_enqueue {
            let _ = self.todo_tx.send(id);
        }
    }

    /// Moves a previously-added step (e.g. one just filled from `Pending` to
    /// `Init`, or a dispatcher-delivered reply step) onto `todo`.
    pub fn enqueue_existing(&self, step_id: StepId) {
        let _ = self.todo_tx.send(step_id);
    }

    /// Enqueues the shutdown sentinel, ending the agent's action loop.
    pub fn shutdown(&self) {
        let _ = self.todo_tx.send(SHUTDOWN_SENTINEL);
    }

    /// Blocks until the next step id is available on `todo`.
    pub async fn next_todo(&self) -> Option<StepId> {
        self.todo_rx.lock().await.recv().await
    }

    /// Current depth of the `todo` queue. Used only for read-only inspection
    /// (spec.md §6 "a bounded queue is represented by its current size") —
    /// nothing in the runtime branches on this value.
    pub async fn todo_len(&self) -> usize {
        self.todo_rx.lock().await.len()
    }

    pub fn get_step(&self, id: StepId) -> Option<Step> {
        self.steps.lock().unwrap().get(&id).cloned()
    }

    pub fn list_steps(&self, filter: StepFilter) -> Vec<Step> {
        self.steps
            .lock()
            .unwrap()
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect()
    }

    /// Mutates a single step's execution_state in place.
    pub fn update_step_status(&self, id: StepId, state: StepState) {
        if let Some(step) = self.steps.lock().unwrap().get_mut(&id) {
            step.execution_state = state;
        }
    }

    /// Replaces a step wholesale (used by executors writing `execute_result`).
    pub fn put_step(&self, step: Step) {
        self.steps.lock().unwrap().insert(step.id, step);
    }
}
