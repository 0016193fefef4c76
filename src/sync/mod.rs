//! [`SyncState`]: the sole mutator of `Task`/`Stage` state (spec.md §4.4).

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::agent::AgentRegistry;
use crate::dispatch::Dispatcher;
use crate::executor::contract::ExecuteOutput;
use crate::state::{
    AgentId, AgentState, LlmConfig, SharedMessage, Stage, StageId, StageState, Step, Task, TaskId, TaskState,
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync/unknown-task: {0}")]
    UnknownTask(TaskId),
    #[error("sync/unknown-stage: {0}")]
    UnknownStage(StageId),
    #[error("sync/unknown-agent: {0}")]
    UnknownAgent(AgentId),
    #[error("sync/dispatch-closed: the dispatcher's channel is closed")]
    DispatchClosed,
    #[error("sync/closed: the synchronizer's output channel is closed")]
    Closed,
}

/// Holds `task_id → Task` and is the only component permitted to mutate
/// `Task`s and `Stage`s (spec.md §4.4). Per-task locks let unrelated tasks
/// advance in parallel while one task's invariants stay serialized.
pub struct SyncState {
    tasks: DashMap<TaskId, Arc<Mutex<Task>>>,
    agents: Arc<AgentRegistry>,
    dispatcher: Dispatcher,
    /// Fallback used to instantiate a task-group member absent from the
    /// registry (spec.md §4.4 `add_task` "instantiate absent agents from
    /// role config"); `None` means every agent referenced by an `add_task`
    /// must already exist.
    default_llm_config: Option<LlmConfig>,
}

impl SyncState {
    pub fn new(agents: Arc<AgentRegistry>, dispatcher: Dispatcher) -> Self {
        Self {
            tasks: DashMap::new(),
            agents,
            dispatcher,
            default_llm_config: None,
        }
    }

    pub fn with_default_llm_config(mut self, config: LlmConfig) -> Self {
        self.default_llm_config = Some(config);
        self
    }

    /// Read-only snapshot for external inspection (spec.md §6 `GET
    /// /api/state/<id>`); clones out from under the per-task lock.
    pub async fn get_task(&self, task_id: TaskId) -> Option<Task> {
        let lock = self.tasks.get(&task_id)?.clone();
        Some(lock.lock().await.clone())
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|entry| *entry.key()).collect()
    }

    /// Applies every populated field of `output` in the fixed order spec.md
    /// §4.4 specifies: state mutations first, `send_message` last, so a
    /// recipient never observes a stale stage.
    ///
    /// Every field's mutation is idempotent with one deliberate exception:
    /// `send_shared_message` appends to an append-only log (spec.md §9
    /// "Task-scoped broadcast log" is explicit that the log is unbounded and
    /// append-only in the source), so re-applying an output that carries one
    /// appends a second, distinctly-timestamped copy rather than a no-op —
    /// the same "no dedup on append" rule spec.md §8 scenario 5 states for
    /// persistent-memory fragments. Re-applying any other field leaves task
    /// and stage state byte-for-byte identical to applying it once.
    pub async fn sync(&self, output: ExecuteOutput) -> Result<(), SyncError> {
        if let Some(update) = output.update_stage_agent_state {
            self.apply_update_stage_agent_state(update).await?;
        }
        if let Some(draft) = output.send_shared_message {
            self.apply_send_shared_message(draft).await?;
        }
        if let Some(task) = output.add_task {
            self.apply_add_task(*task).await?;
        }
        if let Some(stage) = output.add_stage {
            self.apply_add_stage(*stage).await?;
        }
        if let Some((task_id, state)) = output.update_task_state {
            self.apply_update_task_state(task_id, state).await?;
        }
        if let Some(message) = output.send_message {
            self.dispatcher.send(*message).map_err(|_| SyncError::DispatchClosed)?;
        }
        if let Some((agent_id, tools)) = output.update_agent_tools {
            self.apply_update_agent_tools(agent_id, tools).await?;
        }
        if let Some((agent_id, skills)) = output.update_agent_skills {
            self.apply_update_agent_skills(agent_id, skills).await?;
        }
        Ok(())
    }

    fn task_lock(&self, task_id: TaskId) -> Result<Arc<Mutex<Task>>, SyncError> {
        self.tasks.get(&task_id).map(|entry| entry.clone()).ok_or(SyncError::UnknownTask(task_id))
    }

    async fn apply_update_stage_agent_state(&self, update: crate::executor::contract::UpdateStageAgentState) -> Result<(), SyncError> {
        let lock = self.task_lock(update.task_id)?;
        let mut task = lock.lock().await;
        {
            let stage = task
                .stages
                .iter_mut()
                .find(|s| s.id == update.stage_id)
                .ok_or(SyncError::UnknownStage(update.stage_id))?;
            stage.per_agent_state.insert(update.agent_id, update.state);
            if stage.is_complete() {
                stage.execution_state = if stage.should_fail() { StageState::Failed } else { StageState::Finished };
            }
        }
        let just_completed = task
            .stages
            .iter()
            .find(|s| s.id == update.stage_id)
            .is_some_and(|s| matches!(s.execution_state, StageState::Finished | StageState::Failed));
        if just_completed {
            self.advance_task(&mut task, update.stage_id).await;
        }
        Ok(())
    }

    /// spec.md §4.4: "On stage completion, advance the task: set the next
    /// stage to running ... or if there is no next stage, mark the task
    /// finished."
    async fn advance_task(&self, task: &mut Task, completed_stage_id: StageId) {
        let next_index = task.stages.iter().position(|s| s.id == completed_stage_id).map(|i| i + 1);
        let next_stage = next_index.and_then(|i| task.stages.get(i).map(|s| s.id));
        match next_stage {
            Some(stage_id) => self.activate_stage(task, stage_id).await,
            None => {
                task.recompute_completion();
                if matches!(task.execution_state, TaskState::Finished | TaskState::Failed) {
                    let _ = self.dispatcher.task_ended(task.id);
                }
            }
        }
    }

    /// Transitions `stage_id` to `Running` (or straight to `Finished` when it
    /// has no assigned agents) and enqueues each assigned agent's first
    /// `planning` step.
    async fn activate_stage(&self, task: &mut Task, stage_id: StageId) {
        let allocation = {
            let stage = task.stages.iter_mut().find(|s| s.id == stage_id).expect("stage just looked up by id");
            stage.activate();
            stage.agent_allocation.clone()
        };
        for (agent_id, responsibility) in allocation {
            if let Some(handle) = self.agents.get(agent_id) {
                let agent = handle.lock().await;
                let step = Step::new_skill(
                    task.id,
                    stage_id,
                    agent_id,
                    "planning",
                    format!("plan next steps as {responsibility}"),
                    format!("{}\n\nYour responsibility this stage: {responsibility}", task.intention),
                );
                agent.agent_step.add_step(step);
            }
        }
        // An allocation-free stage resolves to Finished inside `activate()`;
        // recurse so the task keeps advancing instead of stalling on it.
        let stage_finished = task
            .stages
            .iter()
            .find(|s| s.id == stage_id)
            .is_some_and(|s| matches!(s.execution_state, StageState::Finished | StageState::Failed));
        if stage_finished {
            Box::pin(self.advance_task(task, stage_id)).await;
        }
    }

    /// Appends to `task.shared_message_log`. Not idempotent by design: the
    /// log is append-only (spec.md §9), so applying the same draft twice
    /// appends two entries, not one — see the exception noted on [`Self::sync`].
    async fn apply_send_shared_message(&self, draft: crate::executor::contract::SharedMessageDraft) -> Result<(), SyncError> {
        let lock = self.task_lock(draft.task_id)?;
        let mut task = lock.lock().await;
        task.push_shared_message(SharedMessage {
            timestamp: Utc::now(),
            agent_id: draft.agent_id,
            role: draft.role,
            stage_id: draft.stage_id,
            content: draft.content,
        });
        Ok(())
    }

    /// spec.md §4.4 `add_task`: registers a new task, instantiating absent
    /// group members from the default LLM config, then enqueues the
    /// designated manager's initial `stage_planning` step.
    async fn apply_add_task(&self, task: Task) -> Result<(), SyncError> {
        for agent_id in task.group.iter().copied() {
            if self.agents.contains(agent_id) {
                continue;
            }
            let Some(config) = self.default_llm_config.clone() else {
                return Err(SyncError::UnknownAgent(agent_id));
            };
            let mut stub = AgentState::new_llm(agent_id.to_string(), "member", "auto-instantiated", config);
            stub.id = agent_id;
            self.agents.insert(stub);
        }
        let manager_handle = self.agents.get(task.manager_agent_id).ok_or(SyncError::UnknownAgent(task.manager_agent_id))?;
        let task_id = task.id;
        let intention = task.intention.clone();
        let manager_id = task.manager_agent_id;
        self.tasks.insert(task_id, Arc::new(Mutex::new(task)));

        let manager = manager_handle.lock().await;
        let step = Step::new_skill(
            task_id,
            StageId(uuid::Uuid::nil()),
            manager_id,
            "stage_planning",
            "plan stages for this task",
            intention,
        );
        manager.agent_step.add_step(step);
        Ok(())
    }

    /// spec.md §4.4 `add_stage`: appends a fully-formed stage; if it is the
    /// first, activates it immediately.
    async fn apply_add_stage(&self, stage: Stage) -> Result<(), SyncError> {
        let lock = self.task_lock(stage.task_id)?;
        let mut task = lock.lock().await;
        let stage_id = stage.id;
        task.stages.push(stage);
        if task.stages.len() == 1 {
            self.activate_stage(&mut task, stage_id).await;
        }
        Ok(())
    }

    async fn apply_update_task_state(&self, task_id: TaskId, state: TaskState) -> Result<(), SyncError> {
        let lock = self.task_lock(task_id)?;
        let mut task = lock.lock().await;
        task.execution_state = state;
        if matches!(state, TaskState::Finished | TaskState::Failed) {
            let _ = self.dispatcher.task_ended(task_id);
        }
        Ok(())
    }

    async fn apply_update_agent_tools(&self, agent_id: AgentId, tools: Vec<String>) -> Result<(), SyncError> {
        let handle = self.agents.get(agent_id).ok_or(SyncError::UnknownAgent(agent_id))?;
        handle.lock().await.tool_permissions = tools;
        Ok(())
    }

    async fn apply_update_agent_skills(&self, agent_id: AgentId, skills: Vec<String>) -> Result<(), SyncError> {
        let handle = self.agents.get(agent_id).ok_or(SyncError::UnknownAgent(agent_id))?;
        handle.lock().await.skill_permissions = skills;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::contract::{SharedMessageDraft, UpdateStageAgentState};
    use crate::state::{ApiType, ParticipationState};
    use std::collections::HashMap;
    use std::time::Duration;

    fn llm_config() -> LlmConfig {
        LlmConfig {
            api_type: ApiType::OpenAI,
            base_url: "http://localhost".into(),
            model: "gpt".into(),
            api_key: "key".into(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout: Duration::from_secs(30),
        }
    }

    fn new_sync() -> (SyncState, Arc<AgentRegistry>) {
        let agents = Arc::new(AgentRegistry::new());
        let dispatcher = Dispatcher::spawn(agents.clone());
        (SyncState::new(agents.clone(), dispatcher), agents)
    }

    /// **Scenario**: a singleton task — one stage, one agent, one step —
    /// runs end to end through add_task → add_stage → completion.
    #[tokio::test]
    async fn singleton_task_reaches_finished() {
        let (sync, agents) = new_sync();
        let manager = AgentState::new_llm("manager", "coordinator", "plans work", llm_config());
        let manager_id = manager.id;
        agents.insert(manager);

        let task = Task::new("say hello", manager_id);
        let task_id = task.id;
        sync.sync(ExecuteOutput { add_task: Some(Box::new(task)), ..Default::default() }).await.unwrap();

        let mut alloc = HashMap::new();
        alloc.insert(manager_id, "reply".to_string());
        let stage = Stage::new(task_id, "greet", alloc);
        let stage_id = stage.id;
        sync.sync(ExecuteOutput { add_stage: Some(Box::new(stage)), ..Default::default() }).await.unwrap();

        sync.sync(ExecuteOutput {
            update_stage_agent_state: Some(UpdateStageAgentState {
                task_id,
                stage_id,
                agent_id: manager_id,
                state: ParticipationState::Finished,
            }),
            ..Default::default()
        })
        .await
        .unwrap();

        let task = sync.get_task(task_id).await.unwrap();
        assert_eq!(task.stages[0].execution_state, StageState::Finished);
        assert_eq!(task.execution_state, TaskState::Finished);
    }

    /// **Scenario**: send_shared_message appends a timestamped line to the
    /// task's log.
    #[tokio::test]
    async fn send_shared_message_appends_to_log() {
        let (sync, agents) = new_sync();
        let manager = AgentState::new_llm("manager", "coordinator", "plans work", llm_config());
        let manager_id = manager.id;
        agents.insert(manager);
        let task = Task::new("chat", manager_id);
        let task_id = task.id;
        sync.sync(ExecuteOutput { add_task: Some(Box::new(task)), ..Default::default() }).await.unwrap();

        sync.sync(ExecuteOutput {
            send_shared_message: Some(SharedMessageDraft {
                task_id,
                agent_id: manager_id,
                role: "manager".into(),
                stage_id: StageId(uuid::Uuid::nil()),
                content: "starting up".into(),
            }),
            ..Default::default()
        })
        .await
        .unwrap();

        let task = sync.get_task(task_id).await.unwrap();
        assert_eq!(task.shared_message_log.len(), 1);
        assert_eq!(task.shared_message_log[0].content, "starting up");
    }

    /// **Scenario**: a strict-policy stage failure fails the stage, and with
    /// no further stages, the task.
    #[tokio::test]
    async fn strict_failure_propagates_to_task() {
        let (sync, agents) = new_sync();
        let manager = AgentState::new_llm("manager", "coordinator", "plans work", llm_config());
        let manager_id = manager.id;
        agents.insert(manager);
        let task = Task::new("risky", manager_id);
        let task_id = task.id;
        sync.sync(ExecuteOutput { add_task: Some(Box::new(task)), ..Default::default() }).await.unwrap();

        let mut alloc = HashMap::new();
        alloc.insert(manager_id, "attempt".to_string());
        let stage = Stage::new(task_id, "risky work", alloc);
        let stage_id = stage.id;
        sync.sync(ExecuteOutput { add_stage: Some(Box::new(stage)), ..Default::default() }).await.unwrap();

        sync.sync(ExecuteOutput {
            update_stage_agent_state: Some(UpdateStageAgentState {
                task_id,
                stage_id,
                agent_id: manager_id,
                state: ParticipationState::Failed,
            }),
            ..Default::default()
        })
        .await
        .unwrap();

        let task = sync.get_task(task_id).await.unwrap();
        assert_eq!(task.stages[0].execution_state, StageState::Failed);
        assert_eq!(task.execution_state, TaskState::Failed);
    }

    /// **Scenario**: update_agent_tools mutates the target agent's permission set.
    #[tokio::test]
    async fn update_agent_tools_mutates_permissions() {
        let (sync, agents) = new_sync();
        let agent = AgentState::new_llm("a", "a", "a", llm_config());
        let agent_id = agent.id;
        let handle = agents.insert(agent);

        sync.sync(ExecuteOutput {
            update_agent_tools: Some((agent_id, vec!["search".to_string()])),
            ..Default::default()
        })
        .await
        .unwrap();

        assert!(handle.lock().await.has_tool("search"));
    }

    /// **Scenario**: applying the same update twice is idempotent.
    #[tokio::test]
    async fn sync_is_idempotent() {
        let (sync, agents) = new_sync();
        let manager = AgentState::new_llm("manager", "coordinator", "plans work", llm_config());
        let manager_id = manager.id;
        agents.insert(manager);
        let task = Task::new("say hello", manager_id);
        let task_id = task.id;
        sync.sync(ExecuteOutput { add_task: Some(Box::new(task)), ..Default::default() }).await.unwrap();

        let mut alloc = HashMap::new();
        alloc.insert(manager_id, "reply".to_string());
        let stage = Stage::new(task_id, "greet", alloc);
        let stage_id = stage.id;
        sync.sync(ExecuteOutput { add_stage: Some(Box::new(stage)), ..Default::default() }).await.unwrap();

        let update = ExecuteOutput {
            update_stage_agent_state: Some(UpdateStageAgentState {
                task_id,
                stage_id,
                agent_id: manager_id,
                state: ParticipationState::Finished,
            }),
            ..Default::default()
        };
        sync.sync(update.clone()).await.unwrap();
        let once = sync.get_task(task_id).await.unwrap();
        sync.sync(update).await.unwrap();
        let twice = sync.get_task(task_id).await.unwrap();
        assert_eq!(once.execution_state, twice.execution_state);
        assert_eq!(once.stages[0].execution_state, twice.stages[0].execution_state);
    }
}
