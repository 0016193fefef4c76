//! [`Mas`]: the system container (spec.md §2, §6). Owns the agent registry,
//! the synchronizer, the dispatcher, and the tool client; wires startup and
//! the creation of the first task.

pub mod view;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::agent::{AgentRegistry, AgentRunner};
use crate::config::{HumanConfig, McpServerSpec, RoleConfig};
use crate::dispatch::Dispatcher;
use crate::error::AllenError;
use crate::executor::contract::ExecuteOutput;
use crate::executor::{ExecutorRegistry, Router};
use crate::state::{AgentId, AgentState, ApiType, LlmConfig, Message, Stage, StageId, Step, StepFilter, Task, TaskId};
use crate::sync::SyncState;
use crate::toolclient::ToolClient;
pub use view::{AgentKindView, AgentStateView, StateKind};

/// The distinguished role name spec.md §6 requires at startup.
pub const MANAGER_ROLE_NAME: &str = "manager";

/// Result of a `bind_human_agent` call (spec.md §6 `POST /api/bind_human_agent`).
#[derive(Debug, Clone, serde::Serialize)]
pub struct BindResult {
    pub success: bool,
    pub human_agent_id: Option<AgentId>,
    pub message: String,
}

pub struct Mas {
    agents: Arc<AgentRegistry>,
    sync: Arc<SyncState>,
    dispatcher: Dispatcher,
    tool_client: ToolClient,
    router: Router,
    sync_tx: mpsc::UnboundedSender<ExecuteOutput>,
    manager_id: crate::state::AgentId,
    /// `(password, level)` per human agent, checked by `bind_human_agent`
    /// (spec.md §6 "Human config" `human_config{agent_id, password, level}`).
    human_credentials: DashMap<AgentId, (String, u32)>,
}

impl Mas {
    /// Brings up the whole runtime: instantiates one agent per role config,
    /// spawns their action loops, the dispatcher, and the synchronizer's
    /// output-consuming task. Fails if no config named `"manager"` is
    /// present (spec.md §6).
    pub async fn start(
        role_configs: Vec<RoleConfig>,
        executor_registry: ExecutorRegistry,
        tool_server_config: HashMap<String, McpServerSpec>,
    ) -> Result<Self, AllenError> {
        if !role_configs.iter().any(|c| c.name == MANAGER_ROLE_NAME) {
            return Err(AllenError::UnknownAgent(format!("no role config named '{MANAGER_ROLE_NAME}'")));
        }

        let agents = Arc::new(AgentRegistry::new());
        let mut manager_id = None;
        for config in &role_configs {
            let llm_config = LlmConfig {
                api_type: config.llm_config.api_type,
                base_url: config.llm_config.base_url.clone(),
                model: config.llm_config.model.clone(),
                api_key: config.llm_config.api_key.clone(),
                max_tokens: config.llm_config.max_tokens,
                temperature: config.llm_config.temperature,
                timeout: Duration::from_secs(config.llm_config.timeout_secs),
            };
            let mut state = AgentState::new_llm(config.name.clone(), config.role.clone(), config.profile.clone(), llm_config);
            state.tool_permissions = config.tools.clone();
            state.skill_permissions = config.skills.clone();
            if config.name == MANAGER_ROLE_NAME {
                manager_id = Some(state.id);
            }
            agents.insert(state);
        }
        let manager_id = manager_id.expect("checked above: a manager role config is present");

        let dispatcher = Dispatcher::spawn(agents.clone());
        let sync = Arc::new(SyncState::new(agents.clone(), dispatcher.clone()));

        let (sync_tx, mut sync_rx) = mpsc::unbounded_channel::<ExecuteOutput>();
        {
            let sync = sync.clone();
            tokio::spawn(async move {
                while let Some(output) = sync_rx.recv().await {
                    let sync = sync.clone();
                    tokio::spawn(async move {
                        if let Err(err) = sync.sync(output).await {
                            tracing::warn!(error = %err, "sync/invariant-violated");
                        }
                    });
                }
            });
        }

        let router = Router::new(Arc::new(executor_registry));
        for id in agents.ids() {
            let handle = agents.get(id).expect("id just listed by ids()");
            let agent_step = handle.lock().await.agent_step.clone();
            let runner = AgentRunner::new(handle, agent_step, router.clone(), sync_tx.clone());
            tokio::spawn(runner.run());
        }

        let tool_client = ToolClient::new(tool_server_config);

        Ok(Self {
            agents,
            sync,
            dispatcher,
            tool_client,
            router,
            sync_tx,
            manager_id,
            human_credentials: DashMap::new(),
        })
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    pub fn sync(&self) -> &Arc<SyncState> {
        &self.sync
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn tool_client(&self) -> &ToolClient {
        &self.tool_client
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Submits a new task, managed by the configured `manager` agent
    /// (spec.md §2 "wires startup and the first task").
    pub async fn submit_task(&self, intention: impl Into<String>) -> Result<TaskId, AllenError> {
        let task = Task::new(intention, self.manager_id);
        let task_id = task.id;
        self.sync
            .sync(ExecuteOutput { add_task: Some(Box::new(task)), ..Default::default() })
            .await?;
        Ok(task_id)
    }

    /// Registers a human-driven agent after startup (spec.md §6 "Human
    /// config"; spec.md §9 "Human-agent subclassing": a variant of the same
    /// capability, not a predeclared startup role). Spawns its action loop
    /// like any other agent so `conversation_privates` replies it later
    /// produces still route through the ordinary step queue.
    pub async fn register_human(&self, config: HumanConfig) -> AgentId {
        let mut state = AgentState::new_human(config.name.clone(), config.role.clone(), config.profile.clone());
        state.tool_permissions = config.tools.clone();
        state.skill_permissions = config.skills.clone();
        let id = state.id;
        self.human_credentials.insert(id, (config.password.clone(), config.level));
        let handle = self.agents.insert(state);
        let agent_step = handle.lock().await.agent_step.clone();
        let runner = AgentRunner::new(handle, agent_step, self.router.clone(), self.sync_tx.clone());
        tokio::spawn(runner.run());
        id
    }

    /// spec.md §6 `POST /api/bind_human_agent`: authenticates an operator
    /// session against a previously registered human agent's password.
    pub fn bind_human_agent(&self, human_agent_id: AgentId, password: &str) -> BindResult {
        match self.human_credentials.get(&human_agent_id) {
            Some(entry) if entry.value().0 == password => BindResult {
                success: true,
                human_agent_id: Some(human_agent_id),
                message: "bound".to_string(),
            },
            Some(_) => BindResult {
                success: false,
                human_agent_id: None,
                message: "invalid password".to_string(),
            },
            None => BindResult {
                success: false,
                human_agent_id: None,
                message: "unknown human agent".to_string(),
            },
        }
    }

    /// spec.md §6 `POST /api/send_private_message` / `send_group_message`:
    /// both bodies differ only in `receivers` cardinality, so one path
    /// handles both — a single receiver is a private message, several is a
    /// group message, exactly as spec.md §4.5 "Group messages ... expand
    /// into per-receiver deliveries" already treats them identically at the
    /// dispatcher. `waiting` is intentionally not exposed here: it requires
    /// an originating step to release back onto (spec.md §4.5), which a
    /// dashboard-driven send from a human operator does not have.
    pub fn send_message(
        &self,
        sender_id: AgentId,
        task_id: TaskId,
        receivers: Vec<AgentId>,
        content: impl Into<String>,
        stage_relative: Option<StageId>,
        need_reply: bool,
        return_waiting_id: Option<crate::state::WaitingId>,
    ) -> Result<(), AllenError> {
        let mut message = Message::new(sender_id, receivers, task_id, content);
        if need_reply {
            message = message.with_need_reply();
        }
        if let Some(stage_id) = stage_relative {
            message = message.with_stage(stage_id);
        }
        message.return_waiting_id = return_waiting_id;
        self.dispatcher.send(message).map_err(AllenError::Dispatch)
    }

    /// Read-only snapshot of every known task (spec.md §6
    /// `GET /api/states?type=task`).
    pub async fn list_tasks(&self) -> Vec<Task> {
        let mut tasks = Vec::new();
        for id in self.sync.task_ids() {
            if let Some(task) = self.sync.get_task(id).await {
                tasks.push(task);
            }
        }
        tasks
    }

    /// Single-task detail (spec.md §6 `GET /api/state/<id>`).
    pub async fn get_task(&self, task_id: TaskId) -> Option<Task> {
        self.sync.get_task(task_id).await
    }

    /// Read-only snapshot of every stage under `task_id` (spec.md §6
    /// `GET /api/states?type=stage`).
    pub async fn list_stages(&self, task_id: TaskId) -> Vec<Stage> {
        self.sync.get_task(task_id).await.map(|task| task.stages).unwrap_or_default()
    }

    /// Single-stage detail (spec.md §6 `GET /api/state/<id>`).
    pub async fn get_stage(&self, task_id: TaskId, stage_id: StageId) -> Option<Stage> {
        self.list_stages(task_id).await.into_iter().find(|s| s.id == stage_id)
    }

    /// Every step an agent has ever been assigned, across its full history
    /// (spec.md §6 `GET /api/states?type=step`).
    pub async fn list_steps(&self, agent_id: AgentId, filter: StepFilter) -> Vec<Step> {
        match self.agents.get(agent_id) {
            Some(handle) => handle.lock().await.agent_step.list_steps(filter),
            None => Vec::new(),
        }
    }

    pub async fn get_step(&self, agent_id: AgentId, step_id: crate::state::StepId) -> Option<Step> {
        let handle = self.agents.get(agent_id)?;
        let state = handle.lock().await;
        state.agent_step.get_step(step_id)
    }

    /// Every agent's read-only view (spec.md §6 `GET /api/states?type=agent`).
    pub async fn list_agent_views(&self) -> Vec<AgentStateView> {
        let mut views = Vec::new();
        for id in self.agents.ids() {
            if let Some(view) = self.agent_view(id).await {
                views.push(view);
            }
        }
        views
    }

    pub async fn agent_view(&self, agent_id: AgentId) -> Option<AgentStateView> {
        let handle = self.agents.get(agent_id)?;
        let state = handle.lock().await;
        let todo_queue_size = state.agent_step.todo_len().await;
        Some(AgentStateView::from_state(&state, todo_queue_size))
    }

    /// Hands an executor's output to the synchronizer without routing it
    /// through an agent's own loop — used by callers that run an executor
    /// directly (e.g. the human-relay API surface).
    pub fn submit_execute_output(&self, output: ExecuteOutput) -> Result<(), AllenError> {
        self.sync_tx.send(output).map_err(|_| AllenError::Sync(crate::sync::SyncError::Closed))
    }

    /// Closes every agent's queue, then the dispatcher, then the tool client
    /// (spec.md §5 "A `shutdown` signal closes every agent's queue, then the
    /// dispatcher, then the tool client").
    pub async fn shutdown(&self) {
        for id in self.agents.ids() {
            if let Some(handle) = self.agents.get(id) {
                handle.lock().await.agent_step.shutdown();
            }
        }
        self.dispatcher.shutdown();
    }
}
