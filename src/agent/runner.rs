//! [`AgentRunner`]: the per-agent action loop, plus the dispatcher-facing
//! `receive_message` task-receipt path (spec.md §4.3).

use tokio::sync::mpsc;

use crate::executor::contract::{error_kind, ExecuteOutput, UpdateStageAgentState};
use crate::executor::Router;
use crate::state::{
    AgentKind, AgentStep, Message, ParticipationState, PrivateMessage, Step, StepState, StageRelative,
};

use super::registry::AgentHandle;

/// One worker per agent (spec.md §5 "Scheduling model"). Blocks on the
/// agent's own `todo` queue — never on the agent's state lock, which is
/// acquired only while a dequeued step actually runs.
pub struct AgentRunner {
    handle: AgentHandle,
    agent_step: std::sync::Arc<AgentStep>,
    router: Router,
    sync_tx: mpsc::UnboundedSender<ExecuteOutput>,
}

impl AgentRunner {
    pub fn new(
        handle: AgentHandle,
        agent_step: std::sync::Arc<AgentStep>,
        router: Router,
        sync_tx: mpsc::UnboundedSender<ExecuteOutput>,
    ) -> Self {
        Self {
            handle,
            agent_step,
            router,
            sync_tx,
        }
    }

    /// Runs until the shutdown sentinel is dequeued or the queue closes.
    pub async fn run(self) {
        loop {
            let step_id = match self.agent_step.next_todo().await {
                Some(id) => id,
                None => break,
            };
            if step_id == crate::state::SHUTDOWN_SENTINEL {
                break;
            }
            let Some(step) = self.agent_step.get_step(step_id) else {
                continue;
            };

            let executor = match self.router.resolve(step.step_type, &step.executor_name) {
                Ok(executor) => executor,
                Err(_) => {
                    self.fail_unroutable(step);
                    continue;
                }
            };

            self.agent_step.update_step_status(step_id, StepState::Running);
            let output = {
                let mut state = self.handle.lock().await;
                executor.execute(step_id, &mut state).await
            };
            let _ = self.sync_tx.send(output);
        }
    }

    /// spec.md §4.1: "Unknown pairs yield a `router/unknown-executor` error
    /// and the caller marks the step `failed`." No executor ran, so this loop
    /// — not the executor contract — is responsible for both the step and
    /// the stage-facing `update_stage_agent_state`.
    fn fail_unroutable(&self, mut step: Step) {
        let (task_id, stage_id, agent_id) = (step.task_id, step.stage_id, step.agent_id);
        step.execution_state = StepState::Failed;
        step.execute_result = Some(crate::state::ExecuteResult::failure(
            error_kind::ROUTER_UNKNOWN_EXECUTOR,
            format!("no executor for ({:?}, {})", step.step_type, step.executor_name),
        ));
        self.agent_step.put_step(step);
        let output = ExecuteOutput {
            update_stage_agent_state: Some(UpdateStageAgentState {
                task_id,
                stage_id,
                agent_id,
                state: ParticipationState::Failed,
            }),
            ..Default::default()
        };
        let _ = self.sync_tx.send(output);
    }
}

/// The task-receipt path invoked from the dispatcher's thread (spec.md §4.3
/// "Task-receipt path"). For an LLM agent, enqueues a `reply_message` skill
/// step carrying the incoming message as context. For a human agent, indexes
/// the message into `conversation_privates`; no step is created — the human
/// variant inserts step records only after the operator acts (spec.md §9
/// "Human-agent subclassing").
pub async fn receive_message(handle: &AgentHandle, message: &Message) {
    let mut state = handle.lock().await;
    let agent_id = state.id;
    match &mut state.kind {
        AgentKind::Llm { .. } => {
            let stage_id = match message.stage_relative {
                StageRelative::Stage(id) => id,
                StageRelative::NoRelative => crate::state::StageId(uuid::Uuid::nil()),
            };
            let intention = format!("reply to message from agent {}", message.sender_id);
            let step = Step::new_skill(message.task_id, stage_id, agent_id, "reply_message", intention, &message.content);
            state.agent_step.add_step(step);
        }
        AgentKind::Human { conversation_privates } => {
            conversation_privates.entry(message.sender_id).or_default().push(PrivateMessage {
                from: message.sender_id,
                content: message.content.clone(),
                need_reply: message.need_reply,
            });
        }
    }
}
