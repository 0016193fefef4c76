//! The Message Dispatcher: single routing authority for inter-agent messages,
//! with waiting/reply correlation and task-ended cancellation (spec.md §4.5).

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::agent::{receive_message, AgentRegistry};
use crate::state::{AgentId, Message, StageId, Step, StepState, TaskId, WaitingId, WorkingState};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher channel closed")]
    Closed,
}

/// What the dispatcher remembers about a sender blocked on a reply.
struct OutstandingWait {
    sender_id: AgentId,
    origin_step_id: crate::state::StepId,
    task_id: TaskId,
}

enum DispatchCommand {
    Deliver(Message),
    TaskEnded(TaskId),
    Shutdown,
}

/// A cloneable handle to the dispatcher's inbound channel. The routing work
/// itself runs on a single background task (spec.md §4.5 "a single
/// goroutine/thread owns an inbound channel"); this handle only ever sends.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<DispatchCommand>,
}

impl Dispatcher {
    /// Spawns the dispatcher's worker task and returns a handle to it.
    pub fn spawn(agents: Arc<AgentRegistry>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let outstanding: Arc<DashMap<WaitingId, OutstandingWait>> = Arc::new(DashMap::new());
        tokio::spawn(async move {
            Self::run(agents, outstanding, rx).await;
        });
        Self { tx }
    }

    pub fn send(&self, message: Message) -> Result<(), DispatchError> {
        self.tx.send(DispatchCommand::Deliver(message)).map_err(|_| DispatchError::Closed)
    }

    /// Cancels every outstanding wait scoped to `task_id` with a synthetic
    /// `task-ended` reply (spec.md §4.5 "Cancellation").
    pub fn task_ended(&self, task_id: TaskId) -> Result<(), DispatchError> {
        self.tx.send(DispatchCommand::TaskEnded(task_id)).map_err(|_| DispatchError::Closed)
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(DispatchCommand::Shutdown);
    }

    async fn run(
        agents: Arc<AgentRegistry>,
        outstanding: Arc<DashMap<WaitingId, OutstandingWait>>,
        mut rx: mpsc::UnboundedReceiver<DispatchCommand>,
    ) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                DispatchCommand::Deliver(message) => Self::deliver(&agents, &outstanding, message).await,
                DispatchCommand::TaskEnded(task_id) => Self::cancel_task(&agents, &outstanding, task_id).await,
                DispatchCommand::Shutdown => break,
            }
        }
    }

    async fn deliver(agents: &AgentRegistry, outstanding: &DashMap<WaitingId, OutstandingWait>, message: Message) {
        if message.receivers.is_empty() {
            Self::deliver_error(agents, message.task_id, message.sender_id, "dispatch/unknown-receiver: zero receivers").await;
            return;
        }

        // A reply releases its matching wait before fan-out, so the release
        // is visible even if the reply's own receivers list is degenerate.
        if let Some(return_waiting_id) = message.return_waiting_id {
            if let Some((_, wait)) = outstanding.remove(&return_waiting_id) {
                Self::release(agents, wait, &message).await;
            }
            // no match: a duplicate or already-released reply, discarded.
        }

        for receiver in message.receivers.iter().copied() {
            match agents.get(receiver) {
                Some(handle) => receive_message(&handle, &message).await,
                None => {
                    Self::deliver_error(
                        agents,
                        message.task_id,
                        message.sender_id,
                        &format!("dispatch/unknown-receiver: {receiver}"),
                    )
                    .await
                }
            }
        }

        if message.waiting {
            if let (Some(waiting_id), Some(origin_step_id)) = (message.waiting_id, message.origin_step_id) {
                if let Some(sender_handle) = agents.get(message.sender_id) {
                    sender_handle.lock().await.working_state = WorkingState::Awaiting;
                }
                outstanding.insert(
                    waiting_id,
                    OutstandingWait {
                        sender_id: message.sender_id,
                        origin_step_id,
                        task_id: message.task_id,
                    },
                );
            }
        }
    }

    /// Releases a sender blocked on `wait`: the reply's content is folded
    /// into the originating step and the step is moved back onto the
    /// agent's queue as a follow-up (spec.md §4.5).
    async fn release(agents: &AgentRegistry, wait: OutstandingWait, reply: &Message) {
        let Some(handle) = agents.get(wait.sender_id) else {
            return;
        };
        let mut state = handle.lock().await;
        if let Some(mut step) = state.agent_step.get_step(wait.origin_step_id) {
            let prior = step.text_content.take().unwrap_or_default();
            step.text_content = Some(format!("{prior}\n\n[reply received]: {}", reply.content));
            step.execution_state = StepState::Init;
            state.agent_step.put_step(step);
        }
        state.agent_step.enqueue_existing(wait.origin_step_id);
        state.working_state = WorkingState::Working;
    }

    /// spec.md §4.5 "Unknown receiver id → deliver a delivery-error reply
    /// step to the sender"; also used for the zero-receivers boundary case
    /// (spec.md §8).
    async fn deliver_error(agents: &AgentRegistry, task_id: TaskId, sender_id: AgentId, reason: &str) {
        let Some(handle) = agents.get(sender_id) else {
            return;
        };
        let state = handle.lock().await;
        let step = Step::new_skill(task_id, StageId(uuid::Uuid::nil()), sender_id, "reply_message", "delivery-error", reason);
        state.agent_step.add_step(step);
    }

    async fn cancel_task(agents: &AgentRegistry, outstanding: &DashMap<WaitingId, OutstandingWait>, task_id: TaskId) {
        let expired: Vec<WaitingId> = outstanding
            .iter()
            .filter(|entry| entry.value().task_id == task_id)
            .map(|entry| *entry.key())
            .collect();
        for waiting_id in expired {
            if let Some((_, wait)) = outstanding.remove(&waiting_id) {
                let synthetic = Message::new(wait.sender_id, vec![wait.sender_id], task_id, "task-ended");
                Self::release(agents, wait, &synthetic).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AgentState, ApiType, LlmConfig, StepType, TaskId};
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

    async fn settle() {
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
    }

    /// **Scenario**: a private message to a known LLM agent enqueues a reply_message step.
    #[tokio::test]
    async fn private_message_enqueues_reply_step() {
        let registry = Arc::new(AgentRegistry::new());
        let writer = AgentState::new_llm("writer", "writer", "answers questions", llm_config());
        let writer_id = writer.id;
        let writer_step = writer.agent_step.clone();
        registry.insert(writer);

        let dispatcher = Dispatcher::spawn(registry);
        let msg = Message::new(AgentId::new(), vec![writer_id], TaskId::new(), "what should I write?");
        dispatcher.send(msg).unwrap();
        settle().await;

        let id = writer_step.next_todo().await.unwrap();
        assert_eq!(writer_step.get_step(id).unwrap().executor_name, "reply_message");
    }

    /// **Scenario**: a waiting send is released by a matching return_waiting_id reply.
    #[tokio::test]
    async fn waiting_send_is_released_by_matching_reply() {
        let registry = Arc::new(AgentRegistry::new());
        let manager = AgentState::new_llm("manager", "coordinator", "plans work", llm_config());
        let manager_id = manager.id;
        let manager_step = manager.agent_step.clone();
        let origin = Step::new_skill(TaskId::new(), StageId(uuid::Uuid::nil()), manager_id, "send_message", "ask writer", "ask writer");
        let origin_id = origin.id;
        manager.agent_step.put_step(origin);
        let manager_handle = registry.insert(manager);

        let writer = AgentState::new_llm("writer", "writer", "answers questions", llm_config());
        let writer_id = writer.id;
        registry.insert(writer);

        let dispatcher = Dispatcher::spawn(registry);

        let task_id = TaskId::new();
        let waiting_msg = Message::new(manager_id, vec![writer_id], task_id, "what should I write?").with_waiting(origin_id);
        let waiting_id = waiting_msg.waiting_id.unwrap();
        dispatcher.send(waiting_msg).unwrap();
        settle().await;
        assert_eq!(manager_handle.lock().await.working_state, WorkingState::Awaiting);

        let reply = Message::reply_to(waiting_id, writer_id, manager_id, task_id, "write about Rust");
        dispatcher.send(reply).unwrap();
        settle().await;

        assert_eq!(manager_handle.lock().await.working_state, WorkingState::Working);
        let popped = manager_step.next_todo().await.unwrap();
        assert_eq!(popped, origin_id);
        let released = manager_step.get_step(origin_id).unwrap();
        assert_eq!(released.execution_state, StepState::Init);
        assert!(released.text_content.unwrap().contains("write about Rust"));
    }

    /// **Scenario**: task_ended cancels an outstanding wait with a synthetic reply.
    #[tokio::test]
    async fn task_ended_cancels_outstanding_wait() {
        let registry = Arc::new(AgentRegistry::new());
        let agent_a = AgentState::new_llm("a", "a", "a", llm_config());
        let a_id = agent_a.id;
        let a_step = agent_a.agent_step.clone();
        let origin = Step::new_skill(TaskId::new(), StageId(uuid::Uuid::nil()), a_id, "send_message", "ask b", "ask b");
        let origin_id = origin.id;
        agent_a.agent_step.put_step(origin);
        registry.insert(agent_a);

        let agent_b = AgentState::new_llm("b", "b", "b", llm_config());
        let b_id = agent_b.id;
        registry.insert(agent_b);

        let dispatcher = Dispatcher::spawn(registry);
        let task_id = TaskId::new();
        let waiting_msg = Message::new(a_id, vec![b_id], task_id, "ask b").with_waiting(origin_id);
        dispatcher.send(waiting_msg).unwrap();
        settle().await;

        dispatcher.task_ended(task_id).unwrap();
        settle().await;

        let popped = a_step.next_todo().await.unwrap();
        assert_eq!(popped, origin_id);
        assert!(a_step.get_step(origin_id).unwrap().text_content.unwrap().contains("task-ended"));
    }

    /// **Scenario**: a message to an unknown receiver delivers a delivery-error step to the sender.
    #[tokio::test]
    async fn unknown_receiver_delivers_error_step_to_sender() {
        let registry = Arc::new(AgentRegistry::new());
        let sender = AgentState::new_llm("sender", "sender", "sends things", llm_config());
        let sender_id = sender.id;
        let sender_step = sender.agent_step.clone();
        registry.insert(sender);

        let dispatcher = Dispatcher::spawn(registry);
        let msg = Message::new(sender_id, vec![AgentId::new()], TaskId::new(), "hello");
        dispatcher.send(msg).unwrap();
        settle().await;

        let popped = sender_step.next_todo().await.unwrap();
        let step = sender_step.get_step(popped).unwrap();
        assert_eq!(step.intention, "delivery-error");
        assert_eq!(step.step_type, StepType::Skill);
    }

    /// **Scenario**: a zero-receivers message is rejected to the sender (spec.md §8 boundary behavior).
    #[tokio::test]
    async fn zero_receivers_is_rejected_to_sender() {
        let registry = Arc::new(AgentRegistry::new());
        let sender = AgentState::new_llm("sender", "sender", "sends things", llm_config());
        let sender_id = sender.id;
        let sender_step = sender.agent_step.clone();
        registry.insert(sender);

        let dispatcher = Dispatcher::spawn(registry);
        let msg = Message::new(sender_id, vec![], TaskId::new(), "hello");
        dispatcher.send(msg).unwrap();
        settle().await;

        let popped = sender_step.next_todo().await.unwrap();
        let step = sender_step.get_step(popped).unwrap();
        assert!(step.text_content.unwrap().contains("zero receivers"));
    }
}
