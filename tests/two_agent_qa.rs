//! End-to-end scenario 2 (spec.md §8): a manager asks a writer a question
//! over a plain (non-waiting) message and folds the reply into the shared
//! log once both agents report their stage participation finished.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;

use allen::config::{LlmConfigSpec, RoleConfig};
use allen::executor::{ExecuteOutput, Executor, ExecutorRegistry, SharedMessageDraft, UpdateStageAgentState};
use allen::state::{
    AgentId, AgentState, ApiType, ExecuteResult, Message, ParticipationState, Stage, Step, StepId, StepState, StepType, TaskId,
};
use allen::system::Mas;

type Directory = Arc<StdMutex<HashMap<String, AgentId>>>;

struct StagePlanningExecutor {
    directory: Directory,
}

#[async_trait]
impl Executor for StagePlanningExecutor {
    fn step_type(&self) -> StepType {
        StepType::Skill
    }
    fn name(&self) -> &str {
        "stage_planning"
    }
    async fn execute(&self, step_id: StepId, agent_state: &mut AgentState) -> ExecuteOutput {
        let step = agent_state.agent_step.get_step(step_id).unwrap();
        let writer_id = *self.directory.lock().unwrap().get("writer").unwrap();

        let mut alloc = HashMap::new();
        alloc.insert(agent_state.id, "ask".to_string());
        alloc.insert(writer_id, "answer".to_string());
        let stage = Stage::new(step.task_id, "a short Q&A", alloc);

        let mut finished = step;
        finished.execution_state = StepState::Finished;
        finished.execute_result = Some(ExecuteResult::success_text("planned a two-agent stage"));
        agent_state.agent_step.put_step(finished);

        ExecuteOutput {
            add_stage: Some(Box::new(stage)),
            ..Default::default()
        }
    }
}

struct PlanningExecutor {
    directory: Directory,
}

#[async_trait]
impl Executor for PlanningExecutor {
    fn step_type(&self) -> StepType {
        StepType::Skill
    }
    fn name(&self) -> &str {
        "planning"
    }
    async fn execute(&self, step_id: StepId, agent_state: &mut AgentState) -> ExecuteOutput {
        let step = agent_state.agent_step.get_step(step_id).unwrap();
        let is_asker = step.intention.contains("as ask");

        let mut finished = step.clone();
        finished.execution_state = StepState::Finished;

        if is_asker {
            finished.execute_result = Some(ExecuteResult::success_text("asked the question"));
            agent_state.agent_step.put_step(finished);
            let writer_id = *self.directory.lock().unwrap().get("writer").unwrap();
            let message = Message::new(agent_state.id, vec![writer_id], step.task_id, "what is 2 + 2?").with_stage(step.stage_id);
            ExecuteOutput {
                update_stage_agent_state: Some(UpdateStageAgentState {
                    task_id: step.task_id,
                    stage_id: step.stage_id,
                    agent_id: agent_state.id,
                    state: ParticipationState::Working,
                }),
                send_message: Some(Box::new(message)),
                ..Default::default()
            }
        } else {
            finished.execute_result = Some(ExecuteResult::success_text("waiting for a question"));
            agent_state.agent_step.put_step(finished);
            ExecuteOutput {
                update_stage_agent_state: Some(UpdateStageAgentState {
                    task_id: step.task_id,
                    stage_id: step.stage_id,
                    agent_id: agent_state.id,
                    state: ParticipationState::Working,
                }),
                ..Default::default()
            }
        }
    }
}

struct ReplyMessageExecutor {
    directory: Directory,
}

#[async_trait]
impl Executor for ReplyMessageExecutor {
    fn step_type(&self) -> StepType {
        StepType::Skill
    }
    fn name(&self) -> &str {
        "reply_message"
    }
    async fn execute(&self, step_id: StepId, agent_state: &mut AgentState) -> ExecuteOutput {
        let step = agent_state.agent_step.get_step(step_id).unwrap();
        let mut finished = step.clone();
        finished.execution_state = StepState::Finished;

        if step.text_content.as_deref() == Some("what is 2 + 2?") {
            finished.execute_result = Some(ExecuteResult::success_text("answered 4"));
            agent_state.agent_step.put_step(finished);
            let manager_id = *self.directory.lock().unwrap().get("manager").unwrap();
            let reply = Message::new(agent_state.id, vec![manager_id], step.task_id, "4").with_stage(step.stage_id);
            ExecuteOutput {
                update_stage_agent_state: Some(UpdateStageAgentState {
                    task_id: step.task_id,
                    stage_id: step.stage_id,
                    agent_id: agent_state.id,
                    state: ParticipationState::Finished,
                }),
                send_message: Some(Box::new(reply)),
                ..Default::default()
            }
        } else {
            finished.execute_result = Some(ExecuteResult::success_text("recorded the answer"));
            agent_state.agent_step.put_step(finished);
            ExecuteOutput {
                update_stage_agent_state: Some(UpdateStageAgentState {
                    task_id: step.task_id,
                    stage_id: step.stage_id,
                    agent_id: agent_state.id,
                    state: ParticipationState::Finished,
                }),
                send_shared_message: Some(SharedMessageDraft {
                    task_id: step.task_id,
                    agent_id: agent_state.id,
                    role: "manager".to_string(),
                    stage_id: step.stage_id,
                    content: format!("answer: {}", step.text_content.unwrap_or_default()),
                }),
                ..Default::default()
            }
        }
    }
}

fn role(name: &str, role: &str) -> RoleConfig {
    RoleConfig {
        name: name.to_string(),
        role: role.to_string(),
        profile: format!("{role} in a Q&A stage"),
        skills: vec!["stage_planning".to_string(), "planning".to_string(), "reply_message".to_string()],
        tools: vec![],
        llm_config: LlmConfigSpec {
            api_type: ApiType::OpenAI,
            base_url: "http://localhost".to_string(),
            model: "gpt-4o".to_string(),
            api_key: "test".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout_secs: 30,
        },
    }
}

#[tokio::test]
async fn two_agents_complete_a_question_and_answer() {
    let directory: Directory = Arc::new(StdMutex::new(HashMap::new()));

    let registry = ExecutorRegistry::builder()
        .register(Arc::new(StagePlanningExecutor { directory: directory.clone() }))
        .register(Arc::new(PlanningExecutor { directory: directory.clone() }))
        .register(Arc::new(ReplyMessageExecutor { directory: directory.clone() }))
        .build();

    let mas = Mas::start(vec![role("manager", "coordinator"), role("writer", "writer")], registry, HashMap::new())
        .await
        .unwrap();

    for id in mas.agents().ids() {
        let handle = mas.agents().get(id).unwrap();
        let name = handle.lock().await.name.clone();
        directory.lock().unwrap().insert(name, id);
    }

    let task_id = mas.submit_task("find out what 2 + 2 is").await.unwrap();
    let task = poll_until_terminal(&mas, task_id).await;

    assert_eq!(task.execution_state, allen::state::TaskState::Finished);
    assert_eq!(task.stages[0].execution_state, allen::state::StageState::Finished);
    assert!(task.shared_message_log.iter().any(|m| m.content.contains('4')));

    mas.shutdown().await;
}

async fn poll_until_terminal(mas: &Mas, task_id: TaskId) -> allen::state::Task {
    for _ in 0..400 {
        if let Some(task) = mas.sync().get_task(task_id).await {
            if matches!(task.execution_state, allen::state::TaskState::Finished | allen::state::TaskState::Failed) {
                return task;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("task {task_id} did not reach a terminal state in time");
}
