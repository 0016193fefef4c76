//! End-to-end scenario 6 (spec.md §8, §9 "Human-agent subclassing"): a
//! message addressed to a human agent is indexed into its private
//! conversation log; no step is created until the operator acts.

use std::collections::HashMap;

use allen::config::{HumanConfig, LlmConfigSpec, RoleConfig};
use allen::executor::ExecutorRegistry;
use allen::state::{AgentKind, ApiType, Message, TaskId};
use allen::system::Mas;

fn manager_config() -> RoleConfig {
    RoleConfig {
        name: "manager".to_string(),
        role: "coordinator".to_string(),
        profile: "plans and assigns stages".to_string(),
        skills: vec![],
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
async fn message_to_human_agent_is_relayed_without_creating_a_step() {
    let mas = Mas::start(vec![manager_config()], ExecutorRegistry::builder().build(), HashMap::new()).await.unwrap();

    let human_id = mas
        .register_human(HumanConfig {
            name: "operator".to_string(),
            role: "approver".to_string(),
            profile: "reviews the manager's plans".to_string(),
            skills: vec![],
            tools: vec![],
            agent_id: None,
            password: "hunter2".to_string(),
            level: 1,
        })
        .await;

    let manager_id = mas.agents().ids().into_iter().find(|id| *id != human_id).unwrap();

    let task_id = TaskId::new();
    let first = Message::new(manager_id, vec![human_id], task_id, "approve stage 1?").with_need_reply();
    let second = Message::new(manager_id, vec![human_id], task_id, "approve stage 2?").with_need_reply();
    mas.dispatcher().send(first).unwrap();
    mas.dispatcher().send(second).unwrap();

    // Two scheduler yields per delivery is enough for the dispatcher's
    // single background task to drain both sends.
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let handle = mas.agents().get(human_id).unwrap();
    let state = handle.lock().await;
    match &state.kind {
        AgentKind::Human { conversation_privates } => {
            let inbox = conversation_privates.get(&manager_id).unwrap();
            assert_eq!(inbox.len(), 2);
            assert!(inbox[0].need_reply);
            assert_eq!(inbox[1].content, "approve stage 2?");
        }
        _ => panic!("expected a human agent"),
    }
    drop(state);

    // No step was ever enqueued for the human agent — it only reacts once
    // an operator acts, which is out of scope for this runtime.
    assert_eq!(handle.lock().await.agent_step.list_steps(Default::default()).len(), 0);

    mas.shutdown().await;
}
