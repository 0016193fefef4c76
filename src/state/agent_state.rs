//! [`AgentState`]: a stateful participant, LLM- or human-driven (spec.md §3.1).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::agent_step::AgentStep;
use super::ids::{AgentId, StageId, StepId, TaskId};
use super::persistent_memory::PersistentMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkingState {
    Unassigned,
    Idle,
    Working,
    Awaiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiType {
    OpenAI,
    Ollama,
}

/// LLM configuration block (spec.md §6 "Role config").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_type: ApiType,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

/// One turn in an LLM agent's rolling dialogue context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Turn {
    System(String),
    User(String),
    Assistant(String),
}

/// Bounded ring buffer holding the last `max_turns` dialogue turns, with the
/// system/role preamble re-prepended on every call (spec.md §9 Design Notes,
/// "Open dialogue-context growth").
#[derive(Debug, Clone)]
pub struct DialogueContext {
    preamble: Option<String>,
    turns: VecDeque<Turn>,
    max_turns: usize,
}

impl DialogueContext {
    pub fn new(max_turns: usize) -> Self {
        Self {
            preamble: None,
            turns: VecDeque::new(),
            max_turns,
        }
    }

    pub fn set_preamble(&mut self, preamble: impl Into<String>) {
        self.preamble = Some(preamble.into());
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    pub fn has_preamble(&self) -> bool {
        self.preamble.is_some()
    }

    /// The preamble (if any) followed by the retained turns, in order —
    /// exactly what is sent on the next LLM call.
    pub fn render(&self) -> Vec<Turn> {
        let mut out = Vec::with_capacity(self.turns.len() + 1);
        if let Some(p) = &self.preamble {
            out.push(Turn::System(p.clone()));
        }
        out.extend(self.turns.iter().cloned());
        out
    }
}

/// A private message exchanged with a human agent (spec.md §4.3, §8 scenario 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub from: AgentId,
    pub content: String,
    pub need_reply: bool,
}

/// Whether an agent is LLM-driven or human-driven; carries the variant-only
/// data each kind needs (spec.md §9 "Human-agent subclassing": variants of
/// one capability, not a subclass hierarchy).
#[derive(Debug, Clone)]
pub enum AgentKind {
    Llm {
        llm_config: LlmConfig,
        dialogue: DialogueContext,
    },
    Human {
        conversation_privates: HashMap<AgentId, Vec<PrivateMessage>>,
    },
}

/// A stateful participant with its own execution loop and step queue.
pub struct AgentState {
    pub id: AgentId,
    pub name: String,
    pub role: String,
    pub profile: String,
    pub working_state: WorkingState,
    pub kind: AgentKind,
    /// task_id → stage_id → step ids; an optional view over `agent_step`,
    /// which is canonical (spec.md §9 Open Questions).
    pub working_memory: HashMap<TaskId, HashMap<StageId, Vec<StepId>>>,
    pub persistent_memory: PersistentMemory,
    /// Shared out of the state lock: the agent loop blocks on
    /// `agent_step.next_todo()` without holding `AgentState`'s lock, which is
    /// acquired only for the duration of a single step's execution
    /// (spec.md §4.3 step 3).
    pub agent_step: Arc<AgentStep>,
    /// Ordered set of tool-server names this agent may invoke.
    pub tool_permissions: Vec<String>,
    pub skill_permissions: Vec<String>,
}

impl AgentState {
    pub fn new_llm(name: impl Into<String>, role: impl Into<String>, profile: impl Into<String>, llm_config: LlmConfig) -> Self {
        let id = AgentId::new();
        Self {
            id,
            name: name.into(),
            role: role.into(),
            profile: profile.into(),
            working_state: WorkingState::Unassigned,
            kind: AgentKind::Llm {
                llm_config,
                dialogue: DialogueContext::new(20),
            },
            working_memory: HashMap::new(),
            persistent_memory: PersistentMemory::new(Some(16 * 1024)),
            agent_step: Arc::new(AgentStep::new(id)),
            tool_permissions: Vec::new(),
            skill_permissions: Vec::new(),
        }
    }

    pub fn new_human(name: impl Into<String>, role: impl Into<String>, profile: impl Into<String>) -> Self {
        let id = AgentId::new();
        Self {
            id,
            name: name.into(),
            role: role.into(),
            profile: profile.into(),
            working_state: WorkingState::Unassigned,
            kind: AgentKind::Human {
                conversation_privates: HashMap::new(),
            },
            working_memory: HashMap::new(),
            persistent_memory: PersistentMemory::new(Some(16 * 1024)),
            agent_step: Arc::new(AgentStep::new(id)),
            tool_permissions: Vec::new(),
            skill_permissions: Vec::new(),
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self.kind, AgentKind::Human { .. })
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tool_permissions.iter().any(|t| t == name)
    }

    pub fn has_skill(&self, name: &str) -> bool {
        self.skill_permissions.iter().any(|s| s == name)
    }

    /// Records a step under `working_memory[task][stage]` (the optional view;
    /// `agent_step` remains the source of truth).
    pub fn record_working_memory(&mut self, task_id: TaskId, stage_id: StageId, step_id: StepId) {
        self.working_memory
            .entry(task_id)
            .or_default()
            .entry(stage_id)
            .or_default()
            .push(step_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    /// **Scenario**: DialogueContext keeps only the last `max_turns` plus the preamble.
    #[test]
    fn dialogue_context_bounds_turns() {
        let mut ctx = DialogueContext::new(2);
        ctx.set_preamble("system prompt");
        ctx.push(Turn::User("a".into()));
        ctx.push(Turn::User("b".into()));
        ctx.push(Turn::User("c".into()));
        let rendered = ctx.render();
        assert_eq!(rendered.len(), 3); // preamble + last 2 turns
        match &rendered[1] {
            Turn::User(s) => assert_eq!(s, "b"),
            _ => panic!("expected user turn"),
        }
    }

    /// **Scenario**: a human agent's conversation_privates is empty at creation.
    #[test]
    fn human_agent_starts_with_no_private_conversations() {
        let agent = AgentState::new_human("H", "human", "operator");
        match &agent.kind {
            AgentKind::Human { conversation_privates } => assert!(conversation_privates.is_empty()),
            _ => panic!("expected human agent"),
        }
    }

    /// **Scenario**: tool/skill permission checks reflect the configured sets.
    #[test]
    fn permission_checks_reflect_configured_sets() {
        let mut agent = AgentState::new_llm("L", "writer", "profile", llm_config());
        agent.tool_permissions.push("search".to_string());
        assert!(agent.has_tool("search"));
        assert!(!agent.has_tool("bash"));
    }
}
