//! The agent registry: every live [`AgentState`], keyed by id.
//!
//! Mirrors the read-mostly, copy-on-write shape spec.md §5 mandates for
//! `server_sessions`: registration is rare (agent creation), lookup is the
//! hot path (every dispatch, every synchronizer permission update), so a
//! `DashMap` gives lock-free reads without a coarse `RwLock<HashMap<_>>`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::state::{AgentId, AgentState};

/// A shared handle to one agent's full state. Held across a step's entire
/// execution by the agent's own worker (spec.md §4.3 step 3); acquired
/// briefly by the dispatcher (appending a reply step) and the synchronizer
/// (permission updates).
pub type AgentHandle = Arc<Mutex<AgentState>>;

/// Concurrent, append-mostly map from agent id to its handle.
#[derive(Default)]
pub struct AgentRegistry {
    agents: DashMap<AgentId, AgentHandle>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly constructed agent, returning its handle.
    pub fn insert(&self, state: AgentState) -> AgentHandle {
        let id = state.id;
        let handle: AgentHandle = Arc::new(Mutex::new(state));
        self.agents.insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: AgentId) -> Option<AgentHandle> {
        self.agents.get(&id).map(|entry| entry.clone())
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
