//! Executor registry: `(step_type, name) → executor factory`, immutable after
//! startup (spec.md §4.1).

use std::collections::HashMap;
use std::sync::Arc;

use crate::state::StepType;

use super::contract::Executor;

/// Registered executors, keyed by `(step_type, name)`. Built once via
/// [`ExecutorRegistryBuilder`] then frozen: lookups are a plain `HashMap::get`
/// behind a shared `Arc`, with no lock on the hot path.
pub struct ExecutorRegistry {
    executors: HashMap<(StepType, String), Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder::new()
    }

    pub fn get(&self, step_type: StepType, name: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(&(step_type, name.to_string())).cloned()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[derive(Default)]
pub struct ExecutorRegistryBuilder {
    executors: HashMap<(StepType, String), Arc<dyn Executor>>,
}

impl ExecutorRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an executor. Each skill/tool implementation calls this once
    /// at startup (spec.md §4.1: "populated at startup by each skill/tool
    /// implementation declaring itself").
    pub fn register(mut self, executor: Arc<dyn Executor>) -> Self {
        let key = (executor.step_type(), executor.name().to_string());
        self.executors.insert(key, executor);
        self
    }

    pub fn build(self) -> ExecutorRegistry {
        ExecutorRegistry {
            executors: self.executors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::contract::ExecuteOutput;
    use crate::state::{AgentState, StepId};
    use async_trait::async_trait;

    struct EchoExecutor;

    #[async_trait]
    impl Executor for EchoExecutor {
        fn step_type(&self) -> StepType {
            StepType::Skill
        }

        fn name(&self) -> &str {
            "echo"
        }

        async fn execute(&self, _step_id: StepId, _agent_state: &mut AgentState) -> ExecuteOutput {
            ExecuteOutput::default()
        }
    }

    /// **Scenario**: a registered executor is retrievable by (type, name).
    #[test]
    fn registered_executor_is_retrievable() {
        let registry = ExecutorRegistry::builder()
            .register(Arc::new(EchoExecutor))
            .build();
        assert!(registry.get(StepType::Skill, "echo").is_some());
        assert!(registry.get(StepType::Skill, "missing").is_none());
        assert!(registry.get(StepType::Tool, "echo").is_none());
    }
}
