//! The Router: resolves a step to a concrete executor (spec.md §4.1).

use std::sync::Arc;

use thiserror::Error;

use crate::state::StepType;

use super::contract::Executor;
use super::registry::ExecutorRegistry;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("router/unknown-executor: no executor for ({0:?}, {1})")]
    UnknownExecutor(StepType, String),
}

/// Given `(type, name)`, returns a ready executor. Holds only a shared
/// reference to the immutable registry, so routing itself never blocks.
#[derive(Clone)]
pub struct Router {
    registry: Arc<ExecutorRegistry>,
}

impl Router {
    pub fn new(registry: Arc<ExecutorRegistry>) -> Self {
        Self { registry }
    }

    pub fn resolve(&self, step_type: StepType, name: &str) -> Result<Arc<dyn Executor>, RouterError> {
        self.registry
            .get(step_type, name)
            .ok_or_else(|| RouterError::UnknownExecutor(step_type, name.to_string()))
    }
}
