//! The agent registry and per-agent action loop (spec.md §4.3).

pub mod registry;
pub mod runner;

pub use registry::{AgentHandle, AgentRegistry};
pub use runner::{receive_message, AgentRunner};
