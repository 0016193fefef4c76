//! Allen: a multi-agent execution runtime.
//!
//! Autonomous agents — LLM- or human-driven — collaborate on user-submitted
//! tasks. Each agent plans, reflects, and invokes external tools
//! independently; this crate is the core that coordinates their concurrent
//! execution: the four-level state model (`Task` → `Stage` → `Step`, plus
//! per-agent state), the per-agent action loop, the executor router, the
//! state synchronizer, the inter-agent message dispatcher, and the tool
//! client multiplexer.
//!
//! ```text
//!                      ┌────────────────────┐
//!                      │   Mas (system)     │
//!                      └─────────┬──────────┘
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!   ┌──────────────────┐ ┌───────────────┐  ┌───────────────────┐
//!   │ AgentRegistry     │ │ SyncState     │  │ ToolClient         │
//!   │ (agent/)          │ │ (sync/)       │  │ (toolclient/)      │
//!   └────────┬──────────┘ └───────┬───────┘  └────────────────────┘
//!            │ one worker/agent   │ owns Task/Stage
//!            ▼                    │
//!   ┌──────────────────┐          │
//!   │ AgentRunner        │──execute_output──▶│
//!   │  Router → Executor │                   │
//!   └──────────────────┘                     ▼
//!                                     ┌───────────────┐
//!                                     │ Dispatcher     │
//!                                     │ (dispatch/)    │
//!                                     └───────────────┘
//! ```
//!
//! Skill/tool prompt content, the LLM HTTP client, and the dashboard's
//! REST/WebSocket surface are external collaborators — out of scope here;
//! this crate exposes the accessors and hooks they plug into.

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod state;
pub mod sync;
pub mod system;
pub mod toolclient;

pub use error::AllenError;
pub use system::Mas;
