//! Planner / worker / reviewer agents over an OpenAI-compatible completion
//! endpoint, and the orchestrator that drives them.
//!
//! The deterministic pieces (session record, state machine, budget gate,
//! escalation ladder, retry policy, event sinks) live in `coordination`.

pub mod agents;
pub mod client;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod prompts;
pub mod telemetry;

pub use agents::{parse_verdict, AgentCall, AgentKit};
pub use client::{
    ChatMessage, CompletionClient, CompletionError, CompletionRequest, CompletionResponse,
    OpenAiCompatClient,
};
pub use config::{EndpointConfig, RoleTemperatures, TriadConfig};
pub use errors::{AgentError, ContractViolation};
pub use orchestrator::Orchestrator;
pub use telemetry::{init_tracing, SessionReport};
