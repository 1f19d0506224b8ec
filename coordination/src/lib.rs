//! Coordination core for the planner → worker → reviewer loop.
//!
//! This crate provides the deterministic, LLM-free half of the system:
//! - The typed [`Session`] record and its state machine
//! - Append-only agent history and retrospective rendering
//! - Token budget tracking with an inclusive ceiling gate
//! - The escalation ladder (revise → re-plan → give up)
//! - A retry-once policy for transient agent-call failures
//! - Write-only structured event sinks
//!
//! Agent wrappers and the orchestrator loop live in `triad-agents`.

#![allow(clippy::uninlined_format_args)]

pub mod budget;
pub mod escalation;
pub mod events;
pub mod history;
pub mod resilience;
pub mod session;
pub mod state_machine;

// Re-export key session types
pub use session::{Session, SessionLimits, SessionOutcome, Verdict};
pub use state_machine::{IllegalTransition, SessionState, StateMachine, TransitionRecord};

// Re-export history types
pub use history::{AgentRole, HistoryEntry, HistoryLog};

// Re-export budget types
pub use budget::{BudgetCheck, BudgetTracker, TokenLedger, TokenPricing, TokenUsage};

// Re-export escalation types
pub use escalation::{EscalationLadder, EscalationPolicy, EscalationStep};

// Re-export resilience types
pub use resilience::{classify_message, FailureClass, Retryable, RetryPolicy};

// Re-export event types
pub use events::{
    EventKind, EventSink, JsonlEventSink, MemoryEventSink, NullEventSink, SessionEvent,
};
