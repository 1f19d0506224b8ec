//! Event records emitted by the orchestrator and the agent wrappers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::AgentRole;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionStarted,
    PlannerCall,
    WorkerCall,
    ReviewerCall,
    BudgetWarning,
    Escalation,
    SessionEnded,
}

impl EventKind {
    /// Event kind for a completed call by `role`.
    pub fn for_role(role: AgentRole) -> Self {
        match role {
            AgentRole::Planner => Self::PlannerCall,
            AgentRole::Worker => Self::WorkerCall,
            AgentRole::Reviewer => Self::ReviewerCall,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SessionStarted => "session_started",
            Self::PlannerCall => "planner_call",
            Self::WorkerCall => "worker_call",
            Self::ReviewerCall => "reviewer_call",
            Self::BudgetWarning => "budget_warning",
            Self::Escalation => "escalation",
            Self::SessionEnded => "session_ended",
        };
        f.write_str(s)
    }
}

/// One structured, append-only event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub event_type: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AgentRole>,
    /// Completed cycles when the event was emitted.
    pub round: u32,
    /// Tokens consumed by the call this event describes, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    /// Session total after this event.
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl SessionEvent {
    pub fn new(kind: EventKind, session_id: impl Into<String>, round: u32, total_tokens: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.into(),
            event_type: kind,
            role: None,
            round,
            tokens: None,
            total_tokens,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_role(mut self, role: AgentRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
