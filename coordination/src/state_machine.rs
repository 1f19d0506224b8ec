//! Session State Machine: explicit states and legal transition guards.
//!
//! Provides a typed state model for the planner → worker → reviewer loop so that:
//! 1. Every state transition is auditable and logged.
//! 2. Illegal transitions are rejected by `advance()` instead of silently applied.
//! 3. Offline replay can reconstruct the exact sequence of states.
//!
//! The orchestrator never writes the state directly; it calls
//! [`Session::advance`](crate::session::Session::advance), which delegates here.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The set of session states.
///
/// Every session starts at `Planning` and terminates at `Succeeded`, one of
/// the `Failed*` states, or `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Planner is producing the first plan.
    Planning,
    /// Worker is executing the current plan.
    Working,
    /// Reviewer is judging the latest result.
    Reviewing,
    /// Planner is re-planning after repeated rejections.
    Escalating,
    /// Reviewer approved the result, terminal.
    Succeeded,
    /// Token ceiling reached, terminal.
    FailedBudget,
    /// Escalation ladder exhausted, terminal.
    FailedQuality,
    /// Iteration ceiling reached, terminal.
    FailedIterations,
    /// Non-transient agent failure or contract violation, terminal.
    Aborted,
}

impl SessionState {
    /// Whether this is a terminal state (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::FailedBudget
                | Self::FailedQuality
                | Self::FailedIterations
                | Self::Aborted
        )
    }

    /// Whether this is a terminal failure a human may need to look at.
    pub fn is_failure(self) -> bool {
        self.is_terminal() && self != Self::Succeeded
    }

    /// Stable snake_case label used in event records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Working => "working",
            Self::Reviewing => "reviewing",
            Self::Escalating => "escalating",
            Self::Succeeded => "succeeded",
            Self::FailedBudget => "failed_budget",
            Self::FailedQuality => "failed_quality",
            Self::FailedIterations => "failed_iterations",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "Planning"),
            Self::Working => write!(f, "Working"),
            Self::Reviewing => write!(f, "Reviewing"),
            Self::Escalating => write!(f, "Escalating"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::FailedBudget => write!(f, "FailedBudget"),
            Self::FailedQuality => write!(f, "FailedQuality"),
            Self::FailedIterations => write!(f, "FailedIterations"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Legal transitions between session states.
///
/// ```text
/// Planning   → Working | FailedBudget | FailedIterations
/// Working    → Reviewing
/// Reviewing  → Working | Escalating | Succeeded
///            | FailedQuality | FailedBudget | FailedIterations
/// Escalating → Working | FailedBudget | FailedIterations
/// ```
/// Any non-terminal state may additionally move to `Aborted`.
fn is_legal_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;

    if to == Aborted && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Planning, Working)
            | (Planning, FailedBudget)
            | (Planning, FailedIterations)
            | (Working, Reviewing)
            // Rejected review: revise, re-plan or give up; gates may also fire
            | (Reviewing, Working)
            | (Reviewing, Escalating)
            | (Reviewing, Succeeded)
            | (Reviewing, FailedQuality)
            | (Reviewing, FailedBudget)
            | (Reviewing, FailedIterations)
            // New plan in hand: back to work unless a gate fires first
            | (Escalating, Working)
            | (Escalating, FailedBudget)
            | (Escalating, FailedIterations)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The state transitioned from.
    pub from: SessionState,
    /// The state transitioned to.
    pub to: SessionState,
    /// Completed cycles at the time of transition.
    pub iteration: u32,
    /// Wall-clock time of the transition.
    pub at: DateTime<Utc>,
    /// Optional context about why this transition happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Illegal state transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// The session state machine.
///
/// Tracks the current state, enforces legal transitions, and keeps the
/// full transition log for replay and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachine {
    current: SessionState,
    transitions: Vec<TransitionRecord>,
}

impl StateMachine {
    /// Create a new state machine starting at `Planning`.
    pub fn new() -> Self {
        Self {
            current: SessionState::Planning,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> SessionState {
        self.current
    }

    /// Attempt to advance to the next state.
    ///
    /// Returns `Err(IllegalTransition)` if the edge is not in the state graph;
    /// the current state is left untouched in that case.
    pub fn advance(
        &mut self,
        to: SessionState,
        iteration: u32,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            iteration,
            "State transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            iteration,
            at: Utc::now(),
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Get the full transition log.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Reason attached to the most recent transition, if any.
    pub fn last_reason(&self) -> Option<&str> {
        self.transitions.last().and_then(|t| t.reason.as_deref())
    }

    /// One-line summary of the path taken, e.g. `Planning → Succeeded [Working → Reviewing → Succeeded]`.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut out = format!(
            "{} → {} ({} transitions)",
            SessionState::Planning,
            self.current,
            self.transitions.len()
        );
        if !states.is_empty() {
            out.push_str(&format!(" [{}]", states.join(" → ")));
        }
        out
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
