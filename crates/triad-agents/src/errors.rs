//! Error taxonomy for agent calls and the orchestration loop.
//!
//! Only [`AgentError::Completion`] can be transient; the retry policy has
//! already spent its single retry by the time one reaches the orchestrator.
//! Everything here ends the session in `Aborted`. Budget, iteration and
//! quality exhaustion are session statuses, not errors.

use coordination::{AgentRole, IllegalTransition, Retryable};
use thiserror::Error;

use crate::client::CompletionError;

/// An agent was invoked before its inputs existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("worker invoked before any plan exists")]
    NoPlan,

    #[error("reviewer invoked before any worker result exists")]
    NoResult,
}

/// Unified error type for agent dispatch and orchestration.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{role} completion failed: {source}")]
    Completion {
        role: AgentRole,
        source: CompletionError,
    },

    #[error("Contract violation: {0}")]
    Contract(#[from] ContractViolation),

    /// The reviewer reply was not the required JSON verdict.
    #[error("Malformed reviewer verdict: {reason}")]
    MalformedVerdict { reason: String, raw: String },

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

impl AgentError {
    pub fn completion(role: AgentRole, source: CompletionError) -> Self {
        Self::Completion { role, source }
    }

    /// Whether the underlying failure was classified as transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Completion { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Role whose call failed, when there is one.
    pub fn role(&self) -> Option<AgentRole> {
        match self {
            Self::Completion { role, .. } => Some(*role),
            Self::Contract(ContractViolation::NoPlan) => Some(AgentRole::Worker),
            Self::Contract(ContractViolation::NoResult) => Some(AgentRole::Reviewer),
            Self::MalformedVerdict { .. } => Some(AgentRole::Reviewer),
            Self::IllegalTransition(_) => None,
        }
    }
}
