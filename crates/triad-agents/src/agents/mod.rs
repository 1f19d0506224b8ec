//! Agent wrappers for the planner → worker → reviewer triad.
//!
//! Each role is one async function over `&mut Session`. [`AgentKit`] holds
//! the shared completion client, retry policy and per-role temperatures and
//! dispatches on the closed [`AgentRole`] enum.

pub mod planner;
pub mod reviewer;
pub mod worker;

use std::sync::Arc;

use coordination::{AgentRole, RetryPolicy, Session, TokenUsage};

use crate::client::{ChatMessage, CompletionClient, CompletionRequest, CompletionResponse};
use crate::config::RoleTemperatures;
use crate::errors::AgentError;

pub use reviewer::parse_verdict;

/// Result of one successful agent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentCall {
    pub role: AgentRole,
    pub usage: TokenUsage,
}

/// Everything an agent needs besides the session.
#[derive(Clone)]
pub struct AgentKit {
    client: Arc<dyn CompletionClient>,
    retry: RetryPolicy,
    temperatures: RoleTemperatures,
}

impl AgentKit {
    pub fn new(client: Arc<dyn CompletionClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            temperatures: RoleTemperatures::default(),
        }
    }

    pub fn with_temperatures(mut self, temperatures: RoleTemperatures) -> Self {
        self.temperatures = temperatures;
        self
    }

    /// Run the agent for `role` against the session.
    pub async fn dispatch(
        &self,
        role: AgentRole,
        session: &mut Session,
    ) -> Result<AgentCall, AgentError> {
        match role {
            AgentRole::Planner => planner::run(self, session).await,
            AgentRole::Worker => worker::run(self, session).await,
            AgentRole::Reviewer => reviewer::run(self, session).await,
        }
    }

    /// One completion call under the retry policy.
    async fn complete(
        &self,
        role: AgentRole,
        system: &str,
        user: String,
    ) -> Result<CompletionResponse, AgentError> {
        let request = CompletionRequest {
            role,
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: self.temperatures.for_role(role),
        };
        let client = &self.client;
        self.retry
            .execute(role.as_str(), || client.complete(&request))
            .await
            .map_err(|source| AgentError::completion(role, source))
    }
}

impl std::fmt::Debug for AgentKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentKit")
            .field("retry", &self.retry)
            .field("temperatures", &self.temperatures)
            .finish_non_exhaustive()
    }
}
