//! Tracing setup and the end-of-session report.
//!
//! The report is what a caller (or a human on call) reads when a session
//! ends: status, why it stopped, how much of each limit it used, and what to
//! do next when it failed.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use coordination::{Session, SessionOutcome, SessionState, TokenPricing};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::prompts::PROMPT_VERSION;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .try_init();
}

/// Summary of a finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub task: String,
    pub status: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub iterations: u32,
    pub max_iterations: u32,
    pub tokens_used: u64,
    pub max_tokens: u64,
    pub plan_version: u32,
    pub replans: u32,
    pub agent_calls: usize,
    pub estimated_cost_usd: f64,
    pub prompt_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionReport {
    pub fn from_session(session: &Session, pricing: &TokenPricing) -> Self {
        let outcome = session.outcome();
        Self {
            session_id: session.id().to_string(),
            task: session.task().to_string(),
            status: outcome.status,
            reason: session.failure_reason().map(str::to_string),
            result: outcome.result,
            iterations: session.iteration(),
            max_iterations: session.limits().max_iterations,
            tokens_used: session.tokens_used(),
            max_tokens: session.limits().max_tokens,
            plan_version: session.plan_version(),
            replans: session.replans(),
            agent_calls: session.history().len(),
            estimated_cost_usd: session.budget().estimated_cost(pricing),
            prompt_version: PROMPT_VERSION.to_string(),
            started_at: session.created_at(),
            finished_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == SessionState::Succeeded
    }

    pub fn outcome(&self) -> SessionOutcome {
        SessionOutcome {
            status: self.status,
            result: self.result.clone(),
        }
    }

    /// What a human should do next, for failed sessions.
    pub fn recommendation(&self) -> Option<&'static str> {
        match self.status {
            SessionState::FailedBudget => {
                Some("raise the token budget or narrow the task, then rerun")
            }
            SessionState::FailedIterations => {
                Some("raise the iteration limit or split the task into smaller pieces")
            }
            SessionState::FailedQuality => Some(
                "revise the task description or review the rejected attempts and finish manually",
            ),
            SessionState::Aborted => {
                Some("inspect the error and the session event log before retrying")
            }
            _ => None,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session {}: {}", self.session_id, self.status)?;
        writeln!(
            f,
            "  Iterations: {}/{} | Tokens: {}/{} | Plan version: {} | Est. cost: ${:.6}",
            self.iterations,
            self.max_iterations,
            self.tokens_used,
            self.max_tokens,
            self.plan_version,
            self.estimated_cost_usd
        )?;
        if let Some(reason) = &self.reason {
            writeln!(f, "  Reason: {reason}")?;
        }
        if let Some(next) = self.recommendation() {
            writeln!(f, "  Human escalation required: {next}")?;
        }
        if let Some(result) = &self.result {
            writeln!(f, "  Result:")?;
            for line in result.lines() {
                writeln!(f, "    {line}")?;
            }
        }
        Ok(())
    }
}
