//! Session: the typed record one orchestration run mutates.
//!
//! All fields are private. Writes go through the `record_*` methods, each of
//! which appends exactly one history entry and adds the call's token usage in
//! the same step, and through [`Session::advance`], which only accepts legal
//! state transitions. This keeps the session invariants mechanically true:
//!
//! - `worker_attempts` resets to 0 exactly when `plan_version` increments.
//! - `tokens_used` only grows and equals the sum of recorded usages.
//! - `history.len()` equals the number of recorded agent calls, in order.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::budget::{BudgetTracker, TokenLedger, TokenUsage, DEFAULT_WARN_RATIO};
use crate::history::{AgentRole, HistoryEntry, HistoryLog};
use crate::resilience::DEFAULT_RETRY_BACKOFF;
use crate::state_machine::{IllegalTransition, SessionState, StateMachine, TransitionRecord};

/// Per-session limits, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionLimits {
    /// Maximum completed worker→reviewer cycles.
    pub max_iterations: u32,
    /// Token ceiling across all agent calls (inclusive).
    pub max_tokens: u64,
    /// Wait before the single retry of a transient failure, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Fraction of `max_tokens` that triggers a budget warning.
    pub warn_ratio: f64,
}

impl SessionLimits {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_tokens: 50_000,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF.as_millis() as u64,
            warn_ratio: DEFAULT_WARN_RATIO,
        }
    }
}

/// Reviewer decision for the latest result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub approved: bool,
    pub feedback: String,
}

/// What a finished session hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub status: SessionState,
    /// The approved worker result; `None` for every failure status.
    pub result: Option<String>,
}

impl SessionOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == SessionState::Succeeded
    }
}

/// One end-to-end orchestration run for a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: String,
    task: String,
    limits: SessionLimits,
    plan_version: u32,
    current_plan: Option<String>,
    replans: u32,
    worker_attempts: u32,
    latest_result: Option<String>,
    latest_verdict: Option<Verdict>,
    history: HistoryLog,
    budget: BudgetTracker,
    iteration: u32,
    machine: StateMachine,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Create a session with every counter zeroed, in `Planning`.
    pub fn new(task: impl Into<String>, limits: SessionLimits) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task: task.into(),
            limits,
            plan_version: 0,
            current_plan: None,
            replans: 0,
            worker_attempts: 0,
            latest_result: None,
            latest_verdict: None,
            history: HistoryLog::new(),
            budget: BudgetTracker::new(limits.max_tokens, limits.warn_ratio),
            iteration: 0,
            machine: StateMachine::new(),
            created_at: Utc::now(),
        }
    }

    /// Report this session's usage to a process-wide ledger as well.
    pub fn with_ledger(mut self, ledger: Arc<TokenLedger>) -> Self {
        self.budget = self.budget.with_ledger(ledger);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    pub fn plan_version(&self) -> u32 {
        self.plan_version
    }

    pub fn current_plan(&self) -> Option<&str> {
        self.current_plan.as_deref()
    }

    /// Re-plans performed so far (plans beyond the first).
    pub fn replans(&self) -> u32 {
        self.replans
    }

    pub fn worker_attempts(&self) -> u32 {
        self.worker_attempts
    }

    pub fn latest_result(&self) -> Option<&str> {
        self.latest_result.as_deref()
    }

    pub fn latest_verdict(&self) -> Option<&Verdict> {
        self.latest_verdict.as_ref()
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    pub fn tokens_used(&self) -> u64 {
        self.budget.tokens_used()
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn status(&self) -> SessionState {
        self.machine.current()
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        self.machine.transitions()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Move to `to` if the edge is legal.
    ///
    /// `Succeeded` additionally requires the latest recorded verdict to be an
    /// approval; without one the call is rejected like any illegal edge and
    /// the status is left unchanged.
    pub fn advance(&mut self, to: SessionState, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if to == SessionState::Succeeded && !self.latest_verdict.as_ref().is_some_and(|v| v.approved) {
            return Err(IllegalTransition {
                from: self.status(),
                to,
            });
        }
        self.machine.advance(to, self.iteration, reason)
    }

    /// Record a planner call: new plan, version bump, attempt counter reset.
    pub fn record_plan(&mut self, plan: String, usage: TokenUsage) {
        if self.current_plan.is_some() {
            self.replans += 1;
        }
        self.plan_version += 1;
        self.worker_attempts = 0;
        self.history.append(HistoryEntry::new(
            AgentRole::Planner,
            self.plan_version,
            self.iteration,
            &plan,
            usage.total(),
        ));
        self.current_plan = Some(plan);
        self.budget.record(usage);
    }

    /// Record a worker call against the current plan.
    pub fn record_work(&mut self, result: String, usage: TokenUsage) {
        self.worker_attempts += 1;
        self.history.append(HistoryEntry::new(
            AgentRole::Worker,
            self.worker_attempts,
            self.iteration,
            &result,
            usage.total(),
        ));
        self.latest_result = Some(result);
        self.budget.record(usage);
    }

    /// Record a reviewer call.
    ///
    /// `verdict` is `None` when the reply could not be parsed; the raw reply
    /// is still logged and its tokens still counted.
    pub fn record_review(&mut self, raw: &str, verdict: Option<Verdict>, usage: TokenUsage) {
        let entry = match &verdict {
            Some(v) => HistoryEntry::new(
                AgentRole::Reviewer,
                self.worker_attempts,
                self.iteration,
                &v.feedback,
                usage.total(),
            )
            .with_approval(v.approved),
            None => HistoryEntry::new(
                AgentRole::Reviewer,
                self.worker_attempts,
                self.iteration,
                raw,
                usage.total(),
            ),
        };
        self.history.append(entry);
        if verdict.is_some() {
            self.latest_verdict = verdict;
        }
        self.budget.record(usage);
    }

    /// Mark one worker→reviewer cycle complete.
    ///
    /// Only counts while the session is `Reviewing`; returns whether the
    /// iteration counter moved.
    pub fn complete_cycle(&mut self) -> bool {
        if self.status() != SessionState::Reviewing {
            return false;
        }
        self.iteration += 1;
        true
    }

    /// Final outcome; the result is only exposed on success.
    pub fn outcome(&self) -> SessionOutcome {
        let status = self.status();
        SessionOutcome {
            status,
            result: if status == SessionState::Succeeded {
                self.latest_result.clone()
            } else {
                None
            },
        }
    }

    /// Reason attached to the terminal transition, if the session failed.
    pub fn failure_reason(&self) -> Option<&str> {
        if self.status().is_failure() {
            self.machine.last_reason()
        } else {
            None
        }
    }

    /// Persist the full session as pretty JSON for audit.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing session")?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }

    /// Load a session previously written by [`Session::save_json`].
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing session {}", path.display()))
    }
}
