//! Orchestrator: the planner → worker → reviewer loop.
//!
//! ```text
//! Planning ──plan──▶ ┌─────────── gates ───────────┐
//!                    │ budget (inclusive) ─▶ FailedBudget
//!                    │ iterations         ─▶ FailedIterations
//!                    └──────────────┬──────────────┘
//!                                   ▼
//!                 Working ──▶ Reviewing ──approved──▶ Succeeded
//!                    ▲            │
//!                    │  revise    │ rejected
//!                    ├────────────┤
//!                    │  re-plan   ▼
//!                    └──────── Escalating
//!                                 │ give up
//!                                 ▼
//!                           FailedQuality
//! ```
//!
//! One session is driven strictly sequentially; the only suspension points
//! are the completion calls and the retry backoff. Any agent error moves the
//! session to `Aborted` and is returned to the caller.

use std::sync::Arc;

use anyhow::Result;
use coordination::{
    AgentRole, BudgetCheck, EscalationLadder, EscalationPolicy, EscalationStep, EventKind,
    EventSink, JsonlEventSink, NullEventSink, RetryPolicy, Session, SessionEvent, SessionLimits,
    SessionState, TokenLedger, TokenPricing,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::agents::{AgentCall, AgentKit};
use crate::client::{CompletionClient, OpenAiCompatClient};
use crate::config::{RoleTemperatures, TriadConfig};
use crate::errors::AgentError;
use crate::telemetry::SessionReport;

/// Drives sessions to a terminal state.
pub struct Orchestrator {
    kit: AgentKit,
    limits: SessionLimits,
    ladder: EscalationLadder,
    sink: Arc<dyn EventSink>,
    pricing: TokenPricing,
    ledger: Option<Arc<TokenLedger>>,
}

impl Orchestrator {
    /// Orchestrator with default escalation policy and no event sink.
    pub fn new(client: Arc<dyn CompletionClient>, limits: SessionLimits) -> Self {
        Self {
            kit: AgentKit::new(client, RetryPolicy::new(limits.retry_backoff())),
            limits,
            ladder: EscalationLadder::new(),
            sink: Arc::new(NullEventSink),
            pricing: TokenPricing::default(),
            ledger: None,
        }
    }

    /// Build the production stack: HTTP client plus JSONL event log.
    pub fn from_config(config: &TriadConfig) -> Result<Self> {
        let client = OpenAiCompatClient::new(&config.endpoint)?;
        let mut orchestrator = Self::new(Arc::new(client), config.limits)
            .with_escalation(config.escalation)
            .with_temperatures(config.temperatures)
            .with_pricing(config.pricing);
        if let Some(path) = &config.event_log {
            orchestrator = orchestrator.with_event_sink(Arc::new(JsonlEventSink::new(path)?));
        }
        Ok(orchestrator)
    }

    pub fn with_escalation(mut self, policy: EscalationPolicy) -> Self {
        self.ladder = EscalationLadder::with_policy(policy);
        self
    }

    pub fn with_temperatures(mut self, temperatures: RoleTemperatures) -> Self {
        self.kit = self.kit.with_temperatures(temperatures);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_pricing(mut self, pricing: TokenPricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Report every session's usage to a shared ledger as well.
    pub fn with_ledger(mut self, ledger: Arc<TokenLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    pub fn escalation_policy(&self) -> &EscalationPolicy {
        self.ladder.policy()
    }

    /// Fresh session bound to this orchestrator's limits (and ledger, if any).
    pub fn new_session(&self, task: impl Into<String>) -> Session {
        let session = Session::new(task, self.limits);
        match &self.ledger {
            Some(ledger) => session.with_ledger(Arc::clone(ledger)),
            None => session,
        }
    }

    /// Run one task end to end.
    ///
    /// On error the session is dropped with the error. Callers that want the
    /// `Aborted` report (and its recommendation) should use [`Self::new_session`]
    /// and [`Self::drive`], then build [`SessionReport::from_session`].
    pub async fn run(&self, task: &str) -> Result<SessionReport, AgentError> {
        let mut session = self.new_session(task);
        self.drive(&mut session).await?;
        Ok(SessionReport::from_session(&session, &self.pricing))
    }

    /// Drive `session` until it reaches a terminal state.
    ///
    /// Returns the terminal status. On error the session is left in
    /// `Aborted` and the error is returned.
    pub async fn drive(&self, session: &mut Session) -> Result<SessionState, AgentError> {
        if session.status().is_terminal() {
            return Ok(session.status());
        }

        info!(
            session = %session.id(),
            max_iterations = session.limits().max_iterations,
            max_tokens = session.limits().max_tokens,
            "Session started"
        );
        self.emit(
            SessionEvent::new(EventKind::SessionStarted, session.id(), session.iteration(), 0)
                .with_payload(json!({ "task": session.task() })),
        );

        let outcome = self.run_loop(session).await;

        if let Err(err) = &outcome {
            error!(session = %session.id(), error = %err, "Session aborted");
            if !session.status().is_terminal() {
                if let Err(e) = session.advance(SessionState::Aborted, Some(&err.to_string())) {
                    warn!(session = %session.id(), error = %e, "Could not mark session aborted");
                }
            }
        }

        self.emit(
            SessionEvent::new(
                EventKind::SessionEnded,
                session.id(),
                session.iteration(),
                session.tokens_used(),
            )
            .with_payload(json!({
                "status": session.status().as_str(),
                "reason": session.failure_reason(),
                "plan_version": session.plan_version(),
                "cost_usd": session.budget().estimated_cost(&self.pricing),
            })),
        );

        outcome
    }

    async fn run_loop(&self, session: &mut Session) -> Result<SessionState, AgentError> {
        if session.current_plan().is_none() {
            self.call(AgentRole::Planner, session).await?;
        }

        loop {
            match session.budget().check() {
                BudgetCheck::Exhausted { used, max } => {
                    return self.finish(
                        session,
                        SessionState::FailedBudget,
                        format!("token budget exhausted: {used}/{max}"),
                    );
                }
                BudgetCheck::Warning { used, max } => {
                    warn!(session = %session.id(), used, max, "Token budget nearly exhausted");
                    self.emit(
                        SessionEvent::new(EventKind::BudgetWarning, session.id(), session.iteration(), used)
                            .with_payload(json!({ "max_tokens": max })),
                    );
                }
                _ => {}
            }

            let max_iterations = session.limits().max_iterations;
            if session.iteration() >= max_iterations {
                return self.finish(
                    session,
                    SessionState::FailedIterations,
                    format!("iteration limit reached: {max_iterations}"),
                );
            }

            session.advance(SessionState::Working, None)?;
            self.call(AgentRole::Worker, session).await?;
            session.advance(SessionState::Reviewing, None)?;
            self.call(AgentRole::Reviewer, session).await?;
            session.complete_cycle();

            if session.latest_verdict().is_some_and(|v| v.approved) {
                return self.finish(
                    session,
                    SessionState::Succeeded,
                    format!("approved on attempt {}", session.worker_attempts()),
                );
            }

            match self
                .ladder
                .decide(session.worker_attempts(), session.replans())
            {
                EscalationStep::Revise => {
                    info!(
                        session = %session.id(),
                        attempt = session.worker_attempts(),
                        "Rejected, revising against current plan"
                    );
                }
                EscalationStep::Replan => {
                    let reason = format!(
                        "{} rejected attempts on plan v{}",
                        session.worker_attempts(),
                        session.plan_version()
                    );
                    info!(session = %session.id(), %reason, "Escalating to re-plan");
                    session.advance(SessionState::Escalating, Some(&reason))?;
                    self.emit(
                        SessionEvent::new(
                            EventKind::Escalation,
                            session.id(),
                            session.iteration(),
                            session.tokens_used(),
                        )
                        .with_payload(json!({
                            "plan_version": session.plan_version(),
                            "worker_attempts": session.worker_attempts(),
                        })),
                    );
                    self.call(AgentRole::Planner, session).await?;
                }
                EscalationStep::GiveUp { attempts } => {
                    return self.finish(
                        session,
                        SessionState::FailedQuality,
                        format!(
                            "{attempts} rejected attempts on plan v{}",
                            session.plan_version()
                        ),
                    );
                }
            }
        }
    }

    /// Dispatch one agent and emit its event, including for a malformed verdict.
    async fn call(&self, role: AgentRole, session: &mut Session) -> Result<AgentCall, AgentError> {
        let outcome = self.kit.dispatch(role, session).await;

        let recorded = match &outcome {
            Ok(_) => true,
            Err(AgentError::MalformedVerdict { .. }) => true,
            Err(_) => false,
        };
        if recorded {
            if let Some(entry) = session.history().last() {
                let mut payload = json!({ "round": entry.round });
                if let Some(approved) = entry.approved {
                    payload["approved"] = json!(approved);
                }
                if outcome.is_err() {
                    payload["malformed_verdict"] = json!(true);
                }
                self.emit(
                    SessionEvent::new(
                        EventKind::for_role(role),
                        session.id(),
                        session.iteration(),
                        session.tokens_used(),
                    )
                    .with_role(role)
                    .with_tokens(entry.tokens)
                    .with_payload(payload),
                );
            }
        }

        outcome
    }

    fn finish(
        &self,
        session: &mut Session,
        status: SessionState,
        reason: String,
    ) -> Result<SessionState, AgentError> {
        session.advance(status, Some(&reason))?;
        if status == SessionState::Succeeded {
            info!(
                session = %session.id(),
                iterations = session.iteration(),
                tokens = session.tokens_used(),
                "Session succeeded"
            );
        } else {
            warn!(
                session = %session.id(),
                status = %status,
                %reason,
                iterations = session.iteration(),
                tokens = session.tokens_used(),
                "Session failed, human escalation required"
            );
        }
        Ok(status)
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.sink.emit(&event) {
            warn!(event = %event.event_type, error = %e, "Failed to write session event");
        }
    }
}
