//! Worker: executes the current plan, revising against reviewer feedback.

use coordination::{AgentRole, Session};
use tracing::info;

use super::{AgentCall, AgentKit};
use crate::errors::{AgentError, ContractViolation};
use crate::prompts::{worker_prompt, WORKER_PREAMBLE};

pub(crate) async fn run(kit: &AgentKit, session: &mut Session) -> Result<AgentCall, AgentError> {
    let plan = session.current_plan().ok_or(ContractViolation::NoPlan)?;

    let history = session
        .history()
        .has_attempts()
        .then(|| session.history().retrospective());
    // Feedback only applies to a revision against the same plan.
    let feedback = if session.worker_attempts() > 0 {
        session.latest_verdict().map(|v| v.feedback.as_str())
    } else {
        None
    };
    let prompt = worker_prompt(session.task(), plan, history.as_deref(), feedback);

    let response = kit
        .complete(AgentRole::Worker, WORKER_PREAMBLE, prompt)
        .await?;
    let usage = response.usage();
    session.record_work(response.text, usage);

    info!(
        session = %session.id(),
        plan_version = session.plan_version(),
        attempt = session.worker_attempts(),
        tokens = usage.total(),
        "Worker produced result"
    );
    Ok(AgentCall {
        role: AgentRole::Worker,
        usage,
    })
}
