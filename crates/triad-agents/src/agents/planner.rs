//! Planner: turns the task (and, when re-planning, the full history) into a plan.

use coordination::{AgentRole, Session};
use tracing::info;

use super::{AgentCall, AgentKit};
use crate::errors::AgentError;
use crate::prompts::{planner_prompt, PLANNER_PREAMBLE};

pub(crate) async fn run(kit: &AgentKit, session: &mut Session) -> Result<AgentCall, AgentError> {
    let history = (session.plan_version() > 0).then(|| session.history().retrospective());
    let prompt = planner_prompt(session.task(), history.as_deref());

    let response = kit
        .complete(AgentRole::Planner, PLANNER_PREAMBLE, prompt)
        .await?;
    let usage = response.usage();
    session.record_plan(response.text, usage);

    info!(
        session = %session.id(),
        plan_version = session.plan_version(),
        tokens = usage.total(),
        "Plan created"
    );
    Ok(AgentCall {
        role: AgentRole::Planner,
        usage,
    })
}
