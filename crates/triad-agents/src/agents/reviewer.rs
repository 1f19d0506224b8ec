//! Reviewer: judges the latest worker result with a strict JSON verdict.

use coordination::{AgentRole, Session, Verdict};
use serde::Deserialize;
use tracing::{info, warn};

use super::{AgentCall, AgentKit};
use crate::errors::{AgentError, ContractViolation};
use crate::prompts::{reviewer_prompt, REVIEWER_PREAMBLE};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct VerdictReply {
    approved: bool,
    feedback: String,
}

/// Parse a reviewer reply of the form `{"approved": bool, "feedback": "..."}`.
///
/// A single surrounding markdown code fence is tolerated; anything else is
/// rejected with the parse error text.
pub fn parse_verdict(raw: &str) -> Result<Verdict, String> {
    let body = strip_code_fence(raw.trim());
    let reply: VerdictReply = serde_json::from_str(body).map_err(|e| e.to_string())?;
    Ok(Verdict {
        approved: reply.approved,
        feedback: reply.feedback,
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

pub(crate) async fn run(kit: &AgentKit, session: &mut Session) -> Result<AgentCall, AgentError> {
    let result = session.latest_result().ok_or(ContractViolation::NoResult)?;
    let prompt = reviewer_prompt(session.task(), result);

    let response = kit
        .complete(AgentRole::Reviewer, REVIEWER_PREAMBLE, prompt)
        .await?;
    let usage = response.usage();

    match parse_verdict(&response.text) {
        Ok(verdict) => {
            info!(
                session = %session.id(),
                attempt = session.worker_attempts(),
                approved = verdict.approved,
                tokens = usage.total(),
                "Review complete"
            );
            session.record_review(&response.text, Some(verdict), usage);
            Ok(AgentCall {
                role: AgentRole::Reviewer,
                usage,
            })
        }
        Err(reason) => {
            warn!(session = %session.id(), %reason, "Reviewer reply is not a valid verdict");
            session.record_review(&response.text, None, usage);
            Err(AgentError::MalformedVerdict {
                reason,
                raw: response.text,
            })
        }
    }
}
