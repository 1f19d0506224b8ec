//! System prompts and user-prompt builders for each agent role.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content changes
//! so logged sessions can be tied to the prompt that produced them.

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.1.0";

pub const PLANNER_PREAMBLE: &str = "\
You are a Planner agent. Your job is to break down complex tasks into clear, \
executable step-by-step plans.

Create a detailed plan that a Worker agent can follow. Be specific about what \
needs to be done at each step.

Return ONLY the plan as a numbered list. Example:
1. First step description
2. Second step description
3. Third step description";

pub const WORKER_PREAMBLE: &str = "\
You are a Worker agent. Your job is to execute the given plan and produce the \
requested output.

Execute ALL steps in the plan. Be thorough and complete. Produce the final deliverable.

If you are revising based on feedback, address ALL the issues mentioned.";

pub const REVIEWER_PREAMBLE: &str = "\
You are a Reviewer agent. Your job is to review the Worker's output against \
the original task requirements.

Provide honest, constructive feedback. Be specific about what needs improvement.

Reply with a single JSON object and nothing else:
{\"approved\": true | false, \"feedback\": \"<what is good and what must change>\"}

If approving, explain why it meets the requirements.
If rejecting, be specific about what needs to be fixed.";

/// User prompt for the planner. `history` is set when re-planning.
pub fn planner_prompt(task: &str, history: Option<&str>) -> String {
    let mut prompt = format!("TASK:\n{task}\n\n");
    if let Some(history) = history {
        prompt.push_str(&format!(
            "PREVIOUS PLAN FAILED. History:\n{history}\n\n\
             Create an IMPROVED plan that addresses the issues in previous attempts.\n\n"
        ));
    }
    prompt.push_str("Create the execution plan:");
    prompt
}

/// User prompt for the worker.
///
/// `history` is included whenever earlier attempts exist; `feedback` only on
/// a revision against the current plan.
pub fn worker_prompt(task: &str, plan: &str, history: Option<&str>, feedback: Option<&str>) -> String {
    let mut prompt = format!("ORIGINAL TASK:\n{task}\n\nEXECUTION PLAN:\n{plan}\n\n");
    if let Some(history) = history {
        prompt.push_str(&format!("PREVIOUS ATTEMPTS AND FEEDBACK:\n{history}\n\n"));
    }
    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "LATEST REVIEWER FEEDBACK:\n{feedback}\n\n\
             Create an IMPROVED version that addresses all feedback.\n\n"
        ));
    }
    prompt.push_str("Execute the plan and produce the complete result:");
    prompt
}

pub fn reviewer_prompt(task: &str, result: &str) -> String {
    format!(
        "ORIGINAL TASK:\n{task}\n\nWORKER'S OUTPUT:\n{result}\n\n\
         Review the output and reply with the JSON verdict:"
    )
}
