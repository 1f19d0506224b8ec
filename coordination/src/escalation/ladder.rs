//! Escalation Ladder: deterministic decision after a rejected review.
//!
//! Consumes the worker attempt counter for the current plan and the number of
//! re-plans already spent. All decisions are deterministic, no LLM calls here.

use serde::{Deserialize, Serialize};

/// Policy knobs for the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Worker attempts against one plan after which a re-plan is requested.
    pub replan_after: u32,
    /// Worker attempts against one plan after which the session gives up.
    pub give_up_after: u32,
    /// Re-plans allowed per session.
    pub max_replans: u32,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            replan_after: 2,
            give_up_after: 3,
            max_replans: 1,
        }
    }
}

/// What the orchestrator should do after a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStep {
    /// Worker revises against the same plan using the reviewer feedback.
    Revise,
    /// Planner produces a new plan informed by the full history.
    Replan,
    /// Stop with a quality failure.
    GiveUp { attempts: u32 },
}

/// The ladder itself.
#[derive(Debug, Clone, Default)]
pub struct EscalationLadder {
    policy: EscalationPolicy,
}

impl EscalationLadder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: EscalationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    /// Decide the next step.
    ///
    /// `worker_attempts` is the attempt count against the current plan after
    /// the rejected review; `replans_used` is the number of re-plans so far.
    /// When the re-plan allowance is spent the worker keeps revising until
    /// `give_up_after` is reached.
    pub fn decide(&self, worker_attempts: u32, replans_used: u32) -> EscalationStep {
        if worker_attempts >= self.policy.give_up_after {
            return EscalationStep::GiveUp {
                attempts: worker_attempts,
            };
        }
        if worker_attempts >= self.policy.replan_after && replans_used < self.policy.max_replans
        {
            return EscalationStep::Replan;
        }
        EscalationStep::Revise
    }
}
