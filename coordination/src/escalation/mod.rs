//! Escalation: deterministic recovery policy for rejected reviews.
//!
//! # Escalation Ladder
//!
//! ```text
//! Worker attempt rejected
//!     │
//!     ├─ 1st attempt on this plan → Worker revises with reviewer feedback
//!     ├─ 2nd attempt on this plan → Planner re-plans with full history
//!     │                             (attempt counter resets to 0)
//!     │     └─ re-plan allowance spent → Worker revises once more
//!     │
//!     ▼
//! 3rd attempt on one plan rejected → FailedQuality, flag for human
//! ```

pub mod ladder;

pub use ladder::{EscalationLadder, EscalationPolicy, EscalationStep};
