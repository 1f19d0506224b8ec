//! History Log: append-only record of planner, worker and reviewer outputs.
//!
//! Agents receive a retrospective rendering of this log so they do not repeat
//! earlier mistakes. Entries are never removed or mutated once appended.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum characters retained per history entry payload.
pub const ENTRY_PAYLOAD_LIMIT: usize = 4_000;

/// Characters of each payload shown in the retrospective context.
pub const RETROSPECTIVE_EXCERPT_CHARS: usize = 200;

/// The closed set of agent roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    Worker,
    Reviewer,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planner => "planner",
            Self::Worker => "worker",
            Self::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable record of an agent's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Which agent produced the output.
    pub role: AgentRole,
    /// Plan version for planner entries; worker attempt number for worker
    /// and reviewer entries.
    pub round: u32,
    /// Completed cycles when the entry was appended.
    pub iteration: u32,
    /// Output text, truncated to [`ENTRY_PAYLOAD_LIMIT`] characters.
    pub excerpt: String,
    /// Reviewer decision; `None` for planner/worker entries and for
    /// reviewer replies that could not be parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    /// Tokens consumed by the call that produced this entry.
    pub tokens: u64,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(role: AgentRole, round: u32, iteration: u32, payload: &str, tokens: u64) -> Self {
        Self {
            role,
            round,
            iteration,
            excerpt: truncate_chars(payload, ENTRY_PAYLOAD_LIMIT),
            approved: None,
            tokens,
            timestamp: Utc::now(),
        }
    }

    pub fn with_approval(mut self, approved: bool) -> Self {
        self.approved = Some(approved);
        self
    }
}

/// Ordered, append-only sequence of [`HistoryEntry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Number of entries produced by `role`.
    pub fn count_role(&self, role: AgentRole) -> usize {
        self.entries.iter().filter(|e| e.role == role).count()
    }

    /// Whether any worker output has been recorded yet.
    pub fn has_attempts(&self) -> bool {
        self.entries.iter().any(|e| e.role == AgentRole::Worker)
    }

    /// Render the log as retrospective context for the next agent call.
    ///
    /// Each payload is cut to [`RETROSPECTIVE_EXCERPT_CHARS`] characters.
    pub fn retrospective(&self) -> String {
        if self.entries.is_empty() {
            return "No previous attempts.".to_string();
        }

        let mut lines = Vec::with_capacity(self.entries.len() * 2);
        for entry in &self.entries {
            let excerpt = excerpt(&entry.excerpt, RETROSPECTIVE_EXCERPT_CHARS);
            match entry.role {
                AgentRole::Planner => {
                    lines.push(format!("Plan Version {}:", entry.round));
                    lines.push(format!("  {excerpt}"));
                }
                AgentRole::Worker => {
                    lines.push(format!("Attempt {}:", entry.round));
                    lines.push(format!("  Output: {excerpt}"));
                }
                AgentRole::Reviewer => {
                    lines.push(format!("  Reviewer Feedback: {excerpt}"));
                    match entry.approved {
                        Some(approved) => lines.push(format!("  Approved: {approved}")),
                        None => lines.push("  Approved: unparseable verdict".to_string()),
                    }
                }
            }
        }
        lines.join("\n")
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn excerpt(text: &str, limit: usize) -> String {
    let cut = truncate_chars(text, limit);
    if cut.len() < text.len() {
        format!("{cut}...")
    } else {
        cut
    }
}
