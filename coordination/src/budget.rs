//! Token budgeting: session-scoped tracker with an inclusive ceiling gate.
//!
//! The tracker accumulates usage for one session and answers the
//! "would exceed" question asked before every worker/reviewer cycle.
//! A [`TokenLedger`] can be shared across sessions for process-wide totals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Default fraction of the ceiling that triggers a warning.
pub const DEFAULT_WARN_RATIO: f64 = 0.8;

/// Token usage reported by one completion call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Combined count; saturates instead of wrapping on absurd endpoint values.
    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Per-million-token prices used for cost estimates.
///
/// Cost is reported for visibility only; gates are token-based.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenPricing {
    /// USD per million prompt tokens.
    pub prompt_per_million: f64,
    /// USD per million completion tokens.
    pub completion_per_million: f64,
}

impl TokenPricing {
    pub fn cost_usd(&self, usage: TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 / 1_000_000.0) * self.prompt_per_million
            + (usage.completion_tokens as f64 / 1_000_000.0) * self.completion_per_million
    }
}

impl Default for TokenPricing {
    /// gpt-4o-mini list prices.
    fn default() -> Self {
        Self {
            prompt_per_million: 0.15,
            completion_per_million: 0.60,
        }
    }
}

/// Outcome of the budget gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCheck {
    /// Below the warning threshold.
    WithinBudget,
    /// At or above the warning threshold but below the ceiling.
    Warning { used: u64, max: u64 },
    /// At or above the ceiling, the session must stop.
    Exhausted { used: u64, max: u64 },
}

impl BudgetCheck {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Process-wide token total shared between concurrently running sessions.
#[derive(Debug, Default)]
pub struct TokenLedger {
    total: AtomicU64,
}

impl TokenLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, tokens: u64) -> u64 {
        self.total.fetch_add(tokens, Ordering::Relaxed) + tokens
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Accumulates token usage for a single session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetTracker {
    max_tokens: u64,
    warn_ratio: f64,
    used: TokenUsage,
    calls: u32,
    #[serde(skip)]
    ledger: Option<Arc<TokenLedger>>,
}

impl BudgetTracker {
    pub fn new(max_tokens: u64, warn_ratio: f64) -> Self {
        Self {
            max_tokens,
            warn_ratio: warn_ratio.clamp(0.0, 1.0),
            used: TokenUsage::default(),
            calls: 0,
            ledger: None,
        }
    }

    /// Also report every recorded call to a shared ledger.
    pub fn with_ledger(mut self, ledger: Arc<TokenLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Add one call's usage. Totals only ever grow.
    pub fn record(&mut self, usage: TokenUsage) {
        self.used.prompt_tokens = self.used.prompt_tokens.saturating_add(usage.prompt_tokens);
        self.used.completion_tokens = self
            .used
            .completion_tokens
            .saturating_add(usage.completion_tokens);
        self.calls += 1;
        if let Some(ledger) = &self.ledger {
            ledger.add(usage.total());
        }
    }

    pub fn tokens_used(&self) -> u64 {
        self.used.total()
    }

    pub fn usage(&self) -> TokenUsage {
        self.used
    }

    pub fn max_tokens(&self) -> u64 {
        self.max_tokens
    }

    /// Number of calls recorded.
    pub fn calls(&self) -> u32 {
        self.calls
    }

    pub fn remaining(&self) -> u64 {
        self.max_tokens.saturating_sub(self.tokens_used())
    }

    /// Whether recording `additional` more tokens would reach the ceiling.
    pub fn would_exceed(&self, additional: u64) -> bool {
        self.tokens_used().saturating_add(additional) >= self.max_tokens
    }

    /// Evaluate the gate. The ceiling is inclusive: `used == max` is exhausted.
    pub fn check(&self) -> BudgetCheck {
        let used = self.tokens_used();
        let max = self.max_tokens;
        if used >= max {
            BudgetCheck::Exhausted { used, max }
        } else if used as f64 >= max as f64 * self.warn_ratio {
            BudgetCheck::Warning { used, max }
        } else {
            BudgetCheck::WithinBudget
        }
    }

    pub fn estimated_cost(&self, pricing: &TokenPricing) -> f64 {
        pricing.cost_usd(self.used)
    }
}
