//! Runtime configuration.
//!
//! Sources, highest precedence first: `TRIAD_*` environment variables, an
//! optional TOML file, built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use coordination::{AgentRole, EscalationPolicy, SessionLimits, TokenPricing};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EVENT_LOG: &str = "logs/triad_sessions.jsonl";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub const ENV_BASE_URL: &str = "TRIAD_BASE_URL";
pub const ENV_API_KEY: &str = "TRIAD_API_KEY";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_MODEL: &str = "TRIAD_MODEL";
pub const ENV_MAX_ITERATIONS: &str = "TRIAD_MAX_ITERATIONS";
pub const ENV_MAX_TOKENS: &str = "TRIAD_MAX_TOKENS";
pub const ENV_RETRY_BACKOFF_MS: &str = "TRIAD_RETRY_BACKOFF_MS";
pub const ENV_MAX_REPLANS: &str = "TRIAD_MAX_REPLANS";
pub const ENV_EVENT_LOG: &str = "TRIAD_EVENT_LOG";

/// OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: None,
            model: DEFAULT_MODEL.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Sampling temperature per agent role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleTemperatures {
    pub planner: f32,
    pub worker: f32,
    pub reviewer: f32,
}

impl RoleTemperatures {
    pub fn for_role(&self, role: AgentRole) -> f32 {
        match role {
            AgentRole::Planner => self.planner,
            AgentRole::Worker => self.worker,
            AgentRole::Reviewer => self.reviewer,
        }
    }
}

impl Default for RoleTemperatures {
    fn default() -> Self {
        Self {
            planner: DEFAULT_TEMPERATURE,
            worker: DEFAULT_TEMPERATURE,
            reviewer: DEFAULT_TEMPERATURE,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriadConfig {
    pub endpoint: EndpointConfig,
    pub temperatures: RoleTemperatures,
    pub limits: SessionLimits,
    pub escalation: EscalationPolicy,
    /// JSONL event log. `None` disables the file sink.
    pub event_log: Option<PathBuf>,
    pub pricing: TokenPricing,
}

impl Default for TriadConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            temperatures: RoleTemperatures::default(),
            limits: SessionLimits::default(),
            escalation: EscalationPolicy::default(),
            event_log: Some(PathBuf::from(DEFAULT_EVENT_LOG)),
            pricing: TokenPricing::default(),
        }
    }
}

impl TriadConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Optional TOML file, then the process environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Failed to parse TOML config")
    }

    /// Apply `TRIAD_*` overrides read through `lookup`.
    ///
    /// An empty `TRIAD_EVENT_LOG` disables the file sink.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.endpoint.base_url = url;
        }
        if let Some(key) = lookup(ENV_API_KEY).or_else(|| lookup(ENV_OPENAI_API_KEY)) {
            self.endpoint.api_key = Some(key);
        }
        if let Some(model) = lookup(ENV_MODEL) {
            self.endpoint.model = model;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_ITERATIONS)? {
            self.limits.max_iterations = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_TOKENS)? {
            self.limits.max_tokens = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_RETRY_BACKOFF_MS)? {
            self.limits.retry_backoff_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_REPLANS)? {
            self.escalation.max_replans = v;
        }
        if let Some(path) = lookup(ENV_EVENT_LOG) {
            self.event_log = (!path.trim().is_empty()).then(|| PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.limits.max_iterations == 0 {
            bail!("limits.max_iterations must be at least 1");
        }
        if self.limits.max_tokens == 0 {
            bail!("limits.max_tokens must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.limits.warn_ratio) {
            bail!("limits.warn_ratio must be within 0.0..=1.0");
        }
        if self.escalation.give_up_after == 0 {
            bail!("escalation.give_up_after must be at least 1");
        }
        for role in [AgentRole::Planner, AgentRole::Worker, AgentRole::Reviewer] {
            let t = self.temperatures.for_role(role);
            if !(0.0..=2.0).contains(&t) {
                bail!("temperature for {role} must be within 0.0..=2.0, got {t}");
            }
        }
        if self.endpoint.base_url.trim().is_empty() {
            bail!("endpoint.base_url must not be empty");
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key}={raw:?} is not a valid number"))
        })
        .transpose()
}
