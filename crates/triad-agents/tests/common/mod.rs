//! Shared test doubles: a completion client that replays a fixed script.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coordination::{AgentRole, SessionLimits};
use triad_agents::{CompletionClient, CompletionError, CompletionRequest, CompletionResponse};

/// One scripted reply.
pub enum Step {
    Reply(CompletionResponse),
    Fail(CompletionError),
}

/// Replays `Step`s in order and records every request it receives.
pub struct ScriptedClient {
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn roles(&self) -> Vec<AgentRole> {
        self.requests().iter().map(|r| r.role).collect()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }

    /// User prompt of the `n`th request.
    pub fn user_prompt(&self, n: usize) -> String {
        self.requests()[n]
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(Step::Reply(response)) => Ok(response),
            Some(Step::Fail(err)) => Err(err),
            None => Err(CompletionError::InvalidRequest("script exhausted".into())),
        }
    }
}

/// Reply with `text`, splitting `tokens` between prompt and completion.
pub fn reply(text: &str, tokens: u64) -> Step {
    Step::Reply(CompletionResponse {
        text: text.to_string(),
        prompt_tokens: tokens / 2,
        completion_tokens: tokens - tokens / 2,
    })
}

pub fn plan(tokens: u64) -> Step {
    reply("1. Outline\n2. Draft\n3. Polish", tokens)
}

pub fn work(text: &str, tokens: u64) -> Step {
    reply(text, tokens)
}

pub fn approve(tokens: u64) -> Step {
    reply(r#"{"approved": true, "feedback": "Meets every requirement."}"#, tokens)
}

pub fn reject(feedback: &str, tokens: u64) -> Step {
    reply(
        &serde_json::json!({ "approved": false, "feedback": feedback }).to_string(),
        tokens,
    )
}

pub fn rate_limited() -> Step {
    Step::Fail(CompletionError::RateLimited("HTTP 429 Too Many Requests".into()))
}

/// Default limits with the retry backoff kept at the production value.
pub fn limits() -> SessionLimits {
    SessionLimits::default()
}

pub fn limits_with_budget(max_tokens: u64) -> SessionLimits {
    SessionLimits {
        max_tokens,
        ..SessionLimits::default()
    }
}
