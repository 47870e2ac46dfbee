//! Fake LLM gateway for testing.
//!
//! Returns deterministic responses based on prompt matching, so tests run
//! without network access or API costs. Scripted results (including errors)
//! take precedence and are consumed in order.

use std::collections::VecDeque;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;

use super::{CompletionRequest, LlmGateway};
use crate::error::GatewayError;

/// A fake gateway for testing.
///
/// Responses are matched by checking whether the combined system + user
/// prompt contains a registered substring (case-insensitive, first
/// registration wins). If no match is found, the default response is used.
#[derive(Debug, Default)]
pub struct FakeGateway {
    /// Ordered (prompt substring, response) pairs.
    responses: RwLock<Vec<(String, String)>>,
    /// Results consumed before any substring matching happens.
    scripted: Mutex<VecDeque<Result<String, GatewayError>>>,
    default_response: RwLock<Option<String>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a gateway that answers prompts containing a substring.
    pub fn with_response(prompt_contains: &str, response: &str) -> Self {
        let gateway = Self::new();
        gateway.add_response(prompt_contains, response);
        gateway
    }

    /// Register a response for prompts containing a specific substring.
    pub fn add_response(&self, prompt_contains: &str, response: &str) {
        self.responses
            .write()
            .unwrap()
            .push((prompt_contains.to_string(), response.to_string()));
    }

    /// Set the response used when no pattern matches.
    pub fn set_default_response(&self, response: &str) {
        *self.default_response.write().unwrap() = Some(response.to_string());
    }

    /// Queue a result returned before any matching happens. Queue an `Err`
    /// to simulate transport or auth failures.
    pub fn push_result(&self, result: Result<String, GatewayError>) {
        self.scripted.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl LlmGateway for FakeGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        if let Some(result) = self.scripted.lock().unwrap().pop_front() {
            return result;
        }

        let haystack = format!("{}\n{}", request.system_prompt, request.user_content)
            .to_lowercase();
        for (pattern, response) in self.responses.read().unwrap().iter() {
            if haystack.contains(&pattern.to_lowercase()) {
                return Ok(response.clone());
            }
        }

        match self.default_response.read().unwrap().as_ref() {
            Some(response) => Ok(response.clone()),
            None => Err(GatewayError::UnexpectedResponse(format!(
                "FakeGateway: no response configured for prompt (first 100 chars): {}",
                request
                    .user_content
                    .chars()
                    .take(100)
                    .collect::<String>()
            ))),
        }
    }
}
