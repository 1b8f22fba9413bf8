use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{GenerateRequest, LlmClient, LlmError};

/// Mock model client for testing. Replays scripted responses in order and
/// records every request it receives.
///
/// When the script runs out, the last response is repeated.
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    last: Mutex<Option<Result<String, LlmError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self::scripted(vec![Ok(response.to_string())])
    }

    pub fn scripted(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: LlmError) -> Self {
        Self::scripted(vec![Err(error)])
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| LlmError::HttpClient("mock state poisoned".into()))?;

        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last.clone().unwrap_or_else(|| Ok(String::new())),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
