use jsforge_llm::{CodeGenerator, GenerateRequest, GenerationError};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct OllamaClient {
    pub base_url: String,
    /// `None` waits for the model however long it takes.
    pub timeout: Option<Duration>,
    pub probe_timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            probe_timeout: Duration::from_secs(2),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    pub fn is_reachable(&self) -> bool {
        let client = match Client::builder().timeout(self.probe_timeout).build() {
            Ok(c) => c,
            Err(_) => return false,
        };

        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        client
            .get(url)
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[derive(Debug, Serialize)]
struct GeneratePayload<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

impl CodeGenerator for OllamaClient {
    fn generate(&self, req: &GenerateRequest) -> Result<String, GenerationError> {
        let client = Client::builder()
            // `None` also lifts the blocking client's 30s default.
            .timeout(self.timeout)
            .build()
            .map_err(|err| GenerationError::Client(err.to_string()))?;

        let url = self.generate_url();
        debug!(%url, model = %req.model, "requesting completion");
        let response = client
            .post(&url)
            .json(&GeneratePayload {
                model: &req.model,
                prompt: &req.prompt,
                stream: false,
            })
            .send()
            .map_err(|err| GenerationError::Transport {
                endpoint: url.clone(),
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response.text().map_err(|err| GenerationError::Transport {
            endpoint: url.clone(),
            message: err.to_string(),
        })?;
        let parsed: GenerateResponse =
            serde_json::from_str(&raw).map_err(|err| GenerationError::Decode(err.to_string()))?;

        let reply = parsed
            .response
            .ok_or(GenerationError::MissingField { field: "response" })?;
        debug!(bytes = reply.len(), "completion received");
        Ok(reply.trim().to_string())
    }
}
