use super::{LlmError, SqlGenerator};
use crate::config::LlmConfig;
use serde::Deserialize;
use serde_json::json;
use std::error::Error as _;
use std::io;

/// Blocking client for an OpenAI-compatible chat-completions endpoint.
pub struct ChatClient {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

impl ChatClient {
    pub fn from_config(config: &LlmConfig) -> Self {
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());

        if api_key.is_none() {
            log::debug!("no API key configured for {}", config.endpoint);
        }

        Self {
            agent: ureq::AgentBuilder::new().timeout(config.timeout()).build(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl SqlGenerator for ChatClient {
    fn generate(&self, system_prompt: &str, question: &str) -> Result<String, LlmError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": question },
            ],
        });

        let mut request = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.set("Authorization", &format!("Bearer {}", key));
        }

        let response = request.send_json(body).map_err(map_transport_error)?;
        let completion: CompletionResponse = response
            .into_json()
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::Malformed("completion has no content".to_string()))
    }
}

fn map_transport_error(err: ureq::Error) -> LlmError {
    match err {
        ureq::Error::Status(code, response) => {
            let detail = response.into_string().unwrap_or_default();
            classify_status(code, detail.trim())
        }
        ureq::Error::Transport(transport) => match transport.kind() {
            ureq::ErrorKind::Io => {
                let io_kind = transport
                    .source()
                    .and_then(|source| source.downcast_ref::<io::Error>())
                    .map(io::Error::kind);
                classify_io(io_kind, transport.to_string())
            }
            ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => {
                LlmError::Unavailable(transport.to_string())
            }
            _ => LlmError::Rejected(transport.to_string()),
        },
    }
}

/// Only a stalled socket counts as a timeout; resets and the like mean
/// the endpoint is unavailable.
fn classify_io(kind: Option<io::ErrorKind>, detail: String) -> LlmError {
    match kind {
        Some(io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => LlmError::Timeout,
        _ => LlmError::Unavailable(detail),
    }
}

fn classify_status(code: u16, detail: &str) -> LlmError {
    let message = if detail.is_empty() {
        format!("HTTP {}", code)
    } else {
        format!("HTTP {}: {}", code, detail)
    };
    match code {
        408 => LlmError::Timeout,
        429 | 500..=599 => LlmError::Unavailable(message),
        _ => LlmError::Rejected(message),
    }
}
