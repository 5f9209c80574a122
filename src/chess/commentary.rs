use super::error::ServiceError;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const TUTOR_PROMPT: &str = "You are a chess tutor. Given a PGN annotated chess match, \
your job is to add annotations and commentary for what the user could learn to improve on, \
and what they did well. Your response should be in valid pgn format.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);
const MAX_ERROR_BODY: usize = 200;

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```").expect("valid fenced block regex")
});

/// A text completion backend.
pub trait CommentaryService {
    fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, ServiceError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

impl<'a> ChatRequest<'a> {
    fn new(model: &'a str, system_prompt: &'a str, user_text: &'a str) -> Self {
        Self {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_text,
                },
            ],
            stream: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn with_base_url(api_key: &str, base_url: &str) -> Result<Self, ServiceError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl CommentaryService for OpenAiClient {
    fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, ServiceError> {
        debug!(model, bytes = user_text.len(), "requesting commentary");
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&ChatRequest::new(model, system_prompt, user_text))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(error_for_status(status, &body));
        }
        reply_content(&body)
    }
}

fn error_for_status(status: StatusCode, body: &str) -> ServiceError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().chars().take(MAX_ERROR_BODY).collect());

    if status == StatusCode::TOO_MANY_REQUESTS {
        ServiceError::RateLimited(message)
    } else {
        ServiceError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn reply_content(body: &str) -> Result<String, ServiceError> {
    let response: ChatResponse = serde_json::from_str(body)?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ServiceError::EmptyResponse)
}

/// Returns the body of the first fenced code block in `reply`, or the whole
/// reply when it has none.
pub fn strip_code_fence(reply: &str) -> String {
    match FENCED_BLOCK_RE.captures(reply).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => reply.trim().to_string(),
    }
}

/// Sends games to a completion backend with the fixed tutor instructions.
pub struct Tutor<S> {
    service: S,
    model: String,
}

impl<S: CommentaryService> Tutor<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Annotated PGN for `pgn`, as returned by the model.
    pub fn analyze(&self, pgn: &str) -> Result<String, ServiceError> {
        let reply = self.service.complete(&self.model, TUTOR_PROMPT, pgn)?;
        Ok(strip_code_fence(&reply))
    }
}
