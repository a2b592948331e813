//! Chat session against the backend: a one-off health probe and bounded
//! message exchange, with an append-only transcript.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::RequestFailure;
use crate::request::{Acceptance, BoundedRequest, Executor, RequestTarget};

pub const PROBE_DEADLINE: Duration = Duration::from_millis(5_000);
pub const SEND_DEADLINE: Duration = Duration::from_millis(15_000);

pub const TIMEOUT_MESSAGE: &str = "Request timed out. Please try again.";
pub const NETWORK_MESSAGE: &str = "Network error. Please try again.";
pub const GENERIC_FAILURE: &str = "Sorry, something went wrong.";
pub const GREETING: &str = "Hey there! I'm your movie buddy! What's your vibe tonight? \
Looking for something to make you laugh, cry, or jump out of your seat?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConnectivityStatus {
    Unknown,
    Online { provider: Option<String> },
    Offline,
}

impl ConnectivityStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityStatus::Online { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: Option<String>,
    provider: Option<String>,
}

/// What the user sees for a call that never produced a reply.
pub fn user_message(failure: &RequestFailure) -> &'static str {
    match failure {
        RequestFailure::Timeout { .. } => TIMEOUT_MESSAGE,
        RequestFailure::NetworkError { .. } => NETWORK_MESSAGE,
        _ => GENERIC_FAILURE,
    }
}

/// Reply text from a chat response body: `reply`, then `error`, then a
/// generic apology.
pub fn extract_reply(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return GENERIC_FAILURE.to_string();
    };
    ["reply", "error"]
        .iter()
        .filter_map(|field| value.get(*field).and_then(Value::as_str))
        .find(|text| !text.is_empty())
        .unwrap_or(GENERIC_FAILURE)
        .to_string()
}

pub struct ChatGateway {
    executor: Executor,
    base_url: String,
    status: ConnectivityStatus,
    transcript: Vec<ChatMessage>,
}

impl ChatGateway {
    pub fn new(executor: Executor, base_url: impl Into<String>) -> Self {
        Self {
            executor,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            status: ConnectivityStatus::Unknown,
            transcript: vec![ChatMessage::assistant(GREETING)],
        }
    }

    pub fn from_config(config: &Config, executor: Executor) -> anyhow::Result<Self> {
        Ok(Self::new(executor, config.require_api_url()?))
    }

    pub fn status(&self) -> &ConnectivityStatus {
        &self.status
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    /// Checks the health endpoint once. Every outcome except cancellation
    /// resolves to a status; nothing is retried.
    pub async fn probe(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<ConnectivityStatus, RequestFailure> {
        let target = RequestTarget::get(format!("{}/health", self.base_url));
        let outcome = self
            .executor
            .execute(
                &target,
                BoundedRequest::new(PROBE_DEADLINE, cancel.clone()),
                Acceptance::Success,
            )
            .await;

        let status = match outcome {
            Ok(res) => match res.json::<HealthBody>() {
                Ok(HealthBody {
                    status: Some(s),
                    provider,
                }) if s == "ok" => ConnectivityStatus::Online { provider },
                Ok(_) => {
                    warn!("Chat backend health reported not ok");
                    ConnectivityStatus::Offline
                }
                Err(e) => {
                    warn!("Chat backend health body unreadable: {}", e);
                    ConnectivityStatus::Offline
                }
            },
            Err(RequestFailure::Cancelled) => return Err(RequestFailure::Cancelled),
            Err(e) => {
                warn!("Chat backend connection failed: {}", e);
                ConnectivityStatus::Offline
            }
        };
        info!("Chat backend connectivity: {:?}", status);
        self.status = status.clone();
        Ok(status)
    }

    /// Sends one user turn. The user message and whatever the user should see
    /// in response are appended to the transcript in order.
    pub async fn send(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<String, RequestFailure> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RequestFailure::InvalidTarget {
                reason: "message is empty".to_string(),
            });
        }
        self.transcript.push(ChatMessage::user(text));

        let target = RequestTarget::post(
            format!("{}/api/chat", self.base_url),
            json!({ "message": text }),
        );
        // Error statuses still carry a readable `error` body.
        let outcome = self
            .executor
            .execute(
                &target,
                BoundedRequest::new(SEND_DEADLINE, cancel.clone()),
                Acceptance::Any,
            )
            .await;

        match outcome {
            Ok(res) => {
                debug!(status = res.status, "chat reply received");
                let reply = extract_reply(&res.body);
                self.transcript.push(ChatMessage::assistant(reply.clone()));
                Ok(reply)
            }
            Err(RequestFailure::Cancelled) => Err(RequestFailure::Cancelled),
            Err(e) => {
                warn!("Chat error: {}", e);
                self.transcript
                    .push(ChatMessage::assistant(user_message(&e)));
                Err(e)
            }
        }
    }
}
