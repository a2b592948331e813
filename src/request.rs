//! Bounded outbound calls: every request carries a deadline and a
//! cancellation token, and settles exactly once as success, rejection,
//! transport failure, timeout or cancellation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::RequestFailure;

/// A well-formed request descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestTarget {
    pub method: Method,
    pub url: String,
    /// Query parameters, kept out of `url` so credentials never reach logs
    /// or error text.
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestTarget {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: vec![("accept".to_string(), "application/json".to_string())],
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, url).json(body)
    }

    pub fn delete(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::DELETE, url).json(body)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn bearer(self, token: &str) -> Self {
        self.header("authorization", format!("Bearer {token}"))
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, RequestFailure> {
        serde_json::from_str(&self.body).map_err(|e| RequestFailure::MalformedBody {
            reason: e.to_string(),
        })
    }
}

/// Decides whether a settled response counts as a success.
#[derive(Debug, Clone, Copy, Default)]
pub enum Acceptance {
    /// Any 2xx status.
    #[default]
    Success,
    /// Every response the transport delivers; the caller inspects the body.
    Any,
}

impl Acceptance {
    pub fn accepts(&self, response: &Response) -> bool {
        match self {
            Acceptance::Success => response.is_success(),
            Acceptance::Any => true,
        }
    }
}

/// Deadline and cancellation for exactly one call. Consumed by
/// [`Executor::execute`].
#[derive(Debug)]
pub struct BoundedRequest {
    pub deadline: Duration,
    pub cancel: CancellationToken,
}

impl BoundedRequest {
    pub fn new(deadline: Duration, cancel: CancellationToken) -> Self {
        Self { deadline, cancel }
    }

    pub fn millis(deadline_ms: u64, cancel: CancellationToken) -> Self {
        Self::new(Duration::from_millis(deadline_ms), cancel)
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, target: &RequestTarget) -> Result<Response, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let user_agent = format!("moviemate/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, target: &RequestTarget) -> Result<Response, TransportError> {
        let mut req = self.client.request(target.method.clone(), &target.url);
        if !target.query.is_empty() {
            req = req.query(&target.query);
        }
        for (name, value) in &target.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &target.body {
            req = req.json(body);
        }
        let res = req
            .send()
            .await
            .map_err(|e| TransportError(e.without_url().to_string()))?;
        let status = res.status().as_u16();
        let body = res
            .text()
            .await
            .map_err(|e| TransportError(format!("reading body failed: {}", e.without_url())))?;
        Ok(Response { status, body })
    }
}

/// Issues single bounded calls. Never retries; retry policy belongs to the
/// caller.
#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn Transport>,
}

impl Executor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn reqwest() -> Result<Self> {
        Ok(Self::new(Arc::new(ReqwestTransport::new()?)))
    }

    pub async fn execute(
        &self,
        target: &RequestTarget,
        request: BoundedRequest,
        acceptance: Acceptance,
    ) -> Result<Response, RequestFailure> {
        let BoundedRequest { deadline, cancel } = request;
        if deadline.is_zero() {
            return Err(RequestFailure::InvalidTarget {
                reason: "deadline must be positive".to_string(),
            });
        }
        if let Err(e) = url::Url::parse(&target.url) {
            return Err(RequestFailure::InvalidTarget {
                reason: format!("bad url '{}': {e}", target.url),
            });
        }
        if cancel.is_cancelled() {
            return Err(RequestFailure::Cancelled);
        }

        let deadline_ms = deadline.as_millis() as u64;
        debug!(method = %target.method, url = %target.url, deadline_ms, "bounded request");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(url = %target.url, "request cancelled");
                return Err(RequestFailure::Cancelled);
            }
            _ = tokio::time::sleep(deadline) => {
                warn!(url = %target.url, deadline_ms, "request timed out");
                return Err(RequestFailure::Timeout { deadline_ms });
            }
            res = self.transport.send(target) => res,
        };

        let response = outcome.map_err(|e| {
            warn!(url = %target.url, "request failed: {}", e);
            RequestFailure::NetworkError { cause: e.0 }
        })?;

        if !acceptance.accepts(&response) {
            debug!(url = %target.url, status = response.status, "response rejected");
            return Err(RequestFailure::RejectedResponse {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }
}
