use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::RequestFailure;
use crate::request::{Acceptance, BoundedRequest, Executor, RequestTarget};

/// The account backend's watchlist endpoints. Ids carry no media kind.
#[async_trait]
pub trait WatchlistApi: Send + Sync {
    async fn add(
        &self,
        token: &str,
        id: i64,
        cancel: &CancellationToken,
    ) -> Result<(), RequestFailure>;

    async fn remove(
        &self,
        token: &str,
        id: i64,
        cancel: &CancellationToken,
    ) -> Result<(), RequestFailure>;

    async fn list(&self, token: &str, cancel: &CancellationToken)
        -> Result<Vec<i64>, RequestFailure>;
}

#[derive(Clone)]
pub struct BackendClient {
    executor: Executor,
    base_url: String,
    deadline: Duration,
}

#[derive(Debug, Deserialize)]
struct MutationResponse {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<i64>,
}

impl BackendClient {
    pub fn new(executor: Executor, base_url: impl Into<String>, deadline: Duration) -> Self {
        Self {
            executor,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            deadline,
        }
    }

    pub fn from_config(config: &Config, executor: Executor) -> anyhow::Result<Self> {
        Ok(Self::new(
            executor,
            config.require_api_url()?,
            config.watchlist_timeout,
        ))
    }

    fn watchlist_url(&self) -> String {
        format!("{}/api/watchlist", self.base_url)
    }

    async fn mutate(
        &self,
        target: RequestTarget,
        cancel: &CancellationToken,
    ) -> Result<(), RequestFailure> {
        let res = self
            .executor
            .execute(
                &target,
                BoundedRequest::new(self.deadline, cancel.clone()),
                Acceptance::Success,
            )
            .await?;
        // The change is committed once the backend answers 2xx; the body is
        // informational only.
        match res.json::<MutationResponse>() {
            Ok(MutationResponse {
                message: Some(message),
            }) => info!("{}", message),
            Ok(_) => {}
            Err(e) => debug!("Ignoring unreadable watchlist response: {}", e),
        }
        Ok(())
    }
}

#[async_trait]
impl WatchlistApi for BackendClient {
    async fn add(
        &self,
        token: &str,
        id: i64,
        cancel: &CancellationToken,
    ) -> Result<(), RequestFailure> {
        let target =
            RequestTarget::post(self.watchlist_url(), json!({ "movie_id": id })).bearer(token);
        self.mutate(target, cancel).await
    }

    async fn remove(
        &self,
        token: &str,
        id: i64,
        cancel: &CancellationToken,
    ) -> Result<(), RequestFailure> {
        let target =
            RequestTarget::delete(self.watchlist_url(), json!({ "movie_id": id })).bearer(token);
        self.mutate(target, cancel).await
    }

    async fn list(
        &self,
        token: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<i64>, RequestFailure> {
        let target = RequestTarget::get(self.watchlist_url()).bearer(token);
        let res = self
            .executor
            .execute(
                &target,
                BoundedRequest::new(self.deadline, cancel.clone()),
                Acceptance::Success,
            )
            .await?;
        let data: ListResponse = res.json()?;
        Ok(data.items)
    }
}
