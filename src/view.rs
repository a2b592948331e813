use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregator::MediaAggregator;
use crate::config::Config;
use crate::error::AggregationFailure;
use crate::models::{EntityRef, MediaRecord};
use crate::request::Executor;
use crate::rotation::RotationController;
use crate::tmdb::TmdbClient;

/// State behind one detail page: the current record and its background
/// rotation. Each load supersedes the previous one; a load whose token was
/// cancelled never touches the view.
pub struct DetailView {
    aggregator: MediaAggregator,
    interval: Duration,
    record: Option<Arc<MediaRecord>>,
    rotation: RotationController,
    teardown: CancellationToken,
    load_token: CancellationToken,
}

impl DetailView {
    pub fn new(aggregator: MediaAggregator, interval: Duration) -> Self {
        Self {
            aggregator,
            interval,
            record: None,
            rotation: RotationController::new(interval),
            teardown: CancellationToken::new(),
            load_token: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &Config, executor: Executor) -> Self {
        let provider = TmdbClient::from_config(config, executor);
        Self::new(
            MediaAggregator::new(Arc::new(provider)),
            config.rotation_interval,
        )
    }

    pub fn record(&self) -> Option<&Arc<MediaRecord>> {
        self.record.as_ref()
    }

    pub fn rotation(&self) -> &RotationController {
        &self.rotation
    }

    /// Teardown handle for whoever owns the view's lifetime. Cancelling it
    /// abandons any load in progress; later loads settle as cancelled.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.teardown.clone()
    }

    pub async fn load(&mut self, entity: EntityRef) -> Result<Arc<MediaRecord>, AggregationFailure> {
        self.load_token.cancel();
        let token = self.teardown.child_token();
        self.load_token = token.clone();

        let result = self.aggregator.fetch_entity(entity, &token).await;
        if token.is_cancelled() {
            debug!("Discarding superseded load of {}", entity);
            return Err(AggregationFailure::Cancelled);
        }
        let record = Arc::new(result?);

        let rotation = RotationController::new(self.interval);
        if let Err(e) = rotation.load(record.images.clone()) {
            warn!("Background rotation for {} not started: {}", entity, e);
        }
        // Dropping the old controller disposes it.
        self.rotation = rotation;
        self.record = Some(Arc::clone(&record));
        Ok(record)
    }

    /// View teardown: cancels any outstanding load and stops the rotation.
    pub fn close(&mut self) {
        self.teardown.cancel();
        self.rotation.dispose();
        self.record = None;
    }
}

impl Drop for DetailView {
    fn drop(&mut self) {
        self.teardown.cancel();
    }
}
