//! Builds one presentable [`MediaRecord`] out of the provider's details,
//! video and image endpoints.
//!
//! Details are mandatory and resolved through a fallback chain; videos and
//! images are enrichment and only degrade the record when they fail.

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{AggregationFailure, AllFailed, RequestFailure};
use crate::fallback::{self, Strategy};
use crate::models::{
    EnrichmentStep, EntityRef, MediaKind, MediaRecord, MediaSummary, PartialFailure,
    VideoCandidate,
};
use crate::tmdb::{image_url, DetailsPayload, Image, TmdbApi};

/// Distinct extra backdrops kept from the image listing, after deduplication.
pub const MAX_EXTRA_BACKDROPS: usize = 5;

#[derive(Clone)]
pub struct MediaAggregator {
    provider: Arc<dyn TmdbApi>,
}

impl MediaAggregator {
    pub fn new(provider: Arc<dyn TmdbApi>) -> Self {
        Self { provider }
    }

    pub async fn fetch_entity(
        &self,
        entity: EntityRef,
        cancel: &CancellationToken,
    ) -> Result<MediaRecord, AggregationFailure> {
        let (resolved, details) = self.resolve_details(entity, cancel).await?;
        if resolved != entity {
            info!("{} resolved as {}", entity, resolved);
        }

        let (videos, images) = tokio::join!(
            self.provider.videos(resolved, cancel),
            self.provider.images(resolved, cancel),
        );
        if cancel.is_cancelled() {
            return Err(AggregationFailure::Cancelled);
        }

        let mut partial_failures = Vec::new();
        let trailer = match videos {
            Ok(videos) => select_trailer(&videos).cloned(),
            Err(e) => {
                warn!("Video listing for {} unavailable: {}", resolved, e);
                partial_failures.push(PartialFailure {
                    step: EnrichmentStep::Videos,
                    reason: e.to_string(),
                });
                None
            }
        };
        let extra_backdrops = match images {
            Ok(listing) => listing.backdrops,
            Err(e) => {
                warn!("Image listing for {} unavailable: {}", resolved, e);
                partial_failures.push(PartialFailure {
                    step: EnrichmentStep::Images,
                    reason: e.to_string(),
                });
                Vec::new()
            }
        };

        let backdrop = details.backdrop_url();
        let poster = details.poster_url();
        let images = assemble_images(backdrop.as_deref(), poster.as_deref(), &extra_backdrops);

        Ok(MediaRecord {
            entity: resolved,
            title: details.display_title().unwrap_or_default().to_string(),
            year: details.year(),
            rating: details.vote_average,
            overview: details.overview(),
            runtime_minutes: details.runtime_minutes(),
            genres: details.genre_names(),
            cast: details.cast_names(),
            directors: details.directors(),
            poster,
            backdrop,
            images,
            trailer,
            partial_failures,
        })
    }

    /// Details for `entity`; a show that cannot be resolved is retried once
    /// as a movie, since the provider sometimes misclassifies ids.
    async fn resolve_details(
        &self,
        entity: EntityRef,
        cancel: &CancellationToken,
    ) -> Result<(EntityRef, DetailsPayload), AggregationFailure> {
        let mut strategies = vec![self.details_strategy(entity, cancel)];
        if entity.kind == MediaKind::Show {
            strategies.push(self.details_strategy(entity.with_kind(MediaKind::Movie), cancel));
        }
        fallback::resolve(strategies, |(_, details)| details.is_presentable())
            .await
            .map_err(|all| {
                if cancel.is_cancelled() || all.was_cancelled() {
                    return AggregationFailure::Cancelled;
                }
                warn!("No usable details for {}: {}", entity, all);
                AggregationFailure::DetailsUnavailable(all)
            })
    }

    fn details_strategy<'a>(
        &'a self,
        entity: EntityRef,
        cancel: &'a CancellationToken,
    ) -> Strategy<'a, (EntityRef, DetailsPayload), RequestFailure> {
        Strategy::new(entity.kind.provider_segment(), move || async move {
            if cancel.is_cancelled() {
                return Err(RequestFailure::Cancelled);
            }
            let details = self.provider.details(entity, cancel).await?;
            Ok((entity, details))
        })
    }

    /// Summary for a kind-less id (watchlist entries carry no kind): tries the
    /// movie endpoint, then the show endpoint.
    pub async fn fetch_summary(
        &self,
        id: i64,
        cancel: &CancellationToken,
    ) -> Result<MediaSummary, AllFailed<RequestFailure>> {
        let strategies = vec![
            self.details_strategy(EntityRef::movie(id), cancel),
            self.details_strategy(EntityRef::show(id), cancel),
        ];
        let (entity, details) =
            fallback::resolve(strategies, |(_, details)| details.is_presentable()).await?;
        Ok(MediaSummary {
            entity,
            title: details.display_title().unwrap_or_default().to_string(),
            year: details.year(),
            poster: details.poster_url(),
            overview: details.overview(),
        })
    }

    /// Summaries for every id in watchlist order. Ids that resolve to neither
    /// kind are skipped.
    pub async fn hydrate_watchlist(
        &self,
        ids: &[i64],
        cancel: &CancellationToken,
    ) -> Vec<MediaSummary> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if cancel.is_cancelled() {
                break;
            }
            match self.fetch_summary(id, cancel).await {
                Ok(summary) => out.push(summary),
                Err(e) => warn!("Skipping watchlist id {}: {}", id, e),
            }
        }
        out
    }
}

/// Trailer policy, first match wins: official YouTube trailer, any trailer,
/// any YouTube video.
pub fn select_trailer(videos: &[VideoCandidate]) -> Option<&VideoCandidate> {
    videos
        .iter()
        .find(|v| v.is_trailer() && v.is_youtube() && v.is_official)
        .or_else(|| videos.iter().find(|v| v.is_trailer()))
        .or_else(|| videos.iter().find(|v| v.is_youtube()))
}

/// Backdrop, poster, then the first few listing backdrops; each URL once.
pub fn assemble_images(
    backdrop: Option<&str>,
    poster: Option<&str>,
    extra_backdrops: &[Image],
) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut images: Vec<String> = backdrop
        .map(str::to_string)
        .into_iter()
        .chain(poster.map(str::to_string))
        .filter(|url| seen.insert(url.clone()))
        .collect();
    let extras: Vec<String> = extra_backdrops
        .iter()
        .filter_map(|b| image_url(&b.file_path))
        .filter(|url| seen.insert(url.clone()))
        .take(MAX_EXTRA_BACKDROPS)
        .collect();
    images.extend(extras);
    images
}
