use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, TmdbCredential};
use crate::error::RequestFailure;
use crate::models::{EntityRef, VideoCandidate};
use crate::request::{Acceptance, BoundedRequest, Executor, RequestTarget};

pub const TMDB_BASE: &str = "https://api.themoviedb.org/3";
pub const IMAGE_BASE: &str = "https://image.tmdb.org/t/p/original";
/// Billed cast members kept on a record.
pub const MAX_CAST: usize = 10;

/// The three per-entity endpoints the aggregator composes.
#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn details(
        &self,
        entity: EntityRef,
        cancel: &CancellationToken,
    ) -> Result<DetailsPayload, RequestFailure>;

    async fn videos(
        &self,
        entity: EntityRef,
        cancel: &CancellationToken,
    ) -> Result<Vec<VideoCandidate>, RequestFailure>;

    async fn images(
        &self,
        entity: EntityRef,
        cancel: &CancellationToken,
    ) -> Result<ImageListing, RequestFailure>;
}

#[derive(Clone)]
pub struct TmdbClient {
    executor: Executor,
    base_url: String,
    credential: TmdbCredential,
    deadline: Duration,
}

impl TmdbClient {
    pub fn new(
        executor: Executor,
        base_url: impl Into<String>,
        credential: TmdbCredential,
        deadline: Duration,
    ) -> Self {
        Self {
            executor,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            deadline,
        }
    }

    pub fn from_config(config: &Config, executor: Executor) -> Self {
        Self::new(
            executor,
            config.tmdb_base_url.clone(),
            config.tmdb_credential.clone(),
            config.request_timeout,
        )
    }

    fn target(&self, path: &str) -> RequestTarget {
        let target = RequestTarget::get(format!("{}{path}", self.base_url));
        match &self.credential {
            TmdbCredential::ApiKey(key) => target.query("api_key", key.as_str()),
            TmdbCredential::ReadAccessToken(token) => target.bearer(token),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        target: RequestTarget,
        cancel: &CancellationToken,
    ) -> Result<T, RequestFailure> {
        let res = self
            .executor
            .execute(
                &target,
                BoundedRequest::new(self.deadline, cancel.clone()),
                Acceptance::Success,
            )
            .await?;
        res.json()
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn details(
        &self,
        entity: EntityRef,
        cancel: &CancellationToken,
    ) -> Result<DetailsPayload, RequestFailure> {
        let path = format!("/{}/{}", entity.kind.provider_segment(), entity.id);
        let target = self
            .target(&path)
            .query("append_to_response", "credits");
        self.get_json(target, cancel).await
    }

    async fn videos(
        &self,
        entity: EntityRef,
        cancel: &CancellationToken,
    ) -> Result<Vec<VideoCandidate>, RequestFailure> {
        let path = format!("/{}/{}/videos", entity.kind.provider_segment(), entity.id);
        let data: Videos = self.get_json(self.target(&path), cancel).await?;
        Ok(data.results.into_iter().map(Video::into_candidate).collect())
    }

    async fn images(
        &self,
        entity: EntityRef,
        cancel: &CancellationToken,
    ) -> Result<ImageListing, RequestFailure> {
        let path = format!("/{}/{}/images", entity.kind.provider_segment(), entity.id);
        self.get_json(self.target(&path), cancel).await
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Genre {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Person {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CrewMember {
    pub name: String,
    pub job: Option<String>,
}

/// Appended to the details payload via `append_to_response=credits`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Credits {
    #[serde(default)]
    pub cast: Vec<Person>,
    #[serde(default)]
    pub crew: Vec<CrewMember>,
}

/// Details as the provider returns them for either kind. Every field is
/// optional because a wrong-kind lookup can come back with almost nothing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetailsPayload {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub name: Option<String>,
    pub original_title: Option<String>,
    pub original_name: Option<String>,
    pub release_date: Option<String>,
    pub first_air_date: Option<String>,
    pub vote_average: Option<f32>,
    pub overview: Option<String>,
    pub runtime: Option<u32>,
    pub episode_run_time: Option<Vec<u32>>,
    pub genres: Option<Vec<Genre>>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub created_by: Option<Vec<Person>>,
    pub credits: Option<Credits>,
}

impl DetailsPayload {
    pub fn display_title(&self) -> Option<&str> {
        [
            &self.title,
            &self.name,
            &self.original_title,
            &self.original_name,
        ]
        .into_iter()
        .filter_map(|t| t.as_deref())
        .map(str::trim)
        .find(|t| !t.is_empty())
    }

    /// Carries its identifying id and something to call it by.
    pub fn is_presentable(&self) -> bool {
        self.id.is_some() && self.display_title().is_some()
    }

    pub fn year(&self) -> Option<String> {
        self.release_date
            .as_deref()
            .filter(|d| !d.is_empty())
            .or_else(|| self.first_air_date.as_deref().filter(|d| !d.is_empty()))
            .and_then(extract_year)
    }

    pub fn runtime_minutes(&self) -> Option<u32> {
        self.runtime.filter(|r| *r > 0).or_else(|| {
            self.episode_run_time
                .as_ref()
                .and_then(|r| r.first().copied())
        })
    }

    pub fn genre_names(&self) -> Vec<String> {
        self.genres
            .as_ref()
            .map(|g| g.iter().map(|x| x.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Billed cast in provider order, capped at [`MAX_CAST`].
    pub fn cast_names(&self) -> Vec<String> {
        self.credits
            .as_ref()
            .map(|c| c.cast.iter().take(MAX_CAST).map(|p| p.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Crew credited as "Director"; shows fall back to their creators.
    pub fn directors(&self) -> Vec<String> {
        let directors: Vec<String> = self
            .credits
            .as_ref()
            .map(|c| {
                c.crew
                    .iter()
                    .filter(|m| m.job.as_deref() == Some("Director"))
                    .map(|m| m.name.clone())
                    .collect()
            })
            .unwrap_or_default();
        if !directors.is_empty() {
            return directors;
        }
        self.created_by
            .as_ref()
            .map(|c| c.iter().map(|p| p.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn overview(&self) -> Option<String> {
        self.overview.clone().filter(|o| !o.trim().is_empty())
    }

    pub fn poster_url(&self) -> Option<String> {
        self.poster_path.as_deref().and_then(image_url)
    }

    pub fn backdrop_url(&self) -> Option<String> {
        self.backdrop_path.as_deref().and_then(image_url)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageListing {
    #[serde(default)]
    pub backdrops: Vec<Image>,
    #[serde(default)]
    pub posters: Vec<Image>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Image {
    pub file_path: String,
}

#[derive(Debug, Deserialize)]
struct Videos {
    #[serde(default)]
    results: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    key: String,
    site: String,
    #[serde(rename = "type")]
    video_type: String,
    #[serde(default)]
    official: bool,
    published_at: Option<String>,
    #[serde(default)]
    name: String,
}

impl Video {
    fn into_candidate(self) -> VideoCandidate {
        VideoCandidate {
            published_at: self.published_at.as_deref().and_then(parse_timestamp),
            external_key: self.key,
            host_site: self.site,
            category: self.video_type,
            is_official: self.official,
            title: self.name,
        }
    }
}

pub fn image_url(path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    Some(format!("{IMAGE_BASE}{path}"))
}

fn extract_year(date: &str) -> Option<String> {
    date.split('-')
        .next()
        .filter(|y| y.len() == 4 && y.chars().all(|c| c.is_ascii_digit()))
        .map(|s| s.to_string())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
