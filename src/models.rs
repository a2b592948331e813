use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const YOUTUBE_SITE: &str = "YouTube";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Show,
}

impl MediaKind {
    /// Path segment the provider uses for this kind.
    pub fn provider_segment(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "tv",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.provider_segment())
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "movie" => Ok(MediaKind::Movie),
            "tv" | "show" => Ok(MediaKind::Show),
            _ => Err(anyhow::anyhow!("media kind must be 'movie' or 'tv'")),
        }
    }
}

/// Identifies one media item across every provider endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: i64,
    pub kind: MediaKind,
}

impl EntityRef {
    pub fn movie(id: i64) -> Self {
        Self {
            id,
            kind: MediaKind::Movie,
        }
    }

    pub fn show(id: i64) -> Self {
        Self {
            id,
            kind: MediaKind::Show,
        }
    }

    pub fn with_kind(self, kind: MediaKind) -> Self {
        Self { id: self.id, kind }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub external_key: String,
    pub host_site: String,
    pub category: String,
    pub is_official: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub title: String,
}

impl VideoCandidate {
    pub fn is_trailer(&self) -> bool {
        self.category == "Trailer"
    }

    pub fn is_youtube(&self) -> bool {
        self.host_site.eq_ignore_ascii_case(YOUTUBE_SITE)
    }

    pub fn watch_url(&self) -> Option<String> {
        self.is_youtube()
            .then(|| format!("https://www.youtube.com/watch?v={}", self.external_key))
    }

    pub fn embed_url(&self) -> Option<String> {
        self.is_youtube()
            .then(|| format!("https://www.youtube.com/embed/{}", self.external_key))
    }
}

/// The aggregated, presentable view of one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaRecord {
    /// The reference the details were actually found under.
    pub entity: EntityRef,
    pub title: String,
    pub year: Option<String>,
    pub rating: Option<f32>,
    pub overview: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub genres: Vec<String>,
    pub cast: Vec<String>,
    pub directors: Vec<String>,
    pub poster: Option<String>,
    pub backdrop: Option<String>,
    pub images: Vec<String>,
    pub trailer: Option<VideoCandidate>,
    /// Enrichment steps that failed and were left empty.
    pub partial_failures: Vec<PartialFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialFailure {
    pub step: EnrichmentStep,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStep {
    Videos,
    Images,
}

/// Lightweight listing entry used by the watchlist page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaSummary {
    pub entity: EntityRef,
    pub title: String,
    pub year: Option<String>,
    pub poster: Option<String>,
    pub overview: Option<String>,
}
