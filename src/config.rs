use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

use crate::tmdb::TMDB_BASE;

pub const DEFAULT_ROTATION_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_WATCHLIST_TIMEOUT_MS: u64 = 10_000;

/// Pre-acquired provider credential, attached to every provider call.
#[derive(Clone)]
pub enum TmdbCredential {
    /// v3 key, sent as the `api_key` query parameter.
    ApiKey(String),
    /// v4 read access token, sent as a bearer header.
    ReadAccessToken(String),
}

impl std::fmt::Debug for TmdbCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TmdbCredential::ApiKey(_) => f.write_str("ApiKey(..)"),
            TmdbCredential::ReadAccessToken(_) => f.write_str("ReadAccessToken(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub tmdb_base_url: String,
    pub tmdb_credential: TmdbCredential,
    pub api_url: Option<String>,
    pub session_token: Option<String>,
    pub rotation_interval: Duration,
    pub request_timeout: Duration,
    pub watchlist_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tmdb_credential = match (get("TMDB_READ_ACCESS_TOKEN"), get("TMDB_API_KEY")) {
            (Some(token), _) => TmdbCredential::ReadAccessToken(token),
            (None, Some(key)) => TmdbCredential::ApiKey(key),
            (None, None) => {
                return Err(anyhow!(
                    "Missing required environment variable: TMDB_API_KEY or TMDB_READ_ACCESS_TOKEN"
                ))
            }
        };

        Ok(Self {
            tmdb_base_url: get("TMDB_BASE_URL").unwrap_or_else(|| TMDB_BASE.to_string()),
            tmdb_credential,
            api_url: get("MOVIEMATE_API_URL").map(|u| u.trim_end_matches('/').to_string()),
            session_token: get("MOVIEMATE_TOKEN"),
            rotation_interval: millis(&get, "MOVIEMATE_ROTATION_MS", DEFAULT_ROTATION_MS)?,
            request_timeout: millis(
                &get,
                "MOVIEMATE_REQUEST_TIMEOUT_MS",
                DEFAULT_REQUEST_TIMEOUT_MS,
            )?,
            watchlist_timeout: millis(
                &get,
                "MOVIEMATE_WATCHLIST_TIMEOUT_MS",
                DEFAULT_WATCHLIST_TIMEOUT_MS,
            )?,
        })
    }

    pub fn require_api_url(&self) -> Result<&str> {
        self.api_url
            .as_deref()
            .ok_or_else(|| anyhow!("Missing required environment variable: MOVIEMATE_API_URL"))
    }
}

fn millis<F>(get: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let ms = match get(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of milliseconds"))?,
        None => default,
    };
    if ms == 0 {
        anyhow::bail!("{} must be positive", key);
    }
    Ok(Duration::from_millis(ms))
}
