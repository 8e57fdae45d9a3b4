//! Metadata lookups against YouTube's public oEmbed endpoint.
//!
//! Only the video title and the channel name are used. Everything else the
//! endpoint returns is ignored.

use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::youtube::{WATCH_URL_PREFIX, is_valid_video_id};

pub const DEFAULT_OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";

/// Title and channel name of a video as reported by YouTube.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMetadata {
    pub title: String,
    pub author_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("`{0}` is not a YouTube video id")]
    InvalidVideoId(String),
    #[error("metadata request failed with HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("metadata request could not be sent: {0}")]
    Transport(String),
    #[error("metadata response could not be decoded: {0}")]
    Decode(String),
    #[error("metadata task was interrupted: {0}")]
    Interrupted(String),
}

impl FetchError {
    /// HTTP status for server-side failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Source of video metadata. Implemented over HTTP for real runs and by
/// scripted fakes in tests.
pub trait MetadataFetcher: Send + Sync {
    fn fetch_metadata(&self, video_id: &str) -> Result<FetchedMetadata, FetchError>;
}

/// Subset of the oEmbed payload we care about. Missing fields come back empty.
#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    #[serde(default)]
    title: String,
    #[serde(default)]
    author_name: String,
}

#[derive(Debug, Clone)]
pub struct OEmbedFetcher {
    agent: ureq::Agent,
    endpoint: String,
}

impl OEmbedFetcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self {
            agent,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for OEmbedFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_OEMBED_ENDPOINT, Duration::from_secs(10))
    }
}

impl MetadataFetcher for OEmbedFetcher {
    fn fetch_metadata(&self, video_id: &str) -> Result<FetchedMetadata, FetchError> {
        if !is_valid_video_id(video_id) {
            return Err(FetchError::InvalidVideoId(video_id.to_owned()));
        }
        let watch_url = format!("{WATCH_URL_PREFIX}{video_id}");
        debug!("requesting oEmbed metadata for {watch_url}");

        let response = self
            .agent
            .get(&self.endpoint)
            .query("url", &watch_url)
            .query("format", "json")
            .set("Accept", "application/json")
            .call()
            .map_err(classify_failure)?;

        let payload: OEmbedResponse = response
            .into_json()
            .map_err(|err| FetchError::Decode(err.to_string()))?;

        Ok(FetchedMetadata {
            title: payload.title,
            author_name: payload.author_name,
        })
    }
}

fn classify_failure(error: ureq::Error) -> FetchError {
    match error {
        ureq::Error::Status(status, response) => {
            let reason = response.status_text().to_owned();
            let body = response.into_string().unwrap_or_default();
            let message = if body.trim().is_empty() {
                reason
            } else {
                format!("{reason} ({})", body.trim())
            };
            FetchError::Status { status, message }
        }
        ureq::Error::Transport(transport) => FetchError::Transport(transport.to_string()),
    }
}
