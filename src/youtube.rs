//! YouTube URL normalization.
//!
//! Every URL typed or pasted into a record goes through [`normalize`] before
//! any network call is made. Input that does not resolve to an 11 character
//! video id is "not ready yet" rather than an error, so the normalizer returns
//! `None` instead of failing and never panics on user input.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Prefix shared by every canonical watch URL.
pub const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";
const THUMBNAIL_HOST: &str = "https://img.youtube.com/vi";

static VIDEO_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid video id pattern"));

/// Best-effort scan used when structured parsing gives up.
static LOOSE_VIDEO_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:v=|/|be/|embed/|shorts/)([A-Za-z0-9_-]{11})")
        .expect("valid loose video id pattern")
});

/// A YouTube video reference reduced to its canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalUrl {
    watch_url: String,
    video_id: String,
}

impl CanonicalUrl {
    fn from_video_id(video_id: &str) -> Self {
        Self {
            watch_url: format!("{WATCH_URL_PREFIX}{video_id}"),
            video_id: video_id.to_owned(),
        }
    }

    pub fn watch_url(&self) -> &str {
        &self.watch_url
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.watch_url)
    }
}

/// Resolves arbitrary user input (watch links, short links, embeds, Shorts,
/// scheme-less pastes) into a canonical watch URL.
pub fn normalize(input: Option<&str>) -> Option<CanonicalUrl> {
    let trimmed = input?.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lowered = trimmed.to_ascii_lowercase();
    let with_scheme = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };

    let parsed = match Url::parse(&with_scheme) {
        Ok(parsed) => parsed,
        Err(_) => return loose_video_id(trimmed).map(|id| CanonicalUrl::from_video_id(&id)),
    };

    let candidate = structured_video_id(&parsed)
        .map(|id| strip_trailing_fragment(&id).to_owned())
        .filter(|id| !id.is_empty());

    match candidate {
        Some(id) if is_valid_video_id(&id) => Some(CanonicalUrl::from_video_id(&id)),
        _ => loose_video_id(trimmed).map(|id| CanonicalUrl::from_video_id(&id)),
    }
}

/// Convenience wrapper around [`normalize`] for a plain string.
pub fn normalize_str(input: &str) -> Option<CanonicalUrl> {
    normalize(Some(input))
}

/// Returns only the video id of a normalizable input.
pub fn extract_video_id(input: &str) -> Option<String> {
    normalize_str(input).map(|canonical| canonical.video_id)
}

pub fn is_valid_video_id(candidate: &str) -> bool {
    VIDEO_ID.is_match(candidate)
}

fn structured_video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let path = url.path();

    if host.ends_with("youtu.be") {
        let id = path.strip_prefix('/').unwrap_or(path);
        return Some(id.to_owned());
    }

    if host.ends_with("youtube.com") || host.ends_with("youtube-nocookie.com") {
        if path.starts_with("/watch") {
            return query_value(url, "v");
        }
        if path.starts_with("/embed/") || path.starts_with("/shorts/") {
            return path.split('/').nth(2).map(str::to_owned);
        }
        return query_value(url, "v");
    }

    None
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

fn strip_trailing_fragment(id: &str) -> &str {
    id.split(['?', '#', '&']).next().unwrap_or_default()
}

fn loose_video_id(raw: &str) -> Option<String> {
    LOOSE_VIDEO_ID
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

/// Preview image sizes published by YouTube for every video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailQuality {
    Default,
    #[default]
    Medium,
    High,
    Max,
}

impl ThumbnailQuality {
    fn file_name(self) -> &'static str {
        match self {
            ThumbnailQuality::Default => "default.jpg",
            ThumbnailQuality::Medium => "mqdefault.jpg",
            ThumbnailQuality::High => "hqdefault.jpg",
            ThumbnailQuality::Max => "maxresdefault.jpg",
        }
    }
}

pub fn thumbnail_url(video_id: &str, quality: ThumbnailQuality) -> String {
    format!("{THUMBNAIL_HOST}/{video_id}/{}", quality.file_name())
}
