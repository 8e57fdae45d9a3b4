//! Audiobook records and their field-level validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::youtube;

pub const DEFAULT_SERIES_NUMBER: u32 = 1;
pub const MIN_YEAR: i32 = 1000;
pub const MAX_YEAR: i32 = 9999;

/// Opaque identifier of a record. Freshly generated for every new record and
/// never handed out twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One audiobook entry anchored to a YouTube video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub narrator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default = "default_series_number")]
    pub series_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

fn default_series_number() -> u32 {
    DEFAULT_SERIES_NUMBER
}

impl Record {
    /// A blank record with a brand new id.
    pub fn empty() -> Self {
        Self {
            id: RecordId::new(),
            url: String::new(),
            title: String::new(),
            author: String::new(),
            narrator: String::new(),
            series: None,
            series_number: DEFAULT_SERIES_NUMBER,
            year: None,
        }
    }

    /// Copies every bibliographic field into a new record. The URL is left
    /// empty.
    pub fn duplicate(&self) -> Self {
        Self {
            title: self.title.clone(),
            author: self.author.clone(),
            narrator: self.narrator.clone(),
            series: self.series.clone(),
            series_number: self.series_number,
            year: self.year,
            ..Self::empty()
        }
    }

    pub fn series_str(&self) -> &str {
        self.series.as_deref().unwrap_or_default()
    }

    /// True when nothing has been entered yet.
    pub fn is_blank(&self) -> bool {
        self.url.trim().is_empty()
            && self.title.trim().is_empty()
            && self.author.trim().is_empty()
            && self.narrator.trim().is_empty()
            && self.series_str().trim().is_empty()
            && self.series_number == DEFAULT_SERIES_NUMBER
            && self.year.is_none()
    }

    /// Short label used when listing records: `author - title`, or whichever
    /// of the two is present.
    pub fn heading(&self) -> Option<String> {
        let author = self.author.trim();
        let title = self.title.trim();
        match (author.is_empty(), title.is_empty()) {
            (false, false) => Some(format!("{author} - {title}")),
            (false, true) => Some(author.to_owned()),
            (true, false) => Some(title.to_owned()),
            (true, true) => None,
        }
    }

    pub fn apply(&self, patch: &RecordPatch) -> Self {
        let mut next = self.clone();
        if let Some(url) = &patch.url {
            next.url = url.clone();
        }
        if let Some(title) = &patch.title {
            next.title = title.clone();
        }
        if let Some(author) = &patch.author {
            next.author = author.clone();
        }
        if let Some(narrator) = &patch.narrator {
            next.narrator = narrator.clone();
        }
        if let Some(series) = &patch.series {
            next.series = series.clone();
        }
        if let Some(series_number) = patch.series_number {
            next.series_number = series_number.max(DEFAULT_SERIES_NUMBER);
        }
        if let Some(year) = patch.year {
            next.year = year;
        }
        next
    }

    pub fn field_value(&self, field: RecordField) -> String {
        match field {
            RecordField::Url => self.url.clone(),
            RecordField::Title => self.title.clone(),
            RecordField::Author => self.author.clone(),
            RecordField::Narrator => self.narrator.clone(),
            RecordField::Series => self.series_str().to_owned(),
            RecordField::SeriesNumber => self.series_number.to_string(),
            RecordField::Year => self.year.map(|year| year.to_string()).unwrap_or_default(),
        }
    }

    /// Checks every field and reports each problem separately.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.url.trim().is_empty() {
            errors.push(FieldError::MissingUrl);
        } else if youtube::normalize_str(&self.url).is_none() {
            errors.push(FieldError::InvalidUrl);
        }
        if self.title.trim().is_empty() {
            errors.push(FieldError::MissingTitle);
        }
        if self.author.trim().is_empty() {
            errors.push(FieldError::MissingAuthor);
        }
        if self.narrator.trim().is_empty() {
            errors.push(FieldError::MissingNarrator);
        }
        if self.series_number < DEFAULT_SERIES_NUMBER {
            errors.push(FieldError::SeriesNumberTooSmall);
        }
        if let Some(year) = self.year
            && !(MIN_YEAR..=MAX_YEAR).contains(&year)
        {
            errors.push(FieldError::YearOutOfRange(year));
        }

        errors
    }

    /// Completeness check used before script generation: url, title, author
    /// and narrator must be present and the url must point at a video.
    pub fn is_complete(&self) -> bool {
        !self.url.trim().is_empty()
            && !self.title.trim().is_empty()
            && !self.author.trim().is_empty()
            && !self.narrator.trim().is_empty()
            && youtube::normalize_str(&self.url).is_some()
    }
}

/// Field-level merge applied by [`crate::collection::Collection::update`].
/// `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub url: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub narrator: Option<String>,
    pub series: Option<Option<String>>,
    pub series_number: Option<u32>,
    pub year: Option<Option<i32>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Builds a patch from free text the way a form field would. Surrounding
    /// whitespace is dropped, and numbers that fail to parse fall back to
    /// their defaults instead of being rejected.
    pub fn from_text(field: RecordField, raw: &str) -> Self {
        let text = raw.trim();
        let mut patch = Self::default();
        match field {
            RecordField::Url => patch.url = Some(text.to_owned()),
            RecordField::Title => patch.title = Some(text.to_owned()),
            RecordField::Author => patch.author = Some(text.to_owned()),
            RecordField::Narrator => patch.narrator = Some(text.to_owned()),
            RecordField::Series => {
                patch.series = Some((!text.is_empty()).then(|| text.to_owned()));
            }
            RecordField::SeriesNumber => patch.series_number = Some(parse_series_number(raw)),
            RecordField::Year => patch.year = Some(parse_year(raw)),
        }
        patch
    }
}

/// Parses a series number, defaulting to 1 for anything unusable.
pub fn parse_series_number(raw: &str) -> u32 {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|value| *value >= DEFAULT_SERIES_NUMBER)
        .unwrap_or(DEFAULT_SERIES_NUMBER)
}

/// Parses an optional year; blank, unparseable or non-positive input means
/// "no year".
pub fn parse_year(raw: &str) -> Option<i32> {
    raw.trim().parse::<i32>().ok().filter(|year| *year >= 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    Url,
    Title,
    Author,
    Narrator,
    Series,
    SeriesNumber,
    Year,
}

impl RecordField {
    pub const ALL: [RecordField; 7] = [
        RecordField::Url,
        RecordField::Title,
        RecordField::Author,
        RecordField::Narrator,
        RecordField::Series,
        RecordField::SeriesNumber,
        RecordField::Year,
    ];

    pub fn key(self) -> &'static str {
        match self {
            RecordField::Url => "url",
            RecordField::Title => "title",
            RecordField::Author => "author",
            RecordField::Narrator => "narrator",
            RecordField::Series => "series",
            RecordField::SeriesNumber => "series_number",
            RecordField::Year => "year",
        }
    }
}

impl FromStr for RecordField {
    type Err = UnknownField;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "url" => Ok(RecordField::Url),
            "title" => Ok(RecordField::Title),
            "author" => Ok(RecordField::Author),
            "narrator" => Ok(RecordField::Narrator),
            "series" => Ok(RecordField::Series),
            "series_number" | "seriesnumber" | "series_num" => Ok(RecordField::SeriesNumber),
            "year" => Ok(RecordField::Year),
            _ => Err(UnknownField(value.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown record field `{0}`")]
pub struct UnknownField(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("URL is required")]
    MissingUrl,
    #[error("URL does not point at a YouTube video")]
    InvalidUrl,
    #[error("title is required")]
    MissingTitle,
    #[error("author is required")]
    MissingAuthor,
    #[error("narrator is required")]
    MissingNarrator,
    #[error("series number must be at least 1")]
    SeriesNumberTooSmall,
    #[error("year {0} is not a 4-digit year")]
    YearOutOfRange(i32),
}

impl FieldError {
    pub fn field(&self) -> RecordField {
        match self {
            FieldError::MissingUrl | FieldError::InvalidUrl => RecordField::Url,
            FieldError::MissingTitle => RecordField::Title,
            FieldError::MissingAuthor => RecordField::Author,
            FieldError::MissingNarrator => RecordField::Narrator,
            FieldError::SeriesNumberTooSmall => RecordField::SeriesNumber,
            FieldError::YearOutOfRange(_) => RecordField::Year,
        }
    }
}
