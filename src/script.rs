//! yt-dlp script and command generation.
//!
//! Every complete record becomes one `yt-dlp` invocation that extracts the
//! audio track as mp3 and names the file after the record's metadata. The
//! invocations are either wrapped in a standalone bash script or chained into
//! a single command line for pasting into a terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{FieldError, Record, RecordField, RecordId};
use crate::youtube;

const DOWNLOADER: &str = "yt-dlp";
const AUDIO_FLAGS: &str = "-x --audio-format mp3";

/// Browser yt-dlp should borrow cookies from, for videos behind a sign-in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CookieSource {
    #[default]
    None,
    Brave,
    Chrome,
    Chromium,
    Edge,
    Firefox,
    Opera,
    Safari,
    Vivaldi,
    Whale,
}

impl CookieSource {
    pub const ALL: [CookieSource; 10] = [
        CookieSource::None,
        CookieSource::Brave,
        CookieSource::Chrome,
        CookieSource::Chromium,
        CookieSource::Edge,
        CookieSource::Firefox,
        CookieSource::Opera,
        CookieSource::Safari,
        CookieSource::Vivaldi,
        CookieSource::Whale,
    ];

    /// Name passed to `--cookies-from-browser`, or `None` to omit the flag.
    pub fn browser(self) -> Option<&'static str> {
        match self {
            CookieSource::None => None,
            CookieSource::Brave => Some("brave"),
            CookieSource::Chrome => Some("chrome"),
            CookieSource::Chromium => Some("chromium"),
            CookieSource::Edge => Some("edge"),
            CookieSource::Firefox => Some("firefox"),
            CookieSource::Opera => Some("opera"),
            CookieSource::Safari => Some("safari"),
            CookieSource::Vivaldi => Some("vivaldi"),
            CookieSource::Whale => Some("whale"),
        }
    }
}

impl fmt::Display for CookieSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.browser().unwrap_or("none"))
    }
}

/// Output filename pattern handed to `yt-dlp -o`.
///
/// `$author`, `$title`, `$narrator`, `$series`, `$series_num` and `$year` are
/// replaced with record values. Everything else, including yt-dlp's own
/// `%(ext)s` fields, is passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilenameTemplate(String);

impl FilenameTemplate {
    pub const DEFAULT: &'static str = "$author - [$series - $series_num] - $title [$narrator].%(ext)s";

    /// Longest names first so `$series_num` is never read as `$series`.
    const PLACEHOLDERS: [(&'static str, RecordField); 6] = [
        ("series_num", RecordField::SeriesNumber),
        ("narrator", RecordField::Narrator),
        ("author", RecordField::Author),
        ("series", RecordField::Series),
        ("title", RecordField::Title),
        ("year", RecordField::Year),
    ];

    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, record: &Record) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();

        while let Some(offset) = rest.find('$') {
            out.push_str(&rest[..offset]);
            let after = &rest[offset + 1..];
            let matched = Self::PLACEHOLDERS
                .iter()
                .find(|(name, _)| after.starts_with(name));
            match matched {
                Some((name, field)) => {
                    out.push_str(&record.field_value(*field).replace('%', "%%"));
                    rest = &after[name.len()..];
                }
                None => {
                    out.push('$');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for FilenameTemplate {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl fmt::Display for FilenameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("no complete records to download ({invalid} incomplete)")]
    NoValidRecords { invalid: usize },
}

/// A record left out of the download list and the reasons why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRecord {
    pub id: RecordId,
    /// Zero-based row in the collection.
    pub index: usize,
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Default)]
pub struct Selection<'a> {
    pub valid: Vec<&'a Record>,
    pub invalid: Vec<InvalidRecord>,
}

/// Splits records into downloadable and incomplete ones. Blank placeholder
/// rows are neither.
pub fn select_valid(records: &[Record]) -> Selection<'_> {
    let mut selection = Selection::default();
    for (index, record) in records.iter().enumerate() {
        if record.is_complete() {
            selection.valid.push(record);
            continue;
        }
        if record.is_blank() {
            continue;
        }
        let errors = record
            .validate()
            .into_iter()
            .filter(|error| {
                matches!(
                    error.field(),
                    RecordField::Url
                        | RecordField::Title
                        | RecordField::Author
                        | RecordField::Narrator
                )
            })
            .collect();
        selection.invalid.push(InvalidRecord {
            id: record.id,
            index,
            errors,
        });
    }
    selection
}

/// Single-quotes an argument for POSIX shells. Embedded single quotes close
/// the quoted run, emit a double-quoted `'` and reopen it.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptGenerator {
    template: FilenameTemplate,
    cookies: CookieSource,
}

impl ScriptGenerator {
    pub fn new(template: FilenameTemplate, cookies: CookieSource) -> Self {
        Self { template, cookies }
    }

    pub fn template(&self) -> &FilenameTemplate {
        &self.template
    }

    pub fn cookies(&self) -> CookieSource {
        self.cookies
    }

    /// One yt-dlp call for `record`, or `None` when its URL is not a video.
    pub fn invocation(&self, record: &Record) -> Option<String> {
        let canonical = youtube::normalize_str(&record.url)?;
        let mut line = format!("{DOWNLOADER} {AUDIO_FLAGS}");
        if let Some(browser) = self.cookies.browser() {
            line.push_str(" --cookies-from-browser ");
            line.push_str(browser);
        }
        line.push_str(" -o ");
        line.push_str(&shell_quote(&self.template.render(record)));
        line.push(' ');
        line.push_str(&shell_quote(canonical.watch_url()));
        Some(line)
    }

    fn invocations(&self, records: &[Record]) -> Result<Vec<String>, ScriptError> {
        let selection = select_valid(records);
        if selection.valid.is_empty() {
            return Err(ScriptError::NoValidRecords {
                invalid: selection.invalid.len(),
            });
        }
        Ok(selection
            .valid
            .iter()
            .filter_map(|record| self.invocation(record))
            .collect())
    }

    /// A self-contained bash script downloading every complete record.
    pub fn script(&self, records: &[Record]) -> Result<String, ScriptError> {
        let lines = self.invocations(records)?;
        let mut script = String::from("#!/usr/bin/env bash\nset -euo pipefail\n\n");
        script.push_str(&format!(
            "if ! command -v {DOWNLOADER} >/dev/null 2>&1; then\n  echo \"{DOWNLOADER} is not installed\" >&2\n  exit 1\nfi\n\n"
        ));
        for line in lines {
            script.push_str(&line);
            script.push('\n');
        }
        Ok(script)
    }

    /// Every invocation chained with `&&` on a single line.
    pub fn command(&self, records: &[Record]) -> Result<String, ScriptError> {
        Ok(self.invocations(records)?.join(" && "))
    }
}
