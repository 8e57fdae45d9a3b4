use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::csv_codec;
use crate::oembed::DEFAULT_OEMBED_ENDPOINT;
use crate::reconcile::{DEFAULT_BATCH_DELAY, DEFAULT_MAX_ATTEMPTS, ReconcileOptions};
use crate::script::{CookieSource, FilenameTemplate, ScriptGenerator};

pub const APP_DIR_NAME: &str = "audiobook-dl";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Settings as written in the TOML file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub filename_template: Option<String>,
    pub cookies_browser: Option<CookieSource>,
    pub csv_has_header: Option<bool>,
    pub csv_expected_columns: Option<usize>,
    pub debounce_ms: Option<u64>,
    pub batch_delay_ms: Option<u64>,
    pub max_fetch_attempts: Option<u32>,
    pub oembed_endpoint: Option<String>,
    pub http_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub filename_template: FilenameTemplate,
    pub cookies: CookieSource,
    pub csv_has_header: bool,
    pub csv_expected_columns: usize,
    pub debounce: Duration,
    pub batch_delay: Duration,
    pub max_fetch_attempts: u32,
    pub oembed_endpoint: String,
    pub http_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            filename_template: FilenameTemplate::default(),
            cookies: CookieSource::default(),
            csv_has_header: true,
            csv_expected_columns: csv_codec::default_columns().len(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            batch_delay: DEFAULT_BATCH_DELAY,
            max_fetch_attempts: DEFAULT_MAX_ATTEMPTS,
            oembed_endpoint: DEFAULT_OEMBED_ENDPOINT.to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            debounce: self.debounce,
            batch_delay: self.batch_delay,
            max_attempts: self.max_fetch_attempts,
        }
    }

    pub fn script_generator(&self) -> ScriptGenerator {
        ScriptGenerator::new(self.filename_template.clone(), self.cookies)
    }
}

/// `<config dir>/audiobook-dl/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn read_file_config(path: &Path) -> Result<Option<FileConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let cfg: FileConfig =
        toml::from_str(&content).with_context(|| format!("Parsing {}", path.display()))?;
    Ok(Some(cfg))
}

pub fn load_settings() -> Result<Settings> {
    match default_config_path() {
        Some(path) => load_settings_from(path),
        None => Ok(Settings::default()),
    }
}

pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    let cfg = read_file_config(path)?.unwrap_or_default();
    let defaults = Settings::default();

    let csv_expected_columns = cfg
        .csv_expected_columns
        .unwrap_or(defaults.csv_expected_columns);
    ensure!(
        csv_expected_columns >= 1,
        "csv_expected_columns must be at least 1 in {}",
        path.display()
    );
    let max_fetch_attempts = cfg
        .max_fetch_attempts
        .unwrap_or(defaults.max_fetch_attempts);
    ensure!(
        max_fetch_attempts >= 1,
        "max_fetch_attempts must be at least 1 in {}",
        path.display()
    );

    Ok(Settings {
        filename_template: cfg
            .filename_template
            .map(FilenameTemplate::new)
            .unwrap_or(defaults.filename_template),
        cookies: cfg.cookies_browser.unwrap_or(defaults.cookies),
        csv_has_header: cfg.csv_has_header.unwrap_or(defaults.csv_has_header),
        csv_expected_columns,
        debounce: cfg
            .debounce_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.debounce),
        batch_delay: cfg
            .batch_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.batch_delay),
        max_fetch_attempts,
        oembed_endpoint: cfg
            .oembed_endpoint
            .filter(|endpoint| !endpoint.trim().is_empty())
            .unwrap_or(defaults.oembed_endpoint),
        http_timeout: cfg
            .http_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.http_timeout),
    })
}
