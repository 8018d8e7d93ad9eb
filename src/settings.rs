use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment};
use serde::Deserialize;

use crate::api::DEFAULT_BASE_URL;

const DATE_FORMAT: &str = "%Y%m%d";
const DEFAULT_BASE_DIR: &str = "./output";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One comments CSV and one replies CSV per video
    Csv,
    /// Rows in the SQLite store, plus run history
    Sqlite,
}

#[derive(Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub base_dir: PathBuf,
    pub max_comments: usize,
    pub page_size: usize,
    #[serde(default)]
    pub max_fetch_attempts: Option<usize>,
    pub concurrency: usize,
    pub request_timeout_secs: u64,
    pub format: OutputFormat,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Settings {
    /// Defaults overridden by `YT_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::from_builder(env_builder())
    }

    /// `base_dir` alone, for logging an abort when the full settings are
    /// invalid. Falls back to the default when it cannot be read either.
    pub fn load_base_dir() -> PathBuf {
        base_dir_from(env_builder())
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .set_default("api_base_url", DEFAULT_BASE_URL)?
            .set_default("base_dir", DEFAULT_BASE_DIR)?
            .set_default("max_comments", 100)?
            .set_default("page_size", 100)?
            .set_default("concurrency", 1)?
            .set_default("request_timeout_secs", 30)?
            .set_default("format", "csv")?
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    /// `YT_API_KEY`, falling back to the conventional `YOUTUBE_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("YOUTUBE_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.base_dir.join("comments.sqlite"))
    }

    pub fn paths(&self, date: &str) -> RunPaths {
        RunPaths::new(&self.base_dir, date)
    }
}

fn env_builder() -> ConfigBuilder<DefaultState> {
    Config::builder().add_source(Environment::with_prefix("YT"))
}

fn base_dir_from(builder: ConfigBuilder<DefaultState>) -> PathBuf {
    builder
        .set_default("base_dir", DEFAULT_BASE_DIR)
        .and_then(|b| b.build())
        .and_then(|c| c.get::<PathBuf>("base_dir"))
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_BASE_DIR))
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("base_dir", &self.base_dir)
            .field("max_comments", &self.max_comments)
            .field("page_size", &self.page_size)
            .field("max_fetch_attempts", &self.max_fetch_attempts)
            .field("concurrency", &self.concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("format", &self.format)
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// Date-stamped locations for one run under `base_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    pub trending_csv: PathBuf,
    pub comments_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_file: PathBuf,
}

impl RunPaths {
    pub fn new(base_dir: &Path, date: &str) -> Self {
        let log_dir = base_dir.join("log");
        RunPaths {
            trending_csv: base_dir.join("trending").join(format!("{}.csv", date)),
            comments_dir: base_dir.join("comments").join(date),
            log_file: log_dir.join(format!("{}_comments.log", date)),
            log_dir,
        }
    }
}

pub fn today() -> String {
    Local::now().format(DATE_FORMAT).to_string()
}

/// clap value parser for `--date`.
pub fn parse_run_date(raw: &str) -> Result<String, String> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .map_err(|_| format!("expected YYYYMMDD, got {:?}", raw))
}
