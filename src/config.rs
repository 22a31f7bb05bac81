//! Explicit runtime configuration.
//!
//! Every component receives what it needs (paths, endpoints, key material)
//! through the values defined here instead of looking at the working
//! directory or the process environment itself. Settings are layered:
//! built-in defaults, then an optional YAML file, then CLI flags and
//! environment variables (see [`crate::cli::Cli`]).

use crate::cli::{Cli, PublishArgs};
use crate::crypto::{EncryptionMode, KeyDerivation};
use crate::error::ConfigError;
use crate::utils::is_news_response_name;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

pub const DEFAULT_NEWS_API_URL: &str = "https://newsapi.org/v2/top-headlines";
pub const DEFAULT_RSS_URL: &str = "https://www.barometern.se/feed";
pub const DEFAULT_COUNTRY: &str = "us";
pub const DEFAULT_CATEGORY: &str = "business";
pub const DEFAULT_NEWS_API_LABEL: &str = "News API";
pub const DEFAULT_RSS_LABEL: &str = "Sweden RSS";

/// File name prefix of news API scratch responses.
pub const NEWS_RESPONSE_PREFIX: &str = "news_response_";
/// File name prefix of saved news API error bodies.
pub const ERROR_RESPONSE_PREFIX: &str = "error_response_";

/// Where every artifact of a run lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    pub data_dir: PathBuf,
    /// Fixed name of the RSS snapshot.
    pub rss_snapshot: String,
    /// Staging name of the freshly merged document.
    pub staged: String,
    /// Name of the published document.
    pub canonical: String,
}

impl Default for DataLayout {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            rss_snapshot: "sweden.json".to_string(),
            staged: "combined_news.json".to_string(),
            canonical: "news.json".to_string(),
        }
    }
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn rss_snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.rss_snapshot)
    }

    pub fn staged_path(&self) -> PathBuf {
        self.data_dir.join(&self.staged)
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.data_dir.join(&self.canonical)
    }

    /// Scratch path for a news API response fetched at `stamp` (`YYYYMMDD_HHMMSS`).
    pub fn news_response_path(&self, stamp: &str) -> PathBuf {
        self.data_dir.join(format!("{NEWS_RESPONSE_PREFIX}{stamp}.json"))
    }

    pub fn error_response_path(&self, stamp: &str) -> PathBuf {
        self.data_dir.join(format!("{ERROR_RESPONSE_PREFIX}{stamp}.json"))
    }

    /// Reject file names that would make cleanup delete the staged or
    /// canonical document, or make two artifacts share a path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("rss snapshot", &self.rss_snapshot),
            ("staged", &self.staged),
            ("canonical", &self.canonical),
        ];
        for (role, name) in names {
            if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
                return Err(ConfigError::Layout(format!(
                    "{role} file name {name:?} must be a plain file name"
                )));
            }
            if is_news_response_name(name) {
                return Err(ConfigError::Layout(format!(
                    "{role} file name {name:?} collides with news API scratch responses"
                )));
            }
        }
        for (i, (role, name)) in names.iter().enumerate() {
            if let Some((other, _)) = names[i + 1..].iter().find(|(_, n)| n == name) {
                return Err(ConfigError::Layout(format!(
                    "{role} and {other} files are both named {name:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Fixed request parameters of the news API fetcher.
#[derive(Debug, Clone)]
pub struct NewsApiConfig {
    pub endpoint: String,
    pub country: String,
    pub category: String,
    pub api_key: Option<String>,
    /// Provenance label stamped on every normalized article.
    pub label: String,
}

impl NewsApiConfig {
    /// The API key, or [`ConfigError::MissingApiKey`] when none was configured.
    pub fn require_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

#[derive(Debug, Clone)]
pub struct RssConfig {
    pub url: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    pub mode: EncryptionMode,
    pub key: Option<String>,
    pub derivation: KeyDerivation,
}

#[derive(Debug, Clone, Default)]
pub struct GitConfig {
    pub push: bool,
    pub repo_dir: PathBuf,
    pub convert_remote_to_ssh: bool,
    pub message: Option<String>,
}

impl From<&PublishArgs> for GitConfig {
    fn from(args: &PublishArgs) -> Self {
        Self {
            push: args.push,
            repo_dir: args.repo_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
            convert_remote_to_ssh: args.convert_remote_to_ssh,
            message: args.message.clone(),
        }
    }
}

/// Fully resolved configuration of one invocation.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub layout: DataLayout,
    pub news_api: NewsApiConfig,
    pub rss: RssConfig,
    pub encryption: EncryptionConfig,
    pub git: GitConfig,
    pub http_timeout: Option<Duration>,
}

/// Optional YAML config file.
///
/// ```yaml
/// data_dir: /srv/news/data
/// news_api:
///   country: se
///   category: general
/// rss:
///   url: https://www.barometern.se/feed
///   snapshot: sweden.json
/// files:
///   canonical: news.json
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub http_timeout_secs: Option<u64>,
    pub news_api: NewsApiSection,
    pub rss: RssSection,
    pub files: FilesSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NewsApiSection {
    pub url: Option<String>,
    pub country: Option<String>,
    pub category: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RssSection {
    pub url: Option<String>,
    pub label: Option<String>,
    pub snapshot: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilesSection {
    pub staged: Option<String>,
    pub canonical: Option<String>,
}

impl FileConfig {
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config file");
        Ok(parsed)
    }

    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file is a valid, empty config.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}

impl AppConfig {
    /// Layer CLI/env values over the file config over built-in defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Layout`] when the configured file names collide.
    pub fn resolve(
        cli: &Cli,
        file: FileConfig,
        publish: Option<&PublishArgs>,
    ) -> Result<Self, ConfigError> {
        let defaults = DataLayout::default();
        let layout = DataLayout {
            data_dir: cli
                .data_dir
                .clone()
                .or(file.data_dir)
                .unwrap_or(defaults.data_dir),
            rss_snapshot: file.rss.snapshot.unwrap_or(defaults.rss_snapshot),
            staged: file.files.staged.unwrap_or(defaults.staged),
            canonical: file.files.canonical.unwrap_or(defaults.canonical),
        };
        layout.validate()?;

        let news_api = NewsApiConfig {
            endpoint: cli
                .news_api_url
                .clone()
                .or(file.news_api.url)
                .unwrap_or_else(|| DEFAULT_NEWS_API_URL.to_string()),
            country: cli
                .country
                .clone()
                .or(file.news_api.country)
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            category: cli
                .category
                .clone()
                .or(file.news_api.category)
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            api_key: cli.news_api_key.clone(),
            label: file
                .news_api
                .label
                .unwrap_or_else(|| DEFAULT_NEWS_API_LABEL.to_string()),
        };

        let rss = RssConfig {
            url: cli
                .rss_url
                .clone()
                .or(file.rss.url)
                .unwrap_or_else(|| DEFAULT_RSS_URL.to_string()),
            label: file.rss.label.unwrap_or_else(|| DEFAULT_RSS_LABEL.to_string()),
        };

        Ok(Self {
            layout,
            news_api,
            rss,
            encryption: EncryptionConfig {
                mode: cli.encryption,
                key: cli.encryption_key.clone().filter(|k| !k.is_empty()),
                derivation: cli.key_derivation,
            },
            git: publish.map(GitConfig::from).unwrap_or_default(),
            http_timeout: cli
                .http_timeout_secs
                .or(file.http_timeout_secs)
                .map(Duration::from_secs),
        })
    }
}
