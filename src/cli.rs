//! Command-line interface definitions for News Collector.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Secrets and most settings can be provided via command-line flags or
//! environment variables (a `.env` file in the working directory is loaded
//! first). Values given here override the optional YAML config file.

use crate::crypto::{EncryptionMode, KeyDerivation};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the News Collector application.
///
/// # Examples
///
/// ```sh
/// # Full pipeline, key from the environment
/// NEWS_API_KEY=... news_collector
///
/// # Full pipeline, then commit and push data/news.json
/// news_collector run --push
///
/// # Read the encrypted canonical document back
/// ENCRYPTION_KEY=... news_collector decrypt
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding scratch snapshots and the canonical document
    #[arg(short, long, global = true, env = "NEWS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Optional path to a YAML config file
    #[arg(short, long, global = true, env = "NEWS_COLLECTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// News API key
    #[arg(long, global = true, env = "NEWS_API_KEY", hide_env_values = true)]
    pub news_api_key: Option<String>,

    /// News API top-headlines endpoint
    #[arg(long, global = true, env = "NEWS_API_URL")]
    pub news_api_url: Option<String>,

    /// Two-letter country filter for the news API
    #[arg(long, global = true, env = "NEWS_API_COUNTRY")]
    pub country: Option<String>,

    /// Category filter for the news API
    #[arg(long, global = true, env = "NEWS_API_CATEGORY")]
    pub category: Option<String>,

    /// RSS feed URL
    #[arg(long, global = true, env = "NEWS_RSS_URL")]
    pub rss_url: Option<String>,

    /// Fernet key or passphrase used to encrypt the canonical document
    #[arg(long, global = true, env = "ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    /// Whether encrypting the canonical document is skipped, attempted or enforced
    #[arg(
        long,
        global = true,
        env = "NEWS_ENCRYPTION",
        value_enum,
        default_value_t = EncryptionMode::BestEffort
    )]
    pub encryption: EncryptionMode,

    /// How a passphrase is turned into a cipher key
    #[arg(long, global = true, value_enum, default_value_t = KeyDerivation::Argon2id)]
    pub key_derivation: KeyDerivation,

    /// Timeout for each HTTP request, in seconds (client default when unset)
    #[arg(long, global = true, env = "NEWS_HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch both sources, combine, replace the canonical document and encrypt it (default)
    Run(PublishArgs),
    /// Fetch both sources and write their scratch snapshots only
    Collect,
    /// Combine existing scratch snapshots into the canonical document
    Combine(PublishArgs),
    /// Summarize the newest news API scratch response
    Inspect,
    /// Compare the scratch snapshots of both sources
    Compare,
    /// Summarize the canonical document, decrypting it in memory if needed
    Summary,
    /// Decrypt the canonical document
    Decrypt(DecryptArgs),
}

/// Options for committing and pushing the canonical document.
#[derive(Args, Debug, Default, Clone)]
pub struct PublishArgs {
    /// Commit and push the canonical document after a successful run
    #[arg(long, env = "NEWS_GIT_PUSH")]
    pub push: bool,

    /// Git work tree to commit in (defaults to the current directory)
    #[arg(long, env = "NEWS_REPO_DIR")]
    pub repo_dir: Option<PathBuf>,

    /// Rewrite an HTTPS `origin` remote to its SSH form before pushing
    #[arg(long)]
    pub convert_remote_to_ssh: bool,

    /// Commit message (a timestamped message is generated when omitted)
    #[arg(long)]
    pub message: Option<String>,
}

#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Encrypted file (defaults to the canonical document)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Write plaintext here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replace the input file with its plaintext
    #[arg(long, conflicts_with = "output")]
    pub in_place: bool,
}
