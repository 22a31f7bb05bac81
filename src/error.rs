//! Error kinds for each pipeline stage.
//!
//! Fetchers log [`FetchError`] and never return it; every other enum
//! propagates into [`PipelineError`] or the binary's exit status.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid JSON body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid XML body: {0}")]
    Xml(String),

    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("no data available from either source")]
    NoSourceData,

    #[error("failed to serialize combined document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("staged document {0} not found")]
    StagedMissing(PathBuf),

    #[error("canonical path {0} is a directory")]
    CanonicalIsDirectory(PathBuf),

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption is required but this build has no cipher support")]
    Unavailable,

    #[error("document {0} not found")]
    Missing(PathBuf),

    #[error("refusing to encrypt: input is not plaintext JSON (already encrypted?)")]
    NotPlaintext,

    #[error("no encryption key configured (set ENCRYPTION_KEY or --encryption-key)")]
    MissingKey,

    #[error("invalid encryption key")]
    InvalidKey,

    #[error("key derivation failed: {0}")]
    Derivation(String),

    #[error("decryption failed: wrong key or corrupted ciphertext")]
    Decrypt,

    #[error("malformed encrypted envelope")]
    Envelope,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum GitError {
    #[error("{0} is not inside a git work tree")]
    NotARepository(PathBuf),

    #[error("could not determine the current branch")]
    UnknownBranch,

    #[error("`git {command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("failed to spawn git: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("news API key is not configured (set NEWS_API_KEY or --news-api-key)")]
    MissingApiKey,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid data layout: {0}")]
    Layout(String),

    #[error("data directory {path} is not writable: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("no {0} found")]
    NotFound(String),

    #[error("document is encrypted; provide ENCRYPTION_KEY to read it")]
    Encrypted,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("unexpected document shape: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Git(#[from] GitError),
}
