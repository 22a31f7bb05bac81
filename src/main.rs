//! # News Collector
//!
//! A batch job that pulls top headlines from a news API and items from an
//! RSS feed, merges them into one JSON document, optionally encrypts it at
//! rest and can commit and push the result with git.
//!
//! ## Features
//!
//! - Fetches the news API `top-headlines` endpoint and a single RSS 2.0 channel
//! - Normalizes both into one article shape tagged with its source
//! - Replaces the published document only after a successful merge
//! - Encrypts the published document with Fernet (`--encryption required`
//!   fails hard when the cipher is not compiled in)
//! - Commits and pushes the published document over SSH (`run --push`)
//!
//! ## Usage
//!
//! ```sh
//! NEWS_API_KEY=... ENCRYPTION_KEY=... news_collector --data-dir ./data run --push
//! ```
//!
//! ## Architecture
//!
//! The application runs each step to completion before the next one:
//! 1. **Fetching**: news API, then RSS; each writes a scratch snapshot
//! 2. **Combining**: normalize and merge, write the staged document
//! 3. **Finalizing**: remove scratch files, rename staged over canonical
//! 4. **Encrypting**: replace the canonical document with its ciphertext
//! 5. **Publishing**: git add/commit/push of the canonical document

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod crypto;
mod error;
mod git;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod sources;
mod utils;

use cli::{Cli, Command, DecryptArgs};
use config::{AppConfig, FileConfig};
use crypto::{GateOutcome, SkipReason};
use error::CryptoError;
use git::PublishOutcome;
use outputs::summary;
use pipeline::RunReport;
use utils::{ensure_writable_dir, write_atomic};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    let dotenv = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("news_collector starting up");
    if let Ok(path) = &dotenv {
        debug!(path = %path.display(), "Loaded .env");
    }

    // Parse CLI
    let args = Cli::parse();
    debug!(command = ?args.command, data_dir = ?args.data_dir, "Parsed CLI arguments");

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let publish = match &args.command {
        Some(Command::Run(p)) | Some(Command::Combine(p)) => Some(p),
        _ => None,
    };
    let config = AppConfig::resolve(&args, file, publish)?;

    let writes = matches!(
        args.command,
        None | Some(Command::Run(_)) | Some(Command::Collect) | Some(Command::Combine(_))
    );
    if writes {
        if let Err(e) = ensure_writable_dir(&config.layout.data_dir).await {
            error!(
                path = %config.layout.data_dir.display(),
                error = %e,
                "Data directory is not writable (fix perms or choose a different path)"
            );
            return Err(e.into());
        }
    }

    let result: Result<(), Box<dyn Error>> = match &args.command {
        None | Some(Command::Run(_)) => pipeline::run(&config)
            .await
            .map(|report| log_run_report(&report))
            .map_err(Into::into),
        Some(Command::Combine(_)) => pipeline::combine_from_snapshots(&config)
            .await
            .map(|report| log_run_report(&report))
            .map_err(Into::into),
        Some(Command::Collect) => pipeline::collect(&config)
            .await
            .map(|_| ())
            .map_err(Into::into),
        Some(Command::Inspect) => summary::inspect(&config.layout)
            .await
            .map(|report| println!("{report}"))
            .map_err(Into::into),
        Some(Command::Compare) => {
            println!("{}", summary::compare(&config.layout).await);
            Ok(())
        }
        Some(Command::Summary) => {
            summary::summarize(&config.layout, config.encryption.key.as_deref())
                .await
                .map(|report| println!("{report}"))
                .map_err(Into::into)
        }
        Some(Command::Decrypt(decrypt_args)) => decrypt(&config, decrypt_args).await,
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(
            ?elapsed,
            secs = elapsed.as_secs(),
            millis = elapsed.subsec_millis(),
            "Execution complete"
        ),
        Err(e) => error!(?elapsed, error = %e, "Execution failed"),
    }
    result
}

fn log_run_report(report: &RunReport) {
    info!(
        news_api = %report.news_api,
        rss = %report.rss,
        total = report.sources.total(),
        canonical = %report.canonical.display(),
        "Canonical document replaced"
    );
    if !report.cleanup.is_clean() {
        warn!(
            failed = report.cleanup.failed.len(),
            "Some scratch files could not be removed"
        );
    }
    match &report.encryption {
        GateOutcome::Encrypted { generated_key: Some(_), .. } => {
            warn!("Document encrypted with a generated key; store it before the next run")
        }
        GateOutcome::Encrypted { .. } => info!("Document encrypted"),
        GateOutcome::Skipped(SkipReason::Disabled) => info!("Document left in plaintext"),
        GateOutcome::Skipped(SkipReason::Unavailable) => {
            warn!("Document left in plaintext: encryption not compiled in")
        }
    }
    match &report.publish {
        Some(PublishOutcome::Pushed { branch, set_upstream, .. }) => {
            info!(%branch, set_upstream, "Published canonical document")
        }
        Some(PublishOutcome::NothingToCommit) => {
            info!("Canonical document unchanged; nothing published")
        }
        None => {}
    }
}

/// Decrypt to stdout, to `--output`, or over the input with `--in-place`.
#[instrument(level = "info", skip_all)]
async fn decrypt(config: &AppConfig, args: &DecryptArgs) -> Result<(), Box<dyn Error>> {
    let key = config
        .encryption
        .key
        .as_deref()
        .ok_or(CryptoError::MissingKey)?;
    let input: PathBuf = args
        .input
        .clone()
        .unwrap_or_else(|| config.layout.canonical_path());

    let plaintext = crypto::decrypt_file(&input, key).await?;

    if args.in_place {
        write_atomic(&input, &plaintext).await?;
        info!(path = %input.display(), "Decrypted in place");
    } else if let Some(output) = &args.output {
        tokio::fs::write(output, &plaintext).await?;
        info!(from = %input.display(), to = %output.display(), "Decrypted");
    } else {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&plaintext).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
