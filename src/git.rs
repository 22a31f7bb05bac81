//! Publishing the canonical document with git.
//!
//! Shells out to the `git` CLI in a configured work tree. SSH credentials
//! come from the user's SSH agent/config; nothing here handles keys.
//!
//! A push that fails only because the branch has no upstream is retried
//! once with `--set-upstream`. Failures never roll back the document.

use crate::error::GitError;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};
use url::Url;

const REMOTE: &str = "origin";

/// What [`Git::commit_and_push`] ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The document was unchanged; nothing was committed or pushed.
    NothingToCommit,
    Pushed {
        branch: String,
        message: String,
        set_upstream: bool,
    },
}

/// A git work tree.
#[derive(Debug, Clone)]
pub struct Git {
    repo: PathBuf,
}

impl Git {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        debug!(repo = %self.repo.display(), ?args, "git");
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .await?;
        Ok(output)
    }

    /// Run and require a zero exit status; returns trimmed stdout.
    async fn run_checked(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.run(args).await?;
        if !output.status.success() {
            return Err(command_error(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether the directory is inside a git work tree.
    pub async fn is_repository(&self) -> bool {
        matches!(
            self.run_checked(&["rev-parse", "--is-inside-work-tree"]).await.as_deref(),
            Ok("true")
        )
    }

    pub async fn current_branch(&self) -> Result<String, GitError> {
        let branch = self.run_checked(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        if branch.is_empty() || branch == "HEAD" {
            return Err(GitError::UnknownBranch);
        }
        Ok(branch)
    }

    pub async fn remote_url(&self, remote: &str) -> Result<String, GitError> {
        self.run_checked(&["remote", "get-url", remote]).await
    }

    /// Point `origin` at the SSH form of its HTTPS URL.
    ///
    /// Returns the new URL, or `None` when the remote already uses SSH or
    /// its URL is not a recognizable HTTPS URL.
    #[instrument(level = "info", skip_all, fields(repo = %self.repo.display()))]
    pub async fn convert_remote_to_ssh(&self) -> Result<Option<String>, GitError> {
        let current = self.remote_url(REMOTE).await?;
        let Some(ssh) = https_to_ssh(&current) else {
            info!(url = %current, "Remote already uses SSH or is not HTTPS; leaving it");
            return Ok(None);
        };
        self.run_checked(&["remote", "set-url", REMOTE, ssh.as_str()]).await?;
        info!(from = %current, to = %ssh, "Converted remote to SSH");
        Ok(Some(ssh))
    }

    /// Stage `paths`, commit them and push the current branch.
    ///
    /// `message` defaults to [`default_commit_message`].
    #[instrument(level = "info", skip_all, fields(repo = %self.repo.display()))]
    pub async fn commit_and_push(
        &self,
        paths: &[PathBuf],
        message: Option<&str>,
    ) -> Result<PublishOutcome, GitError> {
        if !self.is_repository().await {
            return Err(GitError::NotARepository(self.repo.clone()));
        }

        let mut pathspec: Vec<String> = Vec::with_capacity(paths.len());
        for path in paths {
            pathspec.push(absolute(path).await.display().to_string());
        }

        let mut add = vec!["add", "--"];
        add.extend(pathspec.iter().map(String::as_str));
        self.run_checked(&add).await?;

        let mut diff = vec!["diff", "--cached", "--quiet", "--"];
        diff.extend(pathspec.iter().map(String::as_str));
        let staged = self.run(&diff).await?;
        match staged.status.code() {
            Some(0) => {
                info!("No changes to commit");
                return Ok(PublishOutcome::NothingToCommit);
            }
            Some(1) => {}
            _ => return Err(command_error(&diff, &staged)),
        }

        let message = message
            .map(str::to_string)
            .unwrap_or_else(default_commit_message);
        let mut commit = vec!["commit", "-m", message.as_str(), "--"];
        commit.extend(pathspec.iter().map(String::as_str));
        self.run_checked(&commit).await?;
        info!(%message, "Committed");

        let branch = self.current_branch().await?;
        info!(%branch, "Pushing");
        let push = self.run(&["push", REMOTE, branch.as_str()]).await?;
        if push.status.success() {
            return Ok(PublishOutcome::Pushed {
                branch,
                message,
                set_upstream: false,
            });
        }

        let stderr = String::from_utf8_lossy(&push.stderr);
        if !needs_upstream(&stderr) {
            return Err(command_error(&["push", REMOTE, branch.as_str()], &push));
        }
        warn!(%branch, "Branch has no upstream; retrying with --set-upstream");
        self.run_checked(&["push", "--set-upstream", REMOTE, branch.as_str()]).await?;
        Ok(PublishOutcome::Pushed {
            branch,
            message,
            set_upstream: true,
        })
    }
}

fn command_error(args: &[&str], output: &Output) -> GitError {
    GitError::Command {
        command: args.join(" "),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

async fn absolute(path: &Path) -> PathBuf {
    tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf())
}

/// `Automated commit: News data update - YYYY-MM-DD HH:MM:SS` in local time.
pub fn default_commit_message() -> String {
    format!(
        "Automated commit: News data update - {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

/// Whether a failed push's stderr says the branch lacks an upstream.
pub fn needs_upstream(stderr: &str) -> bool {
    stderr.contains("set-upstream") || stderr.contains("no upstream branch")
}

/// `https://host/owner/repo(.git)` to `git@host:owner/repo.git`.
///
/// Returns `None` for SSH remotes, local paths and URLs without a path.
pub fn https_to_ssh(remote: &str) -> Option<String> {
    let url = Url::parse(remote.trim()).ok()?;
    if !matches!(url.scheme(), "https" | "http") {
        return None;
    }
    let host = url.host_str()?;
    let path = url.path().trim_matches('/');
    if path.is_empty() {
        return None;
    }
    let path = if path.ends_with(".git") {
        path.to_string()
    } else {
        format!("{path}.git")
    };
    Some(format!("git@{host}:{path}"))
}
