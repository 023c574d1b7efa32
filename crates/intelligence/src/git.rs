//! Commit history sources.
//!
//! [`GitCli`] streams `git log --numstat` from a child process under a
//! deadline; [`StaticGitSource`] replays a fixed commit list.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::RwLock;
use std::time::Duration;
use tiermind_core::{Error, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Lines added and removed in one file by one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub added: u64,
    pub deleted: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub hash: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub files: Vec<FileChange>,
}

/// Commits read from a source, oldest first.
#[derive(Debug, Clone, Default)]
pub struct GitLog {
    pub commits: Vec<CommitRecord>,
    /// The read hit its deadline; `commits` is a prefix of the history
    pub truncated: bool,
}

/// Somewhere commit history comes from.
#[async_trait]
pub trait GitSource: Send + Sync {
    /// Commits authored at or after `since`, oldest first.
    async fn commits_since(&self, since: DateTime<Utc>) -> Result<GitLog>;

    fn describe(&self) -> String;
}

// ── Parsing ───────────────────────────────────────────────────────────

const RECORD_START: char = '\u{1e}';
const FIELD_SEP: char = '\u{1f}';

/// Incremental parser for
/// `git log --pretty=format:%x1e%H%x1f%an%x1f%aI --numstat`.
#[derive(Debug, Default)]
pub struct NumstatParser {
    current: Option<CommitRecord>,
    done: Vec<CommitRecord>,
}

impl NumstatParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: &str) {
        if let Some(header) = line.strip_prefix(RECORD_START) {
            self.flush();
            let mut fields = header.split(FIELD_SEP);
            let (Some(hash), Some(author), Some(date)) = (fields.next(), fields.next(), fields.next())
            else {
                warn!(line = %header, "Skipping malformed commit header");
                return;
            };
            match DateTime::parse_from_rfc3339(date.trim()) {
                Ok(ts) => {
                    self.current = Some(CommitRecord {
                        hash: hash.to_string(),
                        author: author.to_string(),
                        timestamp: ts.with_timezone(&Utc),
                        files: Vec::new(),
                    });
                }
                Err(e) => warn!(hash, error = %e, "Skipping commit with unparseable date"),
            }
            return;
        }

        let Some(commit) = self.current.as_mut() else {
            return;
        };
        let mut parts = line.splitn(3, '\t');
        if let (Some(added), Some(deleted), Some(path)) = (parts.next(), parts.next(), parts.next())
        {
            // Binary files report "-"
            commit.files.push(FileChange {
                path: resolve_rename(path),
                added: added.parse().unwrap_or(0),
                deleted: deleted.parse().unwrap_or(0),
            });
        }
    }

    fn flush(&mut self) {
        if let Some(commit) = self.current.take() {
            self.done.push(commit);
        }
    }

    /// Commits parsed so far, oldest first.
    pub fn finish(mut self) -> Vec<CommitRecord> {
        self.flush();
        // git log emits newest first
        self.done.sort_by_key(|c| c.timestamp);
        self.done
    }
}

/// The destination path of a numstat rename entry:
/// `old => new` or `dir/{old => new}/file`.
fn resolve_rename(path: &str) -> String {
    if let (Some(open), Some(close)) = (path.find('{'), path.find('}')) {
        if open < close {
            let inner = &path[open + 1..close];
            if let Some((_, new)) = inner.split_once(" => ") {
                let joined = format!("{}{}{}", &path[..open], new, &path[close + 1..]);
                return joined.replace("//", "/");
            }
        }
    }
    match path.split_once(" => ") {
        Some((_, new)) => new.to_string(),
        None => path.to_string(),
    }
}

// ── git CLI ───────────────────────────────────────────────────────────

/// Reads history by running the `git` binary against a work tree.
pub struct GitCli {
    repo: PathBuf,
    max_duration: Duration,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>, max_duration: Duration) -> Self {
        Self {
            repo: repo.into(),
            max_duration,
        }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Fails with `RepositoryUnavailable` unless `repo` is inside a work tree.
    pub async fn ensure_work_tree(&self) -> Result<()> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(["rev-parse", "--is-inside-work-tree"])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::RepositoryUnavailable(format!("cannot run git: {e}")))?;

        let inside = output.status.success()
            && String::from_utf8_lossy(&output.stdout).trim() == "true";
        if inside {
            Ok(())
        } else {
            Err(Error::RepositoryUnavailable(format!(
                "{} is not a git work tree",
                self.repo.display()
            )))
        }
    }
}

#[async_trait]
impl GitSource for GitCli {
    async fn commits_since(&self, since: DateTime<Utc>) -> Result<GitLog> {
        self.ensure_work_tree().await?;

        let deadline = tokio::time::Instant::now() + self.max_duration;
        let mut child = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(["log", "--no-merges", "--no-color"])
            .arg(format!("--since={}", since.to_rfc3339()))
            .arg("--pretty=format:%x1e%H%x1f%an%x1f%aI")
            .arg("--numstat")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Git(format!("failed to spawn git log: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Git("git log produced no stdout".into()))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut parser = NumstatParser::new();
        let mut truncated = false;

        loop {
            match tokio::time::timeout_at(deadline, lines.next_line()).await {
                Ok(Ok(Some(line))) => parser.push_line(&line),
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return Err(Error::Git(format!("reading git log: {e}"))),
                Err(_) => {
                    truncated = true;
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill git log after deadline");
                    }
                    break;
                }
            }
        }

        if !truncated {
            let status = child
                .wait()
                .await
                .map_err(|e| Error::Git(format!("waiting for git log: {e}")))?;
            if !status.success() {
                return Err(Error::Git(format!("git log exited with {status}")));
            }
        }

        let commits = parser.finish();
        if truncated {
            warn!(
                repo = %self.repo.display(),
                parsed = commits.len(),
                limit_secs = self.max_duration.as_secs(),
                "Git analysis hit its deadline, returning partial history"
            );
        } else {
            debug!(repo = %self.repo.display(), commits = commits.len(), "Git log read");
        }
        Ok(GitLog { commits, truncated })
    }

    fn describe(&self) -> String {
        format!("git:{}", self.repo.display())
    }
}

// ── In-memory source ──────────────────────────────────────────────────

/// A fixed, mutable commit list.
pub struct StaticGitSource {
    commits: RwLock<Vec<CommitRecord>>,
    available: bool,
}

impl StaticGitSource {
    pub fn new(commits: Vec<CommitRecord>) -> Self {
        Self {
            commits: RwLock::new(commits),
            available: true,
        }
    }

    /// A source that behaves like a directory outside version control.
    pub fn unavailable() -> Self {
        Self {
            commits: RwLock::new(Vec::new()),
            available: false,
        }
    }

    pub fn push(&self, commit: CommitRecord) {
        self.commits
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(commit);
    }
}

#[async_trait]
impl GitSource for StaticGitSource {
    async fn commits_since(&self, since: DateTime<Utc>) -> Result<GitLog> {
        if !self.available {
            return Err(Error::RepositoryUnavailable(
                "static source marked unavailable".into(),
            ));
        }
        let mut commits: Vec<CommitRecord> = self
            .commits
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.timestamp >= since)
            .cloned()
            .collect();
        commits.sort_by_key(|c| c.timestamp);
        Ok(GitLog {
            commits,
            truncated: false,
        })
    }

    fn describe(&self) -> String {
        "static".into()
    }
}
