//! Git gateway for the Logseq worktree.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{SyncError, SyncResult};

/// Worktree operations the reconciler needs. Behind a trait so tests
/// can run against a recording stub instead of a real repository.
#[async_trait]
pub trait GitGateway: Send + Sync {
    /// Whether the worktree has uncommitted changes.
    async fn has_changes(&self) -> SyncResult<bool>;

    /// Stage everything and commit with a sync-timestamped message,
    /// pushing when the gateway is configured to.
    async fn commit_sync(&self, at: DateTime<Utc>) -> SyncResult<()>;
}

/// Shells out to the `git` binary in the Logseq root.
pub struct CliGit {
    root: PathBuf,
    push_enabled: bool,
}

impl CliGit {
    pub fn new(root: &Path, push_enabled: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            push_enabled,
        }
    }

    async fn run(&self, args: &[&str]) -> SyncResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .await
            .map_err(|e| SyncError::Git(format!("failed to spawn git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl GitGateway for CliGit {
    async fn has_changes(&self) -> SyncResult<bool> {
        let status = self.run(&["status", "--porcelain"]).await?;
        Ok(!status.trim().is_empty())
    }

    async fn commit_sync(&self, at: DateTime<Utc>) -> SyncResult<()> {
        if !self.has_changes().await? {
            debug!("worktree clean, nothing to commit");
            return Ok(());
        }

        self.run(&["add", "."]).await?;
        let message = format!("logseq sync {}", at.to_rfc3339());
        self.run(&["commit", "-m", &message]).await?;
        info!(message, "committed sync changes");

        if self.push_enabled {
            self.run(&["push"]).await?;
            info!("pushed sync commit");
        }
        Ok(())
    }
}
