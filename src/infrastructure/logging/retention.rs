//! Retention cleanup for rolled log files
//!
//! The rolling appender never deletes anything, so files older than
//! `retention_days` are removed here.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{debug, info, warn};

use super::logger::LOG_FILE_PREFIX;

/// Delete rolled log files whose modification time is past the retention
/// window. Returns the number of files removed.
pub async fn prune_expired_logs(log_dir: impl AsRef<Path>, retention_days: u32) -> Result<usize> {
    prune_older_than(log_dir.as_ref(), Utc::now() - Duration::days(i64::from(retention_days))).await
}

async fn prune_older_than(log_dir: &Path, cutoff: DateTime<Utc>) -> Result<usize> {
    if !log_dir.exists() {
        warn!(path = %log_dir.display(), "log directory does not exist");
        return Ok(0);
    }

    let mut entries = tokio::fs::read_dir(log_dir)
        .await
        .context("failed to read log directory")?;
    let mut deleted = 0;

    while let Some(entry) = entries
        .next_entry()
        .await
        .context("failed to read directory entry")?
    {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }

        let modified: DateTime<Utc> = tokio::fs::metadata(&path)
            .await
            .and_then(|meta| meta.modified())
            .with_context(|| format!("failed to stat {}", path.display()))?
            .into();

        if modified < cutoff {
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("failed to delete {}", path.display()))?;
            debug!(path = %path.display(), "deleted expired log file");
            deleted += 1;
        }
    }

    if deleted > 0 {
        info!(deleted, path = %log_dir.display(), "pruned expired log files");
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prunes_only_expired_log_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("warden.log.2024-01-01"), "old")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "keep")
            .await
            .unwrap();

        // Nothing is older than an hour ago.
        let kept = prune_older_than(dir.path(), Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(kept, 0);

        // Everything is older than a minute from now.
        let deleted = prune_older_than(dir.path(), Utc::now() + Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(dir.path().join("notes.txt").exists());
        assert!(!dir.path().join("warden.log.2024-01-01").exists());
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert_eq!(prune_expired_logs(&missing, 30).await.unwrap(), 0);
    }
}
