//! Durable rollback journal
//!
//! The in-memory ledger dies with the process; the journal does not. A
//! record is written to disk before each creation call and the file is
//! removed only after a complete teardown, so a crash mid-session leaves
//! the operator a list of resources that may still be standing (and
//! billing).
//!
//! The journal is a crash record, not replayed state: a new session never
//! reads it back automatically.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalRecord {
    pub resource_id: String,
    pub wait_for_removal: bool,
    pub created_at: DateTime<Utc>,
}

/// Journal file for a single provisioning session.
pub struct Journal {
    path: PathBuf,
    records: Vec<JournalRecord>,
}

impl Journal {
    pub fn new(dir: impl AsRef<Path>, session: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("journal-{session}.json")),
            records: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a new record. Called before the creation call it describes.
    pub async fn record(&mut self, resource_id: &str, wait_for_removal: bool) -> Result<()> {
        self.records.push(JournalRecord {
            resource_id: resource_id.to_string(),
            wait_for_removal,
            created_at: Utc::now(),
        });
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(&self.records)?;
        fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Drop the records whose resources were confirmed removed and rewrite
    /// the file. The file stays on disk while any record remains.
    pub async fn retain(&mut self, keep: impl Fn(&JournalRecord) -> bool) -> Result<()> {
        self.records.retain(|record| keep(record));
        if self.records.is_empty() {
            return self.clear().await;
        }
        let content = serde_json::to_string_pretty(&self.records)?;
        fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Remove the journal once every recorded resource is gone.
    pub async fn clear(&mut self) -> Result<()> {
        self.records.clear();
        if self.path.exists() {
            fs::remove_file(&self.path).await?;
            tracing::debug!(path = %self.path.display(), "removed rollback journal");
        }
        Ok(())
    }

    /// Read the records left behind by an interrupted session.
    pub async fn load(path: impl AsRef<Path>) -> Result<Vec<JournalRecord>> {
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn records_accumulate_and_survive_a_reload() {
        let dir = tempdir().unwrap();
        let mut journal = Journal::new(dir.path(), "a1b2");

        journal.record("/subscriptions/s/r/pip", false).await.unwrap();
        journal.record("/subscriptions/s/r/vm", true).await.unwrap();

        let loaded = Journal::load(journal.path()).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].resource_id, "/subscriptions/s/r/pip");
        assert!(!loaded[0].wait_for_removal);
        assert!(loaded[1].wait_for_removal);
    }

    #[tokio::test]
    async fn retain_rewrites_the_file_and_clears_when_nothing_is_left() {
        let dir = tempdir().unwrap();
        let mut journal = Journal::new(dir.path(), "a1b2");

        journal.record("/subscriptions/s/r/pip", false).await.unwrap();
        journal.record("/subscriptions/s/r/nsg", false).await.unwrap();

        journal
            .retain(|r| r.resource_id.ends_with("nsg"))
            .await
            .unwrap();
        let loaded = Journal::load(journal.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].resource_id, "/subscriptions/s/r/nsg");

        journal.retain(|_| false).await.unwrap();
        assert!(!journal.path().exists());
    }

    #[tokio::test]
    async fn clear_removes_the_file_and_is_repeatable() {
        let dir = tempdir().unwrap();
        let mut journal = Journal::new(dir.path(), "a1b2");

        journal.record("/subscriptions/s/r/pip", false).await.unwrap();
        assert!(journal.path().exists());

        journal.clear().await.unwrap();
        assert!(!journal.path().exists());
        // Clearing again is a no-op.
        journal.clear().await.unwrap();
    }
}
