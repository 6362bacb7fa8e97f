//! Append-only JSONL store for confirmed transactions.
//!
//! Each confirmed row becomes one line of JSON. A batch is serialized up
//! front and written with a single `write_all`, so a serialization failure
//! never leaves half a batch on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use purse_types::error::PersistenceError;
use purse_types::transaction::ConfirmedTransaction;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::Result;

/// Where confirmed transactions end up.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a confirmed batch. An empty slice is a no-op.
    async fn append(&self, rows: &[ConfirmedTransaction]) -> std::result::Result<(), PersistenceError>;
}

/// JSONL file store.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    /// Create a store backed by the given file. Nothing is touched until
    /// the first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored row back.
    ///
    /// A missing file is an empty store. Invalid lines are skipped with a
    /// warning.
    pub async fn load(&self) -> Result<Vec<ConfirmedTransaction>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut rows = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ConfirmedTransaction>(line) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!(line = line_no + 1, error = %e, "skipping invalid JSONL line");
                }
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl TransactionStore for JsonlStore {
    async fn append(&self, rows: &[ConfirmedTransaction]) -> std::result::Result<(), PersistenceError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for row in rows {
            buf.push_str(&serde_json::to_string(row)?);
            buf.push('\n');
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;

        debug!(rows = rows.len(), path = %self.path.display(), "appended transactions");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use purse_types::transaction::{CategorySource, TransactionCandidate, TransactionKind};
    use rust_decimal_macros::dec;

    fn confirmed(desc: &str, amount: rust_decimal::Decimal, category: &str) -> ConfirmedTransaction {
        let mut candidate = TransactionCandidate::new(desc, amount, desc);
        candidate.category = Some(category.into());
        candidate.category_source = CategorySource::Fallback;
        ConfirmedTransaction::from_candidate(candidate, 42, Utc::now())
    }

    #[tokio::test]
    async fn append_writes_one_line_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("tx.jsonl"));

        let rows = vec![
            confirmed("обед", dec!(400), "Food"),
            confirmed("такси", dec!(500), "Transport"),
        ];
        store.append(&rows).await.unwrap();

        let content = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn appends_accumulate_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("tx.jsonl"));

        let first = confirmed("кофе", dec!(12.50), "Food");
        let second = confirmed("зарплата", dec!(100000), "Income");
        store.append(std::slice::from_ref(&first)).await.unwrap();
        store.append(std::slice::from_ref(&second)).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[tokio::test]
    async fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("tx.jsonl");
        let store = JsonlStore::new(&path);

        store.append(&[confirmed("кино", dec!(700), "Entertainment")]).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn empty_batch_does_not_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("tx.jsonl"));

        store.append(&[]).await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("absent.jsonl"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_skips_invalid_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path().join("tx.jsonl"));
        let row = confirmed("обед", dec!(400), "Food");
        store.append(std::slice::from_ref(&row)).await.unwrap();

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(store.path())
            .await
            .unwrap();
        file.write_all(b"not json\n\n").await.unwrap();
        file.flush().await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].kind, TransactionKind::Expense);
    }

    #[tokio::test]
    async fn unwritable_path_maps_to_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be.
        let store = JsonlStore::new(dir.path());

        let err = store.append(&[confirmed("обед", dec!(400), "Food")]).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Io(_)));
    }
}
