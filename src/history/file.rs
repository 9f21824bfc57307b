// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File-backed key-value store
//!
//! One `<key>.json` file per key inside a directory. Each file holds the
//! raw value together with its creation and update times.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ParleyError, Result};

use super::store::{KeyValueStore, StoredItem};

const EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    updated_at: DateTime<Utc>,
}

/// Key-value store persisted as files in a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ParleyError::InvalidInput(format!(
                "invalid storage key: {key:?}"
            )));
        }
        Ok(self.root.join(format!("{key}.{EXTENSION}")))
    }

    async fn read_envelope(path: &Path) -> Result<Option<Envelope>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        Ok(Self::read_envelope(&path).await?.map(|env| env.value))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let now = Utc::now();
        let created_at = match Self::read_envelope(&path).await {
            Ok(Some(existing)) => existing.created_at,
            _ => now,
        };
        let envelope = Envelope {
            value: value.to_string(),
            created_at,
            updated_at: now,
        };

        // Write a sibling temp file, then rename over the target.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(&envelope)?)
            .await
            .map_err(|e| ParleyError::Persistence(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| ParleyError::Persistence(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredItem>> {
        let mut items = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            match Self::read_envelope(&path).await {
                Ok(Some(env)) => items.push(StoredItem {
                    key,
                    value: env.value,
                    created_at: env.created_at,
                    updated_at: env.updated_at,
                }),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        target: "parley.history",
                        path = %path.display(),
                        error = %e,
                        "Skipping unreadable store file"
                    );
                }
            }
        }
        items.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(items)
    }

    async fn del(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ParleyError::Persistence(format!(
                "delete {}: {e}",
                path.display()
            ))),
        }
    }
}
