// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! In-memory key-value store
//!
//! Used by tests and offline runs. Write failures can be switched on to
//! exercise the engine's persistence-failure path.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{ParleyError, Result};

use super::store::{KeyValueStore, StoredItem};

/// Key-value store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<String, StoredItem>>,
    fail_writes: AtomicBool,
    put_count: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, BTreeMap<String, StoredItem>> {
        match self.items.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!(target: "parley.history", "Memory store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Make every subsequent `put`/`del` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful and failed `put` calls so far
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ParleyError::Persistence(
                "memory store is read-only".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items().get(key).map(|item| item.value.clone()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.put_count.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        let now = Utc::now();
        let mut items = self.items();
        let created_at = items.get(key).map(|item| item.created_at).unwrap_or(now);
        items.insert(
            key.to_string(),
            StoredItem {
                key: key.to_string(),
                value: value.to_string(),
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredItem>> {
        Ok(self.items().values().cloned().collect())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.items().remove(key);
        Ok(())
    }
}
