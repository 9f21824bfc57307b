// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat store implementation
//!
//! Stores one JSON blob per chat under `chat_<id>` plus a `history_list`
//! index of `{id, title, created_at, updated_at}` entries, newest first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chat::state::ChatSession;
use crate::config::DefaultsConfig;
use crate::error::{ParleyError, Result};

/// Key of the history index
pub const HISTORY_LIST_KEY: &str = "history_list";

/// Prefix of chat blob keys
pub const CHAT_KEY_PREFIX: &str = "chat_";

/// Key of the blob holding a chat
pub fn chat_key(chat_id: &str) -> String {
    format!("{CHAT_KEY_PREFIX}{chat_id}")
}

/// An entry returned by [`KeyValueStore::list`]
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent key-value collaborator. Every call may fail.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<StoredItem>>;
    async fn del(&self, key: &str) -> Result<()>;
}

/// The persistence operations the chat engine relies on
#[async_trait]
pub trait ChatPersistence: Send + Sync {
    /// Store the chat and refresh its history entry
    async fn persist_chat(&self, chat: &ChatSession) -> Result<()>;

    /// Fetch a stored chat
    async fn get_chat(&self, chat_id: &str) -> Result<ChatSession>;
}

/// One row of the history index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub title: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Chat blobs and history index on top of a [`KeyValueStore`]
#[derive(Clone)]
pub struct ChatStore {
    kv: Arc<dyn KeyValueStore>,
    placeholder_title: String,
    default_model: String,
}

impl ChatStore {
    /// Create a store that names new chats `placeholder_title`
    pub fn new(kv: Arc<dyn KeyValueStore>, placeholder_title: impl Into<String>) -> Self {
        Self {
            kv,
            placeholder_title: placeholder_title.into(),
            default_model: DefaultsConfig::default().model,
        }
    }

    /// Model written into chats stored without one
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Underlying key-value store
    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    async fn write_history(&self, history: &[HistoryEntry]) -> Result<()> {
        let json = serde_json::to_string(history)?;
        self.kv.put(HISTORY_LIST_KEY, &json).await
    }

    /// Read the history index, rebuilding it from stored chats when it is
    /// missing, empty or unreadable.
    pub async fn fetch_or_create_history_list(&self) -> Result<Vec<HistoryEntry>> {
        let raw = match self.kv.get(HISTORY_LIST_KEY).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(target: "parley.history", error = %e, "Failed to fetch history list");
                None
            }
        };

        let parsed = match raw {
            Some(raw) => match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
                Ok(list) => list,
                Err(e) => {
                    tracing::warn!(
                        target: "parley.history",
                        error = %e,
                        "History list is unreadable, rebuilding"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if !parsed.is_empty() {
            return Ok(parsed);
        }

        let mut rebuilt: Vec<HistoryEntry> = self
            .kv
            .list()
            .await?
            .into_iter()
            .filter(|item| item.key.starts_with(CHAT_KEY_PREFIX))
            .filter_map(|item| match serde_json::from_str::<ChatSession>(&item.value) {
                Ok(chat) => Some(HistoryEntry {
                    id: chat.id,
                    title: chat.title,
                    created_at: item.created_at,
                    updated_at: item.updated_at,
                }),
                Err(e) => {
                    tracing::warn!(
                        target: "parley.history",
                        key = %item.key,
                        error = %e,
                        "Skipping unreadable chat blob"
                    );
                    None
                }
            })
            .collect();
        rebuilt.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        if !rebuilt.is_empty() {
            tracing::info!(
                target: "parley.history",
                chats = rebuilt.len(),
                "Rebuilt history list from stored chats"
            );
            self.write_history(&rebuilt).await?;
        }
        Ok(rebuilt)
    }

    /// Create and persist an empty chat, returning its id
    pub async fn add_chat(&self, title: Option<&str>) -> Result<String> {
        let chat = ChatSession::new(
            title.unwrap_or(&self.placeholder_title),
            self.default_model.clone(),
        );
        self.persist_chat(&chat).await?;
        Ok(chat.id)
    }

    /// Remove a chat and its history entry
    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        self.kv.del(&chat_key(chat_id)).await?;
        let mut history = self.fetch_or_create_history_list().await?;
        history.retain(|entry| entry.id != chat_id);
        self.write_history(&history).await?;
        tracing::debug!(target: "parley.history", chat_id, "Deleted chat");
        Ok(())
    }

    /// Change a stored chat's title
    pub async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<()> {
        let mut chat = self.get_chat(chat_id).await?;
        chat.title = title.to_string();
        self.persist_chat(&chat).await
    }

    /// Remove every chat blob and the history index
    pub async fn clear_history(&self) -> Result<()> {
        let items = self.kv.list().await?;
        self.kv.del(HISTORY_LIST_KEY).await?;
        for item in items
            .iter()
            .filter(|item| item.key.starts_with(CHAT_KEY_PREFIX))
        {
            self.kv.del(&item.key).await?;
        }
        tracing::info!(target: "parley.history", "Cleared chat history");
        Ok(())
    }
}

#[async_trait]
impl ChatPersistence for ChatStore {
    async fn persist_chat(&self, chat: &ChatSession) -> Result<()> {
        let blob = if chat.has_model() {
            serde_json::to_string(chat)?
        } else {
            let mut filled = chat.clone();
            filled.model = self.default_model.clone();
            serde_json::to_string(&filled)?
        };
        self.kv.put(&chat_key(&chat.id), &blob).await?;

        let now = Utc::now();
        let mut history = self.fetch_or_create_history_list().await?;
        match history.iter().position(|entry| entry.id == chat.id) {
            Some(pos) => {
                let created_at = history[pos].created_at;
                history.remove(pos);
                history.insert(
                    0,
                    HistoryEntry {
                        id: chat.id.clone(),
                        title: chat.title.clone(),
                        created_at,
                        updated_at: now,
                    },
                );
            }
            None => history.insert(
                0,
                HistoryEntry {
                    id: chat.id.clone(),
                    title: chat.title.clone(),
                    created_at: now,
                    updated_at: now,
                },
            ),
        }
        self.write_history(&history).await?;

        tracing::debug!(
            target: "parley.history",
            chat_id = %chat.id,
            messages = chat.messages.len(),
            "Persisted chat"
        );
        Ok(())
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatSession> {
        let raw = self
            .kv
            .get(&chat_key(chat_id))
            .await?
            .ok_or_else(|| ParleyError::Session(format!("Chat not found: {chat_id}")))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryStore;
    use crate::llm::message::Message;

    fn store() -> (Arc<MemoryStore>, ChatStore) {
        let kv = Arc::new(MemoryStore::new());
        let store = ChatStore::new(kv.clone(), "New Chat");
        (kv, store)
    }

    #[tokio::test]
    async fn test_persist_and_get_chat() {
        let (_kv, store) = store();
        let mut chat = ChatSession::new("Hello", "llama3-3-70b");
        chat.messages.push(Message::user("Hello"));

        store.persist_chat(&chat).await.unwrap();
        let loaded = store.get_chat(&chat.id).await.unwrap();
        assert_eq!(loaded, chat);

        let history = store.fetch_or_create_history_list().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].title, "Hello");
    }

    #[tokio::test]
    async fn test_get_missing_chat_is_session_error() {
        let (_kv, store) = store();
        let err = store.get_chat("nope").await.unwrap_err();
        assert!(matches!(err, ParleyError::Session(_)));
    }

    #[tokio::test]
    async fn test_persist_moves_entry_to_front_and_keeps_created_at() {
        let (_kv, store) = store();
        let first = ChatSession::new("first", "m");
        let second = ChatSession::new("second", "m");
        store.persist_chat(&first).await.unwrap();
        store.persist_chat(&second).await.unwrap();

        let created = store.fetch_or_create_history_list().await.unwrap()[1].created_at;

        let mut renamed = first.clone();
        renamed.title = "first again".to_string();
        store.persist_chat(&renamed).await.unwrap();

        let history = store.fetch_or_create_history_list().await.unwrap();
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[0].title, "first again");
        assert_eq!(history[0].created_at, created);
        assert_eq!(history[1].id, second.id);
    }

    #[tokio::test]
    async fn test_add_chat_uses_placeholder() {
        let (_kv, store) = store();
        let id = store.add_chat(None).await.unwrap();
        assert_eq!(store.get_chat(&id).await.unwrap().title, "New Chat");

        let named = store.add_chat(Some("Plans")).await.unwrap();
        assert_eq!(store.get_chat(&named).await.unwrap().title, "Plans");
    }

    #[tokio::test]
    async fn test_persist_fills_missing_model() {
        let kv = Arc::new(MemoryStore::new());
        let store = ChatStore::new(kv, "New Chat").with_default_model("fallback-model");
        let chat = ChatSession::new("untitled", "");
        store.persist_chat(&chat).await.unwrap();
        assert_eq!(store.get_chat(&chat.id).await.unwrap().model, "fallback-model");

        let id = store.add_chat(None).await.unwrap();
        assert_eq!(store.get_chat(&id).await.unwrap().model, "fallback-model");
    }

    #[tokio::test]
    async fn test_rename_and_delete() {
        let (_kv, store) = store();
        let id = store.add_chat(None).await.unwrap();

        store.rename_chat(&id, "Renamed").await.unwrap();
        assert_eq!(
            store.fetch_or_create_history_list().await.unwrap()[0].title,
            "Renamed"
        );

        store.delete_chat(&id).await.unwrap();
        assert!(store.get_chat(&id).await.is_err());
        assert!(store.fetch_or_create_history_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_missing_chat_fails() {
        let (_kv, store) = store();
        assert!(store.rename_chat("missing", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_history_rebuilt_when_index_missing() {
        let (kv, store) = store();
        let older = ChatSession::new("older", "m");
        let newer = ChatSession::new("newer", "m");
        kv.put(&chat_key(&older.id), &serde_json::to_string(&older).unwrap())
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        kv.put(&chat_key(&newer.id), &serde_json::to_string(&newer).unwrap())
            .await
            .unwrap();
        kv.put("unrelated", "x").await.unwrap();

        let history = store.fetch_or_create_history_list().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].title, "newer");
        assert_eq!(history[1].title, "older");

        // The rebuilt index is written back.
        assert!(kv.get(HISTORY_LIST_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_history_is_rebuilt() {
        let (kv, store) = store();
        let chat = ChatSession::new("kept", "m");
        kv.put(&chat_key(&chat.id), &serde_json::to_string(&chat).unwrap())
            .await
            .unwrap();
        kv.put(HISTORY_LIST_KEY, "{not an array").await.unwrap();

        let history = store.fetch_or_create_history_list().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, chat.id);
    }

    #[tokio::test]
    async fn test_clear_history() {
        let (kv, store) = store();
        store.add_chat(None).await.unwrap();
        store.add_chat(None).await.unwrap();
        kv.put("settings", "{}").await.unwrap();

        store.clear_history().await.unwrap();
        let keys: Vec<String> = kv.list().await.unwrap().into_iter().map(|i| i.key).collect();
        assert_eq!(keys, vec!["settings".to_string()]);
    }

    #[test]
    fn test_history_entry_uses_millisecond_timestamps() {
        let entry = HistoryEntry {
            id: "a".to_string(),
            title: "t".to_string(),
            created_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            updated_at: DateTime::from_timestamp_millis(1_700_000_000_500).unwrap(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["created_at"], 1_700_000_000_000i64);
        assert_eq!(value["updated_at"], 1_700_000_000_500i64);
    }
}
