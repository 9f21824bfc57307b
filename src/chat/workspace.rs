// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Active-session switching
//!
//! A [`ChatWorkspace`] owns at most one active [`SessionEngine`]. Switching
//! away aborts the old engine's in-flight turn, stashes the unsent input as
//! a draft and loads the draft of the chat being opened.

use std::sync::Arc;

use crate::billing::{BillingStatus, CachedBillingStatus};
use crate::chat::draft::DraftManager;
use crate::chat::engine::{SessionEngine, SubmitRequest, TurnOutcome};
use crate::chat::observer::{NoopObserver, SessionObserver};
use crate::chat::state::ChatSession;
use crate::config::Settings;
use crate::error::{ParleyError, Result};
use crate::history::{ChatPersistence, ChatStore, HistoryEntry};
use crate::llm::provider::CompletionProvider;
use crate::tools::ToolRegistry;

pub struct ChatWorkspace {
    provider: Arc<dyn CompletionProvider>,
    store: Arc<ChatStore>,
    settings: Arc<Settings>,
    tools: Arc<ToolRegistry>,
    billing: Arc<dyn BillingStatus>,
    observer: Arc<dyn SessionObserver>,
    active: Option<Arc<SessionEngine>>,
    drafts: DraftManager,
}

impl ChatWorkspace {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        store: Arc<ChatStore>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            provider,
            store,
            billing: Arc::new(CachedBillingStatus::from_config(&settings.billing)),
            settings,
            tools: Arc::new(ToolRegistry::new()),
            observer: Arc::new(NoopObserver),
            active: None,
            drafts: DraftManager::new(),
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_billing(mut self, billing: Arc<dyn BillingStatus>) -> Self {
        self.billing = billing;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &Arc<ChatStore> {
        &self.store
    }

    /// Engine of the active chat
    pub fn active(&self) -> Option<Arc<SessionEngine>> {
        self.active.clone()
    }

    pub fn active_id(&self) -> Option<String> {
        self.active.as_ref().map(|engine| engine.chat_id())
    }

    /// Unsent input of the active chat
    pub fn input(&self) -> &str {
        self.drafts.input()
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.drafts.set_input(text);
    }

    pub fn drafts(&self) -> &DraftManager {
        &self.drafts
    }

    fn build_engine(&self, session: ChatSession) -> Arc<SessionEngine> {
        Arc::new(
            SessionEngine::new(
                session,
                self.provider.clone(),
                self.store.clone(),
                self.settings.clone(),
            )
            .with_tools(self.tools.clone())
            .with_billing(self.billing.clone())
            .with_observer(self.observer.clone()),
        )
    }

    /// Make `chat_id` the active chat
    pub async fn open(&mut self, chat_id: &str) -> Result<Arc<SessionEngine>> {
        if let Some(engine) = &self.active {
            if engine.chat_id() == chat_id {
                return Ok(engine.clone());
            }
        }

        let session = self.store.get_chat(chat_id).await?;
        self.activate(session)
    }

    fn activate(&mut self, session: ChatSession) -> Result<Arc<SessionEngine>> {
        if session.id.is_empty() {
            return Err(ParleyError::InvalidInput("chat id is empty".to_string()));
        }
        if let Some(previous) = self.active.take() {
            if previous.abort() {
                tracing::info!(
                    target: "parley.chat.engine",
                    chat_id = %previous.chat_id(),
                    "Aborted in-flight turn on session switch"
                );
            }
        }

        self.drafts.switch_to(&session.id);
        tracing::debug!(target: "parley.chat.engine", chat_id = %session.id, "Session activated");
        let engine = self.build_engine(session);
        self.active = Some(engine.clone());
        Ok(engine)
    }

    /// Create a chat and make it active
    pub async fn new_chat(&mut self) -> Result<Arc<SessionEngine>> {
        let id = self.store.add_chat(None).await?;
        self.open(&id).await
    }

    /// Copy the active chat up to and including `visible_index` into a new
    /// chat and make it active
    pub async fn fork(&mut self, visible_index: usize) -> Result<Arc<SessionEngine>> {
        let engine = self
            .active
            .as_ref()
            .ok_or_else(|| ParleyError::Session("no active chat".to_string()))?;
        let source = engine.session();
        let raw = source.raw_index_of_visible(visible_index).ok_or_else(|| {
            ParleyError::InvalidInput(format!("no message at index {visible_index}"))
        })?;

        let mut forked = ChatSession::new(format!("{} (Fork)", source.title), source.model);
        forked.messages = source.messages[..=raw].to_vec();
        self.store.persist_chat(&forked).await?;
        tracing::info!(
            target: "parley.chat.engine",
            from = %source.id,
            to = %forked.id,
            messages = forked.messages.len(),
            "Forked chat"
        );
        self.activate(forked)
    }

    /// Submit to the active chat. Its draft is cleared once the turn is admitted.
    pub async fn submit(&mut self, request: SubmitRequest) -> Result<TurnOutcome> {
        let engine = self
            .active
            .clone()
            .ok_or_else(|| ParleyError::Session("no active chat".to_string()))?;
        request.validate()?;
        if engine.is_busy() {
            return Ok(TurnOutcome::Busy);
        }
        self.drafts.on_submit(&engine.chat_id());
        engine.submit(request).await
    }

    pub async fn list_chats(&self) -> Result<Vec<HistoryEntry>> {
        self.store.fetch_or_create_history_list().await
    }

    pub async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ParleyError::InvalidInput("title is empty".to_string()));
        }
        self.store.rename_chat(chat_id, title).await?;
        if let Some(engine) = self.active.as_ref().filter(|e| e.chat_id() == chat_id) {
            engine.set_title(title);
        }
        Ok(())
    }

    pub async fn delete_chat(&mut self, chat_id: &str) -> Result<()> {
        if self.active_id().as_deref() == Some(chat_id) {
            if let Some(engine) = self.active.take() {
                engine.abort();
            }
        }
        self.drafts.forget(chat_id);
        self.store.delete_chat(chat_id).await
    }
}

impl std::fmt::Debug for ChatWorkspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatWorkspace")
            .field("active", &self.active_id())
            .field("provider", &self.provider.name())
            .finish()
    }
}
