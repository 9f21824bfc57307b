// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session engine.
//!
//! Drives one conversation through `idle -> streaming -> persisting -> idle`.
//! A submission is admitted only when the session is idle and the
//! reentrancy flag was clear; the flag is taken synchronously before the
//! first suspension point and released by a drop guard on every exit path.
//!
//! The main response stream and the title generator run concurrently. The
//! turn persists only after both settled, and never after a cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::billing::{BillingStatus, CachedBillingStatus};
use crate::chat::observer::{NoopObserver, SessionObserver};
use crate::chat::state::{ChatSession, MergeOutcome, Phase, SnapshotCell};
use crate::chat::streaming::{StreamConsumer, TurnContext};
use crate::chat::title::{TitleGenerator, TitlePlan};
use crate::chat::tool_calls::ToolCallCoordinator;
use crate::config::Settings;
use crate::error::{ParleyError, Result};
use crate::history::ChatPersistence;
use crate::llm::message::{DocumentMeta, Message};
use crate::llm::provider::{CompletionProvider, CompletionRequest};
use crate::tools::ToolRegistry;

/// A user submission
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub text: String,
    /// Added as a system message when the chat has no messages yet
    pub system_prompt: Option<String>,
    pub document: Option<DocumentMeta>,
    /// Image data URLs
    pub images: Vec<String>,
}

impl SubmitRequest {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_document(mut self, document: DocumentMeta) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_image(mut self, data_url: impl Into<String>) -> Self {
        self.images.push(data_url.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.document.is_none() && self.images.is_empty()
    }

    /// Reject submissions with nothing to send
    pub(crate) fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(ParleyError::InvalidInput("message is empty".to_string()));
        }
        Ok(())
    }
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Response appended; `persisted` is false when the store write failed
    Completed { persisted: bool },
    /// Cancelled on purpose; nothing persisted
    Aborted,
    /// Another turn was in flight; nothing happened
    Busy,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(target: "parley.chat.engine", "Engine lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Holds the reentrancy flag for one turn and resets the session on drop
struct TurnGuard<'a> {
    engine: &'a SessionEngine,
    cancel: CancellationToken,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.engine.cancel_slot) = None;
        self.engine.accumulator.send_replace(None);
        self.engine.set_phase(Phase::Idle);
        self.engine.in_flight.store(false, Ordering::SeqCst);
    }
}

pub struct SessionEngine {
    provider: Arc<dyn CompletionProvider>,
    tools: Arc<ToolRegistry>,
    persistence: Arc<dyn ChatPersistence>,
    billing: Arc<dyn BillingStatus>,
    observer: Arc<dyn SessionObserver>,
    settings: Arc<Settings>,
    snapshot: SnapshotCell,
    accumulator: watch::Sender<Option<String>>,
    in_flight: AtomicBool,
    cancel_slot: Mutex<Option<CancellationToken>>,
    last_error: Mutex<Option<String>>,
}

impl SessionEngine {
    /// Create an engine for `session`.
    ///
    /// Billing defaults to the cached product name in `settings`, tools to an
    /// empty registry and the observer to a no-op.
    pub fn new(
        session: ChatSession,
        provider: Arc<dyn CompletionProvider>,
        persistence: Arc<dyn ChatPersistence>,
        settings: Arc<Settings>,
    ) -> Self {
        let session = with_default_model(session, &settings);
        let (accumulator, _rx) = watch::channel(None);
        Self {
            provider,
            tools: Arc::new(ToolRegistry::new()),
            persistence,
            billing: Arc::new(CachedBillingStatus::from_config(&settings.billing)),
            observer: Arc::new(NoopObserver),
            settings,
            snapshot: SnapshotCell::new(session),
            accumulator,
            in_flight: AtomicBool::new(false),
            cancel_slot: Mutex::new(None),
            last_error: Mutex::new(None),
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

    pub fn chat_id(&self) -> String {
        self.snapshot.id()
    }

    /// Clone of the optimistic snapshot
    pub fn session(&self) -> ChatSession {
        self.snapshot.get()
    }

    pub fn snapshot(&self) -> &SnapshotCell {
        &self.snapshot
    }

    pub fn phase(&self) -> Phase {
        self.snapshot.phase()
    }

    /// Whether a turn or message edit currently holds the session
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSession> {
        self.snapshot.subscribe()
    }

    /// Live text of the active stream; `None` between streams
    pub fn subscribe_stream(&self) -> watch::Receiver<Option<String>> {
        self.accumulator.subscribe()
    }

    /// Generic error flag set by the last failed turn or store write
    pub fn error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    pub fn clear_error(&self) {
        *lock(&self.last_error) = None;
    }

    fn set_error(&self, message: impl Into<String>) {
        *lock(&self.last_error) = Some(message.into());
    }

    /// Replace the snapshot with a freshly loaded copy of the chat
    pub fn load_snapshot(&self, session: ChatSession) {
        self.snapshot
            .replace(with_default_model(session, &self.settings));
    }

    /// Offer an asynchronously fetched remote snapshot
    pub fn reconcile_remote(&self, remote: ChatSession) -> MergeOutcome {
        self.snapshot.reconcile_remote(remote)
    }

    /// Refetch the chat from the store and reconcile it
    pub async fn refresh(&self) -> Result<MergeOutcome> {
        let remote = self.persistence.get_chat(&self.chat_id()).await?;
        Ok(self.reconcile_remote(remote))
    }

    pub fn set_model(&self, model: impl Into<String>) {
        let model = model.into();
        self.snapshot.update(|session| session.model = model);
    }

    /// Set the visible title
    pub fn set_title(&self, title: &str) {
        if title.is_empty() {
            return;
        }
        self.snapshot
            .update(|session| session.title = title.to_string());
        self.observer.on_title(&self.chat_id(), title);
    }

    /// Cancel the in-flight turn, if any. Returns whether one was running.
    pub fn abort(&self) -> bool {
        match lock(&self.cancel_slot).as_ref() {
            Some(token) => {
                tracing::debug!(target: "parley.chat.engine", chat_id = %self.chat_id(), "Aborting turn");
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn set_phase(&self, phase: Phase) {
        let previous = self.snapshot.phase();
        if previous == phase {
            return;
        }
        self.snapshot.set_phase(phase);
        let chat_id = self.chat_id();
        tracing::debug!(
            target: "parley.chat.engine",
            chat_id = %chat_id,
            from = %previous,
            to = %phase,
            "Phase transition"
        );
        self.observer.on_phase_change(&chat_id, phase);
    }

    /// Test-and-set the reentrancy flag. Performs no await.
    fn try_begin(&self) -> Option<TurnGuard<'_>> {
        if self.snapshot.phase() != Phase::Idle {
            return None;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        let cancel = CancellationToken::new();
        *lock(&self.cancel_slot) = Some(cancel.clone());
        self.clear_error();
        Some(TurnGuard { engine: self, cancel })
    }

    fn title_generator(&self) -> TitleGenerator {
        TitleGenerator::new(
            self.provider.clone(),
            &self.settings.title,
            &self.settings.defaults,
        )
    }

    fn build_request(&self, session: &ChatSession) -> CompletionRequest {
        let defaults = &self.settings.defaults;
        let model = if session.has_model() {
            session.model.clone()
        } else {
            defaults.model.clone()
        };
        let request = CompletionRequest::new(model, session.messages.clone())
            .with_temperature(defaults.temperature)
            .with_top_p(defaults.top_p);
        if defaults.tools_enabled && !self.tools.is_empty() {
            request.with_tools(self.tools.definitions())
        } else {
            request
        }
    }

    /// Submit a user message and run the turn to completion.
    ///
    /// Returns [`TurnOutcome::Busy`] without side effects when a turn is
    /// already in flight. Provider failures are returned as errors after the
    /// session went back to idle.
    pub async fn submit(&self, request: SubmitRequest) -> Result<TurnOutcome> {
        request.validate()?;
        let Some(guard) = self.try_begin() else {
            tracing::debug!(target: "parley.chat.engine", "Turn in flight, submit ignored");
            return Ok(TurnOutcome::Busy);
        };

        let SubmitRequest {
            text,
            system_prompt,
            document,
            images,
        } = request;
        let user_message = Message::compose_user(&text, document, &images);
        // Titles follow what the user typed; a bare attachment falls back to its text.
        let first_text = if text.trim().is_empty() {
            user_message.text()
        } else {
            text
        };
        let placeholder = self.settings.defaults.placeholder_title.as_str();

        let mut needs_title = false;
        self.snapshot.update(|session| {
            if session.messages.is_empty() {
                if let Some(prompt) = system_prompt
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                {
                    session.messages.push(Message::system(prompt));
                }
            }
            session.messages.push(user_message);
            needs_title = session.title == placeholder && session.user_message_count() == 1;
        });

        let pending_title = if needs_title {
            match self
                .title_generator()
                .plan(self.billing.plan_tier(), &first_text)
            {
                TitlePlan::Immediate(title) => {
                    self.set_title(&title);
                    None
                }
                TitlePlan::Pending(future) => Some(future),
            }
        } else {
            None
        };

        self.drive_turn(guard, pending_title).await
    }

    /// Drop the assistant message at `visible_index` and everything after
    /// it, then run a new turn over the remaining transcript.
    pub async fn regenerate(&self, visible_index: usize) -> Result<TurnOutcome> {
        let raw = self.snapshot.with(|session| {
            session
                .raw_index_of_visible(visible_index)
                .filter(|&raw| matches!(session.messages.get(raw), Some(Message::Assistant { .. })))
        });
        let Some(raw) = raw else {
            return Err(ParleyError::InvalidInput(format!(
                "no assistant message at index {visible_index}"
            )));
        };
        let Some(guard) = self.try_begin() else {
            return Ok(TurnOutcome::Busy);
        };

        self.snapshot.update(|session| session.messages.truncate(raw));
        self.drive_turn(guard, None).await
    }

    /// Replace the text of a visible message and drop everything after it.
    ///
    /// Returns whether the change was persisted.
    pub async fn edit_message(&self, visible_index: usize, text: impl Into<String>) -> Result<bool> {
        let text = text.into();
        self.truncate_and_persist(visible_index, |messages, raw| {
            if let Some(message) = messages.get_mut(raw) {
                message.set_text(text);
            }
            messages.truncate(raw + 1);
        })
        .await
    }

    /// Remove a visible message and everything after it.
    ///
    /// Returns whether the change was persisted.
    pub async fn delete_message(&self, visible_index: usize) -> Result<bool> {
        self.truncate_and_persist(visible_index, |messages, raw| messages.truncate(raw))
            .await
    }

    async fn truncate_and_persist(
        &self,
        visible_index: usize,
        apply: impl FnOnce(&mut Vec<Message>, usize),
    ) -> Result<bool> {
        let Some(_guard) = self.try_begin() else {
            return Err(ParleyError::Session(
                "a response is still in progress".to_string(),
            ));
        };
        let raw = self
            .snapshot
            .with(|session| session.raw_index_of_visible(visible_index))
            .ok_or_else(|| {
                ParleyError::InvalidInput(format!("no message at index {visible_index}"))
            })?;

        self.snapshot
            .update(|session| apply(&mut session.messages, raw));
        self.set_phase(Phase::Persisting);
        Ok(self.persist_snapshot().await)
    }

    async fn drive_turn(
        &self,
        guard: TurnGuard<'_>,
        pending_title: Option<BoxFuture<'static, String>>,
    ) -> Result<TurnOutcome> {
        let chat_id = self.chat_id();
        let cancel = guard.cancel.clone();
        self.set_phase(Phase::Streaming);
        tracing::info!(
            target: "parley.chat.engine",
            chat_id = %chat_id,
            messages = self.snapshot.with(|s| s.messages.len()),
            "Turn started"
        );

        let title_task = async {
            let Some(generating) = pending_title else {
                return;
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(target: "parley.chat.title", chat_id = %chat_id, "Title generation abandoned");
                }
                title = generating => self.set_title(&title),
            }
        };
        let (result, ()) = tokio::join!(self.run_turn(&chat_id, &cancel), title_task);

        let outcome = match result {
            Err(e) if e.is_abort() => TurnOutcome::Aborted,
            Err(e) => {
                tracing::warn!(
                    target: "parley.chat.engine",
                    chat_id = %chat_id,
                    error = %e,
                    "Turn failed"
                );
                self.set_error(e.to_string());
                self.observer.on_turn_error(&chat_id, &e);
                return Err(e);
            }
            Ok(()) if cancel.is_cancelled() => TurnOutcome::Aborted,
            Ok(()) => {
                self.set_phase(Phase::Persisting);
                TurnOutcome::Completed {
                    persisted: self.persist_snapshot().await,
                }
            }
        };

        tracing::info!(
            target: "parley.chat.engine",
            chat_id = %chat_id,
            outcome = ?outcome,
            "Turn finished"
        );
        drop(guard);
        Ok(outcome)
    }

    async fn run_turn(&self, chat_id: &str, cancel: &CancellationToken) -> Result<()> {
        let request = self.snapshot.with(|session| self.build_request(session));
        let consumer = StreamConsumer::new(self.provider.as_ref(), &self.accumulator);
        let ctx = TurnContext {
            chat_id,
            cancel,
            observer: self.observer.as_ref(),
        };

        let completion = consumer.run(request.clone(), ctx).await?;
        let answer = if completion.has_tool_calls() {
            ToolCallCoordinator::new(&self.tools, &consumer, &self.snapshot)
                .coordinate(completion, &request, ctx)
                .await?
        } else {
            completion
        };

        if cancel.is_cancelled() {
            return Err(ParleyError::StreamAborted);
        }
        self.snapshot.push_message(Message::assistant(answer.content));
        Ok(())
    }

    /// Write the snapshot through the persistence collaborator.
    ///
    /// Failures are logged and flagged, never retried.
    async fn persist_snapshot(&self) -> bool {
        if !self.snapshot.with(ChatSession::has_model) {
            let model = self.settings.defaults.model.clone();
            self.snapshot.update(|session| session.model = model);
        }
        let chat = self.snapshot.get();

        match self.persistence.persist_chat(&chat).await {
            Ok(()) => {
                tracing::debug!(
                    target: "parley.chat.engine",
                    chat_id = %chat.id,
                    messages = chat.messages.len(),
                    "Chat persisted"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    target: "parley.chat.engine",
                    chat_id = %chat.id,
                    error = %e,
                    "Failed to persist chat, keeping local state"
                );
                self.set_error(format!("Failed to save chat: {e}"));
                self.observer.on_persist_failed(&chat.id, &e);
                false
            }
        }
    }
}

fn with_default_model(mut session: ChatSession, settings: &Settings) -> ChatSession {
    if !session.has_model() {
        session.model = settings.defaults.model.clone();
    }
    session
}

impl std::fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEngine")
            .field("chat_id", &self.chat_id())
            .field("phase", &self.phase())
            .field("provider", &self.provider.name())
            .field("tools", &self.tools)
            .field("busy", &self.is_busy())
            .finish()
    }
}
