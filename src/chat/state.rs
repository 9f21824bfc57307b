// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session state and the optimistic snapshot
//!
//! [`SnapshotCell`] holds the locally owned, possibly-ahead-of-server view of
//! one conversation. Front ends subscribe to it; the engine and the remote
//! reconciliation rule are its only writers.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::llm::message::Message;

/// Turn phase of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Streaming,
    Persisting,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Streaming => "streaming",
            Phase::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// A conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Empty until resolved; always filled in before persisting
    #[serde(default)]
    pub model: String,
    /// Local runtime state, never stored
    #[serde(skip)]
    pub phase: Phase,
}

impl ChatSession {
    /// Create an empty session with a fresh id
    pub fn new(title: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), title, model)
    }

    pub fn with_id(id: impl Into<String>, title: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            messages: Vec::new(),
            model: model.into(),
            phase: Phase::Idle,
        }
    }

    pub fn has_model(&self) -> bool {
        !self.model.trim().is_empty()
    }

    /// Number of user messages so far
    pub fn user_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, Message::User { .. }))
            .count()
    }

    /// Map an index over visible (non-system) messages to a raw index
    pub fn raw_index_of_visible(&self, visible_index: usize) -> Option<usize> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_visible())
            .nth(visible_index)
            .map(|(raw, _)| raw)
    }

    /// Visible (non-system) messages in order
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_visible())
    }
}

/// Result of offering a remote snapshot to the local one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Remote was not longer than local; local kept
    KeptLocal,
    /// Remote was longer; adopted in full
    AdoptedRemote,
    /// Remote belongs to another conversation
    Ignored,
}

/// Length-only reconciliation rule.
///
/// Returns the snapshot that should be visible after `remote` arrives. The
/// local phase is kept either way since it is not part of the stored state.
pub fn reconcile(local: &ChatSession, remote: ChatSession) -> (ChatSession, MergeOutcome) {
    if remote.id != local.id {
        return (local.clone(), MergeOutcome::Ignored);
    }
    if remote.messages.len() <= local.messages.len() {
        return (local.clone(), MergeOutcome::KeptLocal);
    }
    let mut adopted = remote;
    adopted.phase = local.phase;
    (adopted, MergeOutcome::AdoptedRemote)
}

/// Observable optimistic snapshot of one session
#[derive(Debug)]
pub struct SnapshotCell {
    tx: watch::Sender<ChatSession>,
}

impl SnapshotCell {
    pub fn new(session: ChatSession) -> Self {
        let (tx, _rx) = watch::channel(session);
        Self { tx }
    }

    /// Clone of the current snapshot
    pub fn get(&self) -> ChatSession {
        self.tx.borrow().clone()
    }

    /// Read the snapshot without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&ChatSession) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Mutate the snapshot and notify subscribers
    pub fn update(&self, f: impl FnOnce(&mut ChatSession)) {
        self.tx.send_modify(f);
    }

    /// Subscribe to snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<ChatSession> {
        self.tx.subscribe()
    }

    pub fn id(&self) -> String {
        self.with(|s| s.id.clone())
    }

    pub fn phase(&self) -> Phase {
        self.with(|s| s.phase)
    }

    pub fn set_phase(&self, phase: Phase) {
        self.tx.send_if_modified(|session| {
            if session.phase == phase {
                return false;
            }
            session.phase = phase;
            true
        });
    }

    pub fn push_message(&self, message: Message) {
        self.update(|session| session.messages.push(message));
    }

    /// Replace the snapshot wholesale, keeping the local phase
    pub fn replace(&self, mut session: ChatSession) {
        self.update(|current| {
            session.phase = current.phase;
            *current = session;
        });
    }

    /// Apply the reconciliation rule to an arriving remote snapshot
    pub fn reconcile_remote(&self, remote: ChatSession) -> MergeOutcome {
        let mut outcome = MergeOutcome::KeptLocal;
        self.tx.send_if_modified(|local| {
            let (merged, result) = reconcile(local, remote);
            outcome = result;
            if result == MergeOutcome::AdoptedRemote {
                *local = merged;
                true
            } else {
                false
            }
        });
        tracing::debug!(
            target: "parley.chat.engine",
            outcome = ?outcome,
            "Reconciled remote snapshot"
        );
        outcome
    }
}
