// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-conversation unsent input

use std::collections::HashMap;

/// Keeps unsent input text per chat across session switches
#[derive(Debug, Default, Clone)]
pub struct DraftManager {
    drafts: HashMap<String, String>,
    /// Chat the visible input currently belongs to
    previous_chat_id: Option<String>,
    input: String,
}

impl DraftManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text currently in the visible input
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn active_chat_id(&self) -> Option<&str> {
        self.previous_chat_id.as_deref()
    }

    /// Stored draft for a chat that is not active
    pub fn draft_for(&self, chat_id: &str) -> Option<&str> {
        self.drafts.get(chat_id).map(String::as_str)
    }

    /// Stash the input of the chat being left and load the draft of `chat_id`.
    ///
    /// Returns the input now visible.
    pub fn switch_to(&mut self, chat_id: &str) -> &str {
        if chat_id.is_empty() {
            return &self.input;
        }

        if let Some(previous) = self.previous_chat_id.take() {
            if previous == chat_id {
                self.previous_chat_id = Some(previous);
                return &self.input;
            }
            let pending = std::mem::take(&mut self.input);
            if pending.trim().is_empty() {
                self.drafts.remove(&previous);
            } else {
                self.drafts.insert(previous, pending);
            }
        }

        self.input = self.drafts.get(chat_id).cloned().unwrap_or_default();
        self.previous_chat_id = Some(chat_id.to_string());
        &self.input
    }

    /// The turn for `chat_id` was submitted; its input is no longer a draft.
    pub fn on_submit(&mut self, chat_id: &str) {
        self.drafts.remove(chat_id);
        if self.previous_chat_id.as_deref() == Some(chat_id) {
            self.input.clear();
        }
    }

    /// Forget everything stored for a deleted chat
    pub fn forget(&mut self, chat_id: &str) {
        self.drafts.remove(chat_id);
        if self.previous_chat_id.as_deref() == Some(chat_id) {
            self.previous_chat_id = None;
            self.input.clear();
        }
    }
}
