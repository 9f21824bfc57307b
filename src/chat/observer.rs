// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Output hooks for the session engine.
//!
//! Frontends implement this trait to render progress. Every hook has a no-op
//! default. Hooks are called from both the turn and the concurrent title
//! task, so they take `&self`.

use serde_json::Value;

use crate::chat::state::Phase;
use crate::error::ParleyError;

pub trait SessionObserver: Send + Sync {
    fn on_phase_change(&self, _chat_id: &str, _phase: Phase) {}

    /// First text delta of a stream; used for scroll side effects only.
    fn on_first_chunk(&self, _chat_id: &str) {}

    fn on_text_delta(&self, _chat_id: &str, _delta: &str) {}

    fn on_tool_invocation(&self, _chat_id: &str, _tool_name: &str, _args: &Value) {}

    fn on_tool_result(&self, _chat_id: &str, _tool_call_id: &str, _result: &Value) {}

    fn on_title(&self, _chat_id: &str, _title: &str) {}

    fn on_turn_error(&self, _chat_id: &str, _error: &ParleyError) {}

    fn on_persist_failed(&self, _chat_id: &str, _error: &ParleyError) {}
}

/// No-op observer for callers that don't need output hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
