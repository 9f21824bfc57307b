// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Stream consumer
//!
//! Opens one streaming completion, republishes the accumulated text after
//! every delta, and stops pulling as soon as the turn's cancellation token
//! fires. Tool-call fragments are left to [`CompletionStream::final_completion`].

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::chat::observer::SessionObserver;
use crate::error::{ParleyError, Result};
use crate::llm::provider::{CompletionMessage, CompletionProvider, CompletionRequest};
use crate::llm::stream::CompletionStream;

/// Per-turn values threaded through every suspension point
#[derive(Clone, Copy)]
pub struct TurnContext<'a> {
    pub chat_id: &'a str,
    pub cancel: &'a CancellationToken,
    pub observer: &'a dyn SessionObserver,
}

/// Ephemeral state of one stream invocation
#[derive(Debug)]
pub struct StreamState {
    text: String,
    cancel: CancellationToken,
    first_chunk_seen: bool,
}

impl StreamState {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            text: String::new(),
            cancel,
            first_chunk_seen: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn first_chunk_seen(&self) -> bool {
        self.first_chunk_seen
    }

    /// Append a delta. Returns true for the first non-empty delta.
    fn push(&mut self, delta: &str) -> bool {
        self.text.push_str(delta);
        !std::mem::replace(&mut self.first_chunk_seen, true)
    }
}

/// Turns a provider's chunked response into an observable accumulation
pub struct StreamConsumer<'a> {
    provider: &'a dyn CompletionProvider,
    accumulator: &'a watch::Sender<Option<String>>,
}

impl<'a> StreamConsumer<'a> {
    pub fn new(
        provider: &'a dyn CompletionProvider,
        accumulator: &'a watch::Sender<Option<String>>,
    ) -> Self {
        Self {
            provider,
            accumulator,
        }
    }

    /// Run one completion to its finalized form.
    ///
    /// Each invocation gets a fresh child of the turn token. Cancellation
    /// yields [`ParleyError::StreamAborted`] and releases the transport.
    pub async fn run(
        &self,
        request: CompletionRequest,
        ctx: TurnContext<'_>,
    ) -> Result<CompletionMessage> {
        let mut state = StreamState::new(ctx.cancel.child_token());
        if state.cancel.is_cancelled() {
            return Err(ParleyError::StreamAborted);
        }

        tracing::debug!(
            target: "parley.chat.stream",
            chat_id = ctx.chat_id,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Opening completion stream"
        );

        let mut stream: CompletionStream = tokio::select! {
            biased;
            _ = state.cancel.cancelled() => return Err(ParleyError::StreamAborted),
            opened = self.provider.complete_stream(request) => opened?,
        };
        self.accumulator.send_replace(Some(String::new()));

        loop {
            let next = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => {
                    stream.close();
                    tracing::debug!(
                        target: "parley.chat.stream",
                        chat_id = ctx.chat_id,
                        received = state.text.len(),
                        "Stream cancelled"
                    );
                    return Err(ParleyError::StreamAborted);
                }
                next = stream.next_chunk() => next,
            };

            let chunk = match next {
                Some(chunk) => chunk?,
                None => break,
            };
            let Some(delta) = chunk.delta.content.as_deref().filter(|d| !d.is_empty()) else {
                continue;
            };

            if state.push(delta) {
                ctx.observer.on_first_chunk(ctx.chat_id);
            }
            self.accumulator.send_replace(Some(state.text.clone()));
            ctx.observer.on_text_delta(ctx.chat_id, delta);
        }

        let completion = stream.final_completion().await?;
        tracing::debug!(
            target: "parley.chat.stream",
            chat_id = ctx.chat_id,
            chars = completion.content.len(),
            tool_calls = completion.tool_calls.len(),
            "Stream finalized"
        );
        Ok(completion)
    }
}
