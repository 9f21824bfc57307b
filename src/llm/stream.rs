// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming completion handle
//!
//! Wraps a provider's chunk stream, records every chunk it hands out, and
//! assembles the finalized completion once the stream is exhausted.

use futures::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::pin::Pin;

use crate::error::Result;
use crate::llm::message::ToolCall;
use crate::llm::provider::{CompletionMessage, FinishReason, StreamChunk};

/// Boxed chunk stream produced by a provider transport
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// A lazy, finite, non-restartable stream of completion chunks
pub struct CompletionStream {
    inner: Option<ChunkStream>,
    accumulator: ChunkAccumulator,
}

impl CompletionStream {
    /// Wrap a provider transport stream
    pub fn new(inner: ChunkStream) -> Self {
        Self {
            inner: Some(inner),
            accumulator: ChunkAccumulator::default(),
        }
    }

    /// Build a stream over pre-made chunks
    pub fn from_chunks(chunks: Vec<StreamChunk>) -> Self {
        Self::new(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }

    /// Pull the next chunk. Returns `None` once the stream ended or was closed.
    pub async fn next_chunk(&mut self) -> Option<Result<StreamChunk>> {
        let inner = self.inner.as_mut()?;
        match inner.next().await {
            Some(Ok(chunk)) => {
                self.accumulator.push(&chunk);
                Some(Ok(chunk))
            }
            Some(Err(e)) => Some(Err(e)),
            None => {
                self.inner = None;
                None
            }
        }
    }

    /// Stop pulling and drop the upstream transport.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            tracing::debug!(target: "parley.chat.stream", "Completion stream closed");
        }
    }

    /// Whether the upstream transport has been released
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Drain any remaining chunks and return the structured completion.
    ///
    /// Tool-call fragments are only surfaced here, joined per index.
    pub async fn final_completion(mut self) -> Result<CompletionMessage> {
        while let Some(chunk) = self.next_chunk().await {
            chunk?;
        }
        Ok(self.accumulator.finish())
    }
}

impl std::fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream")
            .field("closed", &self.is_closed())
            .field("content_len", &self.accumulator.content.len())
            .finish()
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
struct ChunkAccumulator {
    content: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    finish_reason: Option<FinishReason>,
}

impl ChunkAccumulator {
    fn push(&mut self, chunk: &StreamChunk) {
        if let Some(text) = &chunk.delta.content {
            self.content.push_str(text);
        }
        for fragment in chunk.delta.tool_calls.iter().flatten() {
            let call = self.tool_calls.entry(fragment.index).or_default();
            if let Some(id) = &fragment.id {
                if !id.is_empty() {
                    call.id = id.clone();
                }
            }
            if let Some(function) = &fragment.function {
                if let Some(name) = &function.name {
                    call.name.push_str(name);
                }
                if let Some(arguments) = &function.arguments {
                    call.arguments.push_str(arguments);
                }
            }
        }
        if let Some(reason) = &chunk.finish_reason {
            self.finish_reason = Some(reason.clone());
        }
    }

    fn finish(self) -> CompletionMessage {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| {
                let id = if call.id.is_empty() {
                    format!("call_{index}")
                } else {
                    call.id
                };
                ToolCall::new(id, call.name, call.arguments)
            })
            .collect();

        CompletionMessage {
            content: self.content,
            tool_calls,
            finish_reason: self.finish_reason,
        }
    }
}
