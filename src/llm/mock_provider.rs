// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock completion provider for testing
//!
//! Provides a configurable mock implementation of the CompletionProvider
//! trait that can be used in tests and offline mode without making real
//! API calls.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{ApiError, Result};
use crate::llm::message::{Message, ToolCall};
use crate::llm::provider::{
    ChunkDelta, CompletionProvider, CompletionRequest, FinishReason, FunctionDelta, StreamChunk,
    ToolCallDelta,
};
use crate::llm::stream::CompletionStream;

/// A mock completion provider for testing
#[derive(Clone)]
pub struct MockProvider {
    /// Provider name
    name: String,
    /// Responses served in order; the last one repeats
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Responses reserved for a specific model
    model_responses: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
    /// Reply with the last user message instead of the queue
    echo: bool,
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Recorded requests
    recorded_requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

/// A pre-configured response for the mock provider
#[derive(Clone, Debug)]
pub struct MockResponse {
    /// Text content to stream
    pub text: String,
    /// Tool calls to stream (arguments are split across chunks)
    pub tool_calls: Vec<ToolCall>,
    /// Fail the request with this message instead of streaming
    pub error: Option<String>,
    /// Pause before each chunk
    pub chunk_delay: Option<Duration>,
    /// Never end the stream after the last chunk
    pub hang: bool,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: "Mock response".to_string(),
            tool_calls: vec![],
            error: None,
            chunk_delay: None,
            hang: false,
        }
    }
}

impl MockResponse {
    /// Plain text response
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Response requesting the given tool calls
    pub fn tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: String::new(),
            tool_calls,
            ..Default::default()
        }
    }

    /// Request that fails when opened
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Pause before each chunk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Keep the stream open forever after the last chunk
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockProvider {
    /// Create a new mock provider
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            responses: Arc::new(Mutex::new(VecDeque::from([MockResponse::default()]))),
            model_responses: Arc::new(Mutex::new(HashMap::new())),
            echo: false,
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(vec![])),
        }
    }

    /// Provider that answers by echoing the last user message
    pub fn echo() -> Self {
        let mut provider = Self::new();
        provider.echo = true;
        provider
    }

    /// Set a single text response
    pub fn with_response(self, text: impl Into<String>) -> Self {
        self.with_mock_responses(vec![MockResponse::text(text)])
    }

    /// Queue multiple text responses (returned in order)
    pub fn with_responses(self, texts: Vec<String>) -> Self {
        self.with_mock_responses(texts.into_iter().map(MockResponse::text).collect())
    }

    /// Queue fully configured responses (returned in order)
    pub fn with_mock_responses(self, responses: Vec<MockResponse>) -> Self {
        {
            let mut queue = lock(&self.responses);
            queue.clear();
            queue.extend(responses);
        }
        self
    }

    /// Serve `response` to requests for `model` before using the main queue
    pub fn with_model_response(self, model: impl Into<String>, response: MockResponse) -> Self {
        lock(&self.model_responses)
            .entry(model.into())
            .or_default()
            .push_back(response);
        self
    }

    /// Get the number of times complete_stream() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// Requests that were sent for a given model
    pub fn requests_for_model(&self, model: &str) -> Vec<CompletionRequest> {
        lock(&self.recorded_requests)
            .iter()
            .filter(|request| request.model == model)
            .cloned()
            .collect()
    }

    /// Get the last request made
    pub fn last_request(&self) -> Option<CompletionRequest> {
        lock(&self.recorded_requests).last().cloned()
    }

    fn next_response(&self, request: &CompletionRequest) -> MockResponse {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(queue) = lock(&self.model_responses).get_mut(&request.model) {
            if let Some(response) = queue.pop_front() {
                return response;
            }
        }

        if self.echo {
            let last_user = request
                .messages
                .iter()
                .rev()
                .find(|m| matches!(m, Message::User { .. }))
                .map(Message::text)
                .unwrap_or_default();
            return MockResponse::text(format!("You said: {last_user}"));
        }

        let mut queue = lock(&self.responses);
        if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        }
    }
}

fn build_chunks(response: &MockResponse) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();

    // Stream the text in chunks
    for piece in response.text.chars().collect::<Vec<_>>().chunks(10) {
        chunks.push(StreamChunk::text(piece.iter().collect::<String>()));
    }

    for (index, call) in response.tool_calls.iter().enumerate() {
        let args = &call.function.arguments;
        let split = args
            .char_indices()
            .nth(args.chars().count() / 2)
            .map(|(i, _)| i)
            .unwrap_or(args.len());
        let (head, tail) = args.split_at(split);

        chunks.push(StreamChunk {
            delta: ChunkDelta {
                content: None,
                tool_calls: Some(vec![ToolCallDelta {
                    index,
                    id: Some(call.id.clone()),
                    function: Some(FunctionDelta {
                        name: Some(call.function.name.clone()),
                        arguments: Some(head.to_string()),
                    }),
                }]),
            },
            finish_reason: None,
        });
        chunks.push(StreamChunk {
            delta: ChunkDelta {
                content: None,
                tool_calls: Some(vec![ToolCallDelta {
                    index,
                    id: None,
                    function: Some(FunctionDelta {
                        name: None,
                        arguments: Some(tail.to_string()),
                    }),
                }]),
            },
            finish_reason: None,
        });
    }

    let reason = if response.tool_calls.is_empty() {
        FinishReason::Stop
    } else {
        FinishReason::ToolCalls
    };
    chunks.push(StreamChunk::finish(reason));
    chunks
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        lock(&self.recorded_requests).push(request.clone());
        let response = self.next_response(&request);

        if let Some(message) = response.error {
            return Err(ApiError::Network(message).into());
        }

        let chunks = build_chunks(&response);
        let delay = response.chunk_delay;
        let hang = response.hang;

        let stream = async_stream::stream! {
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Result::<StreamChunk>::Ok(chunk);
            }
            if hang {
                futures::future::pending::<()>().await;
            }
        };

        Ok(CompletionStream::new(Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_provider_creation() {
        let provider = MockProvider::new();
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_provider_streams_text() {
        let provider = MockProvider::new().with_response("Test response that is long");
        let request = CompletionRequest::new("mock-model", vec![Message::user("Hello")]);

        let mut stream = provider.complete_stream(request).await.unwrap();
        let first = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(first.delta.content.as_deref(), Some("Test respo"));

        let message = stream.final_completion().await.unwrap();
        assert_eq!(message.content, "Test response that is long");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_queue_order_and_repeat_last() {
        let provider =
            MockProvider::new().with_responses(vec!["first".to_string(), "second".to_string()]);

        for expected in ["first", "second", "second"] {
            let stream = provider
                .complete_stream(CompletionRequest::new("m", vec![]))
                .await
                .unwrap();
            assert_eq!(stream.final_completion().await.unwrap().content, expected);
        }
    }

    #[tokio::test]
    async fn test_mock_provider_tool_calls_roundtrip_through_fragments() {
        let provider = MockProvider::new().with_mock_responses(vec![MockResponse::tool_calls(
            vec![ToolCall::new("call_1", "add", r#"{"a":2,"b":3}"#)],
        )]);

        let stream = provider
            .complete_stream(CompletionRequest::new("m", vec![]))
            .await
            .unwrap();
        let message = stream.final_completion().await.unwrap();
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].function.arguments, r#"{"a":2,"b":3}"#);
        assert_eq!(message.finish_reason, Some(FinishReason::ToolCalls));
    }

    #[tokio::test]
    async fn test_mock_provider_model_routing() {
        let provider = MockProvider::new()
            .with_response("main")
            .with_model_response("title-model", MockResponse::text("A Title"));

        let title = provider
            .complete_stream(CompletionRequest::new("title-model", vec![]))
            .await
            .unwrap();
        assert_eq!(title.final_completion().await.unwrap().content, "A Title");
        assert_eq!(provider.requests_for_model("title-model").len(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_error() {
        let provider = MockProvider::new().with_mock_responses(vec![MockResponse::error("down")]);
        let result = provider
            .complete_stream(CompletionRequest::new("m", vec![]))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_provider_echo() {
        let provider = MockProvider::echo();
        let stream = provider
            .complete_stream(CompletionRequest::new("m", vec![Message::user("ping")]))
            .await
            .unwrap();
        assert_eq!(
            stream.final_completion().await.unwrap().content,
            "You said: ping"
        );
    }

    #[tokio::test]
    async fn test_mock_provider_records_requests() {
        let provider = MockProvider::new();
        let _ = provider
            .complete_stream(CompletionRequest::new("m1", vec![Message::user("a")]))
            .await
            .unwrap();
        assert_eq!(provider.recorded_requests().len(), 1);
        assert_eq!(provider.last_request().unwrap().model, "m1");
    }
}
