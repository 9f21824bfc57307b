// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! OpenAI-compatible chat completions provider
//!
//! Implements the CompletionProvider trait for any endpoint that speaks the
//! `/chat/completions` streaming protocol (server-sent `data:` lines ending
//! with `[DONE]`).

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ParleyError, Result};
use crate::llm::message::{Message, MessageContent, ToolCall};
use crate::llm::provider::{
    ChunkDelta, CompletionProvider, CompletionRequest, FinishReason, StreamChunk, ToolDefinition,
};
use crate::llm::stream::CompletionStream;

use super::common::{parse_retry_after_seconds, server_error, DEFAULT_RETRY_AFTER_SECS};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Streaming provider for OpenAI-compatible endpoints
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    /// Create a new provider against the default endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create with a custom base URL (the `/chat/completions` path is appended)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// Convert internal messages to the wire format.
    ///
    /// Document metadata stays local; only the composed text is sent.
    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|message| match message {
                Message::System { content } => WireMessage {
                    role: "system",
                    content: Some(MessageContent::Text(content.clone())),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Message::User { content, .. } => WireMessage {
                    role: "user",
                    content: Some(content.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                },
                Message::Assistant {
                    content,
                    tool_calls,
                } => WireMessage {
                    role: "assistant",
                    content: if content.is_empty() && !tool_calls.is_empty() {
                        None
                    } else {
                        Some(MessageContent::Text(content.clone()))
                    },
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls.clone())
                    },
                    tool_call_id: None,
                },
                Message::Tool {
                    tool_call_id,
                    content,
                } => WireMessage {
                    role: "tool",
                    content: Some(MessageContent::Text(content.clone())),
                    tool_calls: None,
                    tool_call_id: Some(tool_call_id.clone()),
                },
            })
            .collect()
    }

    fn convert_tools(tools: &[ToolDefinition]) -> Vec<WireTool> {
        tools
            .iter()
            .map(|tool| WireTool {
                tool_type: "function",
                function: tool.clone(),
            })
            .collect()
    }

    /// Build the request body
    fn build_request(request: &CompletionRequest) -> WireRequest {
        let has_tools = !request.tools.is_empty();
        WireRequest {
            model: request.model.clone(),
            messages: Self::convert_messages(&request.messages),
            tools: has_tools.then(|| Self::convert_tools(&request.tools)),
            tool_choice: has_tools.then(|| request.tool_choice.as_str()),
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            stream: true,
        }
    }

    /// Map an unsuccessful HTTP response to an error
    fn parse_error(status: u16, headers: &HeaderMap, body: &str, model: &str) -> ParleyError {
        let message = serde_json::from_str::<WireErrorBody>(body)
            .map(|parsed| parsed.error.message)
            .unwrap_or_else(|_| body.to_string());

        match status {
            401 | 403 => ParleyError::Api(ApiError::AuthenticationFailed),
            404 => ParleyError::Api(ApiError::ModelNotFound(model.to_string())),
            429 => ParleyError::Api(ApiError::RateLimited(
                parse_retry_after_seconds(headers).unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            )),
            _ => server_error(status, message),
        }
    }
}

/// Result of reading one SSE line
#[derive(Debug, PartialEq)]
enum SseLine {
    Skip,
    Done,
    Chunk(StreamChunk),
    Error(String),
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<WireStreamChunk>(data) {
        Ok(parsed) => {
            if let Some(error) = parsed.error {
                return SseLine::Error(error.message);
            }
            match parsed.choices.into_iter().next() {
                Some(choice) => SseLine::Chunk(StreamChunk {
                    delta: choice.delta,
                    finish_reason: choice.finish_reason,
                }),
                // Usage-only chunks carry no choices.
                None => SseLine::Skip,
            }
        }
        Err(e) => {
            tracing::warn!(
                target: "parley.llm.openai",
                error = %e,
                "Skipping unparseable stream event"
            );
            SseLine::Skip
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let body = Self::build_request(&request);

        tracing::debug!(
            target: "parley.llm.openai",
            model = %request.model,
            messages = body.messages.len(),
            tools = request.tools.len(),
            "Opening completion stream"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(
                status.as_u16(),
                &headers,
                &text,
                &request.model,
            ));
        }

        let mut byte_stream = Box::pin(response.bytes_stream());

        let stream = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(item) = byte_stream.next().await {
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ParleyError::Api(ApiError::StreamError(e.to_string())));
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=line_end).collect();
                    match parse_sse_line(&String::from_utf8_lossy(&line)) {
                        SseLine::Skip => {}
                        SseLine::Done => return,
                        SseLine::Chunk(chunk) => yield Result::<StreamChunk>::Ok(chunk),
                        SseLine::Error(message) => {
                            yield Err(ParleyError::Api(ApiError::StreamError(message)));
                            return;
                        }
                    }
                }
            }

            // A final event may arrive without its terminating newline.
            if !buffer.is_empty() {
                match parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                    SseLine::Chunk(chunk) => yield Result::<StreamChunk>::Ok(chunk),
                    SseLine::Error(message) => {
                        yield Err(ParleyError::Api(ApiError::StreamError(message)));
                    }
                    SseLine::Skip | SseLine::Done => {}
                }
            }
        };

        Ok(CompletionStream::new(Box::pin(stream)))
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ToolDefinition,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    error: WireErrorDetail,
}

#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    error: Option<WireErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<FinishReason>,
}
