// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for chat sessions
//!
//! Defines the message structures exchanged with completion providers and
//! stored in chat snapshots. The serialized shape follows the chat-completions
//! convention: a `role` tag, `content` as text or parts, `tool_calls` on
//! assistant messages and `tool_call_id` on tool messages.

use serde::{Deserialize, Serialize};

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// System prompt
    System { content: String },

    /// User input, optionally with image parts and document metadata
    User {
        content: MessageContent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document: Option<DocumentMeta>,
    },

    /// Assistant response; carries `tool_calls` with empty content when
    /// the model asked for tools
    Assistant {
        #[serde(default)]
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },

    /// Result of one tool call
    Tool {
        tool_call_id: String,
        content: String,
    },
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// Content of a user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),
    /// Ordered text and image parts
    Parts(Vec<ContentPart>),
}

/// A part of multi-part content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Image reference (usually a `data:` URL)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Metadata for a document attached to a user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub filename: String,
    pub text: String,
}

/// A model-requested function invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

/// Function name and raw JSON arguments of a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as the model produced them; not guaranteed to be valid JSON
    #[serde(default)]
    pub arguments: String,
}

fn default_call_type() -> String {
    "function".to_string()
}

impl ToolCall {
    /// Create a function tool call
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

impl Message {
    /// Create a plain-text user message
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: MessageContent::Text(content.into()),
            document: None,
        }
    }

    /// Create a plain-text assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Create the placeholder assistant message for pending tool calls
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content: String::new(),
            tool_calls,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Create a tool result message
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    /// Build a user message from typed text plus optional attachments.
    ///
    /// Document text is prefixed to the typed text. Images switch the
    /// content to parts, text first.
    pub fn compose_user(
        text: &str,
        document: Option<DocumentMeta>,
        image_urls: &[String],
    ) -> Self {
        let body = match &document {
            Some(doc) if text.is_empty() => doc.text.clone(),
            Some(doc) => format!("{}\n\n{}", doc.text, text),
            None => text.to_string(),
        };

        let content = if image_urls.is_empty() {
            MessageContent::Text(body)
        } else {
            let mut parts = vec![ContentPart::Text { text: body }];
            parts.extend(image_urls.iter().map(|url| ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            }));
            MessageContent::Parts(parts)
        };

        Message::User { content, document }
    }

    /// Role of this message
    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    /// Text content of the message; parts are joined by newlines and
    /// images are skipped
    pub fn text(&self) -> String {
        match self {
            Message::System { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content.clone(),
            Message::User { content, .. } => content.text(),
        }
    }

    /// Tool calls requested by an assistant message
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Whether the message is shown to the user (everything but system prompts)
    pub fn is_visible(&self) -> bool {
        !matches!(self, Message::System { .. })
    }

    /// Replace the text of the message, keeping any image parts
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        match self {
            Message::System { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => *content = text,
            Message::User { content, .. } => content.set_text(text),
        }
    }
}

impl MessageContent {
    /// Joined text of all text parts
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    fn set_text(&mut self, new_text: String) {
        match self {
            MessageContent::Text(text) => *text = new_text,
            MessageContent::Parts(parts) => {
                parts.retain(|part| !matches!(part, ContentPart::Text { .. }));
                parts.insert(0, ContentPart::Text { text: new_text });
            }
        }
    }
}
