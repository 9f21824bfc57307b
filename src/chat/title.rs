// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation title generation
//!
//! Free plans get the first message truncated, with no model call. Paid
//! plans get a short, low-temperature completion that runs next to the main
//! stream and falls back to the truncation on any failure.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

use crate::billing::PlanTier;
use crate::config::{DefaultsConfig, TitleConfig};
use crate::error::{ApiError, Result};
use crate::llm::message::Message;
use crate::llm::provider::{CompletionProvider, CompletionRequest};

pub const TITLE_SYSTEM_PROMPT: &str = "You are a helpful assistant that generates concise, \
meaningful titles (3-5 words) for chat conversations based on the user's first message. \
Return only the title without quotes or explanations.";

/// First `max_chars` characters of `text`, without quotes or line breaks
pub fn truncate_title(text: &str, max_chars: usize) -> String {
    let head: String = text.chars().take(max_chars).collect();
    head.replace('"', "")
        .replace("\r\n", " ")
        .replace('\n', " ")
        .trim()
        .to_string()
}

/// Clean a model-generated title. Returns `None` when nothing is left.
pub fn clean_title(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix(['"', '\''])
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(['"', '\'']).unwrap_or(trimmed);

    let cleaned = trimmed
        .replace('"', "")
        .replace("\r\n", " ")
        .replace('\n', " ")
        .trim()
        .to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// How the title for a new conversation will be produced
pub enum TitlePlan {
    /// Title known now
    Immediate(String),
    /// Title arrives when the future resolves; never fails
    Pending(BoxFuture<'static, String>),
}

impl std::fmt::Debug for TitlePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TitlePlan::Immediate(title) => f.debug_tuple("Immediate").field(title).finish(),
            TitlePlan::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

#[derive(Clone)]
pub struct TitleGenerator {
    provider: Arc<dyn CompletionProvider>,
    config: TitleConfig,
    model: String,
}

impl TitleGenerator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        config: &TitleConfig,
        defaults: &DefaultsConfig,
    ) -> Self {
        Self {
            provider,
            model: config.effective_model(defaults).to_string(),
            config: config.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Deterministic title used by free plans and as the fallback
    pub fn truncated(&self, first_message: &str) -> String {
        truncate_title(first_message, self.config.free_max_chars)
    }

    /// Decide how to title a conversation starting with `first_message`
    pub fn plan(&self, tier: PlanTier, first_message: &str) -> TitlePlan {
        if tier.is_free() {
            return TitlePlan::Immediate(self.truncated(first_message));
        }
        let generator = self.clone();
        let first_message = first_message.to_string();
        TitlePlan::Pending(
            async move { generator.generate_or_truncate(&first_message).await }.boxed(),
        )
    }

    /// Model-generated title, or the truncation on any failure
    pub async fn generate_or_truncate(&self, first_message: &str) -> String {
        match self.generate(first_message).await {
            Ok(title) => title,
            Err(e) => {
                tracing::warn!(
                    target: "parley.chat.title",
                    error = %e,
                    "Title generation failed, using truncated message"
                );
                self.truncated(first_message)
            }
        }
    }

    /// Ask the model for a title
    pub async fn generate(&self, first_message: &str) -> Result<String> {
        let excerpt: String = first_message
            .chars()
            .take(self.config.prompt_max_chars)
            .collect();
        let messages = vec![
            Message::system(TITLE_SYSTEM_PROMPT),
            Message::user(format!(
                "Generate a concise, contextual title (3-5 words) for a chat that starts with this message: \"{excerpt}\""
            )),
        ];
        let request = CompletionRequest::new(self.model.clone(), messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens);

        tracing::debug!(target: "parley.chat.title", model = %self.model, "Generating title");
        let completion = self
            .provider
            .complete_stream(request)
            .await?
            .final_completion()
            .await?;

        clean_title(&completion.content).ok_or_else(|| {
            ApiError::InvalidResponse("title completion was empty".to_string()).into()
        })
    }
}
