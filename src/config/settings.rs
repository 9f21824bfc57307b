// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Parley
//!
//! Handles loading and saving settings from ~/.parley/settings.json

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod io;
mod migration;
mod validation;

/// Main settings structure, stored in ~/.parley/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Completion provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Default settings for new sessions
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Title generation settings
    #[serde(default)]
    pub title: TitleConfig,

    /// Cached billing information
    #[serde(default)]
    pub billing: BillingConfig,

    /// Chat storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL for the API (the `/chat/completions` path is appended)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
        }
    }
}

/// Default settings for new sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Model used when a chat does not name one
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for chat turns
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling for chat turns
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Offer registered tools to the model
    #[serde(default = "default_true")]
    pub tools_enabled: bool,

    /// Title given to chats before one is generated
    #[serde(default = "default_placeholder_title")]
    pub placeholder_title: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            tools_enabled: true,
            placeholder_title: default_placeholder_title(),
        }
    }
}

/// Title generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    /// Character limit for the truncated (free tier / fallback) title
    #[serde(default = "default_title_free_max_chars")]
    pub free_max_chars: usize,

    /// Character limit for the first message sent to the title model
    #[serde(default = "default_title_prompt_max_chars")]
    pub prompt_max_chars: usize,

    /// Model for title generation (None = defaults.model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature for title generation
    #[serde(default = "default_title_temperature")]
    pub temperature: f32,

    /// Token cap for the generated title
    #[serde(default = "default_title_max_tokens")]
    pub max_tokens: u32,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            free_max_chars: default_title_free_max_chars(),
            prompt_max_chars: default_title_prompt_max_chars(),
            model: None,
            temperature: default_title_temperature(),
            max_tokens: default_title_max_tokens(),
        }
    }
}

/// Cached billing information
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BillingConfig {
    /// Last known product name (e.g. "Free", "Pro")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

/// Chat storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one file per stored key
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "PARLEY_API_KEY".to_string()
}

fn default_model() -> String {
    "llama3-3-70b".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_placeholder_title() -> String {
    "New Chat".to_string()
}

fn default_title_free_max_chars() -> usize {
    50
}

fn default_title_prompt_max_chars() -> usize {
    500
}

fn default_title_temperature() -> f32 {
    0.3
}

fn default_title_max_tokens() -> u32 {
    15
}

fn default_storage_path() -> PathBuf {
    Settings::parley_home().join("store")
}

impl TitleConfig {
    /// Model to use for title generation.
    pub fn effective_model<'a>(&'a self, defaults: &'a DefaultsConfig) -> &'a str {
        self.model.as_deref().unwrap_or(&defaults.model)
    }
}
