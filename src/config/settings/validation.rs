// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{ParleyError, Result};

use super::Settings;

impl Settings {
    /// Get the provider API key, checking env var first.
    pub fn get_api_key(&self) -> Option<String> {
        // Priority: env var > config file.
        std::env::var(&self.provider.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.provider.api_key.clone())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.defaults.model.trim().is_empty() {
            return Err(ParleyError::Config(
                "defaults.model must not be empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.defaults.temperature) {
            return Err(ParleyError::Config(format!(
                "defaults.temperature must be within 0.0..=2.0, got {}",
                self.defaults.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.defaults.top_p) || self.defaults.top_p == 0.0 {
            return Err(ParleyError::Config(format!(
                "defaults.top_p must be within (0.0, 1.0], got {}",
                self.defaults.top_p
            )));
        }
        if !(0.0..=2.0).contains(&self.title.temperature) {
            return Err(ParleyError::Config(format!(
                "title.temperature must be within 0.0..=2.0, got {}",
                self.title.temperature
            )));
        }
        if self.title.free_max_chars == 0
            || self.title.prompt_max_chars == 0
            || self.title.max_tokens == 0
        {
            return Err(ParleyError::Config(
                "title limits must be greater than zero".to_string(),
            ));
        }
        if self.defaults.placeholder_title.trim().is_empty() {
            return Err(ParleyError::Config(
                "defaults.placeholder_title must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
