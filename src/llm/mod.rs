// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Completion provider abstraction layer
//!
//! Provides a unified interface for streaming chat completions.

pub mod message;
pub mod mock_provider;
pub mod provider;
pub mod providers;
pub mod stream;

pub use message::*;
pub use provider::*;
pub use stream::CompletionStream;
