// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Parley - chat session engine for streaming LLM conversations.
//!
//! This crate exposes the shared runtime used by the `parley` CLI
//! (`src/main.rs`) and by any other front end that wants to drive a
//! conversation.
//!
//! Architecture highlights:
//! - `chat`: session state machine, stream consumer, tool-call coordinator,
//!   title generator, drafts and session switching
//! - `llm`: provider abstraction, streaming handle, OpenAI-compatible and mock providers
//! - `history`: key-value persistence collaborator and the chat store on top of it
//! - `tools`: tool executor trait, registry and built-in arithmetic tools
//! - `billing`: plan-tier signal read at title time
//! - `config`: JSON settings under `~/.parley`

pub mod billing;
pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod tools;

pub use error::{ParleyError, Result};
