// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat session engine
//!
//! This module turns a user submission into a cancellable streamed turn,
//! runs requested tools, titles new conversations and keeps the optimistic
//! snapshot reconciled with the persisted one.

pub mod draft;
pub mod engine;
pub mod input_parser;
pub mod observer;
pub mod state;
pub mod streaming;
pub mod title;
pub mod tool_calls;
pub mod workspace;

pub use draft::DraftManager;
pub use engine::{SessionEngine, SubmitRequest, TurnOutcome};
pub use observer::{NoopObserver, SessionObserver};
pub use state::{reconcile, ChatSession, MergeOutcome, Phase, SnapshotCell};
pub use title::{TitleGenerator, TitlePlan};
pub use workspace::ChatWorkspace;
