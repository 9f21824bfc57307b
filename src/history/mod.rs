// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Chat history persistence for Parley
//!
//! Stores chat snapshots and the history index on a pluggable key-value
//! backend.

pub mod file;
pub mod memory;
pub mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{ChatPersistence, ChatStore, HistoryEntry, KeyValueStore, StoredItem};
