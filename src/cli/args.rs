// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Defines all command-line arguments and subcommands for Parley.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parley - streaming chat sessions in your terminal
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version, about = "Streaming chat sessions in your terminal")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start interactive chat session (default when no command given)
    Chat(ChatArgs),

    /// Stored chat management
    History(HistoryArgs),
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ChatArgs {
    /// Initial prompt (optional)
    pub prompt: Option<String>,

    /// Open an existing chat by id
    #[arg(long)]
    pub chat: Option<String>,

    /// Model to use
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt for a new chat's first message
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Use the in-process echo provider instead of the network
    #[arg(long)]
    pub offline: bool,

    /// Do not offer the built-in tools to the model
    #[arg(long)]
    pub no_tools: bool,
}

/// Arguments for history management
#[derive(clap::Args, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub command: HistoryCommands,
}

/// History subcommands
#[derive(Subcommand, Debug)]
pub enum HistoryCommands {
    /// List recent chats
    List {
        /// Maximum number of chats to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Print a stored chat
    Show {
        /// Chat ID
        chat_id: String,
    },

    /// Delete a chat
    Delete {
        /// Chat ID
        chat_id: String,
    },

    /// Delete every stored chat
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}
