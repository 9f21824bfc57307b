// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Write};
use std::sync::Arc;

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use parley::chat::input_parser::ChatCommand;
use parley::chat::{ChatWorkspace, SessionEngine, TurnOutcome};
use parley::cli::{HistoryArgs, HistoryCommands};
use parley::config::Settings;
use parley::error::Result;
use parley::history::ChatPersistence;
use parley::llm::message::Message;

use super::chat_runtime::open_store;
use super::chat_ui::{print_error, print_notice, print_transcript};

/// What the chat loop should do after a command
pub(super) enum CommandFlow {
    Continue,
    Quit,
    /// Regenerate the assistant message at this visible index
    Regenerate(Arc<SessionEngine>, usize),
}

pub(super) fn print_welcome(provider: &str, engine: &SessionEngine) -> Result<()> {
    let session = engine.session();
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    println!("parley v{}", env!("CARGO_PKG_VERSION"));
    stdout.execute(ResetColor)?;
    println!("Provider: {provider}");
    println!("Model: {}", session.model);
    println!("Chat: {} ({})", session.title, session.id);
    println!("Type /help for commands, Ctrl+C to stop a response.\n");
    Ok(())
}

pub(super) fn print_help() -> Result<()> {
    println!("\nCommands:");
    println!("  /new                 - Start a new chat");
    println!("  /list                - List stored chats");
    println!("  /switch <id>         - Switch to another chat");
    println!("  /rename <title>      - Rename the current chat");
    println!("  /delete <id>         - Delete a chat");
    println!("  /fork <index>        - Copy the chat up to a message into a new chat");
    println!("  /edit <index> <text> - Rewrite a message and drop everything after it");
    println!("  /regenerate [index]  - Regenerate an assistant message (default: last)");
    println!("  /model <name>        - Use another model for this chat");
    println!("  /help                - Show this help message");
    println!("  /quit                - Exit parley");
    println!("\nMessage indices are shown by /switch and /fork.");
    println!("\nTip: Press Ctrl+C to stop a response without exiting.");
    println!();
    Ok(())
}

/// Read user input
pub(super) fn read_user_input() -> Result<String> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Green))?;
    print!("you: ");
    stdout.execute(ResetColor)?;
    stdout.flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Print how a turn ended; errors were already shown by the observer.
pub(super) fn report_outcome(outcome: Result<TurnOutcome>) {
    match outcome {
        Ok(TurnOutcome::Completed { .. }) => {}
        Ok(TurnOutcome::Aborted) => print_notice("\n(response stopped)"),
        Ok(TurnOutcome::Busy) => print_notice("A response is still in progress."),
        Err(e) if matches!(e, parley::ParleyError::InvalidInput(_)) => {
            print_error(&e.to_string())
        }
        Err(_) => {}
    }
}

fn last_assistant_index(engine: &SessionEngine) -> Option<usize> {
    let session = engine.session();
    session
        .visible_messages()
        .enumerate()
        .filter(|(_, m)| matches!(m, Message::Assistant { .. }) && m.tool_calls().is_empty())
        .map(|(i, _)| i)
        .last()
}

/// Run a slash command against the workspace
pub(super) async fn handle_command(
    workspace: &mut ChatWorkspace,
    command: ChatCommand,
) -> Result<CommandFlow> {
    match command {
        ChatCommand::Quit => return Ok(CommandFlow::Quit),
        ChatCommand::Help => print_help()?,
        ChatCommand::New => {
            let engine = workspace.new_chat().await?;
            print_notice(&format!("Started chat {}", engine.chat_id()));
        }
        ChatCommand::List => {
            let chats = workspace.list_chats().await?;
            if chats.is_empty() {
                println!("\nNo stored chats.\n");
            } else {
                let active = workspace.active_id();
                println!();
                for entry in chats {
                    let marker = if active.as_deref() == Some(entry.id.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!(
                        "{marker} {} | {} | {}",
                        entry.id,
                        entry.updated_at.format("%Y-%m-%d %H:%M"),
                        entry.title
                    );
                }
                println!();
            }
        }
        ChatCommand::Switch(chat_id) => {
            let engine = workspace.open(&chat_id).await?;
            print_transcript(&engine.session())?;
            if !workspace.input().is_empty() {
                print_notice(&format!("Draft: {}", workspace.input()));
            }
        }
        ChatCommand::Rename(title) => {
            if let Some(chat_id) = workspace.active_id() {
                workspace.rename_chat(&chat_id, &title).await?;
                print_notice(&format!("Renamed to {}", title.trim()));
            }
        }
        ChatCommand::Delete(chat_id) => {
            workspace.delete_chat(&chat_id).await?;
            print_notice(&format!("Deleted chat {chat_id}"));
            if workspace.active().is_none() {
                let engine = workspace.new_chat().await?;
                print_notice(&format!("Started chat {}", engine.chat_id()));
            }
        }
        ChatCommand::Fork(index) => {
            let engine = workspace.fork(index).await?;
            print_transcript(&engine.session())?;
        }
        ChatCommand::Edit { index, text } => {
            if let Some(engine) = workspace.active() {
                engine.edit_message(index, text).await?;
                print_transcript(&engine.session())?;
            }
        }
        ChatCommand::Regenerate(index) => {
            if let Some(engine) = workspace.active() {
                match index.or_else(|| last_assistant_index(&engine)) {
                    Some(index) => return Ok(CommandFlow::Regenerate(engine, index)),
                    None => print_notice("Nothing to regenerate."),
                }
            }
        }
        ChatCommand::Model(model) => {
            if let Some(engine) = workspace.active() {
                engine.set_model(model.clone());
                print_notice(&format!("Model set to {model}"));
            }
        }
        ChatCommand::Invalid(usage) => print_notice(&format!("Usage: {usage}")),
        ChatCommand::Unknown(name) => {
            print_notice(&format!("Unknown command /{name}. Type /help for commands."))
        }
    }
    Ok(CommandFlow::Continue)
}

pub(super) async fn run_history_command(args: HistoryArgs, settings: &Settings) -> Result<()> {
    let store = open_store(settings)?;

    match args.command {
        HistoryCommands::List { limit } => {
            let chats = store.fetch_or_create_history_list().await?;
            if chats.is_empty() {
                println!("\nNo chats in history.\n");
                return Ok(());
            }

            println!("\nRecent chats:\n");
            for entry in chats.into_iter().take(limit) {
                println!(
                    "  {} | {} | {}",
                    entry.id,
                    entry.updated_at.format("%Y-%m-%d %H:%M"),
                    entry.title
                );
            }
            println!();
        }

        HistoryCommands::Show { chat_id } => {
            let chat = store.get_chat(&chat_id).await?;
            print_transcript(&chat)?;
        }

        HistoryCommands::Delete { chat_id } => {
            store.delete_chat(&chat_id).await?;
            println!("Deleted chat {chat_id}");
        }

        HistoryCommands::Clear { force } => {
            if !force {
                print!("Delete every stored chat? [y/N] ");
                io::stdout().flush()?;
                let mut answer = String::new();
                io::stdin().read_line(&mut answer)?;
                if !answer.trim().eq_ignore_ascii_case("y") {
                    println!("Cancelled.");
                    return Ok(());
                }
            }
            store.clear_history().await?;
            println!("History cleared.");
        }
    }

    Ok(())
}
