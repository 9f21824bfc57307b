// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io::{self, Write};

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use parley::chat::{ChatSession, Phase, SessionObserver};
use parley::error::{ParleyError, Result};
use parley::llm::message::Message;

/// Renders engine progress to the terminal.
#[derive(Debug, Default)]
pub(super) struct TerminalObserver;

fn colored(color: Color, text: &str) {
    let mut stdout = io::stdout();
    let _ = stdout.execute(SetForegroundColor(color));
    print!("{text}");
    let _ = stdout.execute(ResetColor);
    let _ = stdout.flush();
}

impl SessionObserver for TerminalObserver {
    fn on_first_chunk(&self, _chat_id: &str) {
        colored(Color::Cyan, "\nparley: ");
    }

    fn on_text_delta(&self, _chat_id: &str, delta: &str) {
        print!("{delta}");
        let _ = io::stdout().flush();
    }

    fn on_phase_change(&self, _chat_id: &str, phase: Phase) {
        if phase == Phase::Persisting {
            println!();
        }
    }

    fn on_tool_invocation(&self, _chat_id: &str, tool_name: &str, args: &serde_json::Value) {
        colored(Color::DarkGrey, "\n  ╭─ ");
        colored(Color::Magenta, tool_name);
        colored(Color::DarkGrey, &format!(" {args}\n"));
    }

    fn on_tool_result(&self, _chat_id: &str, _tool_call_id: &str, result: &serde_json::Value) {
        let color = if result.get("error").is_some() {
            Color::Red
        } else {
            Color::Green
        };
        colored(Color::DarkGrey, "  ╰─ ");
        colored(color, &format!("{result}\n"));
    }

    fn on_title(&self, _chat_id: &str, title: &str) {
        tracing::debug!(target: "parley.chat.title", title, "Title updated");
    }

    fn on_turn_error(&self, _chat_id: &str, error: &ParleyError) {
        print_error(&error.to_string());
    }

    fn on_persist_failed(&self, _chat_id: &str, error: &ParleyError) {
        print_error(&format!("Could not save this chat: {error}"));
    }
}

pub(super) fn print_error(message: &str) {
    colored(Color::Red, &format!("\nError: {message}\n"));
}

pub(super) fn print_notice(message: &str) {
    colored(Color::Yellow, &format!("{message}\n"));
}

/// Print the visible transcript with the indices message commands expect.
pub(super) fn print_transcript(session: &ChatSession) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    println!("\n{} ({})", session.title, session.id);
    stdout.execute(ResetColor)?;

    for (index, message) in session.visible_messages().enumerate() {
        let (label, color) = match message {
            Message::User { .. } => ("you", Color::Green),
            Message::Assistant { .. } => ("parley", Color::Cyan),
            Message::Tool { .. } => ("tool", Color::Magenta),
            Message::System { .. } => continue,
        };
        stdout.execute(SetForegroundColor(Color::DarkGrey))?;
        print!("[{index}] ");
        stdout.execute(SetForegroundColor(color))?;
        print!("{label}: ");
        stdout.execute(ResetColor)?;

        let calls = message.tool_calls();
        if calls.is_empty() {
            println!("{}", message.text());
        } else {
            let names: Vec<&str> = calls.iter().map(|c| c.function.name.as_str()).collect();
            println!("(calling {})", names.join(", "));
        }
    }
    println!();
    Ok(())
}
