// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Input parsing for chat commands
//!
//! Pure functions that classify a line typed in the interactive chat.
//! Anything that does not start with `/` is a message.

/// A slash command typed in the interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    Quit,
    New,
    List,
    Switch(String),
    Rename(String),
    Delete(String),
    Fork(usize),
    Edit { index: usize, text: String },
    Regenerate(Option<usize>),
    Model(String),
    /// Known command with bad arguments; carries the usage line
    Invalid(&'static str),
    Unknown(String),
}

/// Check if user input is an exit command.
pub fn is_exit_command(input: &str) -> bool {
    let trimmed = input.trim().to_lowercase();
    matches!(trimmed.as_str(), "exit" | "quit" | "/exit" | "/quit")
}

fn parse_index(arg: &str) -> Option<usize> {
    arg.trim().parse().ok()
}

/// Parse a slash command. Returns `None` for plain messages.
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix('/')?;
    if is_exit_command(trimmed) {
        return Some(ChatCommand::Quit);
    }

    let (name, rest) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (body, ""),
    };

    let command = match name.to_lowercase().as_str() {
        "help" => ChatCommand::Help,
        "new" => ChatCommand::New,
        "list" | "chats" => ChatCommand::List,
        "switch" | "open" if !rest.is_empty() => ChatCommand::Switch(rest.to_string()),
        "switch" | "open" => ChatCommand::Invalid("/switch <chat-id>"),
        "rename" if !rest.is_empty() => ChatCommand::Rename(rest.to_string()),
        "rename" => ChatCommand::Invalid("/rename <title>"),
        "delete" if !rest.is_empty() => ChatCommand::Delete(rest.to_string()),
        "delete" => ChatCommand::Invalid("/delete <chat-id>"),
        "fork" => match parse_index(rest) {
            Some(index) => ChatCommand::Fork(index),
            None => ChatCommand::Invalid("/fork <message-index>"),
        },
        "edit" => {
            let (index, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            match (parse_index(index), text.trim()) {
                (Some(index), text) if !text.is_empty() => ChatCommand::Edit {
                    index,
                    text: text.to_string(),
                },
                _ => ChatCommand::Invalid("/edit <message-index> <new text>"),
            }
        }
        "regenerate" | "retry" if rest.is_empty() => ChatCommand::Regenerate(None),
        "regenerate" | "retry" => match parse_index(rest) {
            Some(index) => ChatCommand::Regenerate(Some(index)),
            None => ChatCommand::Invalid("/regenerate [message-index]"),
        },
        "model" if !rest.is_empty() => ChatCommand::Model(rest.to_string()),
        "model" => ChatCommand::Invalid("/model <name>"),
        other => ChatCommand::Unknown(other.to_string()),
    };
    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message_is_not_command() {
        assert_eq!(parse_command("hello there"), None);
        assert_eq!(parse_command("  what is 2/3?"), None);
    }

    #[test]
    fn test_exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command(" /QUIT "));
        assert!(!is_exit_command("quitting"));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(parse_command("/new"), Some(ChatCommand::New));
        assert_eq!(parse_command("/list"), Some(ChatCommand::List));
        assert_eq!(parse_command("/HELP"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/regenerate"), Some(ChatCommand::Regenerate(None)));
    }

    #[test]
    fn test_commands_with_arguments() {
        assert_eq!(
            parse_command("/switch abc-123"),
            Some(ChatCommand::Switch("abc-123".to_string()))
        );
        assert_eq!(
            parse_command("/rename  Weekend plans "),
            Some(ChatCommand::Rename("Weekend plans".to_string()))
        );
        assert_eq!(parse_command("/fork 3"), Some(ChatCommand::Fork(3)));
        assert_eq!(
            parse_command("/edit 0 new wording here"),
            Some(ChatCommand::Edit {
                index: 0,
                text: "new wording here".to_string()
            })
        );
        assert_eq!(parse_command("/retry 5"), Some(ChatCommand::Regenerate(Some(5))));
        assert_eq!(
            parse_command("/model gpt-4o-mini"),
            Some(ChatCommand::Model("gpt-4o-mini".to_string()))
        );
    }

    #[test]
    fn test_missing_arguments_are_invalid() {
        assert!(matches!(parse_command("/switch"), Some(ChatCommand::Invalid(_))));
        assert!(matches!(parse_command("/fork x"), Some(ChatCommand::Invalid(_))));
        assert!(matches!(parse_command("/edit 2"), Some(ChatCommand::Invalid(_))));
        assert!(matches!(parse_command("/edit two words"), Some(ChatCommand::Invalid(_))));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_command("/teleport now"),
            Some(ChatCommand::Unknown("teleport".to_string()))
        );
    }
}
