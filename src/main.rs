// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Parley - streaming chat sessions in your terminal
//!
//! Entry point for the Parley CLI application.

use std::future::Future;
use std::sync::Arc;

use clap::Parser;

use parley::chat::input_parser::{is_exit_command, parse_command};
use parley::chat::{SessionEngine, SubmitRequest, TurnOutcome};
use parley::cli::{ChatArgs, Cli, Commands};
use parley::config::Settings;
use parley::error::Result;

#[path = "main/chat_runtime.rs"]
mod chat_runtime;
#[path = "main/chat_ui.rs"]
mod chat_ui;
#[path = "main/cli_commands.rs"]
mod cli_commands;

use chat_runtime::{initialize_chat_runtime, ChatRuntimeSetup};
use chat_ui::{print_error, TerminalObserver};
use cli_commands::{
    handle_command, print_welcome, read_user_input, report_outcome, run_history_command,
    CommandFlow,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on engine diagnostics; `RUST_LOG` still takes precedence.
    if cli.verbose > 0 {
        for directive in [
            "parley.chat.engine=debug",
            "parley.chat.stream=debug",
            "parley.chat.title=debug",
        ] {
            if let Ok(parsed) = directive.parse() {
                env_filter = env_filter.add_directive(parsed);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    settings.ensure_directories()?;

    match cli.command {
        None => run_chat(ChatArgs::default(), settings).await?,
        Some(Commands::Chat(args)) => run_chat(args, settings).await?,
        Some(Commands::History(args)) => run_history_command(args, &settings).await?,
    }

    Ok(())
}

/// Await a turn, turning Ctrl+C into an abort of the active stream.
async fn await_turn(
    engine: &SessionEngine,
    turn: impl Future<Output = Result<TurnOutcome>>,
) -> Result<TurnOutcome> {
    tokio::pin!(turn);
    loop {
        tokio::select! {
            outcome = &mut turn => return outcome,
            _ = tokio::signal::ctrl_c() => {
                if engine.abort() {
                    tracing::debug!(target: "parley.chat.engine", "Abort requested from terminal");
                }
            }
        }
    }
}

async fn send_message(
    setup: &mut ChatRuntimeSetup,
    args: &ChatArgs,
    text: String,
) -> Result<()> {
    let Some(engine) = setup.workspace.active() else {
        return Ok(());
    };
    let mut request = SubmitRequest::text(text);
    if let Some(prompt) = &args.system_prompt {
        request = request.with_system_prompt(prompt.clone());
    }
    let outcome = await_turn(&engine, setup.workspace.submit(request)).await;
    report_outcome(outcome);
    Ok(())
}

async fn run_chat(args: ChatArgs, settings: Settings) -> Result<()> {
    let mut setup = initialize_chat_runtime(&args, settings, Arc::new(TerminalObserver)).await?;

    if let Some(engine) = setup.workspace.active() {
        print_welcome(&setup.provider_name, &engine)?;
    }

    if let Some(prompt) = args.prompt.clone() {
        send_message(&mut setup, &args, prompt).await?;
    }

    loop {
        let input = read_user_input()?;
        if input.is_empty() {
            continue;
        }
        if is_exit_command(&input) {
            break;
        }

        if let Some(command) = parse_command(&input) {
            match handle_command(&mut setup.workspace, command).await {
                Ok(CommandFlow::Continue) => {}
                Ok(CommandFlow::Quit) => break,
                Ok(CommandFlow::Regenerate(engine, index)) => {
                    let outcome = await_turn(&engine, engine.regenerate(index)).await;
                    report_outcome(outcome);
                }
                Err(e) => print_error(&e.to_string()),
            }
            continue;
        }

        send_message(&mut setup, &args, input).await?;
    }

    if let Some(engine) = setup.workspace.active() {
        engine.abort();
    }
    Ok(())
}
