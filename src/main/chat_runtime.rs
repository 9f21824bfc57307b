// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::Arc;

use parley::billing::CachedBillingStatus;
use parley::chat::{ChatWorkspace, SessionObserver};
use parley::cli::ChatArgs;
use parley::config::Settings;
use parley::error::{ParleyError, Result};
use parley::history::{ChatStore, FileStore};
use parley::llm::mock_provider::MockProvider;
use parley::llm::provider::CompletionProvider;
use parley::llm::providers::OpenAiProvider;
use parley::tools::ToolRegistry;

pub(super) struct ChatRuntimeSetup {
    pub(super) workspace: ChatWorkspace,
    pub(super) provider_name: String,
}

/// Open the chat store configured in `settings`.
pub(super) fn open_store(settings: &Settings) -> Result<Arc<ChatStore>> {
    let kv = FileStore::open(&settings.storage.path)?;
    Ok(Arc::new(
        ChatStore::new(Arc::new(kv), settings.defaults.placeholder_title.clone())
            .with_default_model(settings.defaults.model.clone()),
    ))
}

/// Pick the completion provider for this run.
pub(super) fn build_provider(
    settings: &Settings,
    offline: bool,
) -> Result<Arc<dyn CompletionProvider>> {
    if offline {
        return Ok(Arc::new(MockProvider::echo()));
    }

    let api_key = settings.get_api_key().ok_or_else(|| {
        ParleyError::Config(format!(
            "No API key found. Set {} or provider.api_key in {}, or run with --offline.",
            settings.provider.api_key_env,
            Settings::default_path().display()
        ))
    })?;
    Ok(Arc::new(OpenAiProvider::with_base_url(
        api_key,
        settings.provider.base_url.clone(),
    )))
}

/// Build the workspace and open the requested (or a new) chat.
pub(super) async fn initialize_chat_runtime(
    args: &ChatArgs,
    mut settings: Settings,
    observer: Arc<dyn SessionObserver>,
) -> Result<ChatRuntimeSetup> {
    if let Some(model) = &args.model {
        settings.defaults.model = model.clone();
    }
    if args.no_tools {
        settings.defaults.tools_enabled = false;
    }
    settings.validate()?;

    let provider = build_provider(&settings, args.offline)?;
    let provider_name = provider.name().to_string();
    let store = open_store(&settings)?;
    let billing = Arc::new(CachedBillingStatus::from_config(&settings.billing));
    let settings = Arc::new(settings);

    let mut workspace = ChatWorkspace::new(provider, store, settings)
        .with_tools(Arc::new(ToolRegistry::with_builtins()))
        .with_billing(billing)
        .with_observer(observer);

    let engine = match &args.chat {
        Some(chat_id) => workspace.open(chat_id).await?,
        None => workspace.new_chat().await?,
    };
    if let Some(model) = &args.model {
        engine.set_model(model.clone());
    }

    tracing::debug!(
        target: "parley.chat.engine",
        provider = %provider_name,
        chat_id = %engine.chat_id(),
        "Chat runtime ready"
    );
    Ok(ChatRuntimeSetup {
        workspace,
        provider_name,
    })
}
