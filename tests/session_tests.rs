// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;

use parley::billing::PlanTier;
use parley::chat::title::truncate_title;
use parley::chat::tool_calls::FOLLOW_UP_SYSTEM_PROMPT;
use parley::chat::{
    ChatSession, ChatWorkspace, DraftManager, Phase, SessionEngine, SubmitRequest, TitleGenerator,
    TitlePlan, TurnOutcome,
};
use parley::config::Settings;
use parley::error::{ParleyError, Result};
use parley::history::{ChatPersistence, ChatStore, KeyValueStore, MemoryStore};
use parley::llm::message::{Message, ToolCall};
use parley::llm::mock_provider::{MockProvider, MockResponse};
use parley::llm::provider::{ToolChoice, ToolDefinition};
use parley::tools::{SchemaBuilder, ToolExecutor, ToolRegistry};

/// Persistence double that records every snapshot it is asked to store
#[derive(Default)]
struct RecordingPersistence {
    persisted: Mutex<Vec<ChatSession>>,
}

impl RecordingPersistence {
    fn count(&self) -> usize {
        self.persisted.lock().unwrap().len()
    }

    fn last(&self) -> Option<ChatSession> {
        self.persisted.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatPersistence for RecordingPersistence {
    async fn persist_chat(&self, chat: &ChatSession) -> Result<()> {
        self.persisted.lock().unwrap().push(chat.clone());
        Ok(())
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatSession> {
        self.persisted
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|chat| chat.id == chat_id)
            .cloned()
            .ok_or_else(|| ParleyError::Session(format!("Chat not found: {chat_id}")))
    }
}

fn engine(
    provider: &MockProvider,
    tier: PlanTier,
    settings: Settings,
) -> (Arc<SessionEngine>, Arc<RecordingPersistence>) {
    let persistence = Arc::new(RecordingPersistence::default());
    let engine = SessionEngine::new(
        ChatSession::with_id("chat-1", "New Chat", ""),
        Arc::new(provider.clone()),
        persistence.clone(),
        Arc::new(settings),
    )
    .with_tools(Arc::new(ToolRegistry::with_builtins()))
    .with_billing(Arc::new(tier));
    (Arc::new(engine), persistence)
}

fn tool_results(session: &ChatSession) -> Vec<(String, serde_json::Value)> {
    session
        .messages
        .iter()
        .filter_map(|message| match message {
            Message::Tool {
                tool_call_id,
                content,
            } => Some((
                tool_call_id.clone(),
                serde_json::from_str(content).unwrap(),
            )),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_free_tier_title_is_truncated_first_message() {
    let provider = MockProvider::new().with_response("Hi! How can I help?");
    let (engine, persistence) = engine(&provider, PlanTier::Free, Settings::default());

    let outcome = engine.submit(SubmitRequest::text("Hello")).await.unwrap();

    assert_eq!(outcome, TurnOutcome::Completed { persisted: true });
    assert_eq!(engine.session().title, "Hello");
    // Only the main completion went out
    assert_eq!(provider.call_count(), 1);
    assert_eq!(persistence.last().unwrap().title, "Hello");
}

#[tokio::test]
async fn test_paid_tier_title_uses_first_500_chars_and_lands_mid_stream() {
    let mut settings = Settings::default();
    settings.title.model = Some("title-model".to_string());
    let provider = MockProvider::new()
        .with_mock_responses(vec![MockResponse::text(
            "Here is a fairly long answer that keeps streaming for a while.",
        )
        .with_delay(Duration::from_millis(30))])
        .with_model_response("title-model", MockResponse::text("\"Letters A Only\""));
    let (engine, persistence) = engine(&provider, PlanTier::Paid, settings);

    let first_message = format!("{}{}", "a".repeat(500), "b".repeat(100));
    let mut snapshots = engine.subscribe();
    let turn = tokio::spawn({
        let engine = engine.clone();
        async move { engine.submit(SubmitRequest::text(first_message)).await }
    });

    let phase_when_titled = {
        let titled = snapshots
            .wait_for(|session| session.title != "New Chat")
            .await
            .unwrap();
        assert_eq!(titled.title, "Letters A Only");
        titled.phase
    };
    assert_eq!(phase_when_titled, Phase::Streaming);

    let outcome = turn.await.unwrap().unwrap();
    assert_eq!(outcome, TurnOutcome::Completed { persisted: true });

    let title_requests = provider.requests_for_model("title-model");
    assert_eq!(title_requests.len(), 1);
    assert_eq!(title_requests[0].max_tokens, Some(15));
    let prompt = title_requests[0].messages.last().unwrap().text();
    assert!(prompt.contains(&"a".repeat(500)));
    assert!(!prompt.contains('b'));

    assert_eq!(persistence.count(), 1);
    assert_eq!(persistence.last().unwrap().title, "Letters A Only");
}

#[tokio::test]
async fn test_paid_tier_title_falls_back_to_truncation_on_error() {
    let mut settings = Settings::default();
    settings.title.model = Some("title-model".to_string());
    let provider = MockProvider::new()
        .with_response("Sure.")
        .with_model_response("title-model", MockResponse::error("title service down"));
    let (engine, _persistence) = engine(&provider, PlanTier::Paid, settings);

    engine
        .submit(SubmitRequest::text("Plan a weekend trip to the mountains"))
        .await
        .unwrap();

    assert_eq!(engine.session().title, "Plan a weekend trip to the mountains");
}

#[tokio::test]
async fn test_two_tool_calls_round_trip() {
    let provider = MockProvider::new().with_mock_responses(vec![
        MockResponse::tool_calls(vec![
            ToolCall::new("call_add", "add", r#"{"a": 2, "b": 3}"#),
            ToolCall::new("call_mul", "multiply", r#"{"a": 4, "b": 5}"#),
        ]),
        MockResponse::text("2 + 3 is 5 and 4 times 5 is 20."),
    ]);
    let (engine, persistence) = engine(&provider, PlanTier::Free, Settings::default());

    let outcome = engine
        .submit(SubmitRequest::text("What is 2+3 and 4*5?"))
        .await
        .unwrap();
    assert_eq!(outcome, TurnOutcome::Completed { persisted: true });

    let session = engine.session();
    let requested: Vec<String> = session.messages[1]
        .tool_calls()
        .iter()
        .map(|call| call.id.clone())
        .collect();
    assert_eq!(requested, vec!["call_add", "call_mul"]);

    let results = tool_results(&session);
    assert_eq!(results.len(), 2);
    for id in &requested {
        assert_eq!(results.iter().filter(|(call_id, _)| call_id == id).count(), 1);
    }
    assert_eq!(results[0].1, serde_json::json!({"result": 5}));
    assert_eq!(results[1].1, serde_json::json!({"result": 20}));
    assert_eq!(
        session.messages.last(),
        Some(&Message::assistant("2 + 3 is 5 and 4 times 5 is 20."))
    );

    let follow_up = provider.last_request().unwrap();
    assert_eq!(follow_up.tool_choice, ToolChoice::None);
    assert_eq!(follow_up.messages[0], Message::system(FOLLOW_UP_SYSTEM_PROMPT));

    assert_eq!(persistence.count(), 1);
    assert_eq!(persistence.last().unwrap().messages, session.messages);
}

#[tokio::test]
async fn test_unknown_tool_yields_error_payload_and_follow_up_persists() {
    let provider = MockProvider::new().with_mock_responses(vec![
        MockResponse::tool_calls(vec![ToolCall::new("call_1", "divide", r#"{"a": 1, "b": 0}"#)]),
        MockResponse::text("I can't divide, sorry."),
    ]);
    let (engine, persistence) = engine(&provider, PlanTier::Free, Settings::default());

    let outcome = engine.submit(SubmitRequest::text("1/0?")).await.unwrap();
    assert_eq!(outcome, TurnOutcome::Completed { persisted: true });

    let session = engine.session();
    assert_eq!(
        tool_results(&session),
        vec![(
            "call_1".to_string(),
            serde_json::json!({"error": "Unknown tool: divide"})
        )]
    );
    assert_eq!(
        session.messages.last(),
        Some(&Message::assistant("I can't divide, sorry."))
    );
    assert_eq!(persistence.count(), 1);
}

/// Tool that outlasts any reasonable abort delay
struct SlowTool;

#[async_trait]
impl ToolExecutor for SlowTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "slow".to_string(),
            description: "Sleeps before answering".to_string(),
            parameters: SchemaBuilder::new().build(),
        }
    }

    async fn execute(&self, _args: serde_json::Value) -> Result<serde_json::Value> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(serde_json::json!({"result": "slow"}))
    }
}

#[tokio::test]
async fn test_abort_during_tools_keeps_transcript_paired() {
    let provider = MockProvider::new().with_mock_responses(vec![
        MockResponse::tool_calls(vec![
            ToolCall::new("s1", "slow", "{}"),
            ToolCall::new("a1", "add", r#"{"a": 1, "b": 2}"#),
        ]),
        MockResponse::text("next answer"),
    ]);
    let mut tools = ToolRegistry::with_builtins();
    tools.register(Arc::new(SlowTool));
    let persistence = Arc::new(RecordingPersistence::default());
    let engine = Arc::new(
        SessionEngine::new(
            ChatSession::with_id("chat-1", "New Chat", ""),
            Arc::new(provider.clone()),
            persistence.clone(),
            Arc::new(Settings::default()),
        )
        .with_tools(Arc::new(tools))
        .with_billing(Arc::new(PlanTier::Free)),
    );

    let turn = tokio::spawn({
        let engine = engine.clone();
        async move { engine.submit(SubmitRequest::text("go")).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.abort());
    assert_eq!(turn.await.unwrap().unwrap(), TurnOutcome::Aborted);
    assert_eq!(persistence.count(), 0);

    let outcome = engine.submit(SubmitRequest::text("again")).await.unwrap();
    assert_eq!(outcome, TurnOutcome::Completed { persisted: true });

    let stored = persistence.last().unwrap();
    let requested: Vec<String> = stored
        .messages
        .iter()
        .flat_map(|m| m.tool_calls().iter().map(|call| call.id.clone()))
        .collect();
    let answered = tool_results(&stored);
    assert_eq!(requested, vec!["s1", "a1"]);
    assert_eq!(answered.len(), requested.len());
    for (id, payload) in &answered {
        assert!(requested.contains(id));
        assert_eq!(payload, &serde_json::json!({"error": "Cancelled"}));
    }
    assert_eq!(
        stored.messages.last(),
        Some(&Message::assistant("next answer"))
    );
}

#[tokio::test]
async fn test_overlapping_submits_persist_one_turn() {
    let provider = MockProvider::new().with_mock_responses(vec![
        MockResponse::text("Only once").with_delay(Duration::from_millis(20))
    ]);
    let (engine, persistence) = engine(&provider, PlanTier::Free, Settings::default());

    let (first, second) = tokio::join!(
        engine.submit(SubmitRequest::text("first")),
        engine.submit(SubmitRequest::text("second")),
    );

    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|outcome| matches!(outcome, TurnOutcome::Busy));
    assert_eq!(
        outcomes,
        vec![TurnOutcome::Completed { persisted: true }, TurnOutcome::Busy]
    );
    assert_eq!(persistence.count(), 1);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(engine.session().user_message_count(), 1);
}

#[tokio::test]
async fn test_abort_mid_stream_never_persists() {
    let provider = MockProvider::new()
        .with_mock_responses(vec![MockResponse::text("partial answer").hanging()]);
    let (engine, persistence) = engine(&provider, PlanTier::Free, Settings::default());

    let mut stream = engine.subscribe_stream();
    let turn = tokio::spawn({
        let engine = engine.clone();
        async move { engine.submit(SubmitRequest::text("tell me a story")).await }
    });

    stream
        .wait_for(|text| text.as_deref() == Some("partial answer"))
        .await
        .unwrap();
    assert!(engine.abort());

    let outcome = turn.await.unwrap().unwrap();
    assert_eq!(outcome, TurnOutcome::Aborted);
    assert_eq!(persistence.count(), 0);
    assert_eq!(engine.phase(), Phase::Idle);
    assert!(!engine.is_busy());
    assert!(engine.subscribe_stream().borrow().is_none());
    assert!(engine.error().is_none());
}

#[tokio::test]
async fn test_switching_chats_mid_stream_aborts_without_persisting() {
    let kv = Arc::new(MemoryStore::new());
    let store = Arc::new(ChatStore::new(kv.clone(), "New Chat"));
    let provider = MockProvider::new()
        .with_mock_responses(vec![MockResponse::text("streaming forever").hanging()]);
    let mut workspace = ChatWorkspace::new(
        Arc::new(provider),
        store.clone(),
        Arc::new(Settings::default()),
    )
    .with_billing(Arc::new(PlanTier::Free));

    let streaming = workspace.new_chat().await.unwrap();
    let streaming_id = streaming.chat_id();
    let mut accumulator = streaming.subscribe_stream();
    let turn = tokio::spawn({
        let engine = streaming.clone();
        async move { engine.submit(SubmitRequest::text("hello")).await }
    });
    accumulator
        .wait_for(|text| text.as_deref() == Some("streaming forever"))
        .await
        .unwrap();

    let other = workspace.new_chat().await.unwrap();
    assert_ne!(other.chat_id(), streaming_id);

    assert_eq!(turn.await.unwrap().unwrap(), TurnOutcome::Aborted);
    assert_eq!(streaming.phase(), Phase::Idle);

    let stored = store.get_chat(&streaming_id).await.unwrap();
    assert!(stored.messages.is_empty());
    assert!(kv.get(&format!("chat_{streaming_id}")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_drafts_survive_workspace_switches() {
    let store = Arc::new(ChatStore::new(Arc::new(MemoryStore::new()), "New Chat"));
    let mut workspace = ChatWorkspace::new(
        Arc::new(MockProvider::new()),
        store,
        Arc::new(Settings::default()),
    );

    let first = workspace.new_chat().await.unwrap().chat_id();
    workspace.set_input("half-written question");
    let second = workspace.new_chat().await.unwrap().chat_id();
    assert_eq!(workspace.input(), "");

    workspace.open(&first).await.unwrap();
    assert_eq!(workspace.input(), "half-written question");
    workspace.open(&second).await.unwrap();
    assert_eq!(workspace.input(), "");
}

#[tokio::test]
async fn test_remote_snapshot_reconciliation() {
    let provider = MockProvider::new().with_response("Hi");
    let (engine, _persistence) = engine(&provider, PlanTier::Free, Settings::default());
    engine.submit(SubmitRequest::text("Hello")).await.unwrap();

    let mut stale = engine.session();
    stale.messages.truncate(1);
    engine.reconcile_remote(stale);
    assert_eq!(engine.session().messages.len(), 2);

    let mut ahead = engine.session();
    ahead.messages.push(Message::user("from another device"));
    engine.reconcile_remote(ahead);
    assert_eq!(engine.session().messages.len(), 3);
}

proptest! {
    #[test]
    fn prop_free_tier_titles_are_deterministic(message in "\\PC{0,120}") {
        let generator = TitleGenerator::new(
            Arc::new(MockProvider::new()),
            &Default::default(),
            &Default::default(),
        );
        let first = match generator.plan(PlanTier::Free, &message) {
            TitlePlan::Immediate(title) => title,
            TitlePlan::Pending(_) => panic!("free tier must not call the model"),
        };
        let second = match generator.plan(PlanTier::Free, &message) {
            TitlePlan::Immediate(title) => title,
            TitlePlan::Pending(_) => panic!("free tier must not call the model"),
        };
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(&first, &truncate_title(&message, 50));
        prop_assert!(first.chars().count() <= 50);
    }

    #[test]
    fn prop_draft_round_trip_restores_text(draft in "[a-zA-Z0-9 ?!.]{0,60}") {
        let mut drafts = DraftManager::new();
        drafts.switch_to("a");
        drafts.set_input(draft.clone());
        drafts.switch_to("b");
        prop_assert_eq!(drafts.input(), "");
        let restored = drafts.switch_to("a").to_string();
        if draft.trim().is_empty() {
            prop_assert_eq!(restored, "");
        } else {
            prop_assert_eq!(restored, draft);
        }
    }
}
