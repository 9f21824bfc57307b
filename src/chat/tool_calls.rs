// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool-call coordinator
//!
//! Runs the tools a finalized completion asked for, records one `tool`
//! message per call, then drives a follow-up completion with tool use
//! disabled. Tool failures become error payloads; only the follow-up
//! completion can fail the turn.

use serde_json::{json, Value};

use crate::chat::state::SnapshotCell;
use crate::chat::streaming::{StreamConsumer, TurnContext};
use crate::error::{ParleyError, Result};
use crate::llm::message::{Message, ToolCall};
use crate::llm::provider::{CompletionMessage, CompletionRequest, ToolChoice};
use crate::tools::ToolRegistry;

/// System prompt leading the follow-up completion
pub const FOLLOW_UP_SYSTEM_PROMPT: &str = "You are a helpful assistant. \
Use the tool results above to answer the user's question. Do not call any more tools.";

/// Error recorded for tool calls that never ran because the turn was aborted
pub const CANCELLED_TOOL_RESULT: &str = "Cancelled";

/// Parse tool arguments, falling back to an empty object
pub fn parse_arguments(call: &ToolCall) -> Value {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return json!({});
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                target: "parley.chat.tools",
                tool = %call.function.name,
                tool_call_id = %call.id,
                error = %e,
                "Unparseable tool arguments, using empty object"
            );
            json!({})
        }
    }
}

fn error_payload(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

pub struct ToolCallCoordinator<'a> {
    tools: &'a ToolRegistry,
    consumer: &'a StreamConsumer<'a>,
    snapshot: &'a SnapshotCell,
}

impl<'a> ToolCallCoordinator<'a> {
    pub fn new(
        tools: &'a ToolRegistry,
        consumer: &'a StreamConsumer<'a>,
        snapshot: &'a SnapshotCell,
    ) -> Self {
        Self {
            tools,
            consumer,
            snapshot,
        }
    }

    /// Execute one call. Never fails; errors are encoded in the payload.
    pub async fn invoke(&self, call: &ToolCall, args: Value) -> Value {
        let name = call.function.name.as_str();
        let Some(tool) = self.tools.get(name) else {
            tracing::warn!(target: "parley.chat.tools", tool = name, "Unknown tool requested");
            return error_payload(format!("Unknown tool: {name}"));
        };

        match tool.execute(args).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    target: "parley.chat.tools",
                    tool = name,
                    tool_call_id = %call.id,
                    error = %e,
                    "Tool execution failed"
                );
                let message = match e {
                    ParleyError::ToolExecution(message) => message,
                    other => other.to_string(),
                };
                error_payload(message)
            }
        }
    }

    /// Answer every call in `pending` with a cancellation payload so each
    /// `tool_calls` entry keeps exactly one `tool` message.
    fn cancel_remaining(&self, pending: &[ToolCall], ctx: TurnContext<'_>) -> ParleyError {
        tracing::debug!(
            target: "parley.chat.tools",
            chat_id = ctx.chat_id,
            cancelled = pending.len(),
            "Tool calls cancelled"
        );
        for call in pending {
            self.snapshot.push_message(Message::tool(
                call.id.clone(),
                error_payload(CANCELLED_TOOL_RESULT).to_string(),
            ));
        }
        ParleyError::StreamAborted
    }

    /// Run the tool protocol for `completion` and return the follow-up.
    ///
    /// `base` is the request that produced `completion`; its model, sampling
    /// and tool list carry over to the follow-up.
    pub async fn coordinate(
        &self,
        completion: CompletionMessage,
        base: &CompletionRequest,
        ctx: TurnContext<'_>,
    ) -> Result<CompletionMessage> {
        let calls = completion.tool_calls;
        tracing::info!(
            target: "parley.chat.tools",
            chat_id = ctx.chat_id,
            tool_calls = calls.len(),
            "Running tool calls"
        );

        // Pending placeholder, visible right away
        self.snapshot
            .push_message(Message::assistant_tool_calls(calls.clone()));

        for (position, call) in calls.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                return Err(self.cancel_remaining(&calls[position..], ctx));
            }

            let args = parse_arguments(call);
            ctx.observer
                .on_tool_invocation(ctx.chat_id, &call.function.name, &args);

            let result = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    return Err(self.cancel_remaining(&calls[position..], ctx));
                }
                result = self.invoke(call, args) => result,
            };

            ctx.observer.on_tool_result(ctx.chat_id, &call.id, &result);
            self.snapshot
                .push_message(Message::tool(call.id.clone(), result.to_string()));
        }

        let mut messages = vec![Message::system(FOLLOW_UP_SYSTEM_PROMPT)];
        messages.extend(self.snapshot.with(|s| s.messages.clone()));
        let follow_up = CompletionRequest::new(base.model.clone(), messages)
            .with_temperature(base.temperature)
            .with_top_p(base.top_p)
            .with_tools(base.tools.clone())
            .with_tool_choice(ToolChoice::None);

        let mut answer = self.consumer.run(follow_up, ctx).await?;
        if answer.has_tool_calls() {
            tracing::warn!(
                target: "parley.chat.tools",
                chat_id = ctx.chat_id,
                ignored = answer.tool_calls.len(),
                "Follow-up requested tools despite tool_choice none; ignoring"
            );
            answer.tool_calls.clear();
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::observer::NoopObserver;
    use crate::chat::state::ChatSession;
    use crate::llm::mock_provider::{MockProvider, MockResponse};
    use crate::llm::provider::{CompletionProvider, ToolDefinition};
    use crate::tools::{SchemaBuilder, ToolExecutor};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;

    fn snapshot() -> SnapshotCell {
        let mut session = ChatSession::with_id("c1", "New Chat", "m");
        session.messages.push(Message::user("what is 2+3 and 4*5?"));
        SnapshotCell::new(session)
    }

    async fn run_protocol(
        provider: &dyn CompletionProvider,
        snapshot: &SnapshotCell,
        calls: Vec<ToolCall>,
    ) -> Result<CompletionMessage> {
        let tools = ToolRegistry::with_builtins();
        let (tx, _rx) = watch::channel(None);
        let consumer = StreamConsumer::new(provider, &tx);
        let cancel = CancellationToken::new();
        let ctx = TurnContext {
            chat_id: "c1",
            cancel: &cancel,
            observer: &NoopObserver,
        };
        let base = CompletionRequest::new("m", snapshot.with(|s| s.messages.clone()))
            .with_tools(tools.definitions());
        let completion = CompletionMessage {
            tool_calls: calls,
            ..Default::default()
        };
        ToolCallCoordinator::new(&tools, &consumer, snapshot)
            .coordinate(completion, &base, ctx)
            .await
    }

    #[test]
    fn test_parse_arguments_fallback() {
        let bad = ToolCall::new("1", "add", "{not json");
        assert_eq!(parse_arguments(&bad), json!({}));
        let empty = ToolCall::new("2", "add", "  ");
        assert_eq!(parse_arguments(&empty), json!({}));
        let good = ToolCall::new("3", "add", r#"{"a":1}"#);
        assert_eq!(parse_arguments(&good), json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_coordinate_appends_tool_messages_in_order() {
        let provider = MockProvider::new().with_response("2+3 is 5 and 4*5 is 20.");
        let snapshot = snapshot();
        let answer = run_protocol(
            &provider,
            &snapshot,
            vec![
                ToolCall::new("call_a", "add", r#"{"a":2,"b":3}"#),
                ToolCall::new("call_m", "multiply", r#"{"a":4,"b":5}"#),
            ],
        )
        .await
        .unwrap();

        assert_eq!(answer.content, "2+3 is 5 and 4*5 is 20.");
        let messages = snapshot.get().messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].tool_calls().len(), 2);
        assert_eq!(
            messages[2],
            Message::tool("call_a", r#"{"result":5}"#)
        );
        assert_eq!(
            messages[3],
            Message::tool("call_m", r#"{"result":20}"#)
        );
    }

    #[tokio::test]
    async fn test_follow_up_disables_tools() {
        let provider = MockProvider::new().with_response("done");
        let snapshot = snapshot();
        run_protocol(
            &provider,
            &snapshot,
            vec![ToolCall::new("call_a", "add", r#"{"a":1,"b":1}"#)],
        )
        .await
        .unwrap();

        let request = provider.last_request().unwrap();
        assert_eq!(request.tool_choice, ToolChoice::None);
        assert_eq!(request.messages[0], Message::system(FOLLOW_UP_SYSTEM_PROMPT));
        assert!(matches!(request.messages.last(), Some(Message::Tool { .. })));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_failure_are_isolated() {
        let provider = MockProvider::new().with_response("ok");
        let snapshot = snapshot();
        run_protocol(
            &provider,
            &snapshot,
            vec![
                ToolCall::new("call_x", "web_search", r#"{"q":"rust"}"#),
                ToolCall::new("call_bad", "add", r#"{"a":"two","b":3}"#),
                ToolCall::new("call_ok", "subtract", r#"{"a":9,"b":4}"#),
            ],
        )
        .await
        .unwrap();

        let messages = snapshot.get().messages;
        let payload = |i: usize| -> Value { serde_json::from_str(&messages[i].text()).unwrap() };
        assert_eq!(payload(2), json!({"error": "Unknown tool: web_search"}));
        assert!(payload(3)["error"].is_string());
        assert_eq!(payload(4), json!({"result": 5}));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_follow_up_failure_keeps_tool_messages() {
        let provider =
            MockProvider::new().with_mock_responses(vec![MockResponse::error("upstream down")]);
        let snapshot = snapshot();
        let err = run_protocol(
            &provider,
            &snapshot,
            vec![ToolCall::new("call_a", "add", r#"{"a":2,"b":3}"#)],
        )
        .await
        .unwrap_err();

        assert!(!err.is_abort());
        assert_eq!(snapshot.get().messages.len(), 3);
    }

    struct SlowTool;

    #[async_trait]
    impl ToolExecutor for SlowTool {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: "slow".to_string(),
                description: "Takes its time".to_string(),
                parameters: SchemaBuilder::new().build(),
            }
        }

        async fn execute(&self, _args: Value) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!({"result": "late"}))
        }
    }

    #[tokio::test]
    async fn test_abort_answers_every_pending_call() {
        let provider = MockProvider::new().with_response("never sent");
        let snapshot = snapshot();
        let mut tools = ToolRegistry::with_builtins();
        tools.register(Arc::new(SlowTool));
        let (tx, _rx) = watch::channel(None);
        let consumer = StreamConsumer::new(&provider, &tx);
        let cancel = CancellationToken::new();
        let ctx = TurnContext {
            chat_id: "c1",
            cancel: &cancel,
            observer: &NoopObserver,
        };
        let completion = CompletionMessage {
            tool_calls: vec![
                ToolCall::new("s1", "slow", "{}"),
                ToolCall::new("a1", "add", r#"{"a":1,"b":2}"#),
            ],
            ..Default::default()
        };
        let base = CompletionRequest::new("m", snapshot.with(|s| s.messages.clone()));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let err = ToolCallCoordinator::new(&tools, &consumer, &snapshot)
            .coordinate(completion, &base, ctx)
            .await
            .unwrap_err();

        assert!(err.is_abort());
        assert_eq!(provider.call_count(), 0);
        let messages = snapshot.get().messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].tool_calls().len(), 2);
        let cancelled = json!({"error": "Cancelled"}).to_string();
        assert_eq!(messages[2], Message::tool("s1", cancelled.clone()));
        assert_eq!(messages[3], Message::tool("a1", cancelled));
    }
}
