use crate::conversation::{Transcript, Turn};
use crate::provider::{ChatProvider, FinishReason, LlmError};
use crate::session::{SessionError, ToolSession};
use crate::tool::ToolCall;
use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives one question through the model, with at most one tool call.
///
/// Flow: transcript + tools → model → (tool call → session → tool result →
/// model without tools) → answer.
///
/// All new turns are built on a working copy and committed to the caller's
/// transcript only once the final answer is in, so a failure at any step
/// leaves the transcript untouched.
pub struct ConversationEngine {
    provider: Arc<dyn ChatProvider>,
    clock: fn() -> DateTime<Local>,
}

impl ConversationEngine {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            provider,
            clock: Local::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Answer the conversation in `transcript`, appending the new turns to it.
    pub async fn process(
        &self,
        session: &dyn ToolSession,
        transcript: &mut Transcript,
    ) -> Result<String, EngineError> {
        let mut request: Vec<Turn> = transcript.turns().to_vec();
        request.push(Turn::system(self.time_stamp()));

        let tools = session.list_tools().await?;
        debug!(
            provider = self.provider.provider_name(),
            turns = request.len(),
            tools = tools.len(),
            "Requesting first completion"
        );

        let first = self.provider.complete(&request, &tools).await?;
        if first.finish_reason != FinishReason::ToolCalls {
            info!(finish_reason = ?first.finish_reason, "Model answered directly");
            transcript.add_assistant_message(first.content.clone());
            return Ok(first.content);
        }

        let mut calls = first.tool_calls.into_iter();
        let call = calls.next().ok_or_else(|| {
            LlmError::InvalidResponse("finish_reason is tool_calls but no tool call was returned".into())
        })?;
        let dropped: Vec<String> = calls.map(|c| c.name).collect();
        if !dropped.is_empty() {
            warn!(?dropped, "Model requested several tool calls; only the first is executed");
        }

        info!(tool = %call.name, arguments = %call.arguments, "Calling tool");
        let mut result = session.invoke(&call.name, &call.arguments).await?;
        if result.is_error {
            warn!(tool = %call.name, content = %result.content, "Tool reported an error");
        }
        if result.content.trim().is_empty() {
            result.content = no_data_message(&call);
        }

        let mut exchange = Transcript::new();
        exchange.push_tool_exchange(first.content, call, result);
        request.extend(exchange.turns().iter().cloned());

        debug!(turns = request.len(), "Requesting final completion");
        let second = self.provider.complete(&request, &[]).await?;
        if second.finish_reason == FinishReason::ToolCalls {
            warn!("Model asked for another tool call with no tools offered; using its text");
        }

        exchange.add_assistant_message(second.content.clone());
        transcript.extend(exchange);
        Ok(second.content)
    }

    fn time_stamp(&self) -> String {
        let now = (self.clock)();
        format!("Current Time: {}", now.format("%Y/%m/%d %H:%M:%S (UTC%:z)"))
    }
}

fn no_data_message(call: &ToolCall) -> String {
    format!(
        "No data found: tool '{}' returned no result for arguments {}",
        call.name, call.arguments
    )
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Tool session error: {0}")]
    Session(#[from] SessionError),
    #[error("LLM endpoint error: {0}")]
    Upstream(#[from] LlmError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::provider::mock::MockChatProvider;
    use crate::provider::Completion;
    use crate::session::mock::MockToolSession;
    use crate::tool::{ToolArguments, ToolResult};

    fn quote_call(id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: "get_daily_quote".to_string(),
            arguments: ToolArguments::parse(
                r#"{"ts_code": "600519.SH", "start_date": "20240105", "end_date": "20240105"}"#,
            )
            .unwrap(),
        }
    }

    fn setup() -> (ConversationEngine, Arc<MockChatProvider>) {
        let provider = Arc::new(MockChatProvider::new());
        let engine = ConversationEngine::new(provider.clone() as Arc<dyn ChatProvider>);
        (engine, provider)
    }

    fn question() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.add_user_message("What is the closing price of 600519.SH on 2024-01-05?");
        transcript
    }

    #[tokio::test]
    async fn test_direct_answer_appends_one_turn() {
        let (engine, provider) = setup();
        provider.queue_text("Hello! How can I help?");
        let session = MockToolSession::new();

        let mut transcript = question();
        let answer = engine.process(&session, &mut transcript).await.unwrap();

        assert_eq!(answer, "Hello! How can I help?");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.turns()[1].role, Role::Assistant);
        assert!(session.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_time_stamp_sent_but_not_persisted() {
        let (engine, provider) = setup();
        provider.queue_text("ok");
        let session = MockToolSession::new();

        let mut transcript = question();
        engine.process(&session, &mut transcript).await.unwrap();

        let requests = provider.requests();
        let last = requests[0].messages.last().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.content.starts_with("Current Time: "));
        assert!(transcript.turns().iter().all(|t| t.role != Role::System));
    }

    #[tokio::test]
    async fn test_closing_price_scenario() {
        let (engine, provider) = setup();
        provider.queue(Completion::tool_call(quote_call("call_42")));
        provider.queue_text("The closing price of 600519.SH on 2024-01-05 was 1700.0.");
        let session = MockToolSession::new().with_tool(
            "get_daily_quote",
            ToolResult::text(
                r#"[{"ts_code": "600519.SH", "trade_date": "20240105", "close": 1700.0}]"#,
            ),
        );

        let mut transcript = question();
        let answer = engine.process(&session, &mut transcript).await.unwrap();

        assert!(answer.contains("1700.0"));
        assert_eq!(transcript.len(), 4);
        let turns = transcript.turns();
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].tool_call.as_ref().unwrap().id, "call_42");
        assert_eq!(turns[2].role, Role::Tool);
        assert_eq!(turns[2].tool_call_id.as_deref(), Some("call_42"));
        assert!(turns[2].content.contains("1700.0"));
        assert_eq!(turns[3].role, Role::Assistant);
        assert!(transcript.is_well_paired());

        let invocations = session.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(
            invocations[0].1.get("ts_code").and_then(|v| v.as_str()),
            Some("600519.SH")
        );
    }

    #[tokio::test]
    async fn test_tools_offered_only_on_first_completion() {
        let (engine, provider) = setup();
        provider.queue(Completion::tool_call(quote_call("call_1")));
        provider.queue_text("done");
        let session = MockToolSession::new().with_tool("get_daily_quote", ToolResult::text("[]"));

        let mut transcript = question();
        engine.process(&session, &mut transcript).await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        assert!(requests[1].tools.is_empty());
        // Second request carries the call and its result after the time stamp.
        let tail: Vec<Role> = requests[1].messages.iter().rev().take(3).map(|t| t.role).collect();
        assert_eq!(tail, vec![Role::Tool, Role::Assistant, Role::System]);
    }

    #[tokio::test]
    async fn test_empty_result_becomes_no_data_message() {
        let (engine, provider) = setup();
        provider.queue(Completion::tool_call(quote_call("call_7")));
        provider.queue_text("No quote was found for that day.");
        let session = MockToolSession::new().with_tool("get_daily_quote", ToolResult::text(""));

        let mut transcript = question();
        engine.process(&session, &mut transcript).await.unwrap();

        let tool_turn = &transcript.turns()[2];
        assert_eq!(tool_turn.role, Role::Tool);
        assert!(tool_turn.content.starts_with("No data found"));
        assert!(tool_turn.content.contains("600519.SH"));
    }

    #[tokio::test]
    async fn test_server_no_data_text_passes_through() {
        let (engine, provider) = setup();
        provider.queue(Completion::tool_call(quote_call("call_8")));
        provider.queue_text("Nothing found.");
        let message = "No data found for 600519.SH between 20240105 and 20240105.";
        let session = MockToolSession::new().with_tool("get_daily_quote", ToolResult::text(message));

        let mut transcript = question();
        engine.process(&session, &mut transcript).await.unwrap();

        assert_eq!(transcript.turns()[2].content, message);
    }

    #[tokio::test]
    async fn test_tool_error_is_fed_back_as_text() {
        let (engine, provider) = setup();
        provider.queue(Completion::tool_call(quote_call("call_3")));
        provider.queue_text("The data provider failed.");
        let session = MockToolSession::new()
            .with_tool("get_daily_quote", ToolResult::error("upstream quota exceeded"));

        let mut transcript = question();
        let answer = engine.process(&session, &mut transcript).await.unwrap();

        assert_eq!(answer, "The data provider failed.");
        assert_eq!(transcript.turns()[2].content, "upstream quota exceeded");
    }

    #[tokio::test]
    async fn test_only_first_tool_call_is_executed() {
        let (engine, provider) = setup();
        let mut completion = Completion::tool_call(quote_call("call_a"));
        completion.tool_calls.push(ToolCall {
            id: "call_b".to_string(),
            name: "get_daily_fund".to_string(),
            arguments: ToolArguments::new(),
        });
        provider.queue(completion);
        provider.queue_text("done");
        let session = MockToolSession::new()
            .with_tool("get_daily_quote", ToolResult::text("[]"))
            .with_tool("get_daily_fund", ToolResult::text("[]"));

        let mut transcript = question();
        engine.process(&session, &mut transcript).await.unwrap();

        let invocations = session.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].0, "get_daily_quote");
        assert_eq!(transcript.len(), 4);
        assert!(transcript.is_well_paired());
    }

    #[tokio::test]
    async fn test_unknown_tool_leaves_transcript_untouched() {
        let (engine, provider) = setup();
        let mut call = quote_call("call_x");
        call.name = "get_weather".to_string();
        provider.queue(Completion::tool_call(call));
        let session = MockToolSession::new().with_tool("get_daily_quote", ToolResult::text("[]"));

        let mut transcript = question();
        let before = transcript.clone();
        let err = engine.process(&session, &mut transcript).await.unwrap_err();

        assert!(matches!(err, EngineError::Session(SessionError::ToolNotFound(ref n)) if n == "get_weather"));
        assert_eq!(transcript, before);
    }

    #[tokio::test]
    async fn test_second_completion_failure_rolls_back() {
        let (engine, provider) = setup();
        provider.queue(Completion::tool_call(quote_call("call_1")));
        provider.queue_error(LlmError::ApiError {
            status: 500,
            message: "internal".to_string(),
        });
        let session = MockToolSession::new().with_tool("get_daily_quote", ToolResult::text("[]"));

        let mut transcript = question();
        let before = transcript.clone();
        let err = engine.process(&session, &mut transcript).await.unwrap_err();

        assert!(matches!(err, EngineError::Upstream(LlmError::ApiError { status: 500, .. })));
        assert_eq!(transcript, before);
        assert!(transcript.is_well_paired());
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_before_completion() {
        let (engine, provider) = setup();
        let session = MockToolSession::new().failing_listing();

        let mut transcript = question();
        let err = engine.process(&session, &mut transcript).await.unwrap_err();

        assert!(matches!(err, EngineError::Session(SessionError::Protocol(_))));
        assert!(provider.requests().is_empty());
        assert_eq!(transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_calls_without_call_is_invalid_response() {
        let (engine, provider) = setup();
        provider.queue(Completion {
            finish_reason: FinishReason::ToolCalls,
            content: String::new(),
            tool_calls: Vec::new(),
        });
        let session = MockToolSession::new();

        let mut transcript = question();
        let err = engine.process(&session, &mut transcript).await.unwrap_err();

        assert!(matches!(err, EngineError::Upstream(LlmError::InvalidResponse(_))));
        assert_eq!(transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_fixed_clock_formats_time_stamp() {
        use chrono::TimeZone;

        fn fixed() -> DateTime<Local> {
            Local.with_ymd_and_hms(2024, 1, 5, 15, 0, 0).unwrap()
        }

        let (engine, provider) = setup();
        let engine = engine.with_clock(fixed);
        provider.queue_text("ok");

        let mut transcript = question();
        engine.process(&MockToolSession::new(), &mut transcript).await.unwrap();

        let requests = provider.requests();
        let stamp = &requests[0].messages.last().unwrap().content;
        assert!(stamp.starts_with("Current Time: 2024/01/05 15:00:00 (UTC"));
    }
}
