//! End-to-end tests of the blocking client: bridge worker, lifecycle
//! manager, engine and MCP client against in-process and spawned servers.

use std::sync::Arc;

use serde_json::json;
use toolchat_client::{BlockingClient, ClientError, ClientOptions, ProviderFactory};
use toolchat_mcp::{ChannelTransport, LaunchOptions, McpServer};
use toolchat_runtime::provider::mock::MockChatProvider;
use toolchat_runtime::{
    ChatProvider, Completion, EngineError, Role, SessionError, ToolArguments, ToolCall, Transcript,
};

fn factory(provider: Arc<MockChatProvider>) -> ProviderFactory {
    Arc::new(move |_key: &str| Ok(provider.clone() as Arc<dyn ChatProvider>))
}

fn options() -> ClientOptions {
    ClientOptions {
        credential: Some("sk-test".to_string()),
        ..ClientOptions::default()
    }
}

fn quote_server() -> McpServer {
    McpServer::new("tushare")
        .with_tool(
            "get_daily_quote",
            "Daily quotes for a stock code",
            json!({
                "type": "object",
                "properties": {
                    "ts_code": {"type": "string"},
                    "start_date": {"type": "string"},
                    "end_date": {"type": "string"}
                },
                "required": ["ts_code", "start_date", "end_date"]
            }),
            |args| match args["ts_code"].as_str() {
                Some("600519.SH") => {
                    Ok(r#"[{"ts_code": "600519.SH", "trade_date": "20240105", "close": 1700.0}]"#.to_string())
                }
                _ => Ok(String::new()),
            },
        )
}

/// Serve `server` from a runtime of its own, independent of the bridge.
fn spawn_server(server: McpServer) -> (tokio::runtime::Runtime, ChannelTransport) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (client_side, mut server_side) = ChannelTransport::pair();
    let mut server = server;
    runtime.spawn(async move { server.run(&mut server_side).await });
    (runtime, client_side)
}

fn quote_call(code: &str) -> ToolCall {
    ToolCall {
        id: "call_0".to_string(),
        name: "get_daily_quote".to_string(),
        arguments: ToolArguments::try_from(json!({
            "ts_code": code,
            "start_date": "20240105",
            "end_date": "20240105"
        }))
        .unwrap(),
    }
}

#[test]
fn closing_price_question_runs_one_tool_exchange() {
    let provider = Arc::new(MockChatProvider::new());
    provider.queue(Completion::tool_call(quote_call("600519.SH")));
    provider.queue_text("On 2024-01-05, 600519.SH closed at 1700.0.");

    let (_runtime, transport) = spawn_server(quote_server());
    let client = BlockingClient::new(options(), factory(provider.clone())).unwrap();
    client.attach(Box::new(transport)).unwrap();

    let mut transcript = Transcript::new();
    transcript.add_user_message("What was the closing price of 600519.SH on 2024-01-05?");
    let answer = client.process(&mut transcript).unwrap();

    assert!(answer.contains("1700.0"));
    let roles: Vec<Role> = transcript.turns().iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
    let tool_turn = &transcript.turns()[2];
    assert_eq!(tool_turn.tool_call_id.as_deref(), Some("call_0"));
    assert!(tool_turn.content.contains("\"close\": 1700.0"));

    // The final completion saw the tool result and was offered no tools.
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].tools.is_empty());
    assert!(requests[1].messages.iter().any(|t| t.role == Role::Tool));
}

#[test]
fn empty_tool_result_becomes_no_data_text() {
    let provider = Arc::new(MockChatProvider::new());
    provider.queue(Completion::tool_call(quote_call("000000.SZ")));
    provider.queue_text("I could not find any data for that code.");

    let (_runtime, transport) = spawn_server(quote_server());
    let client = BlockingClient::new(options(), factory(provider)).unwrap();
    client.attach(Box::new(transport)).unwrap();

    let mut transcript = Transcript::new();
    transcript.add_user_message("Close of 000000.SZ on 2024-01-05?");
    client.process(&mut transcript).unwrap();

    let tool_turn = &transcript.turns()[2];
    assert_eq!(tool_turn.role, Role::Tool);
    assert!(tool_turn.content.starts_with("No data found"));
}

#[test]
fn unknown_tool_leaves_transcript_unchanged() {
    let provider = Arc::new(MockChatProvider::new());
    provider.queue(Completion::tool_call(ToolCall {
        id: "call_9".to_string(),
        name: "get_weather".to_string(),
        arguments: ToolArguments::new(),
    }));

    let (_runtime, transport) = spawn_server(quote_server());
    let client = BlockingClient::new(options(), factory(provider)).unwrap();
    client.attach(Box::new(transport)).unwrap();

    let mut transcript = Transcript::new();
    transcript.add_user_message("Weather in Shanghai?");
    let before = transcript.clone();

    let err = client.process(&mut transcript).unwrap_err();
    assert!(matches!(
        err,
        ClientError::Engine(EngineError::Session(SessionError::ToolNotFound(ref name))) if name == "get_weather"
    ));
    assert_eq!(transcript, before);
}

#[test]
fn sequential_questions_keep_their_own_answers() {
    let provider = Arc::new(MockChatProvider::new());
    provider.queue_text("first answer");
    provider.queue_text("second answer");

    let (_runtime, transport) = spawn_server(quote_server());
    let client = BlockingClient::new(options(), factory(provider)).unwrap();
    client.attach(Box::new(transport)).unwrap();

    let mut transcript = Transcript::new();
    transcript.add_user_message("one");
    assert_eq!(client.process(&mut transcript).unwrap(), "first answer");
    transcript.add_user_message("two");
    assert_eq!(client.process(&mut transcript).unwrap(), "second answer");
    assert_eq!(transcript.len(), 4);
}

#[test]
fn list_tools_and_cleanup() {
    let (_runtime, transport) = spawn_server(quote_server());
    let client = BlockingClient::new(options(), factory(Arc::new(MockChatProvider::new()))).unwrap();
    client.attach(Box::new(transport)).unwrap();

    let tools = client.list_tools().unwrap();
    assert_eq!(tools[0].name, "get_daily_quote");

    client.cleanup().unwrap();
    client.cleanup().unwrap();
    assert!(!client.is_connected().unwrap());
}

#[test]
fn unsupported_script_is_rejected() {
    let client = BlockingClient::new(options(), factory(Arc::new(MockChatProvider::new()))).unwrap();
    let err = client.connect("servers/tushare.rb").unwrap_err();
    assert!(matches!(err, ClientError::Connect(toolchat_mcp::McpError::InvalidInput(_))));
}

/// A stdio MCP server in POSIX sh. It answers by request id and method and
/// returns fixed text for every tool call.
#[cfg(unix)]
const SH_SERVER: &str = r#"
while IFS= read -r line; do
  req=$(printf '%s\n' "$line" | sed -n 's/^{"jsonrpc":"2.0","id":\([0-9]*\),"method":"\([^"]*\)".*/\1 \2/p')
  [ -z "$req" ] && continue
  id=${req%% *}
  method=${req#* }
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"sh-quotes"}}}\n' "$id" ;;
    tools/list)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"get_daily_quote","description":"Daily quotes","inputSchema":{"type":"object"}}]}}\n' "$id" ;;
    tools/call)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"close 1700.0"}]}}\n' "$id" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Method not found"}}\n' "$id" ;;
  esac
done
"#;

#[cfg(unix)]
#[test]
fn spawned_server_connects_lazily_and_is_stopped_on_cleanup() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("quotes.py");
    std::fs::write(&script, SH_SERVER).unwrap();

    let provider = Arc::new(MockChatProvider::new());
    provider.queue(Completion::tool_call(quote_call("600519.SH")));
    provider.queue_text("It closed at 1700.0.");

    let client = BlockingClient::new(
        ClientOptions {
            launch: LaunchOptions {
                python: "sh".to_string(),
                ..LaunchOptions::default()
            },
            server_script: Some(script),
            credential: Some("sk-test".to_string()),
        },
        factory(provider),
    )
    .unwrap();
    assert!(!client.is_connected().unwrap());

    let mut transcript = Transcript::new();
    transcript.add_user_message("Close of 600519.SH on 2024-01-05?");
    let answer = client.process(&mut transcript).unwrap();

    assert_eq!(answer, "It closed at 1700.0.");
    assert_eq!(transcript.turns()[2].content, "close 1700.0");
    assert!(client.is_connected().unwrap());

    client.cleanup().unwrap();
    assert!(!client.is_connected().unwrap());
    drop(client);
}

/// Like [`SH_SERVER`], but the first launch exits right after the handshake's
/// tool listing. Later launches find the marker file and keep serving.
#[cfg(unix)]
const SH_SERVER_DIES_ONCE: &str = r#"
marker="$0.started"
once=0
if [ ! -f "$marker" ]; then : > "$marker"; once=1; fi
while IFS= read -r line; do
  req=$(printf '%s\n' "$line" | sed -n 's/^{"jsonrpc":"2.0","id":\([0-9]*\),"method":"\([^"]*\)".*/\1 \2/p')
  [ -z "$req" ] && continue
  id=${req%% *}
  method=${req#* }
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"sh-quotes"}}}\n' "$id" ;;
    tools/list)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"get_daily_quote","description":"Daily quotes","inputSchema":{"type":"object"}}]}}\n' "$id"
      [ "$once" = 1 ] && exit 0 ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Method not found"}}\n' "$id" ;;
  esac
done
"#;

#[cfg(unix)]
#[test]
fn dead_tool_server_is_replaced_on_next_call() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("quotes.py");
    std::fs::write(&script, SH_SERVER_DIES_ONCE).unwrap();

    let provider = Arc::new(MockChatProvider::new());
    provider.queue_text("Recovered.");

    let client = BlockingClient::new(
        ClientOptions {
            launch: LaunchOptions {
                python: "sh".to_string(),
                ..LaunchOptions::default()
            },
            server_script: Some(script),
            credential: Some("sk-test".to_string()),
        },
        factory(provider),
    )
    .unwrap();

    let mut transcript = Transcript::new();
    transcript.add_user_message("Close of 600519.SH on 2024-01-05?");
    let before = transcript.clone();

    let err = client.process(&mut transcript).unwrap_err();
    assert!(matches!(err, ClientError::Engine(EngineError::Session(ref e)) if e.is_fatal()));
    assert!(!err.to_string().contains("Transport error: Transport error"));
    assert_eq!(transcript, before);
    assert!(!client.is_connected().unwrap());

    // The next call launches a fresh server from the remembered script.
    assert_eq!(client.process(&mut transcript).unwrap(), "Recovered.");
    assert!(client.is_connected().unwrap());
}
