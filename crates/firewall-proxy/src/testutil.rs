//! In-process mock downstreams for tests.
//!
//! Wires a `Session` to a scripted MCP server over a duplex pipe, standing in
//! for a spawned child process. The mock answers `initialize` itself,
//! delegates other requests to the supplied handler, and hangs up when asked
//! to handle the special `__close` method.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use firewall_types::JsonRpcMessage;

use crate::session::Session;

/// Handler outcome: `None` swallows the request (never answered).
pub(crate) type MockResponse = Option<Result<Value, (i64, String)>>;

pub(crate) async fn spawn_mock_downstream<F>(alias: &str, mut handler: F) -> Session
where
    F: FnMut(&str, &Value) -> MockResponse + Send + 'static,
{
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);

    tokio::spawn(async move {
        let (server_read, mut writer) = tokio::io::split(server_io);
        let mut lines = BufReader::new(server_read).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(msg) = serde_json::from_str::<JsonRpcMessage>(&line) else {
                continue;
            };
            let Some(method) = msg.method.clone() else {
                continue;
            };
            if msg.id.is_none() {
                continue;
            }

            let closing = method == "__close";
            let outcome: MockResponse = if method == "initialize" {
                Some(Ok(json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "serverInfo": {"name": "mock-downstream", "version": "0.0.0"},
                })))
            } else if closing {
                Some(Ok(Value::Null))
            } else {
                handler(&method, msg.params.as_ref().unwrap_or(&Value::Null))
            };

            if let Some(result) = outcome {
                let response = match result {
                    Ok(value) => JsonRpcMessage::response(msg.id.clone(), value),
                    Err((code, message)) => {
                        JsonRpcMessage::error_response(msg.id.clone(), code, message)
                    }
                };
                let mut line = serde_json::to_string(&response).expect("mock response serializes");
                line.push('\n');
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }

            if closing {
                break;
            }
        }
    });

    let (client_read, client_write) = tokio::io::split(client_io);
    Session::connect_streams(alias, client_read, client_write, None, Duration::from_secs(2))
        .await
        .expect("mock session connects")
}
