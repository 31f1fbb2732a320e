//! The upstream server loop.
//!
//! Newline-delimited JSON-RPC on the proxy's own stdio. Each request runs in
//! its own task under the audit middleware; responses funnel through a
//! writer channel so concurrent handlers never interleave output bytes.
//! Responses may be emitted in any order; the upstream client correlates by
//! request ID.

use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::debug;

use firewall_security::audit;
use firewall_types::{FirewallError, JsonRpcMessage, PARSE_ERROR};

use crate::proxy::Proxy;

/// Serve the upstream client on the process's own stdin/stdout.
pub async fn serve_stdio(proxy: Arc<Proxy>) -> Result<(), FirewallError> {
    serve(proxy, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve the upstream client over arbitrary streams.
///
/// Returns cleanly when the reader reaches EOF (upstream hung up).
pub async fn serve<R, W>(proxy: Arc<Proxy>, reader: R, writer: W) -> Result<(), FirewallError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut outbound) = mpsc::channel::<JsonRpcMessage>(64);

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(msg) = outbound.recv().await {
            let mut line = match serde_json::to_string(&msg) {
                Ok(line) => line,
                Err(_) => continue,
            };
            line.push('\n');
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.flush().await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|e| FirewallError::Transport(format!("reading upstream: {e}")))?;
        let Some(line) = line else {
            break; // EOF: upstream closed its side.
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let msg: JsonRpcMessage = match serde_json::from_str(line) {
            Ok(msg) => msg,
            Err(e) => {
                let _ = tx
                    .send(JsonRpcMessage::error_response(
                        None,
                        PARSE_ERROR,
                        format!("parse error: {e}"),
                    ))
                    .await;
                continue;
            }
        };

        if msg.is_notification() {
            debug!(method = ?msg.method, "upstream notification");
            continue;
        }
        if msg.method.is_none() {
            debug!("ignoring upstream message with no method");
            continue;
        }

        // One task per request; the audit middleware wraps dispatch.
        let proxy = proxy.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let shared = audit::new_shared();
            let start = Instant::now();

            let response = proxy.handle_request(&msg, &shared).await;

            let method = msg.method.as_deref().unwrap_or("");
            let is_error = response.error.is_some();
            let info = shared.lock().unwrap().clone();
            audit::emit(method, start.elapsed(), is_error, &info);

            let _ = tx.send(response).await;
        });
    }

    // Let in-flight responses drain before shutting the writer down.
    drop(tx);
    let _ = writer_task.await;
    Ok(())
}

// ============================================================
// Tests
// ============================================================
