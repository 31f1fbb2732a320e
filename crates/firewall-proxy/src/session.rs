//! Downstream client sessions.
//!
//! A session owns one downstream MCP server conversation: newline-delimited
//! JSON-RPC over the child's stdio, a persistent reader task correlating
//! responses to in-flight requests by ID, and a writer task serializing
//! outbound messages. Requests are submitted in order per session; responses
//! resolve whichever request they correlate to.
//!
//! A session that loses its reader (child exit, pipe closed) is flagged
//! unhealthy; in-flight and future requests surface transport errors. The
//! proxy never re-spawns downstreams; the operator restarts the process.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use firewall_types::{FirewallError, JsonRpcMessage, MCP_PROTOCOL_VERSION};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcMessage>>>>;

/// A connected downstream session.
pub struct Session {
    alias: String,
    sender: mpsc::Sender<JsonRpcMessage>,
    pending: PendingMap,
    next_id: AtomicU64,
    healthy: Arc<AtomicBool>,
    /// Keeps the child alive for the session's lifetime; killed on drop.
    _child: Mutex<Option<Child>>,
}

impl Session {
    /// Spawn a downstream process and connect over its stdio.
    ///
    /// Performs the MCP `initialize` handshake before returning. The child's
    /// stderr is drained to debug logs.
    pub async fn connect_command(
        alias: &str,
        mut command: Command,
        timeout: Duration,
    ) -> Result<Self, FirewallError> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| FirewallError::Transport(format!("spawning downstream {alias:?}: {e}")))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            FirewallError::Transport(format!("downstream {alias:?}: no stdin pipe"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            FirewallError::Transport(format!("downstream {alias:?}: no stdout pipe"))
        })?;

        if let Some(stderr) = child.stderr.take() {
            let alias = alias.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %alias, line = %line, "downstream stderr");
                }
            });
        }

        Self::connect_streams(alias, stdout, stdin, Some(child), timeout).await
    }

    /// Connect over arbitrary streams. Used by `connect_command` and by
    /// tests that wire an in-process downstream through a duplex pipe.
    pub async fn connect_streams<R, W>(
        alias: &str,
        reader: R,
        writer: W,
        child: Option<Child>,
        timeout: Duration,
    ) -> Result<Self, FirewallError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, mut outbound) = mpsc::channel::<JsonRpcMessage>(64);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let healthy = Arc::new(AtomicBool::new(true));

        {
            let alias = alias.to_string();
            tokio::spawn(async move {
                let mut writer = writer;
                while let Some(msg) = outbound.recv().await {
                    let mut line = match serde_json::to_string(&msg) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(server = %alias, error = %e, "failed to serialize outbound message");
                            continue;
                        }
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
        }

        {
            let alias = alias.to_string();
            let pending = pending.clone();
            let healthy = healthy.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(reader).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<JsonRpcMessage>(line) {
                                Ok(msg) if msg.is_response() => {
                                    let id = msg.id.as_ref().and_then(Value::as_u64);
                                    let waiter =
                                        id.and_then(|id| pending.lock().unwrap().remove(&id));
                                    match waiter {
                                        Some(tx) => {
                                            let _ = tx.send(msg);
                                        }
                                        None => {
                                            debug!(server = %alias, id = ?id, "response with no waiter");
                                        }
                                    }
                                }
                                Ok(msg) => {
                                    // Server-initiated requests and notifications
                                    // (logging, progress) are not forwarded.
                                    debug!(
                                        server = %alias,
                                        method = ?msg.method,
                                        "ignoring downstream-initiated message"
                                    );
                                }
                                Err(e) => {
                                    warn!(server = %alias, error = %e, "malformed downstream JSON line");
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(server = %alias, error = %e, "downstream read failed");
                            break;
                        }
                    }
                }
                healthy.store(false, Ordering::SeqCst);
                // Dropping the waiters fails any in-flight request fast.
                pending.lock().unwrap().clear();
                debug!(server = %alias, "downstream session closed");
            });
        }

        let session = Self {
            alias: alias.to_string(),
            sender,
            pending,
            next_id: AtomicU64::new(0),
            healthy,
            _child: Mutex::new(child),
        };

        session
            .request(
                "initialize",
                json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "mcp-firewall",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
                timeout,
            )
            .await
            .map_err(|e| {
                FirewallError::Transport(format!("initialize handshake with {alias:?}: {e}"))
            })?;
        session
            .notify("notifications/initialized", json!({}))
            .await?;

        Ok(session)
    }

    /// The alias this session is bound to.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Whether the session's reader is still alive.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Send a request and await its response.
    ///
    /// A JSON-RPC error from the downstream maps to `FirewallError::Mcp`;
    /// a dead session to `Transport`; expiry to `Timeout`.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, FirewallError> {
        if !self.is_healthy() {
            return Err(FirewallError::Transport(format!(
                "session {:?} is not healthy",
                self.alias
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let msg = JsonRpcMessage::request(id, method, params);
        if self.sender.send(msg).await.is_err() {
            self.pending.lock().unwrap().remove(&id);
            return Err(FirewallError::Transport(format!(
                "session {:?} writer closed",
                self.alias
            )));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                if let Some(err) = response.error {
                    return Err(FirewallError::Mcp(format!(
                        "downstream {:?} returned error for {method}: {} (code {})",
                        self.alias, err.message, err.code
                    )));
                }
                Ok(response.result.unwrap_or(Value::Null))
            }
            Ok(Err(_)) => Err(FirewallError::Transport(format!(
                "session {:?} closed while awaiting {method} response",
                self.alias
            ))),
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(FirewallError::Timeout(format!(
                    "downstream {:?} did not answer {method} within {timeout:?}",
                    self.alias
                )))
            }
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), FirewallError> {
        let msg = JsonRpcMessage::notification(method, params);
        self.sender.send(msg).await.map_err(|_| {
            FirewallError::Transport(format!("session {:?} writer closed", self.alias))
        })
    }
}

// ============================================================
// Tests
// ============================================================
