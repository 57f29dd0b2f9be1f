//! Child Connection
//!
//! Design Decision: one owning task per child, correlation via a pending-waiter table
//!
//! Rationale: a connection must let several callers have requests in flight
//! against the same child at once (the Manager fans `listAllTools` out
//! concurrently), while a child process exposes exactly one stdin and one
//! stdout. The split used here is the common one for this shape: a single
//! reader task owns `ChildStdout` and demultiplexes by JSON-RPC `id`, while
//! writers take a short-lived lock on `ChildStdin` just long enough to push
//! one framed line. Each caller parks on a `oneshot::Receiver` registered in
//! the pending table before it writes, so a response that arrives between
//! the write and the park can never be missed.
//!
//! Trade-offs:
//! - A `Mutex<HashMap<u64, oneshot::Sender<_>>>` vs. a dedicated router
//!   actor with its own `mpsc` inbox: the router actor avoids the lock
//!   entirely, at the cost of another task and channel per connection. The
//!   map is simpler and the critical sections here (`insert`/`remove`) are
//!   both O(1) and never held across an `.await`.
//! - `tokio::time::timeout` around the `oneshot::Receiver` await, with an
//!   explicit `pending.remove` on expiry: without the explicit remove, a
//!   timed-out request would leave a dead entry in the table forever, and a
//!   late response for that id would silently resolve nothing (its sender
//!   is simply dropped) rather than being dropped as a surplus frame should.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, oneshot, Mutex as AsyncMutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::mcp::error::{McpError, Result};
use crate::mcp::framing::LineFramer;
use crate::mcp::protocol::{
    ClientCapabilities, ClientInfo, InitializeParams, InitializeResult, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, RequestId, ResourceListResult, ToolListResult,
    CLIENT_NAME, CLIENT_VERSION, PROTOCOL_VERSION,
};
use crate::mcp::spec::EffectiveSpec;

/// Fixed per-request deadline. Not configurable per call - every verb
/// shares it, including the `initialize` handshake itself.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a SIGTERM is given to take effect before SIGKILL follows.
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// What a pending waiter is ultimately resolved with.
enum PendingOutcome {
    Response(Value),
    Error(crate::mcp::protocol::JsonRpcError),
    Closed,
}

/// A point-in-time snapshot of a connection, cheap enough to call on every
/// health check and the binary's startup log line.
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub name: String,
    pub pid: Option<u32>,
    pub initialized: bool,
    pub pending_requests: usize,
}

/// A live subprocess speaking MCP over stdio, plus everything needed to
/// correlate requests with responses and tear the process down cleanly.
///
/// State machine: `[new] -> [spawned] -> [ready] -> [closing] -> [closed]`.
/// `connect` only ever returns a connection that has already reached
/// `[ready]` - a handshake failure kills the process and returns the error
/// instead of handing back a half-initialized value.
pub struct ChildConnection {
    name: String,
    pid: Option<u32>,
    stdin: AsyncMutex<ChildStdin>,
    pending: Arc<StdMutex<HashMap<u64, oneshot::Sender<PendingOutcome>>>>,
    next_id: AtomicU64,
    initialized: AtomicBool,
    closing: Arc<AtomicBool>,
    notifications_tx: broadcast::Sender<Value>,
    disconnected_tx: StdMutex<Option<oneshot::Sender<()>>>,
    process: Arc<AsyncMutex<Option<Child>>>,
}

impl ChildConnection {
    /// Spawn the child described by `effective`, perform the `initialize`
    /// handshake, and return a connection already in `[ready]`.
    ///
    /// On any failure along the way - spawn, pipe setup, handshake timeout,
    /// handshake protocol error - the process is killed and the error is
    /// returned; no half-open connection escapes this function.
    pub async fn connect(
        effective: &EffectiveSpec,
    ) -> Result<(Arc<ChildConnection>, oneshot::Receiver<()>)> {
        let name = effective.name.clone();

        let mut command = Command::new(&effective.command);
        command
            .args(&effective.args)
            .envs(&effective.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &effective.cwd {
            command.current_dir(cwd);
        }

        let mut child = command
            .spawn()
            .map_err(|e| McpError::SpawnFailure(name.clone(), e.to_string()))?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::SpawnFailure(name.clone(), "no stdin pipe".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::SpawnFailure(name.clone(), "no stdout pipe".into()))?;
        let stderr = child.stderr.take();

        let pending = Arc::new(StdMutex::new(HashMap::new()));
        let closing = Arc::new(AtomicBool::new(false));
        let (notifications_tx, _) = broadcast::channel(64);
        let (disconnected_tx, disconnected_rx) = oneshot::channel();
        let process = Arc::new(AsyncMutex::new(Some(child)));

        let connection = Arc::new(ChildConnection {
            name: name.clone(),
            pid,
            stdin: AsyncMutex::new(stdin),
            pending: pending.clone(),
            next_id: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
            closing: closing.clone(),
            notifications_tx: notifications_tx.clone(),
            disconnected_tx: StdMutex::new(Some(disconnected_tx)),
            process: process.clone(),
        });

        if let Some(stderr) = stderr {
            let server = name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "{line}");
                }
            });
        }

        {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection.run_reader(stdout).await;
            });
        }

        if let Err(err) = connection.handshake().await {
            connection.force_kill().await;
            return Err(err);
        }

        info!(server = %name, pid = ?pid, "server connected");
        Ok((connection, disconnected_rx))
    }

    async fn handshake(&self) -> Result<()> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities {
                tools: Some(serde_json::json!({})),
                sampling: None,
                experimental: None,
            },
            client_info: ClientInfo {
                name: CLIENT_NAME.to_string(),
                version: CLIENT_VERSION.to_string(),
            },
        };
        let result = self
            .request("initialize", Some(serde_json::to_value(params)?))
            .await?;

        match serde_json::from_value::<InitializeResult>(result) {
            Ok(init) if init.protocol_version != PROTOCOL_VERSION => {
                warn!(
                    server = %self.name,
                    server_protocol = %init.protocol_version,
                    client_protocol = PROTOCOL_VERSION,
                    "server speaks a different protocol version; continuing anyway",
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(server = %self.name, error = %e, "initialize result did not match the expected shape");
            }
        }

        self.notify("notifications/initialized", None).await?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn run_reader<R>(self: Arc<Self>, stdout: R)
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut reader = stdout;
        let mut framer = LineFramer::new();
        let mut buf = [0u8; 8192];

        loop {
            let n = match tokio::io::AsyncReadExt::read(&mut reader, &mut buf).await {
                Ok(0) => {
                    info!(server = %self.name, "child closed stdout");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    warn!(server = %self.name, error = %e, "error reading child stdout");
                    break;
                }
            };

            for line in framer.push(&buf[..n]) {
                self.dispatch_line(&line);
            }
        }

        self.begin_closing("child process exited").await;
    }

    fn dispatch_line(&self, line: &str) {
        let message: JsonRpcMessage = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                debug!(server = %self.name, error = %e, "discarding unparseable line from child");
                return;
            }
        };

        match message.id {
            Some(RequestId::Number(id)) => {
                let waiter = self.pending.lock().unwrap().remove(&id);
                match waiter {
                    Some(tx) => {
                        let outcome = match message.error {
                            Some(err) => PendingOutcome::Error(err),
                            None => PendingOutcome::Response(message.result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                    None => {
                        debug!(server = %self.name, id, "response for unknown or already-timed-out request id");
                    }
                }
            }
            Some(RequestId::String(id)) => {
                debug!(server = %self.name, id, "discarding response with non-numeric id; this client never issues one");
            }
            None => {
                if let Some(method) = message.method {
                    let payload = serde_json::json!({
                        "method": method,
                        "params": message.params,
                    });
                    let _ = self.notifications_tx.send(payload);
                } else {
                    debug!(server = %self.name, "discarding line with neither id nor method");
                }
            }
        }
    }

    async fn write_line(&self, line: &str) -> std::result::Result<(), std::io::Error> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(McpError::Transport(self.name.clone(), "connection is closing".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let request = JsonRpcRequest::new(id, method, params);
        let line = serde_json::to_string(&request)?;

        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(McpError::Transport(self.name.clone(), e.to_string()));
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(PendingOutcome::Response(value))) => Ok(value),
            Ok(Ok(PendingOutcome::Error(err))) => Err(McpError::protocol(&self.name, method, err)),
            Ok(Ok(PendingOutcome::Closed)) => {
                Err(McpError::Transport(self.name.clone(), "connection closed".into()))
            }
            Ok(Err(_recv_dropped)) => {
                Err(McpError::Transport(self.name.clone(), "connection closed".into()))
            }
            Err(_elapsed) => {
                self.pending.lock().unwrap().remove(&id);
                Err(McpError::Timeout {
                    server: self.name.clone(),
                    method: method.to_string(),
                    timeout_secs: REQUEST_TIMEOUT.as_secs(),
                })
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        let line = serde_json::to_string(&notification)?;
        self.write_line(&line)
            .await
            .map_err(|e| McpError::Transport(self.name.clone(), e.to_string()))
    }

    /// Gate a user verb on connection state. A `[closing]` connection
    /// reports a transport failure, not `NotInitialized`, even though
    /// `begin_closing` also clears `initialized` - that flag flip is
    /// bookkeeping for the teardown sequence, not the caller-visible reason
    /// a verb was rejected. Only a connection that never finished its
    /// handshake reports `NotInitialized`.
    fn require_initialized(&self) -> Result<()> {
        if self.closing.load(Ordering::SeqCst) {
            Err(McpError::Transport(self.name.clone(), "connection is closing".into()))
        } else if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(McpError::NotInitialized(self.name.clone()))
        }
    }

    pub async fn list_tools(&self) -> Result<ToolListResult> {
        self.require_initialized()?;
        let value = self.request("tools/list", None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn call_tool(&self, tool: &str, arguments: Option<Value>) -> Result<Value> {
        self.require_initialized()?;
        let params = serde_json::json!({ "name": tool, "arguments": arguments });
        self.request("tools/call", Some(params)).await
    }

    pub async fn list_resources(&self) -> Result<ResourceListResult> {
        self.require_initialized()?;
        let value = self.request("resources/list", None).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<Value> {
        self.require_initialized()?;
        let params = serde_json::json!({ "uri": uri });
        self.request("resources/read", Some(params)).await
    }

    /// Subscribe to server-initiated notifications (`id`-less frames). Each
    /// subscriber gets its own lagging-tolerant receiver; a slow subscriber
    /// only loses its own backlog, not other subscribers' frames.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Value> {
        self.notifications_tx.subscribe()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            name: self.name.clone(),
            pid: self.pid,
            initialized: self.initialized.load(Ordering::SeqCst),
            pending_requests: self.pending.lock().unwrap().len(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request an orderly shutdown, then tear the connection down regardless
    /// of whether the child answers. Per the design notes, the MCP
    /// `shutdown` response is advisory - teardown proceeds either way.
    pub async fn disconnect(&self) {
        if self.initialized.load(Ordering::SeqCst) {
            let _ = self.request("shutdown", None).await;
        }
        self.begin_closing("disconnect requested").await;
    }

    /// Enter `[closing]` exactly once, regardless of how many call sites
    /// race to trigger it (child exit, external disconnect, write failure).
    async fn begin_closing(&self, reason: &str) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(server = %self.name, reason, "closing connection");
        self.initialized.store(false, Ordering::SeqCst);

        self.escalate_shutdown();

        let failed: Vec<_> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().collect()
        };
        for (_, tx) in failed {
            let _ = tx.send(PendingOutcome::Closed);
        }

        if let Some(tx) = self.disconnected_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }

    /// Send SIGTERM immediately, then SIGKILL after [`GRACE_PERIOD`] if the
    /// child hasn't exited by then. Takes ownership of the `Child` out of
    /// `process` so the wait doesn't hold the lock for the whole grace
    /// period.
    fn escalate_shutdown(&self) {
        let process = self.process.clone();
        let name = self.name.clone();

        tokio::spawn(async move {
            let mut child = match process.lock().await.take() {
                Some(child) => child,
                None => return,
            };

            #[cfg(unix)]
            if let Some(pid) = child.id() {
                use nix::sys::signal::{self, Signal};
                use nix::unistd::Pid;
                if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                    debug!(server = %name, error = %e, "SIGTERM delivery failed");
                }
            }
            #[cfg(not(unix))]
            let _ = child.start_kill();

            tokio::select! {
                status = child.wait() => {
                    debug!(server = %name, ?status, "child exited after SIGTERM");
                }
                _ = sleep(GRACE_PERIOD) => {
                    warn!(server = %name, "child did not exit within grace period, sending SIGKILL");
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                }
            }
        });
    }

    /// Kill the child immediately, bypassing the SIGTERM grace period. Used
    /// when the handshake itself fails - there is no `[ready]` connection to
    /// shut down gracefully, just a process to clean up.
    async fn force_kill(&self) {
        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        if let Some(tx) = self.disconnected_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    }
}
