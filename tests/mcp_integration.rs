//! End-to-end tests against a real child process
//!
//! These spawn `python3 -c <script>` as the child - a real external command,
//! not an in-process fake. The script is a minimal but genuine MCP server:
//! it answers `initialize`, `tools/list`, `tools/call`, and `shutdown` over
//! stdio, exactly as a real server would. Requires `python3` on `PATH`.

use std::time::Duration;

use mcp_railway_service::{ChildConnection, ConnectOutcome, EffectiveSpec, Manager, McpError, ServerSpec};

const FAKE_SERVER: &str = r#"
import sys, json

def send(obj):
    sys.stdout.write(json.dumps(obj) + "\n")
    sys.stdout.flush()

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    try:
        msg = json.loads(line)
    except Exception:
        continue
    method = msg.get("method")
    msg_id = msg.get("id")
    if method == "initialize":
        send({"jsonrpc": "2.0", "id": msg_id, "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "serverInfo": {"name": "fake-server", "version": "0.0.1"},
        }})
    elif method == "notifications/initialized":
        pass
    elif method == "tools/list":
        send({"jsonrpc": "2.0", "id": msg_id, "result": {
            "tools": [{"name": "echo", "description": "echoes input", "inputSchema": {"type": "object"}}],
        }})
    elif method == "tools/call":
        params = msg.get("params") or {}
        send({"jsonrpc": "2.0", "id": msg_id, "result": {"echoed": params.get("arguments")}})
    elif method == "shutdown":
        send({"jsonrpc": "2.0", "id": msg_id, "result": {}})
    elif msg_id is not None:
        send({"jsonrpc": "2.0", "id": msg_id, "error": {"code": -32601, "message": "method not found"}})
"#;

/// Like `FAKE_SERVER`, but silently drops `tools/list` instead of answering
/// it - used to exercise the 30-second per-request timeout (S3) without
/// every other verb also hanging.
const SILENT_ON_LIST_SERVER: &str = r#"
import sys, json

def send(obj):
    sys.stdout.write(json.dumps(obj) + "\n")
    sys.stdout.flush()

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    try:
        msg = json.loads(line)
    except Exception:
        continue
    method = msg.get("method")
    msg_id = msg.get("id")
    if method == "initialize":
        send({"jsonrpc": "2.0", "id": msg_id, "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "serverInfo": {"name": "silent-server", "version": "0.0.1"},
        }})
    elif method == "tools/list":
        pass  # never respond
    elif method == "shutdown":
        send({"jsonrpc": "2.0", "id": msg_id, "result": {}})
"#;

/// Like `FAKE_SERVER`, but `tools/list` always replies with a JSON-RPC
/// error object - used to exercise aggregate resilience (S6) without
/// needing a real transport failure to make one server unhealthy.
const ERROR_ON_LIST_SERVER: &str = r#"
import sys, json

def send(obj):
    sys.stdout.write(json.dumps(obj) + "\n")
    sys.stdout.flush()

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    try:
        msg = json.loads(line)
    except Exception:
        continue
    method = msg.get("method")
    msg_id = msg.get("id")
    if method == "initialize":
        send({"jsonrpc": "2.0", "id": msg_id, "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "serverInfo": {"name": "erroring-server", "version": "0.0.1"},
        }})
    elif method == "tools/list":
        send({"jsonrpc": "2.0", "id": msg_id, "error": {"code": -32000, "message": "tool catalog unavailable"}})
    elif method == "shutdown":
        send({"jsonrpc": "2.0", "id": msg_id, "result": {}})
"#;

fn fake_server_spec(name: &str) -> ServerSpec {
    ServerSpec::new(name, "python3").with_args(["-c", FAKE_SERVER])
}

fn silent_on_list_spec(name: &str) -> ServerSpec {
    ServerSpec::new(name, "python3").with_args(["-c", SILENT_ON_LIST_SERVER])
}

fn error_on_list_spec(name: &str) -> ServerSpec {
    ServerSpec::new(name, "python3").with_args(["-c", ERROR_ON_LIST_SERVER])
}

fn python3_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn connect_list_tools_call_and_disconnect_round_trip() {
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }

    let manager = Manager::new();
    manager.register_server(fake_server_spec("fake"));

    let outcome = manager.connect_server("fake", None).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected);

    let tools = manager.list_tools("fake").await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");

    let result = manager
        .call_tool("fake", "echo", Some(serde_json::json!({"text": "hello"})))
        .await
        .unwrap();
    assert_eq!(result["echoed"]["text"], "hello");

    manager.disconnect_server("fake").await.unwrap();

    // disconnectServer removes the registry entry before returning.
    let err = manager.call_tool("fake", "echo", None).await.unwrap_err();
    assert!(matches!(err, McpError::NotConnected(_)));
}

#[tokio::test]
async fn connect_server_twice_is_idempotent() {
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }

    let manager = Manager::new();
    manager.register_server(fake_server_spec("fake-twice"));

    let first = manager.connect_server("fake-twice", None).await.unwrap();
    assert_eq!(first, ConnectOutcome::Connected);

    let second = manager.connect_server("fake-twice", None).await.unwrap();
    assert_eq!(second, ConnectOutcome::AlreadyConnected);

    manager.disconnect_all().await;
}

#[tokio::test]
async fn list_all_tools_aggregates_across_two_connected_servers() {
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }

    let manager = Manager::new();
    manager.register_server(fake_server_spec("alpha"));
    manager.register_server(fake_server_spec("beta"));

    manager.connect_server("alpha", None).await.unwrap();
    manager.connect_server("beta", None).await.unwrap();

    let aggregate = manager.list_all_tools().await;
    assert_eq!(aggregate.ok.len(), 2);
    assert!(aggregate.errors.is_empty());
    assert!(aggregate.ok.contains_key("alpha"));
    assert!(aggregate.ok.contains_key("beta"));

    manager.disconnect_all().await;
}

/// S6 - one of two connected servers fails `tools/list`; the aggregate
/// still carries the healthy server's actual tools and an empty list (not
/// a missing entry) for the failing one.
#[tokio::test]
async fn list_all_tools_records_an_empty_list_for_a_failing_server() {
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }

    let manager = Manager::new();
    manager.register_server(fake_server_spec("healthy"));
    manager.register_server(error_on_list_spec("broken"));

    manager.connect_server("healthy", None).await.unwrap();
    manager.connect_server("broken", None).await.unwrap();

    let aggregate = manager.list_all_tools().await;
    assert_eq!(aggregate.ok.len(), 2, "both servers get an entry in `ok`");
    assert_eq!(aggregate.ok["healthy"].len(), 1);
    assert_eq!(aggregate.ok["healthy"][0].name, "echo");
    assert!(
        aggregate.ok["broken"].is_empty(),
        "a failing server is an empty list in `ok`, not a missing key"
    );
    assert!(aggregate.errors.contains_key("broken"));
    assert!(!aggregate.errors.contains_key("healthy"));

    manager.disconnect_all().await;
}

/// S5 - killing the child process out from under a live connection cancels
/// every pending waiter with a connection-closed transport error, emits
/// `disconnected` exactly once, and the Manager removes the name from its
/// registry without the caller having called `disconnectServer`.
#[tokio::test]
async fn external_process_kill_cancels_pending_requests_and_removes_the_connection() {
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }

    let effective = EffectiveSpec::compose(&silent_on_list_spec("killed"), None);
    let (connection, disconnected_rx) = ChildConnection::connect(&effective).await.unwrap();
    let pid = connection.status().pid.expect("spawned child has a pid");

    // `tools/list` and `resources/list` are both silently dropped by this
    // server script, so these two calls are genuinely pending - not racing
    // a real response - when the process is killed below.
    let waiter_a = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.list_tools().await })
    };
    let waiter_b = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.list_resources().await })
    };

    // Give both requests time to be written and registered in `pending`
    // before the external kill arrives.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let killed = std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .expect("the `kill` command is available on this platform");
    assert!(killed.success());

    let (result_a, result_b) = tokio::join!(waiter_a, waiter_b);
    assert!(
        matches!(result_a.unwrap().unwrap_err(), McpError::Transport(_, msg) if msg.contains("closed")),
        "pending waiter must fail with a connection-closed transport error"
    );
    assert!(
        matches!(result_b.unwrap().unwrap_err(), McpError::Transport(_, msg) if msg.contains("closed")),
        "pending waiter must fail with a connection-closed transport error"
    );

    // `disconnected` fires exactly once; a second `.await` on the already
    // completed/dropped sender's receiver would otherwise hang or panic.
    disconnected_rx.await.expect("disconnected fires exactly once");
}

#[tokio::test]
async fn connecting_an_unregistered_name_fails_without_spawning_anything() {
    let manager = Manager::new();
    let err = manager.connect_server("never-registered", None).await.unwrap_err();
    assert!(matches!(err, McpError::SpecUnknown(name) if name == "never-registered"));
}

/// S4 - the child answers with a JSON-RPC `error` object; the call fails
/// with a protocol error carrying the remote code and message.
#[tokio::test]
async fn unsupported_method_surfaces_as_a_protocol_error() {
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }

    let manager = Manager::new();
    manager.register_server(fake_server_spec("protocol-error"));
    manager.connect_server("protocol-error", None).await.unwrap();

    // The fake server has no `resources/list` handler, so it falls through
    // to its generic "method not found" error reply.
    let err = manager.list_resources("protocol-error").await.unwrap_err();
    match err {
        McpError::Protocol { code, message, .. } => {
            assert_eq!(code, -32601);
            assert_eq!(message, "method not found");
        }
        other => panic!("expected a protocol error, got {other:?}"),
    }

    manager.disconnect_all().await;
}

/// S3 - a request that never gets an answer fails with a timeout after 30s.
/// The test's clock is paused and explicitly advanced so it doesn't take 30
/// real seconds; the child process itself is real and unaffected by the
/// paused virtual clock (it answers `initialize` over the real stdio pipe).
#[tokio::test(start_paused = true)]
async fn request_with_no_response_times_out_after_30_seconds() {
    if !python3_available() {
        eprintln!("skipping: python3 not on PATH");
        return;
    }

    let manager = Manager::new();
    manager.register_server(silent_on_list_spec("silent"));
    manager.connect_server("silent", None).await.unwrap();

    // Drive the pending call and the clock advance concurrently in this same
    // task: `join!` doesn't need `'static`, unlike `tokio::spawn`, so the
    // call can borrow `manager` directly.
    let (result, ()) = tokio::join!(
        manager.list_tools("silent"),
        tokio::time::advance(Duration::from_secs(31)),
    );
    assert!(matches!(result.unwrap_err(), McpError::Timeout { server, method, timeout_secs }
        if server == "silent" && method == "tools/list" && timeout_secs == 30));

    manager.disconnect_all().await;
}
