//! MCP (Model Context Protocol) subprocess multiplexer
//!
//! This module spawns and supervises MCP servers as child processes
//! speaking JSON-RPC 2.0 over stdio, and exposes a single [`Manager`]
//! façade for registering, connecting, and calling them.
//!
//! # Architecture
//!
//! 1. **Protocol layer** (`protocol.rs`) - JSON-RPC envelope and MCP
//!    message types (`initialize`, `tools/list`, `tools/call`,
//!    `resources/list`, `resources/read`).
//! 2. **Spec layer** (`spec.rs`) - declarative description of how to spawn
//!    a child (`ServerSpec`), plus per-call overrides composed into an
//!    [`spec::EffectiveSpec`].
//! 3. **Framing layer** (`framing.rs`) - turns a raw byte stream into
//!    complete newline-delimited JSON-RPC frames.
//! 4. **Connection layer** (`connection.rs`) - one [`connection::ChildConnection`]
//!    per live subprocess: the `initialize` handshake, concurrent
//!    request/response correlation by id, the `[new] -> [spawned] ->
//!    [ready] -> [closing] -> [closed]` lifecycle, and SIGTERM/SIGKILL
//!    teardown.
//! 5. **Manager layer** (`manager.rs`) - the registry of specs and
//!    connections, and the aggregate operations (`listAllTools`,
//!    `disconnectAll`, `initializeDefaultServers`) that fan out across
//!    every connected server.
//! 6. **Error layer** (`error.rs`) - the `McpError` taxonomy shared by
//!    every layer above.
//!
//! # Security Considerations
//!
//! - Secrets flow through `ServerSpec.env`/`ConnectOverrides.env`, never
//!   through argv or a config file committed to the repo.
//! - Every child is a fully separate OS process; a crash or hang in one
//!   server cannot block another.

pub mod connection;
pub mod error;
pub mod framing;
pub mod manager;
pub mod protocol;
pub mod spec;

pub use connection::{ChildConnection, ConnectionStatus};
pub use error::{McpError, Result};
pub use manager::{AggregateResult, ConnectOutcome, HealthSnapshot, Manager, ManagerStatus, ServerHealth};
pub use protocol::{CLIENT_NAME, CLIENT_VERSION, PROTOCOL_VERSION};
pub use spec::{ConnectOverrides, EffectiveSpec, ServerSpec};
