//! Manager
//!
//! Design Decision: one façade over two registries, each behind its own lock
//!
//! Rationale: the Manager's job is bookkeeping - which specs are known,
//! which names have a live connection - not protocol work, which
//! [`crate::mcp::connection::ChildConnection`] already owns. Keeping
//! `specs` and `connections` as separate `Mutex<HashMap<_>>`s (rather than
//! one lock guarding a combined struct) means a `listAllTools` fan-out can
//! clone the connection table once and then run every server's request
//! concurrently without holding any lock across an `.await`.
//!
//! Trade-offs:
//! - `std::sync::Mutex` over `tokio::sync::RwLock`: every critical section
//!   here is a map lookup/insert/remove, never an await, so a std mutex is
//!   both simpler and avoids an uncontested async-lock cost on every call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde_json::Value;
use tracing::{error, info, warn};

use crate::mcp::connection::{ChildConnection, ConnectionStatus};
use crate::mcp::error::{McpError, Result};
use crate::mcp::protocol::{ResourceDescriptor, ToolDescriptor};
use crate::mcp::spec::{ConnectOverrides, EffectiveSpec, ServerSpec};

/// Result of `connectServer`: connecting a name that already has a live
/// connection is not an error, per the design notes - it's reported back as
/// a no-op so callers can treat `connectServer` as idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    AlreadyConnected,
    Connected,
}

/// Outcome of a fan-out operation across every connected server. Per-server
/// failures never fail the whole aggregate; they're reported in `errors`
/// alongside whatever `ok` holds for that operation. `list_all_tools`/
/// `list_all_resources` also insert an empty list into `ok` for a failing
/// server, so a caller iterating `ok` alone still sees every live server;
/// `initialize_default_servers` only inserts into `ok` on an actual connect.
#[derive(Debug, Default)]
pub struct AggregateResult<T> {
    pub ok: HashMap<String, T>,
    pub errors: HashMap<String, String>,
}

/// A cheap, non-I/O snapshot used by the health endpoint and the binary's
/// startup/shutdown log lines.
#[derive(Debug, Clone)]
pub struct ManagerStatus {
    pub registered_servers: Vec<String>,
    pub connected_servers: Vec<String>,
}

/// Per-server line item in a [`HealthSnapshot`]. `tool_count` is only
/// populated for live connections - it's the result of an actual
/// `tools/list` round trip against the child, not a cached value.
#[derive(Debug, Clone)]
pub struct ServerHealth {
    pub name: String,
    pub description: String,
    pub auto_start: bool,
    pub connected: bool,
    /// `Some(n)` if `tools/list` succeeded against a live connection;
    /// `None` if the server isn't connected, or the call failed.
    pub tool_count: Option<usize>,
}

/// A point-in-time rollup across the whole registry, including a live
/// `tools/list` probe against every connected server. Overall `status` is
/// `"degraded"` if any connected server's probe failed, else `"healthy"`.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub registered_count: usize,
    pub connected_count: usize,
    pub servers: Vec<ServerHealth>,
}

/// Owns the registry of known server specs and the table of live
/// connections. Safe to share across tasks via `Arc`; every method takes
/// `&self`.
pub struct Manager {
    specs: StdMutex<HashMap<String, ServerSpec>>,
    connections: Arc<StdMutex<HashMap<String, Arc<ChildConnection>>>>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        Self {
            specs: StdMutex::new(HashMap::new()),
            connections: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Build a manager pre-loaded with the default registry: a filesystem
    /// server plus several blockchain-analytics subprocesses, all with
    /// `auto_start = false` until an operator opts in via configuration.
    /// The exact membership is a deployment detail, not part of the core
    /// contract - only that these names exist in `specs` after construction.
    ///
    /// `server_api_keys` overlays a per-server secret (e.g. `NODIT_API_KEY`
    /// read from the environment) into the matching spec's `env` at
    /// registration time, keyed by spec name. Names with no matching key are
    /// registered without one; a caller connects them later only if it
    /// supplies the key via `ConnectOverrides`.
    pub fn with_default_registry(server_api_keys: &HashMap<String, String>) -> Self {
        let manager = Self::new();
        let with_key = |spec: ServerSpec| {
            let mut spec = spec;
            if let Some(key) = server_api_keys.get(&spec.name) {
                spec = spec.with_env(format!("{}_API_KEY", spec.name.to_uppercase()), key.clone());
            }
            spec
        };

        manager.register_server(
            ServerSpec::new("filesystem", "npx")
                .with_args(["-y", "@modelcontextprotocol/server-filesystem", "."])
                .with_description("Local filesystem access for the working directory"),
        );
        manager.register_server(with_key(
            ServerSpec::new("nodit", "nodit-mcp")
                .with_description("Blockchain analytics via the Nodit MCP server"),
        ));
        manager.register_server(with_key(
            ServerSpec::new("etherscan", "etherscan-mcp")
                .with_description("Ethereum chain data and contract lookups via Etherscan"),
        ));
        manager.register_server(with_key(
            ServerSpec::new("dune", "dune-mcp")
                .with_description("On-chain analytics queries via Dune"),
        ));
        manager
    }

    /// Register (or overwrite) a named spec. Overwriting a name with a live
    /// connection does not affect that connection - the new spec only takes
    /// effect on the next `connectServer` for that name.
    pub fn register_server(&self, spec: ServerSpec) {
        self.specs.lock().unwrap().insert(spec.name.clone(), spec);
    }

    pub fn unregister_server(&self, name: &str) {
        self.specs.lock().unwrap().remove(name);
    }

    /// Spawn and hand-shake the named server, applying `overrides` for this
    /// call only. Connecting an already-connected name is a no-op, reported
    /// via [`ConnectOutcome::AlreadyConnected`], not an error.
    pub async fn connect_server(
        &self,
        name: &str,
        overrides: Option<ConnectOverrides>,
    ) -> Result<ConnectOutcome> {
        if self.connections.lock().unwrap().contains_key(name) {
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        let spec = self
            .specs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::SpecUnknown(name.to_string()))?;

        let effective = EffectiveSpec::compose(&spec, overrides.as_ref());
        let (connection, disconnected_rx) = ChildConnection::connect(&effective).await?;

        self.connections
            .lock()
            .unwrap()
            .insert(name.to_string(), connection);

        let connections = self.connections.clone();
        let watched_name = name.to_string();
        tokio::spawn(async move {
            let _ = disconnected_rx.await;
            connections.lock().unwrap().remove(&watched_name);
            info!(server = %watched_name, "connection removed from registry after disconnect");
        });

        Ok(ConnectOutcome::Connected)
    }

    /// Disconnect a single server. Unlike `connectServer`, a name with no
    /// live connection IS an error here - there is nothing to disconnect.
    ///
    /// `connection.disconnect()` never fails the caller (graceful shutdown
    /// is best-effort), but this always removes `name` from `connections`
    /// before returning, so the registry reflects the disconnect immediately
    /// rather than waiting on the connection's own `disconnected` watcher.
    pub async fn disconnect_server(&self, name: &str) -> Result<()> {
        let connection = self
            .connections
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::NotConnected(name.to_string()))?;

        connection.disconnect().await;
        self.connections.lock().unwrap().remove(name);
        Ok(())
    }

    fn connection(&self, name: &str) -> Result<Arc<ChildConnection>> {
        self.connections
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| McpError::NotConnected(name.to_string()))
    }

    pub async fn list_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>> {
        Ok(self.connection(server)?.list_tools().await?.tools)
    }

    pub async fn call_tool(&self, server: &str, tool: &str, arguments: Option<Value>) -> Result<Value> {
        self.connection(server)?.call_tool(tool, arguments).await
    }

    pub async fn list_resources(&self, server: &str) -> Result<Vec<ResourceDescriptor>> {
        Ok(self.connection(server)?.list_resources().await?.resources)
    }

    pub async fn read_resource(&self, server: &str, uri: &str) -> Result<Value> {
        self.connection(server)?.read_resource(uri).await
    }

    /// Fan out `tools/list` to every connected server concurrently. A
    /// server that errors is still present in `ok` (as an empty list) so a
    /// caller iterating the primary mapping sees every live server; the
    /// failure detail goes into `errors` alongside it.
    pub async fn list_all_tools(&self) -> AggregateResult<Vec<ToolDescriptor>> {
        let connections: Vec<_> = self
            .connections
            .lock()
            .unwrap()
            .iter()
            .map(|(name, conn)| (name.clone(), conn.clone()))
            .collect();

        let futures = connections.into_iter().map(|(name, conn)| async move {
            let result = conn.list_tools().await.map(|r| r.tools);
            (name, result)
        });

        let results = futures::future::join_all(futures).await;
        let mut aggregate = AggregateResult::default();
        for (name, result) in results {
            match result {
                Ok(tools) => {
                    aggregate.ok.insert(name, tools);
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "listAllTools: server failed, recording empty list");
                    aggregate.errors.insert(name.clone(), e.to_string());
                    aggregate.ok.insert(name, Vec::new());
                }
            }
        }
        aggregate
    }

    /// Fan out `resources/list` the same way `list_all_tools` fans out
    /// `tools/list`: a failing server still gets an empty-list entry in
    /// `ok`, with the failure recorded in `errors`.
    pub async fn list_all_resources(&self) -> AggregateResult<Vec<ResourceDescriptor>> {
        let connections: Vec<_> = self
            .connections
            .lock()
            .unwrap()
            .iter()
            .map(|(name, conn)| (name.clone(), conn.clone()))
            .collect();

        let futures = connections.into_iter().map(|(name, conn)| async move {
            let result = conn.list_resources().await.map(|r| r.resources);
            (name, result)
        });

        let results = futures::future::join_all(futures).await;
        let mut aggregate = AggregateResult::default();
        for (name, result) in results {
            match result {
                Ok(resources) => {
                    aggregate.ok.insert(name, resources);
                }
                Err(e) => {
                    warn!(server = %name, error = %e, "listAllResources: server failed, recording empty list");
                    aggregate.errors.insert(name.clone(), e.to_string());
                    aggregate.ok.insert(name, Vec::new());
                }
            }
        }
        aggregate
    }

    /// Best-effort teardown of every live connection, in parallel. Errors
    /// during individual shutdowns are logged, never propagated - this is
    /// meant to be safe to call unconditionally from a ctrl-c handler.
    /// A second call against an already-empty registry is a no-op.
    pub async fn disconnect_all(&self) {
        let names: Vec<String> = self.connections.lock().unwrap().keys().cloned().collect();

        let futures = names
            .into_iter()
            .map(|name| async move { self.disconnect_server(&name).await });
        futures::future::join_all(futures).await;
    }

    /// Connect every registered server whose spec has `auto_start = true`,
    /// in parallel, swallowing per-server failures.
    pub async fn initialize_default_servers(&self) -> AggregateResult<()> {
        let to_start: Vec<String> = self
            .specs
            .lock()
            .unwrap()
            .values()
            .filter(|spec| spec.auto_start)
            .map(|spec| spec.name.clone())
            .collect();

        let mut aggregate = AggregateResult::default();
        for name in to_start {
            match self.connect_server(&name, None).await {
                Ok(_) => {
                    aggregate.ok.insert(name, ());
                }
                Err(e) => {
                    error!(server = %name, error = %e, "auto-start failed");
                    aggregate.errors.insert(name, e.to_string());
                }
            }
        }
        aggregate
    }

    pub fn connection_status(&self, name: &str) -> Result<ConnectionStatus> {
        Ok(self.connection(name)?.status())
    }

    /// Cheap registry snapshot, no I/O against any child.
    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            registered_servers: self.specs.lock().unwrap().keys().cloned().collect(),
            connected_servers: self.connections.lock().unwrap().keys().cloned().collect(),
        }
    }

    /// Probe every live connection with `tools/list` and roll the results up
    /// alongside the registry. A probe failure degrades the overall status
    /// but never fails this call - same resilience policy as
    /// `listAllTools`.
    pub async fn health_check(&self) -> HealthSnapshot {
        let specs = self.specs.lock().unwrap().clone();
        let connections: HashMap<String, Arc<ChildConnection>> =
            self.connections.lock().unwrap().clone();

        let probes = connections.iter().map(|(name, conn)| {
            let name = name.clone();
            async move { (name, conn.list_tools().await.map(|r| r.tools.len())) }
        });
        let probe_results: HashMap<String, Result<usize>> =
            futures::future::join_all(probes).await.into_iter().collect();

        let mut any_probe_failed = false;
        let mut servers: Vec<ServerHealth> = specs
            .values()
            .map(|spec| {
                let connected = connections.contains_key(&spec.name);
                let tool_count = match probe_results.get(&spec.name) {
                    Some(Ok(n)) => Some(*n),
                    Some(Err(_)) => {
                        any_probe_failed = true;
                        None
                    }
                    None => None,
                };
                ServerHealth {
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    auto_start: spec.auto_start,
                    connected,
                    tool_count,
                }
            })
            .collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));

        HealthSnapshot {
            status: if any_probe_failed { "degraded" } else { "healthy" },
            registered_count: specs.len(),
            connected_count: connections.len(),
            servers,
        }
    }
}
