// Library interface for the MCP subprocess multiplexer.
// Exposes the Manager and its supporting types so the binary entry point
// and integration tests can drive them without re-implementing wiring.

pub mod config;
pub mod logging;
pub mod mcp;

pub use config::Settings;
pub use mcp::{
    AggregateResult, ChildConnection, ConnectOutcome, ConnectOverrides, ConnectionStatus,
    EffectiveSpec, HealthSnapshot, Manager, ManagerStatus, McpError, ServerHealth, ServerSpec,
};
