//! MCP Protocol Types
//!
//! Design Decision: Type-safe MCP protocol message structures
//!
//! Rationale: MCP defines specific message formats for initialization, tool discovery,
//! tool execution, and resource access. Typed structures give compile-time correctness
//! for the envelope fields while leaving `params`/`result` payloads opaque, per the
//! core's contract of passing tool and resource arguments through verbatim.
//!
//! MCP Protocol Reference:
//! - Specification: https://spec.modelcontextprotocol.io/specification/2024-11-05/
//! - Version: 2024-11-05 (the only version this client speaks)
//!
//! Extension Points:
//! - Add Prompts support (prompts/list, prompts/get)
//! - Add Sampling support for server-initiated LLM calls

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The MCP protocol version this client implements and advertises during the
/// `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// The `clientInfo.name` this client advertises during `initialize`.
pub const CLIENT_NAME: &str = "mcp-railway-service";

/// The `clientInfo.version` this client advertises during `initialize`.
pub const CLIENT_VERSION: &str = "1.0.0";

/// A single JSON-RPC 2.0 envelope as read off a child's stdout.
///
/// MCP messages are framed one per line, and a line may be a response to a
/// request we sent (`id` set, `result` or `error` set), or a server-initiated
/// notification (`id` absent, `method` set). This type captures the union so
/// the framing layer can dispatch on shape without a fallible deserialize per
/// candidate type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// An outgoing JSON-RPC 2.0 request. Always carries an `id`; contrast with
/// [`JsonRpcNotification`], which never does.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: RequestId::Number(id),
            method: method.into(),
            params,
        }
    }
}

/// An outgoing JSON-RPC 2.0 notification. No `id` field is serialized, which
/// signals to the child that no response is expected.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 request/response identifier. MCP servers in the wild emit
/// both numeric and string IDs; the core always issues numeric ones but must
/// accept either shape when matching a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

/// JSON-RPC 2.0 error object, carried verbatim in [`JsonRpcMessage::error`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Parameters for the `initialize` request.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ClientCapabilities,
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Result of a successful `initialize` response.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// A single entry from `tools/list`. `input_schema` is passed through
/// opaquely - the core does not validate tool arguments against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolListResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

/// A single entry from `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceListResult {
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_number_serializes_bare() {
        let json = serde_json::to_string(&RequestId::Number(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn request_id_untagged_roundtrips_either_shape() {
        let msg: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"abc","result":1}"#).unwrap();
        assert_eq!(msg.id, Some(RequestId::String("abc".into())));
    }

    #[test]
    fn notification_omits_id_field() {
        let n = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_value(&n).unwrap();
        assert!(json.get("id").is_none());
    }

    #[test]
    fn message_with_error_parses() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"unknown tool"}}"#;
        let msg: JsonRpcMessage = serde_json::from_str(json).unwrap();
        let err = msg.error.unwrap();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message, "unknown tool");
        assert!(msg.result.is_none());
    }

    #[test]
    fn notification_message_has_method_and_no_id() {
        let json = r#"{"jsonrpc":"2.0","method":"tools/list_changed"}"#;
        let msg: JsonRpcMessage = serde_json::from_str(json).unwrap();
        assert!(msg.id.is_none());
        assert_eq!(msg.method.as_deref(), Some("tools/list_changed"));
    }

    #[test]
    fn tool_descriptor_deserializes() {
        let json = r#"{"name":"read_file","description":"reads a file","inputSchema":{"type":"object"}}"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "read_file");
        assert!(tool.input_schema.is_object());
    }
}
