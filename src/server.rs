//! MCP server over stdio.
//!
//! Reads newline-delimited JSON-RPC 2.0 messages from stdin and writes one
//! response line per request to stdout. Requests are handled one at a time.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::{McpError, Result};
use crate::session::McpSession;
use crate::tools::ToolRegistry;

/// MCP protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const SERVER_NAME: &str = "spica-mcp";

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 request. A request without `id` is a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol tag, expected to be `"2.0"`
    #[serde(default)]
    pub jsonrpc: String,
    /// Request id, echoed in the response
    #[serde(default)]
    pub id: Option<JsonValue>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: JsonValue,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`
    pub jsonrpc: &'static str,
    /// Id of the request answered, `null` when it could not be read
    pub id: JsonValue,
    /// Result on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// Error on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Human-readable message
    pub message: String,
    /// Structured details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

impl JsonRpcResponse {
    /// A successful response.
    pub fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    /// An error response.
    pub fn error(id: JsonValue, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// MCP server dispatching tool calls to a [`ToolRegistry`].
pub struct McpServer {
    registry: ToolRegistry,
    session: Arc<McpSession>,
}

impl McpServer {
    /// Create a server over a populated registry.
    pub fn new(registry: ToolRegistry, session: McpSession) -> Self {
        Self {
            registry,
            session: Arc::new(session),
        }
    }

    /// Serve stdin until EOF.
    pub async fn run(&self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        info!(tools = self.registry.len(), "MCP server listening on stdio");
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                stdout.write_all(response.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }
        info!("stdin closed, shutting down");
        Ok(())
    }

    /// Handle one raw message line, returning the serialized response if any.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let response = match serde_json::from_str::<JsonValue>(line) {
            Err(e) => {
                warn!(error = %e, "unparseable message");
                Some(JsonRpcResponse::error(
                    JsonValue::Null,
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {e}")),
                ))
            }
            Ok(value) => self.handle_value(value).await,
        }?;
        match serde_json::to_string(&response) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "failed to serialize response");
                None
            }
        }
    }

    async fn handle_value(&self, value: JsonValue) -> Option<JsonRpcResponse> {
        let id = value.get("id").cloned().unwrap_or(JsonValue::Null);
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => Some(JsonRpcResponse::error(
                id,
                JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {e}")),
            )),
        }
    }

    /// Dispatch a decoded request. Notifications get no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            debug!(method = %request.method, "notification");
            return None;
        };
        debug!(method = %request.method, "request");

        let result = match request.method.as_str() {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(request.params).await,
            other => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        };
        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn initialize_payload(&self) -> JsonValue {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false }
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn tools_list_payload(&self) -> JsonValue {
        json!({ "tools": self.registry.tools() })
    }

    async fn handle_tools_call(
        &self,
        params: JsonValue,
    ) -> std::result::Result<JsonValue, JsonRpcError> {
        let name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                JsonRpcError::new(INVALID_PARAMS, "tools/call requires string field 'name'")
            })?;
        let args = match params.get("arguments") {
            Some(JsonValue::Object(map)) => map.clone(),
            Some(JsonValue::Null) | None => Map::new(),
            Some(_) => {
                return Err(JsonRpcError::new(
                    INVALID_PARAMS,
                    "tools/call 'arguments' must be an object",
                )
                .with_data(json!({ "tool": name })))
            }
        };

        match self.registry.invoke(self.session.clone(), name, args).await {
            Ok(output) => Ok(output.to_call_result()),
            Err(e) => Err(call_error(name, &e)),
        }
    }
}

fn call_error(tool: &str, err: &McpError) -> JsonRpcError {
    match err {
        McpError::UnknownTool(_) => {
            JsonRpcError::new(INVALID_PARAMS, err.to_string()).with_data(json!({ "tool": tool }))
        }
        e if e.is_validation() => JsonRpcError::new(INVALID_PARAMS, e.to_string())
            .with_data(json!({ "tool": tool, "field": e.field() })),
        e => JsonRpcError::new(INTERNAL_ERROR, e.to_string()).with_data(json!({ "tool": tool })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;

    fn server() -> (McpServer, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let session = McpSession::with_parts(transport.clone(), None);
        (
            McpServer::new(ToolRegistry::standard().unwrap(), session),
            transport,
        )
    }

    async fn call(server: &McpServer, line: &str) -> JsonValue {
        let out = server.handle_line(line).await.unwrap();
        serde_json::from_str(&out).unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let (server, _) = server();
        let resp = call(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )
        .await;
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(resp["result"]["serverInfo"]["name"], "spica-mcp");
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_uses_input_schema_key() {
        let (server, _) = server();
        let resp = call(&server, r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#).await;
        let tools = resp["result"]["tools"].as_array().unwrap();
        let bucket_get = tools.iter().find(|t| t["name"] == "bucket_get").unwrap();
        assert_eq!(bucket_get["inputSchema"]["required"], json!(["bucket_id"]));
    }

    #[tokio::test]
    async fn validation_failure_is_invalid_params() {
        let (server, transport) = server();
        let resp = call(
            &server,
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"bucket_get","arguments":{}}}"#,
        )
        .await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
        assert_eq!(resp["error"]["data"]["tool"], "bucket_get");
        assert_eq!(resp["error"]["data"]["field"], "bucket_id");
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_params() {
        let (server, _) = server();
        let resp = call(
            &server,
            r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"bucket_explode"}}"#,
        )
        .await;
        assert_eq!(resp["error"]["code"], INVALID_PARAMS);
        assert_eq!(resp["error"]["data"]["tool"], "bucket_explode");
    }

    #[tokio::test]
    async fn tool_call_wraps_text_content() {
        let (server, transport) = server();
        transport.push_ok(json!([{"_id": "b1", "title": "Posts"}]));
        let resp = call(
            &server,
            r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"bucket_list"}}"#,
        )
        .await;
        assert_eq!(resp["result"]["isError"], false);
        assert_eq!(resp["result"]["content"][0]["type"], "text");
        assert!(resp["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Posts"));
    }

    #[tokio::test]
    async fn repeated_delete_surfaces_remote_error() {
        let (server, transport) = server();
        transport.push_ok(JsonValue::Null);
        transport.push_err(crate::error::RequestError::Remote {
            status: 404,
            message: "{\n  \"message\": \"Not Found\"\n}".to_string(),
        });
        let line = r#"{"jsonrpc":"2.0","id":10,"method":"tools/call","params":{"name":"bucket_delete","arguments":{"bucket_id":"b1"}}}"#;

        let first = call(&server, line).await;
        assert_eq!(first["result"]["isError"], false);
        let second = call(&server, line).await;
        assert_eq!(second["result"]["isError"], true);
        let text = second["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.starts_with("❌ Failed to delete bucket:"));
        assert!(text.contains("Not Found"));
    }

    #[tokio::test]
    async fn protocol_errors() {
        let (server, _) = server();
        let resp = call(&server, "{not json").await;
        assert_eq!(resp["error"]["code"], PARSE_ERROR);
        assert_eq!(resp["id"], JsonValue::Null);

        let resp = call(&server, r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#).await;
        assert_eq!(resp["error"]["code"], METHOD_NOT_FOUND);

        let resp = call(&server, r#"{"jsonrpc":"2.0","id":3}"#).await;
        assert_eq!(resp["error"]["code"], INVALID_REQUEST);
        assert_eq!(resp["id"], 3);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let (server, _) = server();
        assert!(server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await
            .is_none());
    }
}
