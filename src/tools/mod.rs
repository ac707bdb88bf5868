//! Tool registry and dispatch.
//!
//! Each resource group registers its tools as `{definition, handler}` records.
//! The registry rejects duplicate names, validates arguments against each
//! tool's input schema before the handler runs, and turns handler errors and
//! panics into failure text so one bad call never takes the server down.

pub mod apikey;
pub mod bucket;
pub mod bucket_data;
pub mod docs;
pub mod function;
pub mod identity;
pub mod policy;

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::{error, info};

use crate::error::{McpError, Result};
use crate::session::McpSession;

/// A tool definition for the MCP tools/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool name (e.g., "bucket_create")
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for the input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonValue,
}

impl ToolDef {
    /// Create a new tool definition.
    pub fn new(name: &str, description: &str, input_schema: JsonValue) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// Text produced by one tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Human-readable result
    pub text: String,
    /// Whether the call failed
    pub is_error: bool,
}

impl ToolOutput {
    /// A successful result.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    /// A failed result.
    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    /// MCP `tools/call` result payload.
    pub fn to_call_result(&self) -> JsonValue {
        serde_json::json!({
            "content": [{ "type": "text", "text": self.text }],
            "isError": self.is_error,
        })
    }
}

/// Boxed future returned by tool handlers.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;

type ToolHandler = Arc<dyn Fn(Arc<McpSession>, Map<String, JsonValue>) -> ToolFuture + Send + Sync>;

struct RegisteredTool {
    def: ToolDef,
    handler: ToolHandler,
}

/// Registry of available MCP tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every Spica and documentation tool.
    pub fn standard() -> Result<Self> {
        let mut registry = Self::new();
        bucket::register(&mut registry)?;
        bucket_data::register(&mut registry)?;
        identity::register(&mut registry)?;
        apikey::register(&mut registry)?;
        policy::register(&mut registry)?;
        function::register(&mut registry)?;
        docs::register(&mut registry)?;
        Ok(registry)
    }

    /// Register a tool. Fails if the name is taken.
    pub fn register<F, Fut>(&mut self, def: ToolDef, handler: F) -> Result<()>
    where
        F: Fn(Arc<McpSession>, Map<String, JsonValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        if self.tools.contains_key(&def.name) {
            return Err(McpError::DuplicateTool(def.name));
        }
        let handler: ToolHandler = Arc::new(move |session, args| Box::pin(handler(session, args)));
        self.tools
            .insert(def.name.clone(), RegisteredTool { def, handler });
        Ok(())
    }

    /// Get all tool definitions, ordered by name.
    pub fn tools(&self) -> Vec<&ToolDef> {
        self.tools.values().map(|t| &t.def).collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check if a tool exists by name.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Validate arguments and run a tool.
    ///
    /// Unknown tools and schema violations come back as `Err` without the
    /// handler running. Everything that happens inside the handler, including
    /// a panic, comes back as a [`ToolOutput`].
    pub async fn invoke(
        &self,
        session: Arc<McpSession>,
        name: &str,
        args: Map<String, JsonValue>,
    ) -> Result<ToolOutput> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;
        validate_args(&tool.def.input_schema, &args)?;

        info!(tool = name, "tool call");
        let future = (tool.handler)(session, args);
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(text)) => Ok(ToolOutput::success(text)),
            Ok(Err(e)) => {
                info!(tool = name, error = %e, "tool failed");
                Ok(ToolOutput::failure(format!("❌ {e}")))
            }
            Err(_) => {
                error!(tool = name, "tool handler panicked");
                Ok(ToolOutput::failure(format!(
                    "❌ Tool '{name}' failed unexpectedly"
                )))
            }
        }
    }
}

/// Check `args` against the subset of JSON Schema the tool definitions use:
/// `required`, per-property `type`, `minimum`, `enum` and array `items`.
///
/// A `null` value counts as absent. Extra keys are allowed.
pub fn validate_args(schema: &JsonValue, args: &Map<String, JsonValue>) -> Result<()> {
    if let Some(required) = schema.get("required").and_then(|v| v.as_array()) {
        for name in required.iter().filter_map(|v| v.as_str()) {
            match args.get(name) {
                None | Some(JsonValue::Null) => return Err(McpError::MissingArg(name.to_string())),
                Some(_) => {}
            }
        }
    }

    let Some(props) = schema.get("properties").and_then(|v| v.as_object()) else {
        return Ok(());
    };
    for (name, value) in args {
        if value.is_null() {
            continue;
        }
        if let Some(prop) = props.get(name) {
            check_value(name, prop, value)?;
        }
    }
    Ok(())
}

fn check_value(name: &str, prop: &JsonValue, value: &JsonValue) -> Result<()> {
    if let Some(ty) = prop.get("type").and_then(|v| v.as_str()) {
        if !type_matches(ty, value) {
            return Err(McpError::InvalidArg {
                name: name.to_string(),
                reason: format!("expected {ty}"),
            });
        }
    }

    if let (Some(min), Some(n)) = (
        prop.get("minimum").and_then(|v| v.as_f64()),
        value.as_f64(),
    ) {
        if n < min {
            return Err(McpError::InvalidArg {
                name: name.to_string(),
                reason: format!("must be at least {min}"),
            });
        }
    }

    if let Some(allowed) = prop.get("enum").and_then(|v| v.as_array()) {
        if !allowed.contains(value) {
            return Err(McpError::InvalidArg {
                name: name.to_string(),
                reason: format!("must be one of {}", JsonValue::Array(allowed.clone())),
            });
        }
    }

    if let (Some(items), Some(arr)) = (prop.get("items"), value.as_array()) {
        for (i, item) in arr.iter().enumerate() {
            check_value(&format!("{name}[{i}]"), items, item)?;
        }
    }
    Ok(())
}

fn type_matches(ty: &str, value: &JsonValue) -> bool {
    match ty {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Helper macro for creating JSON Schema for tool input parameters.
#[macro_export]
macro_rules! schema {
    // Object with required and optional properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? },
        optional: { $($opt_name:literal : $opt_type:tt),* $(,)? }
    }) => {{
        let mut required: Vec<&str> = Vec::new();
        $(required.push($req_name);)*

        let mut props = serde_json::Map::new();
        $(props.insert($req_name.to_string(), $crate::schema!(@type $req_type));)*
        $(props.insert($opt_name.to_string(), $crate::schema!(@type $opt_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }};

    // Object with only required properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? }
    }) => {{
        let mut required: Vec<&str> = Vec::new();
        $(required.push($req_name);)*

        let mut props = serde_json::Map::new();
        $(props.insert($req_name.to_string(), $crate::schema!(@type $req_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }};

    // Object with only optional properties
    (object {
        optional: { $($opt_name:literal : $opt_type:tt),* $(,)? }
    }) => {{
        let mut props = serde_json::Map::new();
        $(props.insert($opt_name.to_string(), $crate::schema!(@type $opt_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": []
        })
    }};

    // Empty object (no parameters)
    (object {}) => {{
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }};

    // Type mappings
    (@type string) => { serde_json::json!({"type": "string"}) };
    (@type number) => { serde_json::json!({"type": "number"}) };
    (@type integer) => { serde_json::json!({"type": "integer"}) };
    (@type count) => { serde_json::json!({"type": "integer", "minimum": 0}) };
    (@type boolean) => { serde_json::json!({"type": "boolean"}) };
    (@type object) => { serde_json::json!({"type": "object"}) };
    (@type any) => { serde_json::json!({}) };
    (@type array_string) => { serde_json::json!({"type": "array", "items": {"type": "string"}}) };
    (@type array_object) => { serde_json::json!({"type": "array", "items": {"type": "object"}}) };
}
