//! Function tools.
//!
//! Tools: function_list, function_get, function_create, function_update,
//! function_delete, function_get_code, function_update_code,
//! function_list_dependencies, function_add_dependencies,
//! function_remove_dependency, function_logs

use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};

use crate::convert::{
    encode_segment, get_id_arg, get_object_arg, get_optional_string, get_optional_string_array,
    get_optional_u64, get_segment_arg, get_string_arg, pick_fields, render,
};
use crate::error::{failed, McpError, Result};
use crate::schema;
use crate::session::McpSession;
use crate::tools::{ToolDef, ToolRegistry};

const DEFAULT_LANGUAGE: &str = "javascript";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const FUNCTION_FIELDS: &[&str] = &[
    "name",
    "description",
    "triggers",
    "timeout",
    "language",
    "env",
    "category",
];

/// Spica's numeric log levels, by name.
const LOG_LEVELS: &[(&str, u8)] = &[
    ("debug", 0),
    ("log", 1),
    ("info", 2),
    ("warn", 3),
    ("error", 4),
];

/// Register the function tools.
pub fn register(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolDef::new(
            "function_list",
            "List serverless functions.",
            schema!(object {}),
        ),
        list,
    )?;
    registry.register(
        ToolDef::new(
            "function_get",
            "Get one function's definition by id.",
            schema!(object {
                required: { "function_id": string }
            }),
        ),
        get,
    )?;
    registry.register(
        ToolDef::new(
            "function_create",
            "Create a function. triggers maps handler names to trigger definitions, e.g. \
             {\"default\": {\"type\": \"http\", \"active\": true, \"options\": {\"method\": \
             \"Get\", \"path\": \"/hello\", \"preflight\": true}}}. language defaults to \
             javascript and timeout to 60 seconds.",
            schema!(object {
                required: { "name": string, "triggers": object },
                optional: {
                    "description": string,
                    "language": string,
                    "timeout": count,
                    "env": object,
                    "category": string
                }
            }),
        ),
        create,
    )?;
    registry.register(
        ToolDef::new(
            "function_update",
            "Patch a function's definition with the given fields.",
            schema!(object {
                required: { "function_id": string },
                optional: {
                    "name": string,
                    "description": string,
                    "triggers": object,
                    "language": string,
                    "timeout": count,
                    "env": object,
                    "category": string
                }
            }),
        ),
        update,
    )?;
    registry.register(
        ToolDef::new(
            "function_delete",
            "Delete a function.",
            schema!(object {
                required: { "function_id": string }
            }),
        ),
        delete,
    )?;
    registry.register(
        ToolDef::new(
            "function_get_code",
            "Get a function's source code.",
            schema!(object {
                required: { "function_id": string }
            }),
        ),
        get_code,
    )?;
    registry.register(
        ToolDef::new(
            "function_update_code",
            "Replace a function's source code.",
            schema!(object {
                required: { "function_id": string, "code": string }
            }),
        ),
        update_code,
    )?;
    registry.register(
        ToolDef::new(
            "function_list_dependencies",
            "List the npm dependencies installed for a function.",
            schema!(object {
                required: { "function_id": string }
            }),
        ),
        list_dependencies,
    )?;
    registry.register(
        ToolDef::new(
            "function_add_dependencies",
            "Install npm packages for a function, e.g. [\"axios@1.6.0\", \"lodash\"].",
            schema!(object {
                required: { "function_id": string, "names": array_string }
            }),
        ),
        add_dependencies,
    )?;
    registry.register(
        ToolDef::new(
            "function_remove_dependency",
            "Uninstall an npm package from a function.",
            schema!(object {
                required: { "function_id": string, "name": string }
            }),
        ),
        remove_dependency,
    )?;
    registry.register(
        ToolDef::new(
            "function_logs",
            "Query function logs. Filter by function ids, levels, a begin/end time range \
             (ISO 8601), and free-text content; limit and skip paginate.",
            json!({
                "type": "object",
                "properties": {
                    "functions": {"type": "array", "items": {"type": "string"}},
                    "levels": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["debug", "log", "info", "warn", "error"]
                        }
                    },
                    "begin": {"type": "string", "description": "Start of the time range"},
                    "end": {"type": "string", "description": "End of the time range"},
                    "content": {"type": "string", "description": "Text the log line must contain"},
                    "limit": {"type": "integer", "minimum": 0},
                    "skip": {"type": "integer", "minimum": 0}
                },
                "required": []
            }),
        ),
        logs,
    )
}

async fn list(session: Arc<McpSession>, _args: Map<String, JsonValue>) -> Result<String> {
    let functions = session
        .client()
        .get("/function")
        .await
        .map_err(failed("list functions"))?;
    Ok(render("Functions:", &functions))
}

async fn get(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "function_id")?;
    let function = session
        .client()
        .get(&format!("/function/{}", encode_segment(&id)))
        .await
        .map_err(failed("get function"))?;
    Ok(render(&format!("Function {id}:"), &function))
}

async fn create(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let mut payload = json!({
        "name": get_string_arg(&args, "name")?,
        "description": get_optional_string(&args, "description").unwrap_or_default(),
        "triggers": get_object_arg(&args, "triggers")?,
        "language": get_optional_string(&args, "language")
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        "timeout": get_optional_u64(&args, "timeout").unwrap_or(DEFAULT_TIMEOUT_SECS),
    });
    for key in ["env", "category"] {
        if let Some(value) = args.get(key).filter(|v| !v.is_null()) {
            payload[key] = value.clone();
        }
    }
    let created = session
        .client()
        .post("/function", payload)
        .await
        .map_err(failed("create function"))?;
    Ok(render("Function created:", &created))
}

async fn update(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "function_id")?;
    let partial = pick_fields(&args, FUNCTION_FIELDS);
    if partial.is_empty() {
        return Err(McpError::InvalidArg {
            name: "function_id".to_string(),
            reason: "no fields to update were given".to_string(),
        });
    }
    let updated = session
        .client()
        .request(
            "patch",
            &format!("/function/{}", encode_segment(&id)),
            Some(JsonValue::Object(partial)),
        )
        .await
        .map_err(failed("update function"))?;
    Ok(render(&format!("Function {id} updated:"), &updated))
}

async fn delete(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "function_id")?;
    session
        .client()
        .delete(&format!("/function/{}", encode_segment(&id)))
        .await
        .map_err(failed("delete function"))?;
    Ok(format!("✅ Function {id} deleted successfully"))
}

async fn get_code(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "function_id")?;
    let response = session
        .client()
        .get(&format!("/function/{}/index", encode_segment(&id)))
        .await
        .map_err(failed("get function code"))?;
    match response.get("index").and_then(|v| v.as_str()) {
        Some(code) => Ok(format!("✅ Code of function {id}:\n{code}")),
        None => Ok(render(&format!("Code of function {id}:"), &response)),
    }
}

async fn update_code(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "function_id")?;
    let code = get_string_arg(&args, "code")?;
    session
        .client()
        .post(
            &format!("/function/{}/index", encode_segment(&id)),
            json!({ "index": code }),
        )
        .await
        .map_err(failed("update function code"))?;
    Ok(format!("✅ Code of function {id} updated successfully"))
}

async fn list_dependencies(
    session: Arc<McpSession>,
    args: Map<String, JsonValue>,
) -> Result<String> {
    let id = get_id_arg(&args, "function_id")?;
    let deps = session
        .client()
        .get(&format!("/function/{}/dependencies", encode_segment(&id)))
        .await
        .map_err(failed("list function dependencies"))?;
    Ok(render(&format!("Dependencies of function {id}:"), &deps))
}

async fn add_dependencies(
    session: Arc<McpSession>,
    args: Map<String, JsonValue>,
) -> Result<String> {
    let id = get_id_arg(&args, "function_id")?;
    let names = get_optional_string_array(&args, "names")?
        .filter(|n| !n.is_empty())
        .ok_or_else(|| McpError::MissingArg("names".to_string()))?;
    let response = session
        .client()
        .post(
            &format!("/function/{}/dependencies", encode_segment(&id)),
            json!({ "name": names }),
        )
        .await
        .map_err(failed("add function dependencies"))?;
    Ok(render(
        &format!("Installed {} for function {id}:", names.join(", ")),
        &response,
    ))
}

async fn remove_dependency(
    session: Arc<McpSession>,
    args: Map<String, JsonValue>,
) -> Result<String> {
    let id = get_id_arg(&args, "function_id")?;
    let name = get_segment_arg(&args, "name")?;
    session
        .client()
        .delete(&format!(
            "/function/{}/dependencies/{}",
            encode_segment(&id),
            encode_segment(&name)
        ))
        .await
        .map_err(failed("remove function dependency"))?;
    Ok(format!("✅ Dependency {name} removed from function {id}"))
}

/// Translate log filters into `/function-logs` query parameters.
pub fn logs_query(args: &Map<String, JsonValue>) -> Result<Vec<(String, String)>> {
    let mut query = Vec::new();
    for function in get_optional_string_array(args, "functions")?.unwrap_or_default() {
        query.push(("functions".to_string(), function));
    }
    for level in get_optional_string_array(args, "levels")?.unwrap_or_default() {
        let code = LOG_LEVELS
            .iter()
            .find(|(name, _)| *name == level)
            .map(|(_, code)| *code)
            .ok_or_else(|| McpError::InvalidArg {
                name: "levels".to_string(),
                reason: format!("unknown level '{level}'"),
            })?;
        query.push(("levels".to_string(), code.to_string()));
    }
    for key in ["begin", "end", "content"] {
        if let Some(value) = get_optional_string(args, key) {
            query.push((key.to_string(), value));
        }
    }
    for key in ["limit", "skip"] {
        if let Some(value) = get_optional_u64(args, key) {
            query.push((key.to_string(), value.to_string()));
        }
    }
    Ok(query)
}

async fn logs(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let query = logs_query(&args)?;
    let logs = session
        .client()
        .get_with_query("/function-logs", query)
        .await
        .map_err(failed("query function logs"))?;
    Ok(render("Function logs:", &logs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpMethod;
    use crate::testing::{session_with, RecordingTransport};

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register(&mut registry).unwrap();
        registry
    }

    fn args(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn update_issues_patch_with_partial_body() {
        let transport = Arc::new(RecordingTransport::new());
        registry()
            .invoke(
                session_with(transport.clone()),
                "function_update",
                args(json!({"function_id": "fn1", "timeout": 30})),
            )
            .await
            .unwrap();
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Patch);
        assert_eq!(sent[0].path, "/function/fn1");
        assert_eq!(sent[0].body, Some(json!({"timeout": 30})));
    }

    #[tokio::test]
    async fn update_without_fields_sends_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let out = registry()
            .invoke(
                session_with(transport.clone()),
                "function_update",
                args(json!({"function_id": "fn1"})),
            )
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let transport = Arc::new(RecordingTransport::new());
        let triggers = json!({"default": {"type": "http", "active": true, "options": {}}});
        registry()
            .invoke(
                session_with(transport.clone()),
                "function_create",
                args(json!({"name": "hello", "triggers": triggers})),
            )
            .await
            .unwrap();
        assert_eq!(
            transport.requests()[0].body,
            Some(json!({
                "name": "hello",
                "description": "",
                "triggers": triggers,
                "language": "javascript",
                "timeout": 60
            }))
        );
    }

    #[tokio::test]
    async fn code_round_trips_through_index() {
        let transport = Arc::new(RecordingTransport::new());
        transport.push_ok(json!({"index": "export default function() {}"}));
        let registry = registry();
        let session = session_with(transport.clone());

        let out = registry
            .invoke(session.clone(), "function_get_code", args(json!({"function_id": "fn1"})))
            .await
            .unwrap();
        assert!(out.text.ends_with("export default function() {}"));

        registry
            .invoke(
                session,
                "function_update_code",
                args(json!({"function_id": "fn1", "code": "export default () => 1"})),
            )
            .await
            .unwrap();
        let sent = transport.requests();
        assert_eq!(sent[1].method, HttpMethod::Post);
        assert_eq!(sent[1].path, "/function/fn1/index");
        assert_eq!(sent[1].body, Some(json!({"index": "export default () => 1"})));
    }

    #[tokio::test]
    async fn dependencies_add_and_remove() {
        let transport = Arc::new(RecordingTransport::new());
        let registry = registry();
        let session = session_with(transport.clone());

        registry
            .invoke(
                session.clone(),
                "function_add_dependencies",
                args(json!({"function_id": "fn1", "names": ["axios", "lodash@4"]})),
            )
            .await
            .unwrap();
        registry
            .invoke(
                session.clone(),
                "function_remove_dependency",
                args(json!({"function_id": "fn1", "name": "axios"})),
            )
            .await
            .unwrap();
        registry
            .invoke(
                session,
                "function_remove_dependency",
                args(json!({"function_id": "fn1", "name": "@types/node"})),
            )
            .await
            .unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].body, Some(json!({"name": ["axios", "lodash@4"]})));
        assert_eq!(sent[1].method, HttpMethod::Delete);
        assert_eq!(sent[1].path, "/function/fn1/dependencies/axios");
        assert_eq!(sent[2].path, "/function/fn1/dependencies/%40types%2Fnode");
    }

    #[tokio::test]
    async fn dot_dependency_name_is_rejected() {
        let transport = Arc::new(RecordingTransport::new());
        let out = registry()
            .invoke(
                session_with(transport.clone()),
                "function_remove_dependency",
                args(json!({"function_id": "fn1", "name": ".."})),
            )
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.text.contains("dot segment"));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn negative_timeout_is_rejected() {
        let transport = Arc::new(RecordingTransport::new());
        let err = registry()
            .invoke(
                session_with(transport.clone()),
                "function_update",
                args(json!({"function_id": "fn1", "timeout": -5})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("timeout"));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn logs_filters_become_query_parameters() {
        let query = logs_query(&args(json!({
            "functions": ["fn1", "fn2"],
            "levels": ["error", "warn"],
            "begin": "2024-01-01T00:00:00Z",
            "content": "timeout",
            "limit": 50
        })))
        .unwrap();
        assert_eq!(
            query,
            pairs(&[
                ("functions", "fn1"),
                ("functions", "fn2"),
                ("levels", "4"),
                ("levels", "3"),
                ("begin", "2024-01-01T00:00:00Z"),
                ("content", "timeout"),
                ("limit", "50"),
            ])
        );
    }

    #[tokio::test]
    async fn logs_reject_upper_case_level() {
        let transport = Arc::new(RecordingTransport::new());
        let err = registry()
            .invoke(
                session_with(transport.clone()),
                "function_logs",
                args(json!({"levels": ["WARN"]})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("levels[0]"));
        assert!(logs_query(&args(json!({"levels": ["WARN"]}))).is_err());
    }

    #[tokio::test]
    async fn logs_reject_unknown_level_in_schema() {
        let transport = Arc::new(RecordingTransport::new());
        let err = registry()
            .invoke(
                session_with(transport.clone()),
                "function_logs",
                args(json!({"levels": ["verbose"]})),
            )
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("levels[0]"));
        assert!(transport.requests().is_empty());
    }
}
