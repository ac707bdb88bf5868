//! API key tools.
//!
//! Tools: apikey_list, apikey_get, apikey_create, apikey_update, apikey_delete,
//! apikey_attach_policy, apikey_detach_policy

use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};
use tracing::warn;

use crate::convert::{
    encode_segment, get_id_arg, get_optional_bool, get_optional_string,
    get_optional_string_array, get_string_arg, pagination_query, pick_fields, render,
    to_pretty_json,
};
use crate::error::{failed, Result};
use crate::schema;
use crate::session::McpSession;
use crate::tools::{ToolDef, ToolRegistry};

const APIKEY_FIELDS: &[&str] = &["name", "description", "active"];

/// Register the API key tools.
pub fn register(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolDef::new(
            "apikey_list",
            "List API keys.",
            schema!(object {
                optional: { "limit": count, "skip": count }
            }),
        ),
        list,
    )?;
    registry.register(
        ToolDef::new(
            "apikey_get",
            "Get one API key by id.",
            schema!(object {
                required: { "apikey_id": string }
            }),
        ),
        get,
    )?;
    registry.register(
        ToolDef::new(
            "apikey_create",
            "Create an API key. policies lists policy ids attached one by one after the \
             key exists; attachment stops at the first failure and the key is kept.",
            schema!(object {
                required: { "name": string },
                optional: { "description": string, "active": boolean, "policies": array_string }
            }),
        ),
        create,
    )?;
    registry.register(
        ToolDef::new(
            "apikey_update",
            "Update an API key. Fetches it, overwrites the given fields and writes the \
             whole key back.",
            schema!(object {
                required: { "apikey_id": string },
                optional: { "name": string, "description": string, "active": boolean }
            }),
        ),
        update,
    )?;
    registry.register(
        ToolDef::new(
            "apikey_delete",
            "Delete an API key.",
            schema!(object {
                required: { "apikey_id": string }
            }),
        ),
        delete,
    )?;
    registry.register(
        ToolDef::new(
            "apikey_attach_policy",
            "Attach a policy to an API key.",
            schema!(object {
                required: { "apikey_id": string, "policy_id": string }
            }),
        ),
        attach_policy,
    )?;
    registry.register(
        ToolDef::new(
            "apikey_detach_policy",
            "Detach a policy from an API key.",
            schema!(object {
                required: { "apikey_id": string, "policy_id": string }
            }),
        ),
        detach_policy,
    )
}

fn policy_path(apikey_id: &str, policy_id: &str) -> String {
    format!(
        "/passport/apikey/{}/policy/{}",
        encode_segment(apikey_id),
        encode_segment(policy_id)
    )
}

async fn list(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let keys = session
        .client()
        .get_with_query("/passport/apikey", pagination_query(&args))
        .await
        .map_err(failed("list API keys"))?;
    Ok(render("API keys:", &keys))
}

async fn get(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "apikey_id")?;
    let key = session
        .client()
        .get(&format!("/passport/apikey/{}", encode_segment(&id)))
        .await
        .map_err(failed("get API key"))?;
    Ok(render(&format!("API key {id}:"), &key))
}

async fn create(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let mut payload = json!({
        "name": get_string_arg(&args, "name")?,
        "active": get_optional_bool(&args, "active").unwrap_or(true),
    });
    if let Some(description) = get_optional_string(&args, "description") {
        payload["description"] = json!(description);
    }
    let policies = get_optional_string_array(&args, "policies")?.unwrap_or_default();

    let client = session.client();
    let created = client
        .post("/passport/apikey", payload)
        .await
        .map_err(failed("create API key"))?;

    if policies.is_empty() {
        return Ok(render("API key created:", &created));
    }

    let Some(key_id) = created.get("_id").and_then(|v| v.as_str()) else {
        return Ok(format!(
            "⚠️ API key created but no _id was returned, so no policies were attached:\n{}",
            to_pretty_json(&created)
        ));
    };

    let mut attached: Vec<&str> = Vec::new();
    for policy_id in &policies {
        if let Err(e) = client.put(&policy_path(key_id, policy_id), None).await {
            warn!(apikey = key_id, policy = %policy_id, error = %e, "policy attachment failed");
            let done = if attached.is_empty() {
                "none".to_string()
            } else {
                attached.join(", ")
            };
            return Ok(format!(
                "⚠️ API key {key_id} created, but attaching policy {policy_id} failed: {e}\n\
                 Policies attached: {done}\n{}",
                to_pretty_json(&created)
            ));
        }
        attached.push(policy_id);
    }

    Ok(format!(
        "✅ API key {key_id} created with policies: {}\n{}",
        attached.join(", "),
        to_pretty_json(&created)
    ))
}

async fn update(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "apikey_id")?;
    let partial = pick_fields(&args, APIKEY_FIELDS);
    let updated = session
        .client()
        .update_merged(
            &format!("/passport/apikey/{}", encode_segment(&id)),
            "_id",
            &id,
            partial,
        )
        .await
        .map_err(failed("update API key"))?;
    Ok(render(&format!("API key {id} updated:"), &updated))
}

async fn delete(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "apikey_id")?;
    session
        .client()
        .delete(&format!("/passport/apikey/{}", encode_segment(&id)))
        .await
        .map_err(failed("delete API key"))?;
    Ok(format!("✅ API key {id} deleted successfully"))
}

async fn attach_policy(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let key_id = get_id_arg(&args, "apikey_id")?;
    let policy_id = get_id_arg(&args, "policy_id")?;
    session
        .client()
        .put(&policy_path(&key_id, &policy_id), None)
        .await
        .map_err(failed("attach policy"))?;
    Ok(format!(
        "✅ Policy {policy_id} attached to API key {key_id}"
    ))
}

async fn detach_policy(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let key_id = get_id_arg(&args, "apikey_id")?;
    let policy_id = get_id_arg(&args, "policy_id")?;
    session
        .client()
        .delete(&policy_path(&key_id, &policy_id))
        .await
        .map_err(failed("detach policy"))?;
    Ok(format!(
        "✅ Policy {policy_id} detached from API key {key_id}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpMethod;
    use crate::error::RequestError;
    use crate::testing::{session_with, RecordingTransport};

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        register(&mut registry).unwrap();
        registry
    }

    fn args(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn first_failed_attachment_stops_the_sequence() {
        let transport = Arc::new(RecordingTransport::new());
        transport.push_ok(json!({"_id": "k1", "name": "ci", "key": "secret"}));
        transport.push_err(RequestError::Remote {
            status: 404,
            message: "policy not found".to_string(),
        });

        let out = registry()
            .invoke(
                session_with(transport.clone()),
                "apikey_create",
                args(json!({"name": "ci", "policies": ["p-bad", "p-good"]})),
            )
            .await
            .unwrap();

        assert!(!out.is_error);
        assert!(out.text.contains("attaching policy p-bad failed"));
        assert!(!out.text.contains("p-good"));
        assert!(out.text.contains("Policies attached: none"));

        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[0].body, Some(json!({"name": "ci", "active": true})));
        assert_eq!(sent[1].method, HttpMethod::Put);
        assert_eq!(sent[1].path, "/passport/apikey/k1/policy/p-bad");
    }

    #[tokio::test]
    async fn attaches_every_policy_in_order() {
        let transport = Arc::new(RecordingTransport::new());
        transport.push_ok(json!({"_id": "k1"}));
        let out = registry()
            .invoke(
                session_with(transport.clone()),
                "apikey_create",
                args(json!({"name": "ci", "policies": ["p1", "p2"]})),
            )
            .await
            .unwrap();
        assert!(out.text.starts_with("✅ API key k1 created with policies: p1, p2"));

        let paths: Vec<String> = transport.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(
            paths,
            vec![
                "/passport/apikey",
                "/passport/apikey/k1/policy/p1",
                "/passport/apikey/k1/policy/p2"
            ]
        );
    }

    #[tokio::test]
    async fn failed_creation_reports_error() {
        let transport = Arc::new(RecordingTransport::new());
        transport.push_err(RequestError::Transport("connection refused".to_string()));
        let out = registry()
            .invoke(
                session_with(transport.clone()),
                "apikey_create",
                args(json!({"name": "ci", "policies": ["p1"]})),
            )
            .await
            .unwrap();
        assert!(out.is_error);
        assert_eq!(out.text, "❌ Failed to create API key: connection refused");
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn detach_issues_delete() {
        let transport = Arc::new(RecordingTransport::new());
        registry()
            .invoke(
                session_with(transport.clone()),
                "apikey_detach_policy",
                args(json!({"apikey_id": "k1", "policy_id": "p1"})),
            )
            .await
            .unwrap();
        let sent = transport.requests();
        assert_eq!(sent[0].method, HttpMethod::Delete);
        assert_eq!(sent[0].path, "/passport/apikey/k1/policy/p1");
    }
}
