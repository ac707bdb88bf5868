//! Bucket tools.
//!
//! Tools: bucket_list, bucket_get, bucket_create, bucket_update, bucket_delete

use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};

use crate::convert::{encode_segment, get_id_arg, get_object_arg, pick_fields, render};
use crate::error::{failed, Result};
use crate::schema;
use crate::session::McpSession;
use crate::tools::{ToolDef, ToolRegistry};

const DEFAULT_ICON: &str = "view_stream";
const DEFAULT_PRIMARY: &str = "title";
const DEFAULT_ACL_RULE: &str = "true==true";

/// Fields a caller may set on create or update.
const BUCKET_FIELDS: &[&str] = &[
    "title",
    "description",
    "icon",
    "primary",
    "readOnly",
    "history",
    "properties",
    "acl",
    "order",
];

fn bucket_schema(required: &[&str]) -> JsonValue {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "title": {"type": "string", "description": "Bucket title"},
            "description": {"type": "string", "description": "What the bucket stores"},
            "icon": {"type": "string", "description": "Material icon name (default view_stream)"},
            "primary": {"type": "string", "description": "Property shown as the record title (default title)"},
            "readOnly": {"type": "boolean"},
            "history": {"type": "boolean", "description": "Keep record history"},
            "properties": {"type": "object", "description": "Property definitions keyed by name"},
            "acl": {
                "type": "object",
                "description": "Row-level rules, e.g. {\"read\": \"true==true\", \"write\": \"true==true\"}"
            },
            "order": {"type": "integer"}
        },
        "required": required,
    });
    if required.contains(&"bucket_id") {
        schema["properties"]["bucket_id"] = json!({"type": "string", "description": "Bucket to update"});
    }
    schema
}

/// Register the bucket tools.
pub fn register(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolDef::new(
            "bucket_list",
            "List every bucket (collection schema) on the Spica instance.",
            schema!(object {}),
        ),
        list,
    )?;
    registry.register(
        ToolDef::new(
            "bucket_get",
            "Get one bucket schema by id.",
            schema!(object {
                required: { "bucket_id": string }
            }),
        ),
        get,
    )?;
    registry.register(
        ToolDef::new(
            "bucket_create",
            "Create a bucket. title, description and properties are required; icon, \
             primary, readOnly, history, acl and order fall back to Spica defaults.",
            bucket_schema(&["title", "description", "properties"]),
        ),
        create,
    )?;
    registry.register(
        ToolDef::new(
            "bucket_update",
            "Update a bucket. Fetches the current schema, overwrites the given top-level \
             fields and writes the whole document back.",
            bucket_schema(&["bucket_id"]),
        ),
        update,
    )?;
    registry.register(
        ToolDef::new(
            "bucket_delete",
            "Delete a bucket and all of its data.",
            schema!(object {
                required: { "bucket_id": string }
            }),
        ),
        delete,
    )
}

async fn list(session: Arc<McpSession>, _args: Map<String, JsonValue>) -> Result<String> {
    let buckets = session
        .client()
        .get("/bucket")
        .await
        .map_err(failed("list buckets"))?;
    Ok(render("Buckets:", &buckets))
}

async fn get(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "bucket_id")?;
    let bucket = session
        .client()
        .get(&format!("/bucket/{}", encode_segment(&id)))
        .await
        .map_err(failed("get bucket"))?;
    Ok(render(&format!("Bucket {id}:"), &bucket))
}

/// Build the create payload with Spica's defaults filled in.
pub fn create_payload(args: &Map<String, JsonValue>) -> Result<JsonValue> {
    let properties = get_object_arg(args, "properties")?;
    let acl = args.get("acl").and_then(|v| v.as_object());
    let acl_rule = |key: &str| {
        acl.and_then(|a| a.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_ACL_RULE)
            .to_string()
    };
    let string_or = |key: &str, default: &str| {
        args.get(key)
            .and_then(|v| v.as_str())
            .unwrap_or(default)
            .to_string()
    };
    let flag = |key: &str| args.get(key).and_then(|v| v.as_bool()).unwrap_or(false);

    Ok(json!({
        "title": string_or("title", ""),
        "description": string_or("description", ""),
        "icon": string_or("icon", DEFAULT_ICON),
        "primary": string_or("primary", DEFAULT_PRIMARY),
        "readOnly": flag("readOnly"),
        "history": flag("history"),
        "properties": properties,
        "acl": {
            "read": acl_rule("read"),
            "write": acl_rule("write"),
        },
        "order": args.get("order").and_then(|v| v.as_i64()).unwrap_or(0),
    }))
}

async fn create(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let payload = create_payload(&args)?;
    let created = session
        .client()
        .post("/bucket", payload)
        .await
        .map_err(failed("create bucket"))?;
    Ok(render("Bucket created:", &created))
}

async fn update(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "bucket_id")?;
    let partial = pick_fields(&args, BUCKET_FIELDS);
    let updated = session
        .client()
        .update_merged(&format!("/bucket/{}", encode_segment(&id)), "_id", &id, partial)
        .await
        .map_err(failed("update bucket"))?;
    Ok(render(&format!("Bucket {id} updated:"), &updated))
}

async fn delete(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "bucket_id")?;
    session
        .client()
        .delete(&format!("/bucket/{}", encode_segment(&id)))
        .await
        .map_err(failed("delete bucket"))?;
    Ok(format!("✅ Bucket {id} deleted successfully"))
}
