//! Policy tools.
//!
//! Tools: policy_list, policy_get, policy_create, policy_update, policy_delete

use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};

use crate::convert::{
    encode_segment, get_id_arg, get_string_arg, pagination_query, pick_fields, render,
};
use crate::error::{failed, Result};
use crate::schema;
use crate::session::McpSession;
use crate::tools::{ToolDef, ToolRegistry};

const POLICY_FIELDS: &[&str] = &["name", "description", "statement"];

/// Register the policy tools.
pub fn register(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolDef::new(
            "policy_list",
            "List policies.",
            schema!(object {
                optional: { "limit": count, "skip": count }
            }),
        ),
        list,
    )?;
    registry.register(
        ToolDef::new(
            "policy_get",
            "Get one policy by id.",
            schema!(object {
                required: { "policy_id": string }
            }),
        ),
        get,
    )?;
    registry.register(
        ToolDef::new(
            "policy_create",
            "Create a policy. Each statement is an object such as \
             {\"action\": \"bucket:data:index\", \"module\": \"bucket:data\", \
             \"resource\": {\"include\": [\"*\"], \"exclude\": []}}.",
            schema!(object {
                required: { "name": string, "statement": array_object },
                optional: { "description": string }
            }),
        ),
        create,
    )?;
    registry.register(
        ToolDef::new(
            "policy_update",
            "Update a policy. Fetches it, overwrites the given fields and writes the \
             whole policy back.",
            schema!(object {
                required: { "policy_id": string },
                optional: { "name": string, "description": string, "statement": array_object }
            }),
        ),
        update,
    )?;
    registry.register(
        ToolDef::new(
            "policy_delete",
            "Delete a policy.",
            schema!(object {
                required: { "policy_id": string }
            }),
        ),
        delete,
    )
}

async fn list(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let policies = session
        .client()
        .get_with_query("/passport/policy", pagination_query(&args))
        .await
        .map_err(failed("list policies"))?;
    Ok(render("Policies:", &policies))
}

async fn get(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "policy_id")?;
    let policy = session
        .client()
        .get(&format!("/passport/policy/{}", encode_segment(&id)))
        .await
        .map_err(failed("get policy"))?;
    Ok(render(&format!("Policy {id}:"), &policy))
}

async fn create(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let payload = json!({
        "name": get_string_arg(&args, "name")?,
        "description": args.get("description").cloned().unwrap_or_else(|| json!("")),
        "statement": args.get("statement").cloned().unwrap_or_else(|| json!([])),
    });
    let created = session
        .client()
        .post("/passport/policy", payload)
        .await
        .map_err(failed("create policy"))?;
    Ok(render("Policy created:", &created))
}

async fn update(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "policy_id")?;
    let partial = pick_fields(&args, POLICY_FIELDS);
    let updated = session
        .client()
        .update_merged(
            &format!("/passport/policy/{}", encode_segment(&id)),
            "_id",
            &id,
            partial,
        )
        .await
        .map_err(failed("update policy"))?;
    Ok(render(&format!("Policy {id} updated:"), &updated))
}

async fn delete(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "policy_id")?;
    session
        .client()
        .delete(&format!("/passport/policy/{}", encode_segment(&id)))
        .await
        .map_err(failed("delete policy"))?;
    Ok(format!("✅ Policy {id} deleted successfully"))
}
