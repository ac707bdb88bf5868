//! Identity tools.
//!
//! Tools: identity_list, identity_get, identity_create, identity_update,
//! identity_delete, identity_login, identity_verify

use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};

use crate::client::{ApiRequest, Auth, HttpMethod};
use crate::convert::{
    encode_segment, get_id_arg, get_optional_u64, get_string_arg, pagination_query, pick_fields,
    render,
};
use crate::error::{failed, Result};
use crate::schema;
use crate::session::McpSession;
use crate::tools::{ToolDef, ToolRegistry};

const IDENTITY_FIELDS: &[&str] = &["identifier", "password", "policies", "attributes"];

/// Register the identity tools.
pub fn register(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolDef::new(
            "identity_list",
            "List identities (user accounts).",
            schema!(object {
                optional: { "limit": count, "skip": count }
            }),
        ),
        list,
    )?;
    registry.register(
        ToolDef::new(
            "identity_get",
            "Get one identity by id.",
            schema!(object {
                required: { "identity_id": string }
            }),
        ),
        get,
    )?;
    registry.register(
        ToolDef::new(
            "identity_create",
            "Create an identity with an identifier and password. policies lists policy \
             ids to grant; attributes holds custom fields.",
            schema!(object {
                required: { "identifier": string, "password": string },
                optional: { "policies": array_string, "attributes": object }
            }),
        ),
        create,
    )?;
    registry.register(
        ToolDef::new(
            "identity_update",
            "Update an identity. Fetches it, overwrites the given fields and writes the \
             whole identity back.",
            schema!(object {
                required: { "identity_id": string },
                optional: {
                    "identifier": string,
                    "password": string,
                    "policies": array_string,
                    "attributes": object
                }
            }),
        ),
        update,
    )?;
    registry.register(
        ToolDef::new(
            "identity_delete",
            "Delete an identity.",
            schema!(object {
                required: { "identity_id": string }
            }),
        ),
        delete,
    )?;
    registry.register(
        ToolDef::new(
            "identity_login",
            "Log in with an identifier and password. Returns the token payload issued \
             by Spica; the token is not stored.",
            schema!(object {
                required: { "identifier": string, "password": string },
                optional: { "expires": count }
            }),
        ),
        login,
    )?;
    registry.register(
        ToolDef::new(
            "identity_verify",
            "Check whether an identity token is valid and return its decoded identity.",
            schema!(object {
                required: { "token": string }
            }),
        ),
        verify,
    )
}

async fn list(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let identities = session
        .client()
        .get_with_query("/passport/identity", pagination_query(&args))
        .await
        .map_err(failed("list identities"))?;
    Ok(render("Identities:", &identities))
}

async fn get(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "identity_id")?;
    let identity = session
        .client()
        .get(&format!("/passport/identity/{}", encode_segment(&id)))
        .await
        .map_err(failed("get identity"))?;
    Ok(render(&format!("Identity {id}:"), &identity))
}

async fn create(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let mut payload = pick_fields(&args, IDENTITY_FIELDS);
    payload
        .entry("policies")
        .or_insert_with(|| JsonValue::Array(Vec::new()));
    let created = session
        .client()
        .post("/passport/identity", JsonValue::Object(payload))
        .await
        .map_err(failed("create identity"))?;
    Ok(render("Identity created:", &created))
}

async fn update(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "identity_id")?;
    let partial = pick_fields(&args, IDENTITY_FIELDS);
    let updated = session
        .client()
        .update_merged(
            &format!("/passport/identity/{}", encode_segment(&id)),
            "_id",
            &id,
            partial,
        )
        .await
        .map_err(failed("update identity"))?;
    Ok(render(&format!("Identity {id} updated:"), &updated))
}

async fn delete(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_id_arg(&args, "identity_id")?;
    session
        .client()
        .delete(&format!("/passport/identity/{}", encode_segment(&id)))
        .await
        .map_err(failed("delete identity"))?;
    Ok(format!("✅ Identity {id} deleted successfully"))
}

async fn login(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let mut body = json!({
        "identifier": get_string_arg(&args, "identifier")?,
        "password": get_string_arg(&args, "password")?,
    });
    if let Some(expires) = get_optional_u64(&args, "expires") {
        body["expires"] = json!(expires);
    }
    let request = ApiRequest::new(HttpMethod::Post, "/passport/identify")
        .with_body(body)
        .with_auth(Auth::Anonymous);
    let token = session
        .client()
        .send(request)
        .await
        .map_err(failed("log in"))?;
    Ok(render("Login successful:", &token))
}

async fn verify(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let token = get_string_arg(&args, "token")?;
    let request = ApiRequest::new(HttpMethod::Get, "/passport/identify/verify")
        .with_auth(Auth::Token(token));
    let identity = session
        .client()
        .send(request)
        .await
        .map_err(failed("verify token"))?;
    Ok(render("Token is valid:", &identity))
}
