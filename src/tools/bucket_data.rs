//! Bucket data tools.
//!
//! Tools: bucket_data_list, bucket_data_get, bucket_data_create,
//! bucket_data_update, bucket_data_delete

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::convert::{
    encode_segment, get_id_arg, get_object_arg, pagination_query, render,
};
use crate::error::{failed, Result};
use crate::schema;
use crate::session::McpSession;
use crate::tools::{ToolDef, ToolRegistry};

/// Register the bucket data tools.
pub fn register(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolDef::new(
            "bucket_data_list",
            "List records of a bucket. limit and skip paginate; filter and sort are \
             JSON objects passed to Spica as-is (e.g. filter {\"status\": \"draft\"}, \
             sort {\"created_at\": -1}).",
            schema!(object {
                required: { "bucket_id": string },
                optional: { "limit": count, "skip": count, "filter": object, "sort": object }
            }),
        ),
        list,
    )?;
    registry.register(
        ToolDef::new(
            "bucket_data_get",
            "Get one record of a bucket.",
            schema!(object {
                required: { "bucket_id": string, "data_id": string }
            }),
        ),
        get,
    )?;
    registry.register(
        ToolDef::new(
            "bucket_data_create",
            "Insert a record into a bucket. data must match the bucket's properties.",
            schema!(object {
                required: { "bucket_id": string, "data": object }
            }),
        ),
        create,
    )?;
    registry.register(
        ToolDef::new(
            "bucket_data_update",
            "Update a record. Fetches it, overwrites the top-level fields given in data \
             and writes the whole record back.",
            schema!(object {
                required: { "bucket_id": string, "data_id": string, "data": object }
            }),
        ),
        update,
    )?;
    registry.register(
        ToolDef::new(
            "bucket_data_delete",
            "Delete a record from a bucket.",
            schema!(object {
                required: { "bucket_id": string, "data_id": string }
            }),
        ),
        delete,
    )
}

/// Query parameters for a record listing.
pub fn list_query(args: &Map<String, JsonValue>) -> Vec<(String, String)> {
    let mut query = pagination_query(args);
    for key in ["filter", "sort"] {
        if let Some(value) = args.get(key).filter(|v| v.is_object()) {
            query.push((key.to_string(), value.to_string()));
        }
    }
    query
}

fn record_path(bucket_id: &str, data_id: &str) -> String {
    format!(
        "/bucket/{}/data/{}",
        encode_segment(bucket_id),
        encode_segment(data_id)
    )
}

async fn list(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let bucket_id = get_id_arg(&args, "bucket_id")?;
    let records = session
        .client()
        .get_with_query(
            &format!("/bucket/{}/data", encode_segment(&bucket_id)),
            list_query(&args),
        )
        .await
        .map_err(failed("list bucket data"))?;
    Ok(render(&format!("Records in bucket {bucket_id}:"), &records))
}

async fn get(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let bucket_id = get_id_arg(&args, "bucket_id")?;
    let data_id = get_id_arg(&args, "data_id")?;
    let record = session
        .client()
        .get(&record_path(&bucket_id, &data_id))
        .await
        .map_err(failed("get bucket data"))?;
    Ok(render(&format!("Record {data_id}:"), &record))
}

async fn create(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let bucket_id = get_id_arg(&args, "bucket_id")?;
    let data = get_object_arg(&args, "data")?;
    let created = session
        .client()
        .post(
            &format!("/bucket/{}/data", encode_segment(&bucket_id)),
            JsonValue::Object(data),
        )
        .await
        .map_err(failed("create bucket data"))?;
    Ok(render("Record created:", &created))
}

async fn update(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let bucket_id = get_id_arg(&args, "bucket_id")?;
    let data_id = get_id_arg(&args, "data_id")?;
    let data = get_object_arg(&args, "data")?;
    let updated = session
        .client()
        .update_merged(
            &record_path(&bucket_id, &data_id),
            "_id",
            &data_id,
            data,
        )
        .await
        .map_err(failed("update bucket data"))?;
    Ok(render(&format!("Record {data_id} updated:"), &updated))
}

async fn delete(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let bucket_id = get_id_arg(&args, "bucket_id")?;
    let data_id = get_id_arg(&args, "data_id")?;
    session
        .client()
        .delete(&record_path(&bucket_id, &data_id))
        .await
        .map_err(failed("delete bucket data"))?;
    Ok(format!(
        "✅ Record {data_id} deleted from bucket {bucket_id} successfully"
    ))
}
