//! Documentation tools.
//!
//! Tools: search, fetch, answer_question

use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};

use crate::convert::{get_string_arg, to_pretty_json};
use crate::error::Result;
use crate::schema;
use crate::session::McpSession;
use crate::tools::{ToolDef, ToolRegistry};

/// Register the documentation tools.
pub fn register(registry: &mut ToolRegistry) -> Result<()> {
    registry.register(
        ToolDef::new(
            "search",
            "Search the Spica documentation. Returns matching documents with a snippet, \
             a link and a relevance score; pass an id to fetch for the full text.",
            schema!(object {
                required: { "query": string }
            }),
        ),
        search,
    )?;
    registry.register(
        ToolDef::new(
            "fetch",
            "Fetch the full text of one documentation file by the id returned from search.",
            schema!(object {
                required: { "id": string }
            }),
        ),
        fetch,
    )?;
    registry.register(
        ToolDef::new(
            "answer_question",
            "Answer a question about Spica from the single most relevant documentation \
             file, citing it as the source.",
            schema!(object {
                required: { "query": string }
            }),
        ),
        answer_question,
    )
}

async fn search(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let query = get_string_arg(&args, "query")?;
    let results = session.docs().search(&query).await?;
    Ok(to_pretty_json(&json!({ "results": results })))
}

async fn fetch(session: Arc<McpSession>, args: Map<String, JsonValue>) -> Result<String> {
    let id = get_string_arg(&args, "id")?;
    let document = session.docs().fetch(&id).await?;
    Ok(to_pretty_json(&serde_json::to_value(&document)?))
}

async fn answer_question(
    session: Arc<McpSession>,
    args: Map<String, JsonValue>,
) -> Result<String> {
    let query = get_string_arg(&args, "query")?;
    match session.docs().answer_question(&query).await? {
        Some(answer) => Ok(format!(
            "{}\n\nSource: {} ({})",
            answer.text.trim(),
            answer.source_title,
            answer.source_url
        )),
        None => Ok(format!(
            "No documentation matched \"{query}\", so there is nothing to answer from."
        )),
    }
}
