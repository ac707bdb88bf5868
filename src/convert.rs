//! Argument extraction and JSON helpers shared by the tool handlers.

use std::borrow::Cow;

use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};

/// Pretty-print a JSON value for a text result.
pub fn to_pretty_json(value: &JsonValue) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Success text: a one-line header followed by the pretty-printed payload.
pub fn render(header: &str, value: &JsonValue) -> String {
    format!("✅ {header}\n{}", to_pretty_json(value))
}

/// Overwrite top-level keys of `target` with those of `partial`.
///
/// Nested objects are replaced, not merged, and keys cannot be removed.
pub fn merge_shallow(target: &mut Map<String, JsonValue>, partial: Map<String, JsonValue>) {
    for (key, value) in partial {
        target.insert(key, value);
    }
}

/// Copy the listed keys that are present (and not null) from `args`.
pub fn pick_fields(args: &Map<String, JsonValue>, keys: &[&str]) -> Map<String, JsonValue> {
    keys.iter()
        .filter_map(|key| match args.get(*key) {
            None | Some(JsonValue::Null) => None,
            Some(value) => Some((key.to_string(), value.clone())),
        })
        .collect()
}

/// Helper to get a required string argument from JSON arguments.
pub fn get_string_arg(args: &Map<String, JsonValue>, name: &str) -> Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| McpError::MissingArg(name.to_string()))
}

/// Helper to get a required argument that becomes one URL path segment.
///
/// Blank values and the dot segments `.` and `..` are rejected; URL parsers
/// resolve dot segments even when percent-encoded. Everything else is legal
/// once passed through [`encode_segment`].
pub fn get_segment_arg(args: &Map<String, JsonValue>, name: &str) -> Result<String> {
    let value = get_string_arg(args, name)?;
    let value = value.trim();
    let reason = match value {
        "" => "must not be empty",
        "." | ".." => "must not be a dot segment",
        _ => return Ok(value.to_string()),
    };
    Err(McpError::InvalidArg {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}

/// Helper to get a required, non-blank identifier argument.
///
/// Same rules as [`get_segment_arg`]; identifiers never contain slashes.
pub fn get_id_arg(args: &Map<String, JsonValue>, name: &str) -> Result<String> {
    let id = get_segment_arg(args, name)?;
    if id.contains('/') {
        return Err(McpError::InvalidArg {
            name: name.to_string(),
            reason: "must not contain '/'".to_string(),
        });
    }
    Ok(id)
}

/// Percent-encode a value for use as a single URL path segment.
pub fn encode_segment(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// Helper to get an optional string argument from JSON arguments.
pub fn get_optional_string(args: &Map<String, JsonValue>, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Helper to get an optional u64 argument from JSON arguments.
pub fn get_optional_u64(args: &Map<String, JsonValue>, name: &str) -> Option<u64> {
    args.get(name).and_then(|v| v.as_u64())
}

/// Helper to get an optional boolean argument.
pub fn get_optional_bool(args: &Map<String, JsonValue>, name: &str) -> Option<bool> {
    args.get(name).and_then(|v| v.as_bool())
}

/// Helper to get a required object argument.
pub fn get_object_arg(args: &Map<String, JsonValue>, name: &str) -> Result<Map<String, JsonValue>> {
    match args.get(name) {
        Some(JsonValue::Object(map)) => Ok(map.clone()),
        Some(JsonValue::Null) | None => Err(McpError::MissingArg(name.to_string())),
        Some(_) => Err(McpError::InvalidArg {
            name: name.to_string(),
            reason: "Expected an object".to_string(),
        }),
    }
}

/// Helper to get an optional array-of-strings argument.
pub fn get_optional_string_array(
    args: &Map<String, JsonValue>,
    name: &str,
) -> Result<Option<Vec<String>>> {
    let arr = match args.get(name) {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(JsonValue::Array(arr)) => arr,
        Some(_) => {
            return Err(McpError::InvalidArg {
                name: name.to_string(),
                reason: "Expected array of strings".to_string(),
            })
        }
    };

    arr.iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| McpError::InvalidArg {
                    name: name.to_string(),
                    reason: "Expected array of strings".to_string(),
                })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

/// Build `limit`/`skip` query pairs from optional pagination arguments.
pub fn pagination_query(args: &Map<String, JsonValue>) -> Vec<(String, String)> {
    let mut query = Vec::new();
    if let Some(limit) = get_optional_u64(args, "limit") {
        query.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(skip) = get_optional_u64(args, "skip") {
        query.push(("skip".to_string(), skip.to_string()));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_shallow_replaces_nested_objects() {
        let mut target = args(json!({"a": 1, "acl": {"read": "x", "write": "y"}}));
        merge_shallow(&mut target, args(json!({"acl": {"read": "z"}})));
        assert_eq!(
            JsonValue::Object(target),
            json!({"a": 1, "acl": {"read": "z"}})
        );
    }

    #[test]
    fn pick_fields_skips_absent_and_null() {
        let picked = pick_fields(
            &args(json!({"title": "T", "icon": null, "other": 1})),
            &["title", "icon", "description"],
        );
        assert_eq!(JsonValue::Object(picked), json!({"title": "T"}));
    }

    #[test]
    fn id_arg_rejects_blank_and_slashes() {
        assert_eq!(get_id_arg(&args(json!({"id": " b1 "})), "id").unwrap(), "b1");
        assert!(get_id_arg(&args(json!({"id": ""})), "id").is_err());
        assert!(get_id_arg(&args(json!({"id": "a/b"})), "id").is_err());
        assert!(matches!(
            get_id_arg(&args(json!({})), "id"),
            Err(McpError::MissingArg(_))
        ));
    }

    #[test]
    fn dot_segments_are_rejected() {
        for bad in [".", "..", " .. "] {
            let err = get_id_arg(&args(json!({"id": bad})), "id").unwrap_err();
            assert_eq!(err.field(), Some("id"));
            assert!(get_segment_arg(&args(json!({"name": bad})), "name").is_err());
        }
        assert_eq!(get_id_arg(&args(json!({"id": "...x"})), "id").unwrap(), "...x");
    }

    #[test]
    fn segments_escape_reserved_characters() {
        assert_eq!(encode_segment("@types/node"), "%40types%2Fnode");
        assert_eq!(encode_segment("b1#frag"), "b1%23frag");
        assert_eq!(encode_segment("b1?x=1"), "b1%3Fx%3D1");
        assert_eq!(encode_segment("65f0c2a1e4b0"), "65f0c2a1e4b0");
    }

    #[test]
    fn string_array_validation() {
        let a = args(json!({"xs": ["a", "b"], "bad": ["a", 1]}));
        assert_eq!(
            get_optional_string_array(&a, "xs").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(get_optional_string_array(&a, "missing").unwrap(), None);
        assert!(get_optional_string_array(&a, "bad").is_err());
    }

    #[test]
    fn pagination_passes_through() {
        let q = pagination_query(&args(json!({"limit": 10, "skip": 20})));
        assert_eq!(
            q,
            vec![
                ("limit".to_string(), "10".to_string()),
                ("skip".to_string(), "20".to_string())
            ]
        );
        assert!(pagination_query(&Map::new()).is_empty());
    }
}
