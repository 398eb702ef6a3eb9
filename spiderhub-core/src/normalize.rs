//! Canonical shape of a video detail record.

use serde_json::{Map, Value};

/// Scalar fields, defaulting to `""`
pub const STRING_FIELDS: [&str; 12] = [
    "vod_id",
    "vod_name",
    "vod_pic",
    "vod_director",
    "vod_actor",
    "vod_remarks",
    "vod_content",
    "vod_play_from",
    "vod_play_url",
    "type_name",
    "vod_year",
    "vod_area",
];

/// List fields, defaulting to `[]`
pub const LIST_FIELDS: [&str; 2] = ["episodes_names", "episodes"];

/// Joins a play-url given as a list
pub const PLAY_URL_DELIMITER: &str = "#";

/// Produce a record with exactly the fixed field set.
///
/// Missing or null fields take their default; a `vod_play_url` list of
/// strings is joined with `#`. Normalizing twice is a no-op.
pub fn normalize_video_detail(record: &Value) -> Value {
    let mut normalized = Map::with_capacity(STRING_FIELDS.len() + LIST_FIELDS.len());

    for field in STRING_FIELDS {
        let value = match record.get(field) {
            None | Some(Value::Null) => Value::String(String::new()),
            Some(Value::Array(items)) if field == "vod_play_url" => {
                Value::String(join_play_urls(items))
            }
            Some(other) => other.clone(),
        };
        normalized.insert(field.to_string(), value);
    }

    for field in LIST_FIELDS {
        let value = match record.get(field) {
            None | Some(Value::Null) => Value::Array(Vec::new()),
            Some(other) => other.clone(),
        };
        normalized.insert(field.to_string(), value);
    }

    Value::Object(normalized)
}

fn join_play_urls(items: &[Value]) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(PLAY_URL_DELIMITER)
}
