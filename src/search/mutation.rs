//! Bulk mutation requests
//!
//! A bulk request is newline-delimited JSON: one action line per target,
//! followed by a body line for updates.

use crate::models::DocumentRef;
use serde_json::{json, Value};
use std::fmt;

const REMOVE_TAG_SCRIPT: &str =
    "if (ctx._source.tags != null) { ctx._source.tags.removeIf(t -> t == params.tag) }";

const ADD_TAG_SCRIPT: &str = "if (ctx._source.tags == null) { ctx._source.tags = [] } \
     if (!ctx._source.tags.contains(params.tag)) { ctx._source.tags.add(params.tag) }";

/// State change applied to every target of a bulk request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkMutation {
    AddTag(String),
    RemoveTag(String),
    Delete,
}

impl BulkMutation {
    pub fn add_tag(tag: impl Into<String>) -> Self {
        BulkMutation::AddTag(tag.into())
    }

    pub fn remove_tag(tag: impl Into<String>) -> Self {
        BulkMutation::RemoveTag(tag.into())
    }

    /// Label used in logs and metrics
    pub fn action(&self) -> &'static str {
        match self {
            BulkMutation::AddTag(_) => "add_tag",
            BulkMutation::RemoveTag(_) => "remove_tag",
            BulkMutation::Delete => "delete",
        }
    }

    /// Newline-delimited request body for the `_bulk` endpoint
    pub fn to_ndjson(&self, targets: &[DocumentRef]) -> String {
        let mut body = String::new();
        for target in targets {
            let verb = match self {
                BulkMutation::Delete => "delete",
                _ => "update",
            };
            push_line(&mut body, &json!({verb: address(target)}));

            match self {
                BulkMutation::AddTag(tag) => push_line(&mut body, &script(ADD_TAG_SCRIPT, tag)),
                BulkMutation::RemoveTag(tag) => push_line(&mut body, &script(REMOVE_TAG_SCRIPT, tag)),
                BulkMutation::Delete => {}
            }
        }
        body
    }
}

impl fmt::Display for BulkMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkMutation::AddTag(tag) => write!(f, "add tag '{}'", tag),
            BulkMutation::RemoveTag(tag) => write!(f, "remove tag '{}'", tag),
            BulkMutation::Delete => write!(f, "delete"),
        }
    }
}

fn address(target: &DocumentRef) -> Value {
    let mut address = json!({"_index": target.index, "_id": target.id});
    if let Some(doc_type) = &target.doc_type {
        address["_type"] = json!(doc_type);
    }
    address
}

fn script(source: &str, tag: &str) -> Value {
    json!({
        "script": {
            "lang": "painless",
            "source": source,
            "params": {"tag": tag},
        }
    })
}

fn push_line(body: &mut String, value: &Value) {
    body.push_str(&value.to_string());
    body.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(body: &str) -> Vec<Value> {
        body.lines().map(|line| serde_json::from_str(line).unwrap()).collect()
    }

    #[test]
    fn test_remove_tag_body() {
        let targets = vec![
            DocumentRef::new("a", "logstash-2016.09.15").with_type("log"),
            DocumentRef::new("b", "logstash-2016.09.16"),
        ];
        let body = BulkMutation::remove_tag("inbox").to_ndjson(&targets);
        let lines = lines(&body);

        assert!(body.ends_with('\n'));
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            json!({"update": {"_index": "logstash-2016.09.15", "_id": "a", "_type": "log"}})
        );
        assert_eq!(lines[1]["script"]["params"]["tag"], json!("inbox"));
        assert_eq!(lines[2], json!({"update": {"_index": "logstash-2016.09.16", "_id": "b"}}));
    }

    #[test]
    fn test_delete_has_no_body_lines() {
        let targets = vec![DocumentRef::new("a", "idx"), DocumentRef::new("b", "idx")];
        let lines = lines(&BulkMutation::Delete.to_ndjson(&targets));

        assert_eq!(
            lines,
            vec![
                json!({"delete": {"_index": "idx", "_id": "a"}}),
                json!({"delete": {"_index": "idx", "_id": "b"}}),
            ]
        );
    }

    #[test]
    fn test_empty_targets() {
        assert!(BulkMutation::Delete.to_ndjson(&[]).is_empty());
    }
}
