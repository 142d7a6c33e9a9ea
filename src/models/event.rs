use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Addressing information needed to mutate one document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub index: String,
    /// Mapping type, only present on older clusters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
}

impl DocumentRef {
    pub fn new(id: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index: index.into(),
            doc_type: None,
        }
    }

    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }
}

/// One matched event on the current page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub doc: DocumentRef,

    /// Raw document body
    pub source: Value,

    /// Parsed event timestamp, if the document carried a readable one
    pub timestamp: Option<DateTime<FixedOffset>>,

    /// Marked for a bulk action
    #[serde(default)]
    pub selected: bool,

    /// Detail view open
    #[serde(default)]
    pub expanded: bool,
}

impl EventRecord {
    /// Build a record from a raw document, defaulting a missing tag list to empty
    pub fn new(doc: DocumentRef, mut source: Value, timestamp_field: &str, tags_field: &str) -> Self {
        if let Value::Object(map) = &mut source {
            let missing = !matches!(map.get(tags_field), Some(Value::Array(_)));
            if missing {
                map.insert(tags_field.to_string(), Value::Array(Vec::new()));
            }
        }

        let timestamp = lookup_path(&source, timestamp_field)
            .and_then(Value::as_str)
            .and_then(parse_timestamp);

        Self {
            doc,
            source,
            timestamp,
            selected: false,
            expanded: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.doc.id
    }

    /// Tags currently on the document
    pub fn tags<'a>(&'a self, tags_field: &str) -> Vec<&'a str> {
        lookup_path(&self.source, tags_field)
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn has_tag(&self, tags_field: &str, tag: &str) -> bool {
        self.tags(tags_field).contains(&tag)
    }

    /// Apply a tag change locally after the server accepted it
    pub fn set_tag(&mut self, tags_field: &str, tag: &str, present: bool) {
        let Value::Object(map) = &mut self.source else {
            return;
        };
        let tags = map
            .entry(tags_field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(tags) = tags {
            tags.retain(|t| t.as_str() != Some(tag));
            if present {
                tags.push(Value::String(tag.to_string()));
            }
        }
    }

    /// Raw timestamp value as stored, suitable as a range bound
    pub fn raw_timestamp<'a>(&'a self, timestamp_field: &str) -> Option<&'a Value> {
        lookup_path(&self.source, timestamp_field)
    }
}

/// Resolve a dotted field path (`alert.severity`) inside a document.
///
/// A literal key containing the dots wins over nested traversal.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(found) = value.get(path) {
        return Some(found);
    }
    path.split('.').try_fold(value, |current, segment| current.get(segment))
}

/// Parse EVE-style (`2016-09-15T11:23:20.197956-0600`) and RFC 3339 timestamps
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
}
