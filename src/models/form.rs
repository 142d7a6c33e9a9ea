use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use validator::Validate;

/// Which slice of the alert stream is being triaged
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum View {
    /// Alerts still carrying the `inbox` tag
    Inbox,
    /// Alerts carrying the `starred` tag
    Starred,
    /// Every alert
    Alerts,
}

impl View {
    /// Tag every result in this view is required to carry
    pub fn required_tag(&self) -> Option<&'static str> {
        match self {
            View::Inbox => Some(INBOX_TAG),
            View::Starred => Some(STARRED_TAG),
            View::Alerts => None,
        }
    }
}

pub const INBOX_TAG: &str = "inbox";
pub const STARRED_TAG: &str = "starred";

/// How results are grouped
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum AggregationMode {
    /// Plain hit list
    #[default]
    #[serde(rename = "none", alias = "")]
    #[strum(to_string = "none", serialize = "")]
    None,

    /// One bucket per signature
    #[serde(rename = "signature")]
    #[strum(to_string = "signature")]
    BySignature,

    /// One bucket per signature and source address
    #[serde(rename = "signature+src")]
    #[strum(to_string = "signature+src")]
    BySignatureAndSource,
}

impl AggregationMode {
    /// Number of nested terms-bucket levels the mode requests
    pub fn depth(&self) -> usize {
        match self {
            AggregationMode::None => 0,
            AggregationMode::BySignature => 1,
            AggregationMode::BySignatureAndSource => 2,
        }
    }
}

/// Aggregation table sort column
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum SortKey {
    #[default]
    #[serde(rename = "last")]
    #[strum(serialize = "last")]
    LastSeen,

    #[serde(rename = "count")]
    #[strum(serialize = "count")]
    Count,

    #[serde(rename = "message")]
    #[strum(serialize = "message")]
    Message,

    #[serde(rename = "src_ip")]
    #[strum(serialize = "src_ip")]
    SourceAddress,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Structural filter from the search form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterClause {
    /// Field equals value
    Term {
        field: String,
        value: serde_json::Value,
    },
    /// Document carries the tag
    Tag { tag: String },
}

impl FilterClause {
    pub fn term(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag { tag: tag.into() }
    }
}

/// Query intent gathered by the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct SearchForm {
    /// Free-text query; empty means everything
    #[serde(default)]
    pub user_query: String,

    #[serde(default)]
    pub filters: Vec<FilterClause>,

    #[serde(default)]
    pub aggregate_by: AggregationMode,

    #[serde(default)]
    pub sort_by: SortKey,

    #[serde(default)]
    pub sort_order: SortOrder,

    /// 1-based page number
    #[validate(range(min = 1))]
    pub page: u32,

    #[validate(range(min = 1))]
    pub page_size: u32,
}

impl SearchForm {
    pub fn new(page_size: u32) -> Self {
        Self {
            user_query: String::new(),
            filters: Vec::new(),
            aggregate_by: AggregationMode::None,
            sort_by: SortKey::default(),
            sort_order: SortOrder::default(),
            page: 1,
            page_size,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.user_query = query.into();
        self
    }

    pub fn with_filter(mut self, filter: FilterClause) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_aggregation(mut self, mode: AggregationMode) -> Self {
        self.aggregate_by = mode;
        self
    }

    pub fn with_sort(mut self, key: SortKey, order: SortOrder) -> Self {
        self.sort_by = key;
        self.sort_order = order;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Offset of the first hit on the current page
    pub fn offset(&self) -> u64 {
        u64::from(self.page_size) * u64::from(self.page.saturating_sub(1))
    }

    /// Query string sent to the engine; an empty query matches everything
    pub fn effective_query(&self) -> &str {
        if self.user_query.trim().is_empty() {
            "*"
        } else {
            &self.user_query
        }
    }
}
