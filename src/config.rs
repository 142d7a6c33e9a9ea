use crate::error::{AppError, Result};
use crate::models::AggregationMode;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Config {
    /// Search engine connection
    #[validate(nested)]
    pub elasticsearch: ElasticsearchConfig,

    /// Query construction and paging
    #[validate(nested)]
    pub search: SearchSettings,

    /// Bulk job behaviour
    #[validate(nested)]
    pub bulk: BulkSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/alert-triage.toml".to_string());
        Self::load_from(&config_path)
    }

    /// Load configuration layering the given file over the built-in defaults
    pub fn load_from(config_path: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(config_path).required(false))
            // Override with environment variables (prefix: ALERT_TRIAGE__)
            .add_source(
                config::Environment::with_prefix("ALERT_TRIAGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults only, without file or environment overrides
    pub fn builtin() -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ElasticsearchConfig {
    /// Base URL of the search engine
    #[validate(length(min = 1))]
    pub url: String,

    /// Index pattern searched for events
    #[serde(default = "default_index")]
    pub index: String,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchSettings {
    /// Events per result page
    #[validate(range(min = 1))]
    pub page_size: u32,

    /// Aggregation mode used on the inbox view when none is requested
    #[serde(default)]
    pub default_inbox_aggregation: AggregationMode,

    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,

    #[serde(default = "default_signature_field")]
    pub signature_field: String,

    #[serde(default = "default_source_address_field")]
    pub source_address_field: String,

    #[serde(default = "default_severity_field")]
    pub severity_field: String,

    #[serde(default = "default_tags_field")]
    pub tags_field: String,

    /// Value of the `event_type` field every query is restricted to
    #[serde(default = "default_event_type")]
    pub event_type: String,

    /// Terms aggregation size; 0 asks for every bucket
    #[serde(default)]
    pub aggregation_bucket_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BulkSettings {
    /// Documents fetched and mutated per iteration
    #[validate(range(min = 1))]
    pub batch_size: u32,

    /// Iterations after which a job is abandoned
    #[validate(range(min = 1))]
    pub max_iterations: u32,

    /// Use the server's delete-by-query endpoint instead of a paginated job
    #[serde(default = "default_true")]
    pub server_delete_by_query: bool,

    /// Capacity of the progress and notification channels
    #[serde(default = "default_event_capacity")]
    #[validate(range(min = 1))]
    pub event_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl SearchSettings {
    /// Aggregation mode a fresh form starts with on the given view
    pub fn initial_aggregation(&self, view: crate::models::View) -> AggregationMode {
        if view == crate::models::View::Inbox {
            self.default_inbox_aggregation
        } else {
            AggregationMode::None
        }
    }
}

impl TryFrom<&str> for Config {
    type Error = AppError;

    /// Parse a complete TOML document, without defaults
    fn try_from(toml: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

// Default value functions
fn default_index() -> String {
    "logstash-*".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_timestamp_field() -> String {
    "@timestamp".to_string()
}

fn default_signature_field() -> String {
    "alert.signature.raw".to_string()
}

fn default_source_address_field() -> String {
    "src_ip.raw".to_string()
}

fn default_severity_field() -> String {
    "alert.severity".to_string()
}

fn default_tags_field() -> String {
    "tags".to_string()
}

fn default_event_type() -> String {
    "alert".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
