//! Configuration types for rally-export
//!
//! The configuration is a single JSON document describing how to reach the API,
//! which record types to export, the filter applied to every type query, and
//! the field configuration tree per type.

use crate::error::{Error, Result};
use crate::query::Filter;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, path::PathBuf, time::Duration};

/// Default Rally Web Services API endpoint
pub const DEFAULT_BASE_URL: &str = "https://rally1.rallydev.com/slm/webservice/v2.0/";

/// Largest page size the Rally API accepts
pub const MAX_PAGE_SIZE: usize = 2000;

/// Connection settings for the Rally API
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the Web Services API (default: Rally production v2.0)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key sent as the `ZSESSIONID` header (preferred over basic auth)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Username for basic authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for basic authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Workspace reference to scope type queries to
    #[serde(default)]
    pub workspace: Option<String>,

    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Records requested per page (default: 200, max: 2000)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Upper bound on records returned per query (None = everything)
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            username: None,
            password: None,
            workspace: None,
            timeout: default_timeout(),
            page_size: default_page_size(),
            limit: None,
        }
    }
}

// Credentials stay out of debug output.
impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("workspace", &self.workspace)
            .field("timeout", &self.timeout)
            .field("page_size", &self.page_size)
            .field("limit", &self.limit)
            .finish()
    }
}

impl ApiConfig {
    /// Override credentials from `RALLY_API_KEY`, `RALLY_USERNAME` and
    /// `RALLY_PASSWORD` when they are set.
    pub fn with_env_credentials(self) -> Self {
        self.with_credentials_from(|name| std::env::var(name).ok())
    }

    /// Override credentials from an arbitrary variable lookup
    pub fn with_credentials_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(key) = non_empty("RALLY_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(user) = non_empty("RALLY_USERNAME") {
            self.username = Some(user);
        }
        if let Some(pass) = non_empty("RALLY_PASSWORD") {
            self.password = Some(pass);
        }
        self
    }
}

/// File collision handling strategy for attachments
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Overwrite existing file (default)
    #[default]
    Overwrite,
    /// Append (1), (2), etc. to filename
    Rename,
    /// Skip the attachment, keep existing
    Skip,
}

/// Attachment download settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachmentConfig {
    /// Maximum attachment content fetches in flight (default: 8)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// What to do when an attachment file already exists
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: default_max_concurrent_fetches(),
            file_collision: FileCollisionAction::default(),
        }
    }
}

/// One node of the field configuration tree, as written in the config file
///
/// Keys of the original exporter configuration (`rallyApiField`,
/// `locationInData`, `collectionFieldConfigs`, `mediaUrlConfig`,
/// `mediaRefObjectLocation`) are accepted as aliases.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Output key, also requested from the API as a fetch field
    #[serde(alias = "rallyApiField")]
    pub field: String,

    /// `string`, `collection` or `mediaCollection` (case-insensitive)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,

    /// Dotted path into the record (defaults to `field`)
    #[serde(
        default,
        alias = "locationInData",
        skip_serializing_if = "Option::is_none"
    )]
    pub path: Option<String>,

    /// Text placed before a string value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Text placed after a string value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postfix: Option<String>,

    /// Fields resolved for every item of a collection
    #[serde(
        default,
        alias = "collectionFieldConfigs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub children: Vec<FieldConfig>,

    /// String field naming each media item (default: `Name`)
    #[serde(
        default,
        alias = "mediaUrlConfig",
        skip_serializing_if = "Option::is_none"
    )]
    pub media: Option<Box<FieldConfig>>,

    /// Path within a media item to its content reference (default: `Content`)
    #[serde(
        default,
        rename = "mediaReference",
        alias = "mediaRefObjectLocation",
        skip_serializing_if = "Option::is_none"
    )]
    pub media_reference: Option<String>,
}

impl FieldConfig {
    /// A `string` field reading its own key
    pub fn string(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            field_type: Some("string".to_string()),
            ..Default::default()
        }
    }
}

/// Main configuration for an export run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// API connection settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Existing directory attachments are written to (default: "./data/images")
    #[serde(default = "default_processing_dir")]
    pub processing_dir: PathBuf,

    /// Record types to export, in order
    pub types: Vec<String>,

    /// Predicates applied to every type query, combined with AND
    #[serde(default)]
    pub filter: Vec<Filter>,

    /// Fields exported for every type
    #[serde(default)]
    pub global_configs: Vec<FieldConfig>,

    /// Additional fields per type
    #[serde(default)]
    pub type_configs: HashMap<String, Vec<FieldConfig>>,

    /// Attachment download settings
    #[serde(default)]
    pub attachments: AttachmentConfig,
}

impl ExportConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_json(&text)
    }

    /// Parse and validate a configuration document
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that would otherwise only fail mid-run
    pub fn validate(&self) -> Result<()> {
        if self.types.is_empty() {
            return Err(Error::config("at least one record type is required", "types"));
        }

        for record_type in &self.types {
            if record_type.trim().is_empty() {
                return Err(Error::config("record type names must not be empty", "types"));
            }
            if self.configs_for_type(record_type).is_empty() {
                return Err(Error::config(
                    format!("no field configs for type '{}'", record_type),
                    "type_configs",
                ));
            }
        }

        if self.api.page_size == 0 || self.api.page_size > MAX_PAGE_SIZE {
            return Err(Error::config(
                format!("page size must be between 1 and {}", MAX_PAGE_SIZE),
                "api.page_size",
            ));
        }

        if self.attachments.max_concurrent_fetches == 0 {
            return Err(Error::config(
                "must allow at least one concurrent fetch",
                "attachments.max_concurrent_fetches",
            ));
        }

        Ok(())
    }

    /// Global configs followed by the type's own configs
    pub fn configs_for_type(&self, record_type: &str) -> Vec<FieldConfig> {
        let mut fields = self.global_configs.clone();
        if let Some(type_fields) = self.type_configs.get(record_type) {
            fields.extend(type_fields.iter().cloned());
        }
        fields
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_page_size() -> usize {
    200
}

fn default_processing_dir() -> PathBuf {
    PathBuf::from("./data/images")
}

fn default_max_concurrent_fetches() -> usize {
    8
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "processing_dir": "/tmp/images",
        "types": ["defect", "hierarchicalrequirement"],
        "filter": [["State", "=", "Open"], ["Priority", "=", "High"]],
        "global_configs": [
            {"field": "FormattedID", "type": "string"},
            {"field": "Name", "type": "String", "prefix": "[", "postfix": "]"}
        ],
        "type_configs": {
            "defect": [
                {
                    "rallyApiField": "Attachments",
                    "type": "mediaCollection",
                    "mediaUrlConfig": {"rallyApiField": "Name", "type": "string"},
                    "mediaRefObjectLocation": "Content"
                }
            ]
        }
    }"#;

    #[test]
    fn parses_sample_with_defaults() {
        let config = ExportConfig::from_json(SAMPLE).unwrap();

        assert_eq!(config.types, vec!["defect", "hierarchicalrequirement"]);
        assert_eq!(config.processing_dir, PathBuf::from("/tmp/images"));
        assert_eq!(config.filter.len(), 2);
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.timeout, Duration::from_secs(30));
        assert_eq!(config.api.page_size, 200);
        assert_eq!(config.attachments.max_concurrent_fetches, 8);
        assert_eq!(
            config.attachments.file_collision,
            FileCollisionAction::Overwrite
        );
    }

    #[test]
    fn legacy_keys_are_accepted_as_aliases() {
        let config = ExportConfig::from_json(SAMPLE).unwrap();
        let attachments = &config.type_configs["defect"][0];

        assert_eq!(attachments.field, "Attachments");
        assert_eq!(attachments.field_type.as_deref(), Some("mediaCollection"));
        assert_eq!(attachments.media_reference.as_deref(), Some("Content"));
        assert_eq!(attachments.media.as_ref().unwrap().field, "Name");
    }

    #[test]
    fn configs_for_type_puts_globals_first() {
        let config = ExportConfig::from_json(SAMPLE).unwrap();

        let defect: Vec<_> = config
            .configs_for_type("defect")
            .into_iter()
            .map(|c| c.field)
            .collect();
        assert_eq!(defect, vec!["FormattedID", "Name", "Attachments"]);

        let story: Vec<_> = config
            .configs_for_type("hierarchicalrequirement")
            .into_iter()
            .map(|c| c.field)
            .collect();
        assert_eq!(story, vec!["FormattedID", "Name"]);
    }

    #[test]
    fn validate_rejects_empty_types() {
        let err = ExportConfig::from_json(r#"{"types": []}"#).unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "types"));
    }

    #[test]
    fn validate_rejects_type_without_fields() {
        let err = ExportConfig::from_json(r#"{"types": ["defect"]}"#).unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "type_configs"));
    }

    #[test]
    fn validate_rejects_out_of_range_page_size() {
        let json = r#"{
            "types": ["defect"],
            "global_configs": [{"field": "Name", "type": "string"}],
            "api": {"page_size": 5000}
        }"#;
        let err = ExportConfig::from_json(json).unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "api.page_size"));
    }

    #[test]
    fn malformed_filter_is_a_parse_error() {
        let json = r#"{
            "types": ["defect"],
            "global_configs": [{"field": "Name", "type": "string"}],
            "filter": [["State", "="]]
        }"#;
        assert!(matches!(
            ExportConfig::from_json(json),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn env_credentials_override_file_values() {
        let api = ApiConfig {
            api_key: Some("from-file".into()),
            username: Some("file-user".into()),
            ..Default::default()
        };

        let api = api.with_credentials_from(|name| match name {
            "RALLY_API_KEY" => Some("from-env".into()),
            "RALLY_USERNAME" => Some(String::new()),
            _ => None,
        });

        assert_eq!(api.api_key.as_deref(), Some("from-env"));
        // empty variables do not clear configured values
        assert_eq!(api.username.as_deref(), Some("file-user"));
        assert_eq!(api.password, None);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let api = ApiConfig {
            api_key: Some("_abc123".into()),
            password: Some("hunter2".into()),
            ..Default::default()
        };
        let rendered = format!("{:?}", api);
        assert!(!rendered.contains("_abc123"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn from_file_reports_missing_file_as_config_error() {
        let err = ExportConfig::from_file("/nonexistent/rally-config.json").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
