//! Validated field configuration tree
//!
//! [`FieldConfig`] is the loose, file-facing form. [`FieldSpec`] is what the
//! processor walks: one variant per field type, each carrying only what that
//! type needs. Missing and unknown type tags stay representable so they can be
//! reported per field instead of failing the whole configuration.

use crate::config::FieldConfig;
use crate::error::{Error, Result};

/// Media field used when a media collection does not configure one
const DEFAULT_MEDIA_FIELD: &str = "Name";

/// Path to the content reference of a Rally attachment
const DEFAULT_MEDIA_REFERENCE: &str = "Content";

/// A `string` field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringField {
    /// Output key
    pub key: String,
    /// Dotted path into the record
    pub source_path: String,
    /// Text placed before the value
    pub prefix: String,
    /// Text placed after the value
    pub postfix: String,
}

/// A `collection` field: a reference whose items are resolved recursively
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionField {
    /// Output key
    pub key: String,
    /// Dotted path to the reference object
    pub source_path: String,
    /// Fields resolved for every item
    pub children: Vec<FieldSpec>,
}

/// A `mediaCollection` field: a reference to attachments whose content is
/// downloaded after the records are resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaCollectionField {
    /// Output key
    pub key: String,
    /// Dotted path to the reference object
    pub source_path: String,
    /// Field naming each item in the output. The file name is the item's raw
    /// value at this field's key, whatever its source path.
    pub media: StringField,
    /// Dotted path within an item to its content reference
    pub media_reference_path: String,
}

/// One node of the validated field configuration tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldSpec {
    /// Plain value with optional prefix/postfix
    String(StringField),
    /// Nested collection resolved through a reference
    Collection(CollectionField),
    /// Attachment collection
    MediaCollection(MediaCollectionField),
    /// The config carries no type
    Untyped {
        /// Output key
        key: String,
    },
    /// The config carries a type tag this version does not know
    Unsupported {
        /// Output key
        key: String,
        /// Type tag as written
        type_name: String,
    },
}

impl FieldSpec {
    /// Build the spec tree for one config node
    ///
    /// Missing or unknown type tags are not errors here. A media config
    /// without a type is taken as a `string` field; one declaring any other
    /// type is rejected.
    pub fn from_config(config: &FieldConfig) -> Result<Self> {
        let key = config.field.clone();
        let source_path = config.path.clone().unwrap_or_else(|| key.clone());

        let type_name = match config.field_type.as_deref().map(str::trim) {
            None | Some("") => return Ok(FieldSpec::Untyped { key }),
            Some(t) => t,
        };

        let spec = match type_name.to_lowercase().as_str() {
            "string" => FieldSpec::String(string_field(config)),
            "collection" => FieldSpec::Collection(CollectionField {
                key,
                source_path,
                children: Self::from_configs(&config.children)?,
            }),
            "mediacollection" => {
                let media = match config.media.as_deref() {
                    Some(media) => {
                        let declared = media.field_type.as_deref().map_or("", str::trim);
                        if !declared.is_empty() && !declared.eq_ignore_ascii_case("string") {
                            return Err(Error::config(
                                format!("media config of '{}' must be a string field", key),
                                key,
                            ));
                        }
                        string_field(media)
                    }
                    None => string_field(&FieldConfig::string(DEFAULT_MEDIA_FIELD)),
                };
                FieldSpec::MediaCollection(MediaCollectionField {
                    key,
                    source_path,
                    media,
                    media_reference_path: config
                        .media_reference
                        .clone()
                        .unwrap_or_else(|| DEFAULT_MEDIA_REFERENCE.to_string()),
                })
            }
            _ => FieldSpec::Unsupported {
                key,
                type_name: type_name.to_string(),
            },
        };
        Ok(spec)
    }

    /// Build specs for a list of config nodes, keeping their order
    pub fn from_configs(configs: &[FieldConfig]) -> Result<Vec<Self>> {
        configs.iter().map(Self::from_config).collect()
    }

    /// Output key of the field
    pub fn key(&self) -> &str {
        match self {
            FieldSpec::String(f) => &f.key,
            FieldSpec::Collection(f) => &f.key,
            FieldSpec::MediaCollection(f) => &f.key,
            FieldSpec::Untyped { key } | FieldSpec::Unsupported { key, .. } => key,
        }
    }
}

fn string_field(config: &FieldConfig) -> StringField {
    StringField {
        key: config.field.clone(),
        source_path: config.path.clone().unwrap_or_else(|| config.field.clone()),
        prefix: config.prefix.clone().unwrap_or_default(),
        postfix: config.postfix.clone().unwrap_or_default(),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn typed(field: &str, field_type: &str) -> FieldConfig {
        FieldConfig {
            field: field.into(),
            field_type: Some(field_type.into()),
            ..Default::default()
        }
    }

    #[test]
    fn string_field_defaults_path_to_key() {
        let spec = FieldSpec::from_config(&FieldConfig::string("FormattedID")).unwrap();
        assert_eq!(
            spec,
            FieldSpec::String(StringField {
                key: "FormattedID".into(),
                source_path: "FormattedID".into(),
                prefix: String::new(),
                postfix: String::new(),
            })
        );
    }

    #[test]
    fn type_tags_are_case_insensitive() {
        for tag in ["STRING", "String", "string"] {
            assert!(matches!(
                FieldSpec::from_config(&typed("a", tag)).unwrap(),
                FieldSpec::String(_)
            ));
        }
        assert!(matches!(
            FieldSpec::from_config(&typed("Attachments", "MEDIACOLLECTION")).unwrap(),
            FieldSpec::MediaCollection(_)
        ));
    }

    #[test]
    fn missing_and_blank_types_are_untyped() {
        let missing = FieldConfig {
            field: "Owner".into(),
            ..Default::default()
        };
        assert_eq!(
            FieldSpec::from_config(&missing).unwrap(),
            FieldSpec::Untyped {
                key: "Owner".into()
            }
        );
        assert_eq!(
            FieldSpec::from_config(&typed("Owner", "  ")).unwrap(),
            FieldSpec::Untyped {
                key: "Owner".into()
            }
        );
    }

    #[test]
    fn unknown_type_keeps_the_tag() {
        assert_eq!(
            FieldSpec::from_config(&typed("Owner", "User")).unwrap(),
            FieldSpec::Unsupported {
                key: "Owner".into(),
                type_name: "User".into()
            }
        );
    }

    #[test]
    fn collection_children_are_converted_in_order() {
        let config = FieldConfig {
            children: vec![FieldConfig::string("Name"), FieldConfig::string("State")],
            path: Some("Tasks".into()),
            ..typed("Tasks", "collection")
        };
        match FieldSpec::from_config(&config).unwrap() {
            FieldSpec::Collection(c) => {
                assert_eq!(c.source_path, "Tasks");
                let keys: Vec<_> = c.children.iter().map(FieldSpec::key).collect();
                assert_eq!(keys, vec!["Name", "State"]);
            }
            other => panic!("expected collection, got {other:?}"),
        }
    }

    #[test]
    fn media_collection_defaults() {
        match FieldSpec::from_config(&typed("Attachments", "mediaCollection")).unwrap() {
            FieldSpec::MediaCollection(m) => {
                assert_eq!(m.media.key, "Name");
                assert_eq!(m.media_reference_path, "Content");
            }
            other => panic!("expected media collection, got {other:?}"),
        }
    }

    #[test]
    fn media_config_must_be_a_string_field() {
        let config = FieldConfig {
            media: Some(Box::new(typed("Name", "collection"))),
            ..typed("Attachments", "mediaCollection")
        };
        let err = FieldSpec::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn untyped_media_config_is_a_string_field() {
        let config = FieldConfig {
            media: Some(Box::new(FieldConfig {
                field: "Name".into(),
                path: Some("Url".into()),
                ..Default::default()
            })),
            ..typed("Attachments", "mediaCollection")
        };
        match FieldSpec::from_config(&config).unwrap() {
            FieldSpec::MediaCollection(m) => {
                assert_eq!(m.media.key, "Name");
                assert_eq!(m.media.source_path, "Url");
            }
            other => panic!("expected media collection, got {other:?}"),
        }
    }
}
