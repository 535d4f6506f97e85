//! Core result types

use crate::error::FieldError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Value of a successfully resolved field
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedValue {
    /// A string field
    Text(String),
    /// One record per item of a collection or media collection
    Items(Vec<ResolvedRecord>),
}

impl ResolvedValue {
    /// JSON form used in the export
    pub fn into_json(self) -> Value {
        match self {
            ResolvedValue::Text(text) => Value::String(text),
            ResolvedValue::Items(items) => {
                Value::Array(items.into_iter().map(ResolvedRecord::into_json).collect())
            }
        }
    }
}

/// The outcome of resolving one field config against one record
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedField {
    /// Output key
    pub key: String,
    /// Resolved value, or why there is none
    pub outcome: Result<ResolvedValue, FieldError>,
}

impl ResolvedField {
    /// A resolved value
    pub fn ok(key: impl Into<String>, value: ResolvedValue) -> Self {
        Self {
            key: key.into(),
            outcome: Ok(value),
        }
    }

    /// A field that could not be resolved
    pub fn err(key: impl Into<String>, error: FieldError) -> Self {
        Self {
            key: key.into(),
            outcome: Err(error),
        }
    }

    /// JSON value exported for this field
    pub fn into_json(self) -> Value {
        match self.outcome {
            Ok(value) => value.into_json(),
            Err(error) => error.placeholder(),
        }
    }
}

/// All fields of one record, merged under their keys in configuration order
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedRecord(Map<String, Value>);

impl ResolvedRecord {
    /// Merge field results; a repeated key keeps the later value
    pub fn from_fields(fields: impl IntoIterator<Item = ResolvedField>) -> Self {
        let map = fields
            .into_iter()
            .map(|field| (field.key.clone(), field.into_json()))
            .collect();
        Self(map)
    }

    /// Value stored under a key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Keys in configuration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON object form
    pub fn into_json(self) -> Value {
        Value::Object(self.0)
    }
}

/// Outcome of draining one attachment queue
#[must_use]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrainSummary {
    /// Files written
    pub written: Vec<PathBuf>,
    /// Files left alone because they already existed
    pub skipped: Vec<PathBuf>,
    /// Paths claimed by more than one entry under `overwrite`; the last
    /// entry's content is the one written
    pub replaced: Vec<PathBuf>,
}

/// Totals for a whole export run
#[must_use]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Types whose records were exported
    pub types_exported: usize,
    /// Types whose top-level query failed
    pub types_failed: usize,
    /// Records exported across all types
    pub records: usize,
    /// Attachment files written across all types
    pub attachments_written: usize,
    /// Types whose attachment phase reported failures
    pub attachment_failures: usize,
}
