//! Field resolution: the extraction engine
//!
//! A [`FieldProcessor`] walks the [`FieldSpec`] tree against source records:
//!
//! - `String` fields are read from the record and wrapped in prefix/postfix.
//! - `Collection` fields follow a reference with a nested query and resolve
//!   their child specs against every returned item.
//! - `MediaCollection` fields do the same with a single media field per item,
//!   and additionally queue each item's content fetch on the
//!   [`AttachmentQueue`] for the drain phase.
//!
//! Failures stay with the field they happened in. A field whose nested query
//! fails resolves to a [`FieldError`]; its siblings and the record are
//! unaffected.

use crate::attachments::AttachmentQueue;
use crate::client::QueryClient;
use crate::error::FieldError;
use crate::field::{CollectionField, FieldSpec, MediaCollectionField, StringField};
use crate::query::QueryOptions;
use crate::types::{ResolvedField, ResolvedRecord, ResolvedValue};
use crate::utils::{lookup_path, reference_url, render_value};
use futures::future::{BoxFuture, FutureExt, join_all};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves field specs against records for one type pass
pub struct FieldProcessor<'q> {
    client: Arc<dyn QueryClient>,
    attachments: &'q AttachmentQueue,
}

impl<'q> FieldProcessor<'q> {
    /// Create a processor that queues attachments on `attachments`
    pub fn new(client: Arc<dyn QueryClient>, attachments: &'q AttachmentQueue) -> Self {
        Self {
            client,
            attachments,
        }
    }

    /// Resolve every record, keeping their order
    pub async fn resolve_records(
        &self,
        specs: &[FieldSpec],
        records: &[Value],
    ) -> Vec<ResolvedRecord> {
        join_all(records.iter().map(|record| self.resolve_record(specs, record))).await
    }

    /// Resolve all fields of one record concurrently and merge them
    pub async fn resolve_record(&self, specs: &[FieldSpec], record: &Value) -> ResolvedRecord {
        let fields = join_all(specs.iter().map(|spec| self.resolve_field(spec, record))).await;
        ResolvedRecord::from_fields(fields)
    }

    /// Resolve one field spec against one record
    ///
    /// Boxed because collections recurse back into [`resolve_record`](Self::resolve_record).
    pub fn resolve_field<'a>(
        &'a self,
        spec: &'a FieldSpec,
        record: &'a Value,
    ) -> BoxFuture<'a, ResolvedField> {
        async move {
            match spec {
                FieldSpec::String(field) => resolve_string(field, record),
                FieldSpec::Collection(field) => self.resolve_collection(field, record).await,
                FieldSpec::MediaCollection(field) => {
                    self.resolve_media_collection(field, record).await
                }
                FieldSpec::Untyped { key } => {
                    ResolvedField::err(key, FieldError::MissingType { field: key.clone() })
                }
                FieldSpec::Unsupported { key, type_name } => ResolvedField::err(
                    key,
                    FieldError::UnsupportedType {
                        field: key.clone(),
                        type_name: type_name.clone(),
                    },
                ),
            }
        }
        .boxed()
    }

    async fn resolve_collection(&self, field: &CollectionField, record: &Value) -> ResolvedField {
        let items = match self.fetch_items(&field.key, &field.source_path, record).await {
            Ok(items) => items,
            Err(e) => return ResolvedField::err(&field.key, e),
        };

        let resolved = join_all(
            items
                .iter()
                .map(|item| self.resolve_record(&field.children, item)),
        )
        .await;

        ResolvedField::ok(&field.key, ResolvedValue::Items(resolved))
    }

    async fn resolve_media_collection(
        &self,
        field: &MediaCollectionField,
        record: &Value,
    ) -> ResolvedField {
        let items = match self.fetch_items(&field.key, &field.source_path, record).await {
            Ok(items) => items,
            Err(e) => return ResolvedField::err(&field.key, e),
        };

        let mut resolved = Vec::with_capacity(items.len());
        for item in &items {
            resolved.push(ResolvedRecord::from_fields([resolve_string(&field.media, item)]));

            let file_name = render_value(item.get(&field.media.key));
            let reference = lookup_path(item, &field.media_reference_path).and_then(reference_url);
            if reference.is_none() {
                warn!(
                    field = %field.key,
                    file = %file_name,
                    path = %field.media_reference_path,
                    "media item has no content reference"
                );
            }
            self.attachments
                .enqueue(Arc::clone(&self.client), file_name, reference)
                .await;
        }

        ResolvedField::ok(&field.key, ResolvedValue::Items(resolved))
    }

    /// Follow the reference at `path` and return the referenced items
    async fn fetch_items(
        &self,
        key: &str,
        path: &str,
        record: &Value,
    ) -> Result<Vec<Value>, FieldError> {
        let Some(reference) = lookup_path(record, path).and_then(reference_url) else {
            warn!(field = %key, path = %path, "no reference to follow");
            return Err(FieldError::MissingReference {
                field: key.to_string(),
                path: path.to_string(),
            });
        };

        debug!(
            field = %key,
            reference = %reference,
            client = self.client.name(),
            "following reference"
        );

        match self.client.query(&QueryOptions::for_ref(reference)).await {
            Ok(response) => Ok(response.results),
            Err(e) => {
                warn!(field = %key, error = %e, "nested fetch failed");
                Err(FieldError::Transport {
                    field: key.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Resolve a `string` field; pure, no I/O
pub fn resolve_string(field: &StringField, record: &Value) -> ResolvedField {
    let value = render_value(lookup_path(record, &field.source_path));
    ResolvedField::ok(
        &field.key,
        ResolvedValue::Text(format!("{}{}{}", field.prefix, value, field.postfix)),
    )
}
