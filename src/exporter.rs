//! Export run orchestration
//!
//! For every configured record type, in order:
//! 1. query the type with the configured fetch list and filter
//! 2. resolve every returned record (the attachment queue fills up here)
//! 3. print the resolved records as a pretty JSON array
//! 4. drain the type's attachment queue into the processing directory
//!
//! Types run one after another, each with its own attachment queue.

use crate::attachments::AttachmentQueue;
use crate::client::{QueryClient, RallyClient};
use crate::config::ExportConfig;
use crate::error::{Error, Result};
use crate::field::FieldSpec;
use crate::processor::FieldProcessor;
use crate::query::QueryOptions;
use crate::types::{DrainSummary, ResolvedRecord, RunSummary};
use std::io::Write;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Records of one type, resolved but with attachments not yet written
pub struct TypeBatch {
    /// Record type name
    pub record_type: String,
    /// Resolved records in the order the API returned them
    pub records: Vec<ResolvedRecord>,
    /// Attachment fetches started while resolving
    pub attachments: AttachmentQueue,
}

/// Runs an export over all configured types
pub struct Exporter {
    config: ExportConfig,
    client: Arc<dyn QueryClient>,
    specs: Vec<(String, Vec<FieldSpec>)>,
}

impl Exporter {
    /// Create an exporter using the given client
    ///
    /// # Errors
    /// Returns error if the configuration is invalid
    pub fn new(config: ExportConfig, client: Arc<dyn QueryClient>) -> Result<Self> {
        config.validate()?;

        let specs = config
            .types
            .iter()
            .map(|record_type| {
                let specs = FieldSpec::from_configs(&config.configs_for_type(record_type))?;
                Ok((record_type.clone(), specs))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            client,
            specs,
        })
    }

    /// Create an exporter talking to the Rally API described in the config
    pub fn from_config(config: ExportConfig) -> Result<Self> {
        let client = RallyClient::new(&config.api)?;
        Self::new(config, Arc::new(client))
    }

    /// Field specs for a type (global fields first)
    pub fn specs_for(&self, record_type: &str) -> Option<&[FieldSpec]> {
        self.specs
            .iter()
            .find(|(t, _)| t == record_type)
            .map(|(_, specs)| specs.as_slice())
    }

    /// Query a type and resolve all of its records
    ///
    /// # Errors
    /// Returns error if the type is not configured or its top-level query fails.
    /// Failures of individual fields are recorded in the records instead.
    pub async fn resolve_type(&self, record_type: &str) -> Result<TypeBatch> {
        let specs = self.specs_for(record_type).ok_or_else(|| {
            Error::config(format!("type '{}' is not configured", record_type), "types")
        })?;

        let options = QueryOptions::for_type(record_type, specs, &self.config.filter);
        info!(
            record_type,
            fetch = %options.fetch.join(","),
            query = %options.query.as_ref().map(ToString::to_string).unwrap_or_default(),
            "querying records"
        );
        let response = self.client.query(&options).await?;

        let attachments = AttachmentQueue::new(self.config.attachments.max_concurrent_fetches);
        let records = FieldProcessor::new(Arc::clone(&self.client), &attachments)
            .resolve_records(specs, &response.results)
            .await;

        let queued = attachments.len().await;
        info!(
            record_type,
            records = records.len(),
            attachments = queued,
            "records resolved"
        );

        Ok(TypeBatch {
            record_type: record_type.to_string(),
            records,
            attachments,
        })
    }

    /// Write the attachments of a resolved batch into the processing directory
    pub async fn save_attachments(&self, attachments: AttachmentQueue) -> Result<DrainSummary> {
        attachments
            .drain(
                &self.config.processing_dir,
                self.config.attachments.file_collision,
            )
            .await
    }

    /// Export every configured type, printing JSON to stdout
    pub async fn run(&self) -> Result<RunSummary> {
        self.run_with_writer(&mut std::io::stdout()).await
    }

    /// Export every configured type, writing JSON to `out`
    ///
    /// A type whose query fails is logged and skipped; so is a type whose
    /// attachments could not all be saved. The run itself only fails when the
    /// processing directory is missing or `out` cannot be written.
    pub async fn run_with_writer<W: Write>(&self, out: &mut W) -> Result<RunSummary> {
        let dir = &self.config.processing_dir;
        if !dir.is_dir() {
            return Err(Error::config(
                format!("processing directory {} does not exist", dir.display()),
                "processing_dir",
            ));
        }

        let mut summary = RunSummary::default();

        for (record_type, _) in &self.specs {
            let batch = match self.resolve_type(record_type).await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(record_type = %record_type, error = %e, "export of type failed");
                    summary.types_failed += 1;
                    continue;
                }
            };

            writeln!(out, "{}", serde_json::to_string_pretty(&batch.records)?)?;
            out.flush()?;
            summary.types_exported += 1;
            summary.records += batch.records.len();

            match self.save_attachments(batch.attachments).await {
                Ok(drained) => summary.attachments_written += drained.written.len(),
                Err(e) => {
                    warn!(record_type = %record_type, error = %e, "attachment phase incomplete");
                    if let Error::Attachments { written, .. } = e {
                        summary.attachments_written += written;
                    }
                    summary.attachment_failures += 1;
                }
            }
        }

        info!(
            types = summary.types_exported,
            failed = summary.types_failed,
            records = summary.records,
            attachments = summary.attachments_written,
            "export finished"
        );
        Ok(summary)
    }
}
