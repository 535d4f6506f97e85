//! # rally-export
//!
//! Configuration-driven exporter for Rally records and their attachments.
//!
//! ## How it works
//!
//! An export is described by a JSON configuration: the record types to query,
//! a filter, and a tree of field configs per type. For every record the
//! exporter resolves each configured field:
//!
//! - **string** fields are read from the record by dotted path
//! - **collection** fields follow a reference and resolve nested fields for
//!   every referenced item
//! - **mediaCollection** fields do the same for attachments, and download the
//!   attachment content once all records of the type are resolved
//!
//! A field that cannot be resolved never aborts the export: configuration
//! mistakes show up as a diagnostic string in place of the value, failed
//! fetches as `null`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rally_export::{ExportConfig, Exporter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ExportConfig::from_file("rally-config.json")?;
//!     config.api = config.api.with_env_credentials();
//!
//!     let exporter = Exporter::from_config(config)?;
//!     let summary = exporter.run().await?;
//!     eprintln!("exported {} records", summary.records);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Deferred attachment downloads
pub mod attachments;
/// Remote query client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Export run orchestration
pub mod exporter;
/// Validated field configuration tree
pub mod field;
/// Field resolution
pub mod processor;
/// Query options and filter composition
pub mod query;
/// Core result types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use attachments::AttachmentQueue;
pub use client::{QueryClient, QueryResponse, RallyClient};
pub use config::{ApiConfig, AttachmentConfig, ExportConfig, FieldConfig, FileCollisionAction};
pub use error::{Error, FieldError, Result};
pub use exporter::{Exporter, TypeBatch};
pub use field::FieldSpec;
pub use processor::FieldProcessor;
pub use query::{Filter, Query, QueryOptions, QueryTarget};
pub use types::{DrainSummary, ResolvedField, ResolvedRecord, ResolvedValue, RunSummary};
