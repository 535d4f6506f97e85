//! Remote query client
//!
//! The exporter only talks to the API through the [`QueryClient`] trait, so the
//! extraction engine can run against any backend. [`RallyClient`] is the
//! implementation for the Rally Web Services API.
//!
//! ## Usage
//!
//! ```no_run
//! use rally_export::client::{QueryClient, RallyClient};
//! use rally_export::config::ApiConfig;
//! use rally_export::query::{Filter, QueryOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RallyClient::new(&ApiConfig::default().with_env_credentials())?;
//!
//!     let options = QueryOptions {
//!         fetch: vec!["FormattedID".into(), "Name".into()],
//!         ..QueryOptions::for_type("defect", &[], &[Filter::new("State", "=", "Open")])
//!     };
//!     let response = client.query(&options).await?;
//!     println!("{} open defects", response.total_result_count);
//!
//!     Ok(())
//! }
//! ```

mod rally;

pub use rally::RallyClient;

use crate::error::Result;
use crate::query::QueryOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Records returned by a query
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    /// The records, in the order the API returned them
    #[serde(rename = "Results", default)]
    pub results: Vec<Value>,

    /// Number of records matching the query on the server
    #[serde(rename = "TotalResultCount", default)]
    pub total_result_count: usize,
}

impl QueryResponse {
    /// A response holding exactly these records
    pub fn from_results(results: Vec<Value>) -> Self {
        Self {
            total_result_count: results.len(),
            results,
        }
    }
}

/// Access to the remote API
///
/// Implementations must be shareable across tasks: attachment content fetches
/// run as spawned tasks holding a clone of the client.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Run a query for a type or a collection reference
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the API reports errors, or the
    /// response cannot be parsed.
    async fn query(&self, options: &QueryOptions) -> Result<QueryResponse>;

    /// Fetch the single object behind a reference (e.g. attachment content)
    ///
    /// # Errors
    ///
    /// Same conditions as [`query`](QueryClient::query).
    async fn fetch(&self, reference: &str) -> Result<Value>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
