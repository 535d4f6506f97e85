//! Rally Web Services API client

use super::{QueryClient, QueryResponse};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::query::{QueryOptions, QueryTarget};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Header carrying a Rally API key
const API_KEY_HEADER: &str = "ZSESSIONID";

/// Longest error body echoed back in [`Error::Api`]
const MAX_ERROR_BODY: usize = 200;

#[derive(Clone)]
enum Credentials {
    ApiKey(String),
    Basic {
        username: String,
        password: Option<String>,
    },
    Anonymous,
}

#[derive(Deserialize)]
struct QueryEnvelope {
    #[serde(rename = "QueryResult")]
    query_result: QueryPage,
}

#[derive(Deserialize)]
struct QueryPage {
    #[serde(rename = "Results", default)]
    results: Vec<Value>,
    #[serde(rename = "TotalResultCount", default)]
    total_result_count: usize,
    #[serde(rename = "Errors", default)]
    errors: Vec<String>,
}

/// [`QueryClient`] for the Rally Web Services API (v2.0)
///
/// Type queries go to `<base_url>/<type>`, references are requested as-is
/// (relative references are resolved against the base URL). Multi-page results
/// are followed until everything, or the configured limit, has been read.
pub struct RallyClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    workspace: Option<String>,
    page_size: usize,
    limit: Option<usize>,
}

impl RallyClient {
    /// Create a client from API settings
    ///
    /// An API key takes precedence over username/password.
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be created
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut base_url = Url::parse(&config.base_url)?;
        // Url::join drops the last segment unless the path ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("rally-export/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        let credentials = match (&config.api_key, &config.username) {
            (Some(key), _) => Credentials::ApiKey(key.clone()),
            (None, Some(username)) => Credentials::Basic {
                username: username.clone(),
                password: config.password.clone(),
            },
            (None, None) => Credentials::Anonymous,
        };

        Ok(Self {
            http,
            base_url,
            credentials,
            workspace: config.workspace.clone(),
            page_size: config.page_size.max(1),
            limit: config.limit,
        })
    }

    /// Base URL every type query is resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn target_url(&self, target: &QueryTarget) -> Result<Url> {
        match target {
            QueryTarget::Type(record_type) => Ok(self.base_url.join(record_type)?),
            QueryTarget::Ref(reference) => self.reference_url(reference),
        }
    }

    fn reference_url(&self, reference: &str) -> Result<Url> {
        match Url::parse(reference) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(self.base_url.join(reference.trim_start_matches('/'))?)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn page_url(&self, base: &Url, options: &QueryOptions, start: usize, page_size: usize) -> Url {
        let mut url = base.clone();
        {
            let mut pairs = url.query_pairs_mut();
            // Without an explicit list, ask for every attribute so nested
            // field configs have something to read.
            let fetch = if options.fetch.is_empty() {
                "true".to_string()
            } else {
                options.fetch.join(",")
            };
            pairs.append_pair("fetch", &fetch);
            if let Some(query) = &options.query {
                pairs.append_pair("query", &query.to_string());
            }
            if let (QueryTarget::Type(_), Some(workspace)) = (&options.target, &self.workspace) {
                pairs.append_pair("workspace", workspace);
            }
            pairs.append_pair("start", &start.to_string());
            pairs.append_pair("pagesize", &page_size.to_string());
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::ApiKey(key) => request.header(API_KEY_HEADER, key),
            Credentials::Basic { username, password } => {
                request.basic_auth(username, password.as_ref())
            }
            Credentials::Anonymous => request,
        }
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        debug!(url = %url, "requesting");

        let response = self.authorize(self.http.get(url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.trim();
            let message = if body.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body.chars().take(MAX_ERROR_BODY).collect()
            };
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

/// Unwrap `{"AttachmentContent": {...}}` style single-object responses
fn unwrap_single_object(body: Value) -> Result<Value> {
    let map = match body {
        Value::Object(map) => map,
        other => {
            return Err(Error::Other(format!(
                "expected a JSON object, got {}",
                other
            )));
        }
    };

    let inner = if map.len() == 1 {
        map.into_iter()
            .next()
            .map(|(_, value)| value)
            .unwrap_or(Value::Null)
    } else {
        Value::Object(map)
    };

    let errors = api_errors(&inner);
    if !errors.is_empty() {
        return Err(Error::Api {
            status: 200,
            message: errors.join("; "),
        });
    }
    Ok(inner)
}

fn api_errors(value: &Value) -> Vec<String> {
    value
        .get("Errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl QueryClient for RallyClient {
    async fn query(&self, options: &QueryOptions) -> Result<QueryResponse> {
        if self.limit == Some(0) {
            return Ok(QueryResponse::default());
        }

        let base = self.target_url(&options.target)?;
        let mut results = Vec::new();
        let mut total = 0;
        let mut start = 1;

        loop {
            let page_size = match self.limit {
                Some(limit) => self.page_size.min(limit - results.len()),
                None => self.page_size,
            };
            let body = self
                .get_json(self.page_url(&base, options, start, page_size))
                .await?;
            let page = serde_json::from_value::<QueryEnvelope>(body)?.query_result;

            if !page.errors.is_empty() {
                return Err(Error::Api {
                    status: 200,
                    message: page.errors.join("; "),
                });
            }

            total = page.total_result_count;
            let received = page.results.len();
            results.extend(page.results);
            start += received;

            let wanted = self.limit.map_or(total, |limit| limit.min(total));
            if received == 0 || results.len() >= wanted {
                break;
            }
        }

        if let Some(limit) = self.limit {
            results.truncate(limit);
        }

        debug!(
            query_target = ?options.target,
            received = results.len(),
            total,
            "query complete"
        );

        Ok(QueryResponse {
            results,
            total_result_count: total,
        })
    }

    async fn fetch(&self, reference: &str) -> Result<Value> {
        let url = self.reference_url(reference)?;
        let body = self.get_json(url).await?;
        unwrap_single_object(body)
    }

    fn name(&self) -> &'static str {
        "rally"
    }
}
