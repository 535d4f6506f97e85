//! Deferred attachment downloads
//!
//! Resolving a media collection only *starts* the content fetch of each item
//! and parks the task handle in an [`AttachmentQueue`]. Once every record of a
//! type is resolved, [`AttachmentQueue::drain`] joins all fetches, decodes the
//! base64 payloads and writes them into the processing directory.
//!
//! A queue belongs to one type pass. The exporter creates a fresh one per type
//! and consumes it with `drain`, so entries of different types never mix.

use crate::client::QueryClient;
use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use crate::types::DrainSummary;
use crate::utils::{get_unclaimed_path, validate_file_name};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Attribute of an AttachmentContent object holding the encoded bytes
const CONTENT_ATTRIBUTE: &str = "Content";

/// Content fetch of one queued attachment
enum ContentFetch {
    /// Fetch running in a spawned task
    Pending(JoinHandle<Result<Value>>),
    /// No fetch could be started (the item had no content reference)
    Unavailable(String),
}

/// One attachment waiting for the drain
struct QueuedAttachment {
    file_name: String,
    reference: Option<String>,
    content: ContentFetch,
}

/// Attachments discovered while resolving the records of one type
pub struct AttachmentQueue {
    entries: Mutex<Vec<QueuedAttachment>>,
    fetch_limit: Arc<Semaphore>,
}

impl AttachmentQueue {
    /// Create an empty queue allowing `max_concurrent_fetches` fetches in flight
    pub fn new(max_concurrent_fetches: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            fetch_limit: Arc::new(Semaphore::new(max_concurrent_fetches.max(1))),
        }
    }

    /// Queue an attachment and start fetching its content
    ///
    /// The fetch runs in its own task and is not awaited here. Without a
    /// reference the entry is still queued so the drain reports it.
    pub async fn enqueue(
        &self,
        client: Arc<dyn QueryClient>,
        file_name: String,
        reference: Option<String>,
    ) {
        let content = match &reference {
            Some(reference) => {
                let reference = reference.clone();
                let limit = Arc::clone(&self.fetch_limit);
                ContentFetch::Pending(tokio::spawn(async move {
                    let _permit = limit
                        .acquire_owned()
                        .await
                        .map_err(|e| Error::Other(format!("fetch limiter closed: {}", e)))?;
                    debug!(reference = %reference, "fetching attachment content");
                    client.fetch(&reference).await
                }))
            }
            None => ContentFetch::Unavailable(format!("no content reference for '{}'", file_name)),
        };

        self.entries.lock().await.push(QueuedAttachment {
            file_name,
            reference,
            content,
        });
    }

    /// Number of queued attachments
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether nothing has been queued
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// `(file name, content reference)` of every entry, in queue order
    pub async fn entries(&self) -> Vec<(String, Option<String>)> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|e| (e.file_name.clone(), e.reference.clone()))
            .collect()
    }

    /// Wait for every content fetch, then write every payload to `dir`
    ///
    /// All fetches are joined before the first write. Target paths are then
    /// chosen one entry at a time in queue order, so entries sharing a file
    /// name never race for the same file, and the writes run together. Every
    /// entry settles before this returns. Individual failures are logged and
    /// summed up in [`Error::Attachments`].
    pub async fn drain(self, dir: &Path, collision: FileCollisionAction) -> Result<DrainSummary> {
        let entries = self.entries.into_inner();
        let total = entries.len();
        if total == 0 {
            return Ok(DrainSummary::default());
        }

        info!(count = total, dir = %dir.display(), "waiting for attachment content");

        let fetched = join_all(entries.into_iter().map(|entry| async move {
            let content = match entry.content {
                ContentFetch::Pending(handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(Error::Other(format!("content fetch task failed: {}", e))),
                },
                ContentFetch::Unavailable(reason) => Err(Error::Other(reason)),
            };
            (entry.file_name, content)
        }))
        .await;

        let mut summary = DrainSummary::default();
        let mut failed = 0;
        let mut claimed = HashSet::new();
        let mut writes: Vec<PendingWrite> = Vec::new();

        for (file_name, content) in fetched {
            match place_attachment(dir, &file_name, content, collision, &claimed) {
                Ok(Placement::Write { path, bytes }) => {
                    if let Some(earlier) = writes.iter_mut().find(|w| w.path == path) {
                        // overwrite: the last entry with this name wins
                        debug!(path = %path.display(), "attachment replaced by a later entry");
                        earlier.file_name = file_name;
                        earlier.bytes = bytes;
                        summary.replaced.push(path);
                    } else {
                        claimed.insert(path.clone());
                        writes.push(PendingWrite {
                            file_name,
                            path,
                            bytes,
                        });
                    }
                }
                Ok(Placement::Skip(path)) => {
                    debug!(path = %path.display(), "attachment exists, skipped");
                    summary.skipped.push(path);
                }
                Err(e) => {
                    error!(file = %file_name, error = %e, "failed to save attachment");
                    failed += 1;
                }
            }
        }

        let outcomes = join_all(writes.into_iter().map(|write| async move {
            let outcome = tokio::fs::write(&write.path, &write.bytes).await;
            if outcome.is_ok() {
                debug!(
                    path = %write.path.display(),
                    bytes = write.bytes.len(),
                    "attachment written"
                );
            }
            (write.file_name, write.path, outcome)
        }))
        .await;

        for (file_name, path, outcome) in outcomes {
            match outcome {
                Ok(()) => summary.written.push(path),
                Err(e) => {
                    error!(file = %file_name, error = %e, "failed to save attachment");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(Error::Attachments {
                failed,
                total,
                written: summary.written.len(),
            });
        }

        info!(
            written = summary.written.len(),
            skipped = summary.skipped.len(),
            "attachments saved"
        );
        Ok(summary)
    }
}

/// Where one fetched attachment goes
enum Placement {
    Write { path: PathBuf, bytes: Vec<u8> },
    Skip(PathBuf),
}

struct PendingWrite {
    file_name: String,
    path: PathBuf,
    bytes: Vec<u8>,
}

/// Decode the `Content` attribute of an AttachmentContent object
pub fn decode_content(content: &Value) -> Result<Vec<u8>> {
    let encoded = content
        .get(CONTENT_ATTRIBUTE)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::Other(format!(
                "attachment content has no '{}' attribute",
                CONTENT_ATTRIBUTE
            ))
        })?;
    Ok(BASE64.decode(encoded.trim())?)
}

fn place_attachment(
    dir: &Path,
    file_name: &str,
    content: Result<Value>,
    collision: FileCollisionAction,
    claimed: &HashSet<PathBuf>,
) -> Result<Placement> {
    let content = content?;
    validate_file_name(file_name)?;
    let bytes = decode_content(&content)?;

    let target = dir.join(file_name);
    Ok(match get_unclaimed_path(&target, collision, claimed)? {
        Some(path) => Placement::Write { path, bytes },
        None => Placement::Skip(target),
    })
}
