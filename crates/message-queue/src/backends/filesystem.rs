//! Filesystem backend.
//!
//! Each queue is a directory under the backend root and each message is one
//! JSON file named `<timestamp>-<sequence>-<uuid>.json`, so a directory listing
//! sorted by name is insertion order. Files are written to a temporary name
//! and renamed into place.
//!
//! Receive claims a file by renaming it before reading it. Rename succeeds for
//! exactly one caller, which makes receive safe across threads and processes
//! sharing the same directory.

use crate::backend::{Backend, BackendKind};
use crate::config::InterfaceConfig;
use crate::error::BackendError;
use crate::message::{Envelope, QueueName, ReceiveOptions};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

#[cfg(test)]
#[path = "filesystem_tests.rs"]
mod tests;

const MESSAGE_EXTENSION: &str = "json";

/// On-disk representation of a message
#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    id: String,
    queue: QueueName,
    enqueued_at: DateTime<Utc>,
    envelope: Envelope,
}

/// A message file waiting to be claimed
struct PendingFile {
    queue: QueueName,
    file_name: String,
    path: PathBuf,
}

/// Directory-per-queue backend.
///
/// # Examples
///
/// ```no_run
/// use message_queue::backends::FileSystemBackend;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = FileSystemBackend::new("./data/queues").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileSystemBackend {
    root: PathBuf,
    sequence: AtomicU64,
}

impl FileSystemBackend {
    /// Create a backend rooted at `root`, creating the directory if needed
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| io_error(&root, e))?;

        Ok(Self {
            root,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of unclaimed messages on `queue`
    pub async fn len(&self, queue: &QueueName) -> Result<usize, BackendError> {
        Ok(self.pending_files(queue).await?.len())
    }

    fn queue_dir(&self, queue: &QueueName) -> PathBuf {
        self.root.join(queue.as_str())
    }

    fn next_file_name(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{:010}-{}.{}",
            Utc::now().format("%Y%m%dT%H%M%S%.9f"),
            sequence,
            Uuid::new_v4().simple(),
            MESSAGE_EXTENSION
        )
    }

    /// Unclaimed message files on `queue`, sorted by name
    async fn pending_files(&self, queue: &QueueName) -> Result<Vec<PendingFile>, BackendError> {
        let dir = self.queue_dir(queue);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(MESSAGE_EXTENSION) {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(String::from)
            else {
                continue;
            };
            files.push(PendingFile {
                queue: queue.clone(),
                file_name,
                path,
            });
        }

        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }

    /// Queue directories owned by `config`
    async fn owned_queues(&self, config: &InterfaceConfig) -> Result<Vec<QueueName>, BackendError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))?;

        let mut queues = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                continue;
            };
            if let Ok(queue) = QueueName::new(name) {
                if config.queues.matches(queue.as_str()) {
                    queues.push(queue);
                }
            }
        }

        queues.sort();
        Ok(queues)
    }

    /// Claim, read and delete one message file.
    ///
    /// Returns `Ok(None)` when another receiver claimed the file first or the
    /// file could not be parsed.
    async fn take(&self, pending: PendingFile) -> Result<Option<Envelope>, BackendError> {
        let claimed = pending
            .path
            .with_file_name(format!(".{}.claimed-{}", pending.file_name, Uuid::new_v4().simple()));

        match fs::rename(&pending.path, &claimed).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&pending.path, e)),
        }

        let json = fs::read_to_string(&claimed)
            .await
            .map_err(|e| io_error(&claimed, e))?;

        let stored: StoredMessage = match serde_json::from_str(&json) {
            Ok(stored) => stored,
            Err(e) => {
                let corrupt = pending
                    .path
                    .with_file_name(format!(".{}.corrupt", pending.file_name));
                warn!(
                    queue = %pending.queue,
                    file = %pending.file_name,
                    error = %e,
                    "Skipping unreadable message file"
                );
                fs::rename(&claimed, &corrupt)
                    .await
                    .map_err(|e| io_error(&claimed, e))?;
                return Ok(None);
            }
        };

        fs::remove_file(&claimed)
            .await
            .map_err(|e| io_error(&claimed, e))?;

        Ok(Some(stored.envelope.with_queue(stored.queue)))
    }
}

#[async_trait]
impl Backend for FileSystemBackend {
    async fn send(
        &self,
        queue: &QueueName,
        mut envelope: Envelope,
        _config: &InterfaceConfig,
    ) -> Result<(), BackendError> {
        let dir = self.queue_dir(queue);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_error(&dir, e))?;

        envelope.queue = None;
        let file_name = self.next_file_name();
        let stored = StoredMessage {
            id: file_name.trim_end_matches(".json").to_string(),
            queue: queue.clone(),
            enqueued_at: Utc::now(),
            envelope,
        };

        let json = serde_json::to_vec(&stored).map_err(|e| BackendError::Corrupt {
            id: stored.id.clone(),
            message: e.to_string(),
        })?;

        let final_path = dir.join(&file_name);
        let temp_path = dir.join(format!(".{}.tmp", file_name));

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        file.write_all(&json)
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        file.flush().await.map_err(|e| io_error(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| io_error(&final_path, e))?;

        debug!(queue = %queue, id = %stored.id, "Stored message file");
        Ok(())
    }

    async fn receive(
        &self,
        queue: Option<&QueueName>,
        config: &InterfaceConfig,
        options: &ReceiveOptions,
    ) -> Result<Vec<Envelope>, BackendError> {
        let mut pending = match queue {
            Some(queue) => self.pending_files(queue).await?,
            None => {
                let mut all = Vec::new();
                for queue in self.owned_queues(config).await? {
                    all.extend(self.pending_files(&queue).await?);
                }
                all.sort_by(|a, b| a.file_name.cmp(&b.file_name));
                all
            }
        };

        let mut received = Vec::new();
        for file in pending.drain(..) {
            if options.is_satisfied(received.len()) {
                break;
            }
            if let Some(envelope) = self.take(file).await? {
                received.push(envelope);
            }
        }

        debug!(
            queue = queue.map(QueueName::as_str).unwrap_or("*"),
            count = received.len(),
            "Received message files"
        );
        Ok(received)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::FileSystem
    }
}

fn io_error(path: &Path, source: std::io::Error) -> BackendError {
    BackendError::Io {
        path: path.display().to_string(),
        source,
    }
}
