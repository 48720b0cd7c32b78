// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::errors::{TaskError, UploadError};
use common::EvidenceType;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Uploads running at once in a batch.
pub const MAX_CONCURRENT_UPLOADS: usize = 3;

const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;
const MAX_FILE_BYTES: usize = 25 * 1024 * 1024;

const PHOTO_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/heic",
];

const DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "text/plain",
    "text/csv",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/zip",
];

/// A file received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Where a stored file ended up.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub url: String,
    pub path: String,
    pub name: String,
    pub size: i64,
}

/// Checks a file against the rules for its evidence type. Photos must be
/// images up to 10 MiB; other files may also be documents, up to 25 MiB.
pub fn validate_upload(evidence_type: EvidenceType, file: &FileUpload) -> Result<(), TaskError> {
    if file.bytes.is_empty() {
        return Err(TaskError::validation(format!(
            "File '{}' is empty.",
            file.name
        )));
    }

    let content_type = file.content_type.to_ascii_lowercase();
    let (allowed, max_bytes) = match evidence_type {
        EvidenceType::Photo => (PHOTO_TYPES.contains(&content_type.as_str()), MAX_PHOTO_BYTES),
        EvidenceType::File => (
            PHOTO_TYPES.contains(&content_type.as_str())
                || DOCUMENT_TYPES.contains(&content_type.as_str()),
            MAX_FILE_BYTES,
        ),
        EvidenceType::Link | EvidenceType::Checklist => {
            return Err(TaskError::validation(
                "Files can only be attached as photo or file evidence.",
            ));
        }
    };

    if !allowed {
        return Err(TaskError::validation(format!(
            "File type '{}' is not allowed for {:?} evidence.",
            file.content_type, evidence_type
        )));
    }
    if file.bytes.len() > max_bytes {
        return Err(TaskError::validation(format!(
            "File '{}' exceeds the {} MiB limit.",
            file.name,
            max_bytes / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Owner side of an upload cancellation.
pub struct AbortController {
    tx: watch::Sender<bool>,
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation token passed into uploads.
#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the controller aborts. Pends forever if the controller is
    /// gone without aborting.
    pub async fn aborted(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Removes a partially written file unless the write was committed.
struct PartFile {
    path: PathBuf,
    committed: bool,
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Filesystem blob storage for submission evidence, keyed by task id.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
    public_prefix: String,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_prefix: "/evidence".to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores a file under `<task_id>/<uuid>_<name>`. Either the whole file
    /// is stored or nothing is left behind, including on cancellation.
    pub async fn put(
        &self,
        task_id: i64,
        file: &FileUpload,
        signal: &AbortSignal,
    ) -> Result<StoredObject, UploadError> {
        let mut signal = signal.clone();
        if signal.is_aborted() {
            return Err(UploadError::Cancelled);
        }

        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(UploadError::Bucket(format!(
                    "{} is not a directory",
                    self.root.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(UploadError::Permission(e.to_string()));
            }
            Err(e) => {
                return Err(UploadError::Bucket(format!(
                    "{}: {}",
                    self.root.display(),
                    e
                )));
            }
        }

        let name = sanitize_file_name(&file.name);
        let object_id = Uuid::new_v4();
        let key = format!("{}/{}_{}", task_id, object_id, name);
        let target = self.root.join(&key);
        let mut part = PartFile {
            path: self.root.join(format!("{}/{}.part", task_id, object_id)),
            committed: false,
        };

        tokio::fs::create_dir_all(self.root.join(task_id.to_string())).await?;

        tokio::select! {
            written = write_part(&part.path, &file.bytes) => written?,
            _ = signal.aborted() => {
                info!("Upload of '{}' for task {} cancelled.", name, task_id);
                return Err(UploadError::Cancelled);
            }
        }

        tokio::fs::rename(&part.path, &target).await?;
        part.committed = true;

        debug!("Stored {} bytes at {}", file.bytes.len(), key);

        Ok(StoredObject {
            url: format!("{}/{}", self.public_prefix, key),
            path: key,
            name,
            size: file.bytes.len() as i64,
        })
    }

    pub async fn remove(&self, path: &str) -> Result<(), UploadError> {
        if path.split('/').any(|segment| segment == "..") {
            return Err(UploadError::Other(format!("Refusing to remove '{}'", path)));
        }
        tokio::fs::remove_file(self.root.join(path)).await?;
        Ok(())
    }

    /// Uploads several files with at most `MAX_CONCURRENT_UPLOADS` in flight.
    /// A failed upload does not stop the others; results keep input order.
    pub async fn put_many(
        self: &Arc<Self>,
        task_id: i64,
        files: Vec<FileUpload>,
        signal: &AbortSignal,
    ) -> Vec<Result<StoredObject, UploadError>> {
        let permits = Arc::new(Semaphore::new(MAX_CONCURRENT_UPLOADS));
        let handles: Vec<_> = files
            .into_iter()
            .map(|file| {
                let store = Arc::clone(self);
                let permits = Arc::clone(&permits);
                let signal = signal.clone();
                tokio::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| UploadError::Other(e.to_string()))?;
                    let result = store.put(task_id, &file, &signal).await;
                    if let Err(e) = &result {
                        warn!("Upload of '{}' for task {} failed: {}", file.name, task_id, e);
                    }
                    result
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(UploadError::Other(format!("upload task failed: {}", e))),
            });
        }
        results
    }
}

async fn write_part(path: &Path, bytes: &[u8]) -> Result<(), UploadError> {
    let mut out = tokio::fs::File::create(path).await?;
    out.write_all(bytes).await?;
    out.sync_all().await?;
    Ok(())
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
