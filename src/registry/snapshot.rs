//! Snapshot-file registry backend.
//!
//! Reads and rewrites a JSON document in the shape returned by
//! `aws ecr describe-images`:
//!
//! ```json
//! {
//!   "imageDetails": [
//!     {
//!       "repositoryName": "web",
//!       "imageDigest": "sha256:a1b2...",
//!       "imageTags": ["release-12"],
//!       "imagePushedAt": "2024-03-01T12:00:00+00:00"
//!     }
//!   ]
//! }
//! ```
//!
//! `imagePushedAt` may be an RFC 3339 string (AWS CLI v2) or epoch seconds
//! (AWS CLI v1); rewritten snapshots always use RFC 3339. Listing a
//! repository with no entries in the snapshot is [`Error::NotFound`].
//!
//! Fields the engine does not use (sizes, manifest types, ...) are carried
//! through untouched when the snapshot is rewritten.
//!
//! # Security
//!
//! Snapshots larger than [`MAX_SNAPSHOT_SIZE`] are rejected before parsing,
//! and rewrites go through a temporary file followed by a rename so a crash
//! never leaves a truncated snapshot behind.

use super::{DEFAULT_BATCH_SIZE, DeletionExecutor, IMAGE_NOT_FOUND, InventoryProvider};
use crate::models::{DeleteImagesResult, Image, ImageFailure, ImageId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Maximum snapshot file size (64 MiB).
pub const MAX_SNAPSHOT_SIZE: u64 = 64 * 1024 * 1024;

/// On-disk snapshot document.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotFile {
    #[serde(default)]
    image_details: Vec<ImageDetail>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// One `imageDetails` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repository_name: Option<String>,
    image_digest: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    image_tags: Vec<String>,
    #[serde(deserialize_with = "deserialize_pushed_at")]
    image_pushed_at: DateTime<Utc>,
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// `imagePushedAt` as written by the AWS CLI: an RFC 3339 string (v2) or
/// epoch seconds (v1 default `cli_timestamp_format`).
#[derive(Deserialize)]
#[serde(untagged)]
enum PushedAt {
    Rfc3339(DateTime<Utc>),
    EpochSeconds(f64),
}

fn deserialize_pushed_at<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match PushedAt::deserialize(deserializer)? {
        PushedAt::Rfc3339(pushed_at) => Ok(pushed_at),
        PushedAt::EpochSeconds(secs) => from_epoch_seconds(secs).ok_or_else(|| {
            serde::de::Error::custom(format!("imagePushedAt {secs} is out of range"))
        }),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0);
    DateTime::from_timestamp(whole as i64, nanos as u32)
}

impl ImageDetail {
    fn belongs_to(&self, repository: &str) -> bool {
        self.repository_name
            .as_deref()
            .is_none_or(|name| name == repository)
    }

    fn to_image(&self) -> Image {
        Image {
            digest: self.image_digest.clone(),
            pushed_at: self.image_pushed_at,
            tags: self.image_tags.clone(),
        }
    }
}

/// A registry backed by a `describe-images` JSON snapshot.
#[derive(Debug)]
pub struct SnapshotRegistry {
    path: PathBuf,
    batch_size: usize,
    write_lock: Mutex<()>,
}

impl SnapshotRegistry {
    /// Opens the snapshot at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::NotFound(format!("snapshot {}", path.display())));
        }
        Ok(Self {
            path,
            batch_size: DEFAULT_BATCH_SIZE,
            write_lock: Mutex::new(()),
        })
    }

    /// Sets the maximum batch size for delete calls.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<SnapshotFile> {
        let metadata = fs::metadata(&self.path).map_err(|e| {
            Error::operation("read_snapshot", format!("{}: {e}", self.path.display()))
        })?;
        if metadata.len() > MAX_SNAPSHOT_SIZE {
            return Err(Error::InvalidInput(format!(
                "snapshot {} is {} bytes, limit is {MAX_SNAPSHOT_SIZE}",
                self.path.display(),
                metadata.len()
            )));
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            Error::operation("read_snapshot", format!("{}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            Error::operation("parse_snapshot", format!("{}: {e}", self.path.display()))
        })
    }

    fn write(&self, snapshot: &SnapshotFile) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| Error::operation("serialize_snapshot", e))?;

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        fs::write(&tmp_path, json).map_err(|e| {
            Error::operation("write_snapshot", format!("{}: {e}", tmp_path.display()))
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            Error::operation("write_snapshot", format!("{}: {e}", self.path.display()))
        })
    }

    fn delete_batch(&self, repository: &str, ids: &[ImageId]) -> Result<DeleteImagesResult> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| Error::operation("lock_snapshot", e))?;
        let mut snapshot = self.read()?;
        let mut result = DeleteImagesResult::default();

        for id in ids {
            let position = snapshot
                .image_details
                .iter()
                .position(|d| d.belongs_to(repository) && d.image_digest == id.digest);
            let Some(position) = position else {
                result.failures.push(ImageFailure::new(
                    id.clone(),
                    IMAGE_NOT_FOUND,
                    "Requested image not found",
                ));
                continue;
            };
            let removed = snapshot.image_details.remove(position);
            let mut deleted = ImageId::from_digest(removed.image_digest);
            deleted.tag = removed.image_tags.into_iter().next();
            result.deletions.push(deleted);
        }

        if !result.deletions.is_empty() {
            self.write(&snapshot)?;
        }
        debug!(
            deleted = result.deletions.len(),
            failed = result.failures.len(),
            "Snapshot batch applied"
        );
        Ok(result)
    }
}

impl InventoryProvider for SnapshotRegistry {
    #[instrument(
        name = "registry_gc.registry.snapshot.images",
        skip(self),
        fields(component = "registry", operation = "list", path = %self.path.display())
    )]
    fn images(&self, repository: &str) -> Result<Vec<Image>> {
        let snapshot = self.read()?;
        let images: Vec<Image> = snapshot
            .image_details
            .iter()
            .filter(|d| d.belongs_to(repository))
            .map(ImageDetail::to_image)
            .collect();

        if images.is_empty() {
            warn!(
                repository,
                entries = snapshot.image_details.len(),
                "Snapshot holds no images for repository"
            );
            return Err(Error::NotFound(format!("repository '{repository}'")));
        }
        Ok(images)
    }
}

impl DeletionExecutor for SnapshotRegistry {
    #[instrument(
        name = "registry_gc.registry.snapshot.delete",
        skip(self, images),
        fields(component = "registry", operation = "delete", images = images.len())
    )]
    fn delete_images(&self, repository: &str, images: &[Image]) -> Result<DeleteImagesResult> {
        super::delete_in_batches(images, self.batch_size, |ids| {
            self.delete_batch(repository, ids)
        })
    }
}
