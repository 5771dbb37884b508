//! Registry image records and deletion outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of digest characters shown in reports.
pub const SHORT_DIGEST_LEN: usize = 16;

/// A container image as listed by a registry.
///
/// Images are immutable snapshots: the engine reads them and hands out
/// copies, it never edits one in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Image {
    /// Content digest, e.g. `sha256:9f86d08...`.
    pub digest: String,
    /// When the image was pushed to the registry.
    pub pushed_at: DateTime<Utc>,
    /// Tags naming this image, in registry order. Empty for untagged images.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Image {
    /// Creates a new image record.
    #[must_use]
    pub fn new(
        digest: impl Into<String>,
        pushed_at: DateTime<Utc>,
        tags: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            digest: digest.into(),
            pushed_at,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if the image carries no tags.
    #[must_use]
    pub fn is_untagged(&self) -> bool {
        self.tags.is_empty()
    }

    /// Returns the leading part of the digest used in reports.
    #[must_use]
    pub fn short_digest(&self) -> &str {
        short_digest(&self.digest)
    }
}

/// Truncates a digest to at most [`SHORT_DIGEST_LEN`] characters.
#[must_use]
pub fn short_digest(digest: &str) -> &str {
    digest
        .char_indices()
        .nth(SHORT_DIGEST_LEN)
        .map_or(digest, |(idx, _)| &digest[..idx])
}

/// Returns a copy of `images` ordered most recently pushed first.
///
/// The sort is stable: images pushed at the same instant keep the relative
/// order they had in the input, so identical inventories always produce
/// identical output.
#[must_use]
pub fn newest_first(images: &[Image]) -> Vec<Image> {
    let mut sorted = images.to_vec();
    sorted.sort_by(|a, b| b.pushed_at.cmp(&a.pushed_at));
    sorted
}

/// Identity of an image in a deletion request or result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId {
    /// Content digest.
    pub digest: String,
    /// Tag that resolved to the digest, when the registry reports one.
    pub tag: Option<String>,
}

impl ImageId {
    /// Creates an identifier addressed by digest only.
    #[must_use]
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            tag: None,
        }
    }

    /// Sets the resolved tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

impl From<&Image> for ImageId {
    fn from(image: &Image) -> Self {
        Self::from_digest(image.digest.clone())
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{tag}", self.digest),
            None => write!(f, "{}", self.digest),
        }
    }
}

/// A failure to delete a single image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFailure {
    /// The image that could not be deleted.
    pub id: ImageId,
    /// Machine-readable failure code, e.g. `ImageNotFound`.
    pub code: String,
    /// Human-readable reason.
    pub reason: String,
}

impl ImageFailure {
    /// Creates a failure record.
    #[must_use]
    pub fn new(id: ImageId, code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            code: code.into(),
            reason: reason.into(),
        }
    }
}

/// Successes and failures of a deletion run.
///
/// A single batch call can report a mix of both, so failures here are
/// partial-success details rather than errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteImagesResult {
    /// Images that were removed.
    pub deletions: Vec<ImageId>,
    /// Images the registry refused or could not find.
    pub failures: Vec<ImageFailure>,
}

impl DeleteImagesResult {
    /// Returns `true` if nothing was attempted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.failures.is_empty()
    }

    /// Returns `true` if any image failed to delete.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Appends another result, keeping batch order.
    pub fn merge(&mut self, other: Self) {
        self.deletions.extend(other.deletions);
        self.failures.extend(other.failures);
    }
}
