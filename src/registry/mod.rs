//! Registry collaborators.
//!
//! The retention engine never talks to a registry itself. This module holds
//! the two seams it is wired to:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`InventoryProvider`] | Lists every image in a repository |
//! | [`DeletionExecutor`] | Removes a deletion set, reporting per-image outcomes |
//!
//! Two local backends implement both traits:
//!
//! - [`InMemoryRegistry`]: repositories held in memory, for tests and embedding
//! - [`SnapshotRegistry`]: a JSON `describe-images` snapshot on disk
//!
//! Executors share [`delete_in_batches`], which splits a deletion set into
//! bounded batches and merges the per-batch results.

mod memory;
mod snapshot;

pub use memory::InMemoryRegistry;
pub use snapshot::{MAX_SNAPSHOT_SIZE, SnapshotRegistry};

use crate::Result;
use crate::models::{DeleteImagesResult, Image, ImageId};
use tracing::debug;

/// Largest number of images a single batch delete call may carry.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Failure code reported for digests the registry does not hold.
pub const IMAGE_NOT_FOUND: &str = "ImageNotFound";

/// Source of the full image inventory of a repository.
///
/// Implementations must return every image, however many pages the backing
/// store needs. Any listing failure is fatal and returned as `Err`.
pub trait InventoryProvider: Send + Sync {
    /// Lists all images in `repository`.
    fn images(&self, repository: &str) -> Result<Vec<Image>>;
}

/// Performs deletions approved by the retention engine.
///
/// A failed call is returned as `Err`. Images that individually fail to
/// delete are reported in [`DeleteImagesResult::failures`] instead, since a
/// single batch may partly succeed. An empty deletion set must return an
/// empty result without contacting the registry.
pub trait DeletionExecutor: Send + Sync {
    /// Deletes `images` from `repository`.
    fn delete_images(&self, repository: &str, images: &[Image]) -> Result<DeleteImagesResult>;
}

/// Splits `images` into batches of at most `batch_size` and deletes each.
///
/// `delete_batch` is never called for an empty deletion set. A batch size
/// of zero is treated as one. The first batch call that fails aborts the
/// run. Results are merged in batch order.
pub fn delete_in_batches<F>(
    images: &[Image],
    batch_size: usize,
    mut delete_batch: F,
) -> Result<DeleteImagesResult>
where
    F: FnMut(&[ImageId]) -> Result<DeleteImagesResult>,
{
    let mut result = DeleteImagesResult::default();
    if images.is_empty() {
        return Ok(result);
    }

    let ids: Vec<ImageId> = images.iter().map(ImageId::from).collect();
    let batch_size = batch_size.max(1);
    for (index, batch) in ids.chunks(batch_size).enumerate() {
        debug!(batch = index, size = batch.len(), "Deleting image batch");
        metrics::counter!("gc_delete_batches_total").increment(1);
        result.merge(delete_batch(batch)?);
    }

    metrics::counter!("gc_images_deleted_total")
        .increment(u64::try_from(result.deletions.len()).unwrap_or(u64::MAX));
    metrics::counter!("gc_delete_failures_total")
        .increment(u64::try_from(result.failures.len()).unwrap_or(u64::MAX));

    Ok(result)
}
