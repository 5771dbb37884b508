//! In-memory registry backend.
//!
//! Holds repositories in a `Mutex`-guarded map. Useful for tests and for
//! embedding the engine where the inventory is already in hand.

use super::{DEFAULT_BATCH_SIZE, DeletionExecutor, IMAGE_NOT_FOUND, InventoryProvider};
use crate::models::{DeleteImagesResult, Image, ImageFailure, ImageId};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::instrument;

/// A registry whose repositories live in memory.
#[derive(Debug)]
pub struct InMemoryRegistry {
    repositories: Mutex<BTreeMap<String, Vec<Image>>>,
    batch_size: usize,
    batch_calls: AtomicUsize,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            repositories: Mutex::new(BTreeMap::new()),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// Sets the maximum batch size for delete calls.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Adds (or replaces) a repository and its images.
    #[must_use]
    pub fn with_repository(mut self, name: impl Into<String>, images: Vec<Image>) -> Self {
        if let Ok(repositories) = self.repositories.get_mut() {
            repositories.insert(name.into(), images);
        }
        self
    }

    /// Returns the number of batch delete calls issued so far.
    #[must_use]
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::Relaxed)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<Image>>>> {
        self.repositories
            .lock()
            .map_err(|e| Error::operation("lock_registry", e))
    }

    fn delete_batch(&self, repository: &str, ids: &[ImageId]) -> Result<DeleteImagesResult> {
        self.batch_calls.fetch_add(1, Ordering::Relaxed);
        let mut repositories = self.lock()?;
        let images = repositories
            .get_mut(repository)
            .ok_or_else(|| Error::NotFound(format!("repository '{repository}'")))?;

        let mut result = DeleteImagesResult::default();
        for id in ids {
            let Some(position) = images.iter().position(|img| img.digest == id.digest) else {
                result.failures.push(ImageFailure::new(
                    id.clone(),
                    IMAGE_NOT_FOUND,
                    "Requested image not found",
                ));
                continue;
            };
            let removed = images.remove(position);
            let mut deleted = ImageId::from_digest(removed.digest);
            deleted.tag = removed.tags.into_iter().next();
            result.deletions.push(deleted);
        }
        Ok(result)
    }
}

impl InventoryProvider for InMemoryRegistry {
    fn images(&self, repository: &str) -> Result<Vec<Image>> {
        self.lock()?
            .get(repository)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("repository '{repository}'")))
    }
}

impl DeletionExecutor for InMemoryRegistry {
    #[instrument(
        name = "registry_gc.registry.memory.delete",
        skip(self, images),
        fields(component = "registry", operation = "delete", images = images.len())
    )]
    fn delete_images(&self, repository: &str, images: &[Image]) -> Result<DeleteImagesResult> {
        super::delete_in_batches(images, self.batch_size, |ids| {
            self.delete_batch(repository, ids)
        })
    }
}
