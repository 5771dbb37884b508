//! # registry-gc
//!
//! Retention-policy garbage collection for container registry images.
//!
//! registry-gc looks at every image in a repository and decides which ones
//! a retention policy allows to be deleted: keep the N most recent images
//! per tag prefix, keep anything carrying a tag the policy does not manage,
//! and optionally sweep untagged images.
//!
//! ## Layout
//!
//! - [`gc`]: the retention engine (pure, no I/O)
//! - [`models`]: image records and deletion outcomes
//! - [`registry`]: inventory and deletion collaborators, batching
//! - [`config`]: layered TOML/env configuration
//! - [`observability`]: structured logging
//! - [`cli`]: command implementations behind the `registry-gc` binary
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use registry_gc::gc::{RetentionPolicy, images_to_delete};
//! use registry_gc::models::Image;
//!
//! let inventory = vec![
//!     Image::new("sha256:aaa", Utc::now(), Vec::<String>::new()),
//! ];
//! let policy = RetentionPolicy::new().with_delete_untagged(true);
//!
//! let deletions = images_to_delete(&inventory, &policy);
//! assert_eq!(deletions.len(), 1);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod gc;
pub mod models;
pub mod observability;
pub mod registry;

// Re-exports for convenience
pub use config::GcConfig;
pub use gc::{Classification, KeepRule, RetentionPlan, RetentionPolicy, images_to_delete, plan};
pub use models::{DeleteImagesResult, Image, ImageFailure, ImageId};
pub use registry::{DeletionExecutor, InMemoryRegistry, InventoryProvider, SnapshotRegistry};

/// Error type for registry-gc operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed keep rules, out-of-range config values, missing repository |
/// | `OperationFailed` | I/O, JSON or TOML failures, logging initialization |
/// | `NotFound` | Unknown repository, missing snapshot file |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A keep rule is not of the form `prefix=count`
    /// - A keep count is negative or not an integer
    /// - `batch_size` is outside `1..=1000`
    /// - No repository was named by flag, config or environment
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - A config or snapshot file cannot be read, parsed or written
    /// - A deletion batch call fails outright
    /// - Logging is initialized twice
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A repository or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation name and cause.
    pub fn operation(operation: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for registry-gc operations.
pub type Result<T> = std::result::Result<T, Error>;
