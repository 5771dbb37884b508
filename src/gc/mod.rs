//! Garbage collection module.
//!
//! This module decides which registry images a retention policy allows to
//! be deleted. It is the only part of the crate with real decision logic,
//! and it never talks to a registry: callers fetch the inventory through an
//! [`InventoryProvider`](crate::registry::InventoryProvider), hand it to
//! [`plan`] or [`images_to_delete`], and pass the result to a
//! [`DeletionExecutor`](crate::registry::DeletionExecutor).
//!
//! # Overview
//!
//! A [`RetentionPolicy`] maps tag prefixes to keep counts. Scanning the
//! inventory newest first, each prefix retains its first N matching images;
//! later matches expire. Images carrying any tag outside the known prefixes
//! are treated as unmanaged and always kept. Untagged images are deleted
//! only when the policy says so.
//!
//! # Example
//!
//! ```rust,ignore
//! use registry_gc::gc::{Classification, RetentionPolicy, plan};
//! use registry_gc::registry::{InventoryProvider, SnapshotRegistry};
//!
//! let registry = SnapshotRegistry::open("images.json")?;
//! let inventory = registry.images("web")?;
//! let policy = RetentionPolicy::new()
//!     .with_keep("release", 4)
//!     .with_keep("build", 8)
//!     .with_delete_untagged(true);
//!
//! let plan = plan(&inventory, &policy);
//! println!("{} of {} images expired", plan.count(Classification::Expired), plan.len());
//! ```

mod engine;
mod policy;

pub use engine::{
    Classification, ImageDecision, ImageFlags, PrefixCounters, RetentionPlan, TagMatches,
    classify, count_tag_matches, has_unknown_tags, image_flags, images_to_delete, plan,
    should_delete,
};
pub use policy::{KeepRule, RetentionPolicy};
