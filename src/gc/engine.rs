//! Retention engine.
//!
//! Decides which images a [`RetentionPolicy`] allows to be deleted. The
//! engine is a pure function of its inputs: it never performs I/O, never
//! touches the caller's inventory and holds no state between calls.
//!
//! # Algorithm
//!
//! 1. Copy the inventory and sort it most recently pushed first
//!    ([`newest_first`]).
//! 2. Start a zeroed counter for every known prefix.
//! 3. For each image, in sorted order:
//!    - derive the image-level flags: untagged, or unmanaged when any tag
//!      matches no known prefix ([`image_flags`]);
//!    - walk every `(tag, prefix)` match, marking the image a candidate and
//!      marking it recent whenever the prefix counter has not yet reached
//!      its keep count, then bumping that counter ([`count_tag_matches`]);
//!    - delete when `(untagged && delete_untagged) || (candidate && !recent && !unmanaged)`.
//!
//! # Surprising cases
//!
//! Counting happens per matching tag, not per image. An image tagged both
//! `foo-1` and `foo-latest` advances the `foo` counter twice and can use up
//! two slots of its own retention budget.
//!
//! Matching tags of an unmanaged image still advance their counters, even
//! though the image itself is never deleted.
//!
//! # Example
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use registry_gc::gc::{RetentionPolicy, images_to_delete};
//! use registry_gc::models::Image;
//!
//! let now = Utc::now();
//! let inventory = vec![
//!     Image::new("old", now - Duration::hours(2), ["release-1"]),
//!     Image::new("new", now, ["release-2"]),
//! ];
//! let policy = RetentionPolicy::new().with_keep("release", 1);
//!
//! let deletions = images_to_delete(&inventory, &policy);
//! assert_eq!(deletions.len(), 1);
//! assert_eq!(deletions[0].digest, "old");
//! ```

use super::policy::RetentionPolicy;
use crate::models::{Image, newest_first};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, instrument};

/// Why an image was kept or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Classification {
    /// No tags at all. Deleted only if the policy deletes untagged images.
    Untagged,
    /// At least one tag matches no known prefix. Always retained.
    Unmanaged,
    /// Within the keep count of at least one matching prefix. Retained.
    Recent,
    /// Matched known prefixes but fell outside every keep count. Deleted.
    Expired,
    /// Tagged, yet never became a deletion candidate. Retained.
    ///
    /// [`plan`] never yields this: a tagged image that is not unmanaged has
    /// every tag under some prefix and so is always a candidate. It remains
    /// so [`classify`] is total over hand-built flags, and the report keeps
    /// its `unmatched=` column.
    Unmatched,
}

impl Classification {
    /// All classifications, in reporting order.
    pub const ALL: [Self; 5] = [
        Self::Untagged,
        Self::Unmanaged,
        Self::Recent,
        Self::Expired,
        Self::Unmatched,
    ];

    /// Returns the classification as a label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Untagged => "untagged",
            Self::Unmanaged => "unmanaged",
            Self::Recent => "recent",
            Self::Expired => "expired",
            Self::Unmatched => "unmatched",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Image-level flags, computed from the image's tags alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageFlags {
    /// The image has no tags.
    pub untagged: bool,
    /// Some tag matches none of the known prefixes.
    pub unmanaged: bool,
}

/// Tag-level outcome of walking an image's prefix matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagMatches {
    /// At least one tag matched a known prefix.
    pub candidate: bool,
    /// At least one match was still within its prefix's keep count.
    pub recent: bool,
}

/// Per-prefix "seen so far" counters for a single scan.
///
/// Every known prefix starts at zero. A counter set belongs to exactly one
/// [`plan`] call.
#[derive(Debug, Clone)]
pub struct PrefixCounters<'p> {
    policy: &'p RetentionPolicy,
    seen: BTreeMap<&'p str, u32>,
}

impl<'p> PrefixCounters<'p> {
    /// Creates zeroed counters for every prefix in `policy`.
    #[must_use]
    pub fn new(policy: &'p RetentionPolicy) -> Self {
        let seen = policy.prefixes().map(|prefix| (prefix, 0)).collect();
        Self { policy, seen }
    }

    /// Records one occurrence of `prefix`.
    ///
    /// Returns `true` if the occurrence fell within the prefix's keep count.
    /// The counter advances either way. Unknown prefixes are never within a
    /// keep count.
    pub fn observe(&mut self, prefix: &str) -> bool {
        let keep = self.policy.keep_count(prefix).unwrap_or(0);
        let Some(seen) = self.seen.get_mut(prefix) else {
            return false;
        };
        let within = *seen < keep;
        *seen = seen.saturating_add(1);
        within
    }

    /// Returns how many occurrences of `prefix` have been seen.
    #[must_use]
    pub fn seen(&self, prefix: &str) -> u32 {
        self.seen.get(prefix).copied().unwrap_or(0)
    }
}

/// Returns `true` if any tag starts with none of the policy's prefixes.
///
/// A single stray tag is enough: the veto covers the whole image.
#[must_use]
pub fn has_unknown_tags(tags: &[String], policy: &RetentionPolicy) -> bool {
    tags.iter().any(|tag| !policy.is_known_tag(tag))
}

/// First pass: image-level flags.
#[must_use]
pub fn image_flags(image: &Image, policy: &RetentionPolicy) -> ImageFlags {
    if image.is_untagged() {
        ImageFlags {
            untagged: true,
            unmanaged: false,
        }
    } else {
        ImageFlags {
            untagged: false,
            unmanaged: has_unknown_tags(&image.tags, policy),
        }
    }
}

/// Second pass: walks every `(tag, prefix)` match and advances counters.
///
/// Each match is counted separately, so an image with several tags under
/// the same prefix consumes several slots.
pub fn count_tag_matches(image: &Image, counters: &mut PrefixCounters<'_>) -> TagMatches {
    let policy = counters.policy;
    let mut matches = TagMatches::default();
    for tag in &image.tags {
        for (prefix, _) in policy.matching_prefixes(tag) {
            matches.candidate = true;
            if counters.observe(prefix) {
                matches.recent = true;
            }
        }
    }
    matches
}

/// Reduces both passes to a classification.
#[must_use]
pub const fn classify(flags: ImageFlags, matches: TagMatches) -> Classification {
    if flags.untagged {
        Classification::Untagged
    } else if flags.unmanaged {
        Classification::Unmanaged
    } else if !matches.candidate {
        Classification::Unmatched
    } else if matches.recent {
        Classification::Recent
    } else {
        Classification::Expired
    }
}

/// Applies the deletion rule to the classified flags.
#[must_use]
pub const fn should_delete(
    flags: ImageFlags,
    matches: TagMatches,
    policy: &RetentionPolicy,
) -> bool {
    (flags.untagged && policy.delete_untagged)
        || (matches.candidate && !matches.recent && !flags.unmanaged)
}

/// The engine's verdict for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDecision {
    /// The image, copied from the sorted working set.
    pub image: Image,
    /// Why the image was kept or deleted.
    pub classification: Classification,
    /// Whether the image is in the deletion set.
    pub delete: bool,
}

/// Every decision of a single engine run, most recent image first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    decisions: Vec<ImageDecision>,
}

impl RetentionPlan {
    /// Returns every decision in scan order.
    #[must_use]
    pub fn decisions(&self) -> &[ImageDecision] {
        &self.decisions
    }

    /// Iterates over the images approved for deletion, in scan order.
    pub fn deletions(&self) -> impl Iterator<Item = &Image> {
        self.decisions
            .iter()
            .filter(|d| d.delete)
            .map(|d| &d.image)
    }

    /// Iterates over the images that are kept, in scan order.
    pub fn retained(&self) -> impl Iterator<Item = &Image> {
        self.decisions
            .iter()
            .filter(|d| !d.delete)
            .map(|d| &d.image)
    }

    /// Counts images with the given classification.
    #[must_use]
    pub fn count(&self, classification: Classification) -> usize {
        self.decisions
            .iter()
            .filter(|d| d.classification == classification)
            .count()
    }

    /// Number of images in the deletion set.
    #[must_use]
    pub fn deletion_count(&self) -> usize {
        self.decisions.iter().filter(|d| d.delete).count()
    }

    /// Number of images evaluated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    /// Returns `true` if the inventory was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Consumes the plan, returning the deletion set.
    #[must_use]
    pub fn into_deletions(self) -> Vec<Image> {
        self.decisions
            .into_iter()
            .filter(|d| d.delete)
            .map(|d| d.image)
            .collect()
    }
}

/// Classifies every image in `inventory` under `policy`.
#[instrument(
    name = "registry_gc.gc.plan",
    skip_all,
    fields(
        component = "gc",
        operation = "plan",
        images = inventory.len(),
        prefixes = policy.len(),
        delete_untagged = policy.delete_untagged
    )
)]
pub fn plan(inventory: &[Image], policy: &RetentionPolicy) -> RetentionPlan {
    let mut counters = PrefixCounters::new(policy);
    let decisions: Vec<ImageDecision> = newest_first(inventory)
        .into_iter()
        .map(|image| {
            let flags = image_flags(&image, policy);
            let matches = count_tag_matches(&image, &mut counters);
            let classification = classify(flags, matches);
            let delete = should_delete(flags, matches, policy);

            debug!(
                digest = image.short_digest(),
                classification = classification.as_str(),
                delete,
                "Classified image"
            );
            metrics::counter!(
                "gc_images_classified_total",
                "classification" => classification.as_str()
            )
            .increment(1);

            ImageDecision {
                image,
                classification,
                delete,
            }
        })
        .collect();

    let plan = RetentionPlan { decisions };
    metrics::counter!("gc_images_evaluated_total")
        .increment(u64::try_from(plan.len()).unwrap_or(u64::MAX));

    info!(
        images = plan.len(),
        deletions = plan.deletion_count(),
        recent = plan.count(Classification::Recent),
        unmanaged = plan.count(Classification::Unmanaged),
        untagged = plan.count(Classification::Untagged),
        "Retention plan computed"
    );

    plan
}

/// Returns the images `policy` allows to be deleted, most recent first.
///
/// The result is a fresh list of copies; `inventory` is not modified and its
/// order does not matter.
#[must_use]
pub fn images_to_delete(inventory: &[Image], policy: &RetentionPolicy) -> Vec<Image> {
    plan(inventory, policy).into_deletions()
}
