//! Retention policy configuration.
//!
//! A policy is a set of keep rules, each saying "keep the N most recently
//! pushed images with a tag starting with this prefix", plus a switch for
//! untagged images.
//!
//! # Example
//!
//! ```rust
//! use registry_gc::gc::{KeepRule, RetentionPolicy};
//!
//! let rule: KeepRule = "release=4".parse()?;
//! let policy = RetentionPolicy::new()
//!     .with_rules([rule])
//!     .with_keep("build", 8)
//!     .with_delete_untagged(true);
//!
//! assert_eq!(policy.keep_count("release"), Some(4));
//! assert!(policy.is_known_tag("build-1234"));
//! assert!(!policy.is_known_tag("latest"));
//! # Ok::<(), registry_gc::Error>(())
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A single `prefix=count` keep rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepRule {
    /// Tag prefix governed by this rule.
    pub prefix: String,
    /// How many of the most recent matching images to keep.
    pub count: u32,
}

impl KeepRule {
    /// Creates a keep rule.
    #[must_use]
    pub fn new(prefix: impl Into<String>, count: u32) -> Self {
        Self {
            prefix: prefix.into(),
            count,
        }
    }
}

impl FromStr for KeepRule {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let Some((prefix, count)) = value.split_once('=') else {
            return Err(Error::InvalidInput(
                "expected PREFIX=COUNT e.g. release=4".to_string(),
            ));
        };

        let count = count.trim().parse::<u32>().map_err(|_| {
            Error::InvalidInput(format!(
                "expected N in {prefix}=N to be a non-negative integer"
            ))
        })?;

        Ok(Self::new(prefix, count))
    }
}

impl fmt::Display for KeepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.prefix, self.count)
    }
}

/// Retention policy evaluated by the engine.
///
/// Prefixes are held in a `BTreeMap` so every scan visits them in the same
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Keep counts by tag prefix.
    #[serde(default)]
    pub keep_counts: BTreeMap<String, u32>,

    /// Whether images without any tag may be deleted.
    #[serde(default)]
    pub delete_untagged: bool,
}

impl RetentionPolicy {
    /// Creates an empty policy that deletes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the keep count for a prefix, replacing any earlier value.
    #[must_use]
    pub fn with_keep(mut self, prefix: impl Into<String>, count: u32) -> Self {
        self.keep_counts.insert(prefix.into(), count);
        self
    }

    /// Applies keep rules in order; later rules win for the same prefix.
    #[must_use]
    pub fn with_rules(mut self, rules: impl IntoIterator<Item = KeepRule>) -> Self {
        for rule in rules {
            self.keep_counts.insert(rule.prefix, rule.count);
        }
        self
    }

    /// Sets whether untagged images may be deleted.
    #[must_use]
    pub const fn with_delete_untagged(mut self, delete_untagged: bool) -> Self {
        self.delete_untagged = delete_untagged;
        self
    }

    /// Returns the keep count configured for `prefix`.
    #[must_use]
    pub fn keep_count(&self, prefix: &str) -> Option<u32> {
        self.keep_counts.get(prefix).copied()
    }

    /// Iterates over the known prefixes in order.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.keep_counts.keys().map(String::as_str)
    }

    /// Iterates over every `(prefix, keep_count)` that `tag` starts with.
    ///
    /// A tag can match several prefixes, e.g. `release-1` matches both
    /// `rel` and `release`.
    pub fn matching_prefixes<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = (&'a str, u32)> {
        self.keep_counts
            .iter()
            .filter(move |(prefix, _)| tag.starts_with(prefix.as_str()))
            .map(|(prefix, count)| (prefix.as_str(), *count))
    }

    /// Returns `true` if `tag` starts with at least one known prefix.
    #[must_use]
    pub fn is_known_tag(&self, tag: &str) -> bool {
        self.prefixes().any(|prefix| tag.starts_with(prefix))
    }

    /// Returns the number of keep rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keep_counts.len()
    }

    /// Returns `true` if the policy has no keep rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keep_counts.is_empty()
    }

    /// Returns the keep rules in prefix order.
    #[must_use]
    pub fn rules(&self) -> Vec<KeepRule> {
        self.keep_counts
            .iter()
            .map(|(prefix, count)| KeepRule::new(prefix.clone(), *count))
            .collect()
    }
}
