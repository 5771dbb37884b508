//! CLI command implementations.
//!
//! This module provides the command-line interface for registry-gc. Each
//! submodule implements a specific CLI command.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `plan` | Show which images the policy would delete |
//! | `apply` | Delete the images the policy allows |
//! | `config` | Show the effective configuration |
//!
//! # Example Usage
//!
//! ```bash
//! # Preview a run against a describe-images snapshot
//! registry-gc plan --repo web --inventory images.json --keep release=4 --keep build=8
//!
//! # Delete, sweeping untagged images too
//! registry-gc apply --repo web --inventory images.json --keep release=4 --delete-untagged
//! ```

pub mod config;
pub mod gc;
pub mod report;

pub use gc::{GcCommand, GcOutcome, GcOverrides};
