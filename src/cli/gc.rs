//! Garbage collection CLI command.

use super::report;
use crate::config::GcConfig;
use crate::gc::{KeepRule, RetentionPlan, RetentionPolicy, plan};
use crate::models::DeleteImagesResult;
use crate::registry::{DeletionExecutor, InventoryProvider};
use crate::Result;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Command-line overrides layered on top of [`GcConfig`].
#[derive(Debug, Clone, Default)]
pub struct GcOverrides {
    /// Repository name.
    pub repository: Option<String>,
    /// Region.
    pub region: Option<String>,
    /// Keep rules, merged over the configured ones.
    pub keep: Vec<KeepRule>,
    /// Delete untagged images (only ever switches the setting on).
    pub delete_untagged: bool,
    /// Snapshot path.
    pub inventory: Option<PathBuf>,
    /// Delete batch size.
    pub batch_size: Option<usize>,
}

impl GcOverrides {
    /// Applies the overrides to `config`.
    pub fn apply(self, config: &mut GcConfig) {
        if let Some(repository) = self.repository {
            config.repository = Some(repository);
        }
        if let Some(region) = self.region {
            config.region = Some(region);
        }
        if self.delete_untagged {
            config.policy.delete_untagged = true;
        }
        if let Some(inventory) = self.inventory {
            config.inventory = Some(inventory);
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        config.policy = std::mem::take(&mut config.policy).with_rules(self.keep);
    }
}

/// Outcome of a garbage collection run.
#[derive(Debug, Clone)]
pub struct GcOutcome {
    /// The engine's decisions.
    pub plan: RetentionPlan,
    /// Deletion result; `None` for dry runs.
    pub result: Option<DeleteImagesResult>,
}

impl GcOutcome {
    /// Returns `true` if any deletion failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(DeleteImagesResult::has_failures)
    }
}

/// List, decide, and (unless dry-running) delete.
#[derive(Debug, Clone)]
pub struct GcCommand {
    repository: String,
    region: Option<String>,
    policy: RetentionPolicy,
    dry_run: bool,
}

impl GcCommand {
    /// Creates a command for `repository` under `policy`.
    #[must_use]
    pub fn new(repository: impl Into<String>, policy: RetentionPolicy) -> Self {
        Self {
            repository: repository.into(),
            region: None,
            policy,
            dry_run: false,
        }
    }

    /// Builds the command from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or names no
    /// repository.
    pub fn from_config(config: &GcConfig, dry_run: bool) -> Result<Self> {
        config.validate()?;
        let mut command = Self::new(config.require_repository()?, config.policy.clone())
            .with_dry_run(dry_run);
        command.region.clone_from(&config.region);
        Ok(command)
    }

    /// Sets the region shown in the report.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Runs the command, writing the report to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails, a delete call fails outright, or
    /// the report cannot be written. Per-image deletion failures are
    /// reported in the outcome instead.
    #[instrument(
        name = "registry_gc.cli.gc",
        skip_all,
        fields(
            component = "cli",
            operation = "gc",
            repository = %self.repository,
            dry_run = self.dry_run
        )
    )]
    pub fn execute<P, D, W>(&self, provider: &P, executor: &D, out: &mut W) -> Result<GcOutcome>
    where
        P: InventoryProvider + ?Sized,
        D: DeletionExecutor + ?Sized,
        W: Write + ?Sized,
    {
        let inventory = provider.images(&self.repository)?;
        report::write_inventory_header(
            out,
            &self.repository,
            self.region.as_deref(),
            inventory.len(),
        )?;

        let plan = plan(&inventory, &self.policy);
        report::write_images(out, "Images to delete", plan.deletions())?;
        report::write_retained_summary(out, &plan)?;

        if self.dry_run {
            writeln!(out, "Dry run: no images were deleted")
                .map_err(|e| crate::Error::operation("write_report", e))?;
            return Ok(GcOutcome { plan, result: None });
        }

        let deletions: Vec<_> = plan.deletions().cloned().collect();
        let result = executor.delete_images(&self.repository, &deletions)?;
        report::write_result(out, &result)?;

        if result.has_failures() {
            warn!(
                failures = result.failures.len(),
                "Some images could not be deleted"
            );
        }
        info!(
            deleted = result.deletions.len(),
            failed = result.failures.len(),
            "Garbage collection completed"
        );

        Ok(GcOutcome {
            plan,
            result: Some(result),
        })
    }
}
