//! Config CLI command.

use crate::config::GcConfig;
use crate::{Error, Result};
use std::io::Write;

/// Writes the effective configuration as TOML.
pub fn show<W: Write + ?Sized>(config: &GcConfig, out: &mut W) -> Result<()> {
    let rendered = config.to_toml()?;
    out.write_all(rendered.as_bytes())
        .map_err(|e| Error::operation("write_config", e))
}
