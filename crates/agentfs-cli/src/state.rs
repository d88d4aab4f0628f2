//! Persists a zone snapshot to a JSON file across CLI invocations, reusing
//! the facade's own `ZoneExport` rather than inventing a second format.

use std::path::Path;

use agentfs_facade::ZoneExport;
use anyhow::{Context, Result};

/// Loads a previously saved snapshot, if the file exists.
pub fn load(path: &Path) -> Result<Option<ZoneExport>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let export = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(export))
}

/// Saves a zone snapshot, overwriting any existing file.
pub fn save(path: &Path, export: &ZoneExport) -> Result<()> {
    let text = serde_json::to_string_pretty(export)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
