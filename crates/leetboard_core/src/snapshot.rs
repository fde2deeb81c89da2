use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};

use crate::filesystem::write_atomic;
use crate::record::StudentRecord;

/// Replace the snapshot file with `records`, pretty-printed.
pub fn write_snapshot(path: &Path, records: &[StudentRecord]) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(records).context("failed to serialize snapshot JSON")?;
    write_atomic(path, rendered.as_bytes())
}

/// Raw snapshot text, or `None` before the first cycle has written one.
pub fn read_snapshot_raw(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error).with_context(|| format!("failed to read {}", path.display())),
    }
}

pub fn load_snapshot(path: &Path) -> Result<Option<Vec<StudentRecord>>> {
    let Some(content) = read_snapshot_raw(path)? else {
        return Ok(None);
    };
    let records = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(records))
}
