//! CLI command implementations.

pub mod diff;
pub mod replay;

use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;
use tabula_core::Change;

/// Reads and parses a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
    let value = serde_json::from_str(&text)
        .map_err(|err| format!("failed to parse {}: {}", path.display(), err))?;
    Ok(value)
}

/// Reads a file holding an array of change batches.
pub fn read_batches(path: &Path) -> Result<Vec<Vec<Change>>, Box<dyn std::error::Error>> {
    read_json(path)
}
