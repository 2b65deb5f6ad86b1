use crate::model::RawEvent;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find raw export files (*.json) under the input directory, sorted so the
/// concatenation order is stable across runs.
pub fn find_export_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_file() {
            if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
                if ext.eq_ignore_ascii_case("json") {
                    files.push(path.to_path_buf());
                }
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Read one export file: a JSON array of listening events. Null fields in a
/// record are tolerated; a file that is not a JSON array is an error.
pub fn read_export_file(path: &Path) -> Result<Vec<RawEvent>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read export file {path:?}"))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse export file {path:?}"))
}

/// Concatenate every export file under the directory into one record set.
pub fn read_all(dir: &Path) -> Result<Vec<RawEvent>> {
    let files = find_export_files(dir)?;
    if files.is_empty() {
        anyhow::bail!("No .json export files found under {dir:?}");
    }

    let mut events = Vec::new();
    for file in &files {
        let batch = read_export_file(file)?;
        println!(
            "Read {} events from {:?}",
            batch.len(),
            file.file_name().unwrap_or_default()
        );
        events.extend(batch);
    }
    Ok(events)
}
