// Crawl admin files: `admin.<domain>.json` in every data directory

use crate::error::AnalysisError;
use refscope_scanner::PageRecord;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// The directory's admin file, if it has one. With several, the first by name wins.
pub fn find_admin_file(dir: &Path) -> Result<Option<PathBuf>, AnalysisError> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("admin.") && name.ends_with(".json"))
        })
        .collect();
    candidates.sort();
    Ok(candidates.into_iter().next())
}

fn read(path: &Path) -> Result<Value, AnalysisError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write(path: &Path, admin: &Value) -> Result<(), AnalysisError> {
    fs::write(path, serde_json::to_string_pretty(admin)?)?;
    Ok(())
}

/// Number of URLs the crawler recorded as visited. The collector writes
/// `visited` as a list or as an object keyed by URL.
pub fn visited_count(path: &Path) -> Result<usize, AnalysisError> {
    let admin = read(path)?;
    Ok(match admin.get("visited") {
        Some(Value::Array(urls)) => urls.len(),
        Some(Value::Object(urls)) => urls.len(),
        _ => 0,
    })
}

/// Append page records to the admin file's `results` array, creating it if needed.
///
/// Callers must not run two writers on the same directory at once; the batch
/// driver guarantees this by giving each directory to exactly one task.
pub fn append_results(path: &Path, records: &[PageRecord]) -> Result<(), AnalysisError> {
    let mut admin = read(path)?;
    let Some(object) = admin.as_object_mut() else {
        return Err(AnalysisError::MalformedAdminFile(path.to_path_buf()));
    };

    let results = object
        .entry("results")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !results.is_array() {
        *results = Value::Array(Vec::new());
    }
    if let Value::Array(list) = results {
        for record in records {
            list.push(serde_json::to_value(record)?);
        }
    }

    write(path, &admin)
}

pub fn results(path: &Path) -> Result<Vec<PageRecord>, AnalysisError> {
    let admin = read(path)?;
    match admin.get("results") {
        Some(results) => Ok(serde_json::from_value(results.clone())?),
        None => Ok(Vec::new()),
    }
}

/// Empty the `results` array, leaving the rest of the admin file untouched.
pub fn clear_results(path: &Path) -> Result<(), AnalysisError> {
    let mut admin = read(path)?;
    if let Some(object) = admin.as_object_mut() {
        object.insert("results".to_string(), Value::Array(Vec::new()));
    }
    write(path, &admin)
}
