// Consent-management-platform lookup built from crawler logs

use crate::error::AnalysisError;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

const MARKER: &str = "CMP detected on ";

/// Which CMP, if any, was seen on a page, keyed by the page's final URL.
#[derive(Debug, Clone, Default)]
pub struct CmpLookup {
    by_url: HashMap<String, String>,
}

/// Parse one crawler log line of the form
/// `[...] CMP detected on https://www.example.com/: {"cmpName":"Example"}`.
pub fn parse_log_line(line: &str) -> Option<(String, String)> {
    let (_, rest) = line.split_once(MARKER)?;
    let url = rest.split(' ').next()?.trim_end_matches(':');
    if url.is_empty() {
        return None;
    }

    let payload = &rest[rest.find('{')?..];
    let cmp_name = match serde_json::from_str::<Value>(payload.trim()) {
        Ok(value) => value.get("cmpName")?.as_str()?.to_string(),
        Err(_) => cmp_name_fallback(payload)?,
    };

    Some((url.to_string(), cmp_name))
}

/// For truncated or trailing-garbage payloads: take the quoted value after `cmpName`.
fn cmp_name_fallback(payload: &str) -> Option<String> {
    let (_, after_key) = payload.split_once("\"cmpName\"")?;
    let (_, after_quote) = after_key.split_once('"')?;
    let (name, _) = after_quote.split_once('"')?;
    Some(name.to_string())
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(String::from)
        .unwrap_or_else(|_| url.to_string())
}

impl CmpLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(content: &str) -> Self {
        let mut lookup = Self::new();
        lookup.extend_from_log(content);
        lookup
    }

    /// Read every `*.log` file directly under `dir`, in file-name order.
    pub fn from_log_dir(dir: &Path) -> Result<Self, AnalysisError> {
        let mut logs: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "log"))
            .collect();
        logs.sort();

        let mut lookup = Self::new();
        for log in &logs {
            let content = fs::read_to_string(log)?;
            lookup.extend_from_log(&content);
        }
        debug!("Loaded {} CMP sightings from {} log files", lookup.len(), logs.len());
        Ok(lookup)
    }

    pub fn extend_from_log(&mut self, content: &str) {
        for (url, cmp) in content.lines().filter_map(parse_log_line) {
            self.insert(&url, &cmp);
        }
    }

    pub fn insert(&mut self, url: &str, cmp: &str) {
        self.by_url.insert(normalize(url), cmp.to_string());
    }

    pub fn lookup(&self, final_url: &str) -> Option<&str> {
        self.by_url
            .get(final_url)
            .or_else(|| self.by_url.get(&normalize(final_url)))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }
}
