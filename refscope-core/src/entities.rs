// Domain -> organization lookup

use crate::error::AnalysisError;
use refscope_scanner::registrable_domain;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Maps registrable domains to the organization operating them.
///
/// Accepts either a flat `{ "domain": "Organization" }` object or a
/// tracker-radar style entity list, optionally wrapped in `{"entities": ...}`:
/// `{ "Google LLC": { "displayName": "Google", "properties": ["google.com", ...] } }`.
#[derive(Debug, Clone, Default)]
pub struct EntityMap {
    domains: HashMap<String, String>,
}

impl EntityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> Result<Self, AnalysisError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let root: Value = serde_json::from_str(json)?;
        let entities = root.get("entities").unwrap_or(&root);

        let mut map = Self::new();
        let Some(object) = entities.as_object() else {
            return Ok(map);
        };

        for (key, value) in object {
            match value {
                Value::String(organization) => map.insert(key, organization),
                Value::Object(entity) => {
                    let organization = entity
                        .get("displayName")
                        .and_then(Value::as_str)
                        .unwrap_or(key);
                    let properties = entity
                        .get("properties")
                        .and_then(Value::as_array)
                        .into_iter()
                        .flatten()
                        .filter_map(Value::as_str);
                    for domain in properties {
                        map.insert(domain, organization);
                    }
                }
                _ => debug!("Ignoring entity map entry {}", key),
            }
        }

        Ok(map)
    }

    pub fn insert(&mut self, domain: &str, organization: &str) {
        self.domains
            .insert(domain.to_lowercase(), organization.to_string());
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Looks up the domain as given, then its registrable domain.
    pub fn organization(&self, domain: &str) -> Option<&str> {
        let domain = domain.to_lowercase();
        self.domains
            .get(&domain)
            .or_else(|| {
                registrable_domain(&domain).and_then(|registrable| self.domains.get(&registrable))
            })
            .map(String::as_str)
    }

    /// Distinct organizations behind `domains`. Unmapped domains are skipped.
    pub fn organizations<'a, I>(&self, domains: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        domains
            .into_iter()
            .filter_map(|domain| self.organization(domain))
            .map(str::to_string)
            .collect()
    }
}
