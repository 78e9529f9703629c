// Tranco list rank lookup

use crate::error::AnalysisError;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Popularity rank of a domain: its zero-based position in a Tranco list.
#[derive(Debug, Clone, Default)]
pub struct TrancoRanking {
    positions: HashMap<String, usize>,
}

impl TrancoRanking {
    pub fn from_file(path: &Path) -> Result<Self, AnalysisError> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// One domain per line, either bare or as `rank,domain` (the list's CSV
    /// form). Blank lines and `#` comments are ignored. The first occurrence
    /// of a domain wins.
    pub fn parse(content: &str) -> Self {
        Self::from_domains(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(|line| match line.split_once(',') {
                    Some((_, domain)) => domain.trim(),
                    None => line,
                }),
        )
    }

    pub fn from_domains<'a, I>(domains: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut positions = HashMap::new();
        for (position, domain) in domains.into_iter().enumerate() {
            positions.entry(domain.to_lowercase()).or_insert(position);
        }
        Self { positions }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn rank(&self, domain: &str) -> Option<usize> {
        self.positions.get(&domain.to_lowercase()).copied()
    }
}

/// Output form of an optional rank: unlisted domains are `-1`.
pub fn rank_value(rank: Option<usize>) -> i64 {
    rank.map(|r| r as i64).unwrap_or(-1)
}
