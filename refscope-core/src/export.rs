// Corpus exports: one CSV row per site, and per-site policy summaries as JSON

use crate::error::AnalysisError;
use crate::summary::{DomainSummary, PolicySummary};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const CORPUS_HEADER: [&str; 6] = [
    "domain",
    "rank",
    "cmp",
    "leaked_endpoints",
    "third_parties",
    "referrer_leakage",
];

/// List columns are JSON arrays; an unranked site has rank `-1`; no CMP is an empty cell.
pub fn write_corpus_csv<W: Write>(writer: W, summaries: &[DomainSummary]) -> Result<(), AnalysisError> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CORPUS_HEADER)?;

    for summary in summaries {
        csv.write_record([
            summary.domain.clone(),
            summary.rank_value().to_string(),
            summary.cmp.clone().unwrap_or_default(),
            serde_json::to_string(&summary.leaked_endpoints)?,
            serde_json::to_string(&summary.third_parties)?,
            serde_json::to_string(&summary.referrer_leakage)?,
        ])?;
    }

    csv.flush()?;
    Ok(())
}

pub fn policy_summaries(summaries: &[DomainSummary]) -> BTreeMap<String, PolicySummary> {
    summaries
        .iter()
        .map(|summary| (summary.domain.clone(), summary.policy_summary()))
        .collect()
}

pub fn save_corpus_csv(path: &Path, summaries: &[DomainSummary]) -> Result<(), AnalysisError> {
    write_corpus_csv(File::create(path)?, summaries)
}

pub fn save_policies_json(path: &Path, summaries: &[DomainSummary]) -> Result<(), AnalysisError> {
    let mut file = File::create(path)?;
    serde_json::to_writer_pretty(&mut file, &policy_summaries(summaries))?;
    file.write_all(b"\n")?;
    Ok(())
}
