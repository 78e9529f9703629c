// Report generation from stored corpus rows

use crate::counter::{AggregateReport, Aggregator, RankBuckets, TableScope};
use crate::data::{Database, RunInfo};
use crate::entities::EntityMap;
use crate::error::ReportError;
use crate::summary::DomainSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const HEAVY_RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub top: usize,
    pub buckets: RankBuckets,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            top: 10,
            buckets: RankBuckets::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSection {
    pub key: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub aggregate: AggregateReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunInfo>,
    pub domains: usize,
    pub pages: usize,
    pub unranked_domains: usize,
    pub cmp_domains: usize,
    pub sections: Vec<ReportSection>,
}

/// Organizations behind `domains`; without an entity map the domains stand for themselves.
fn organizations<'a, I>(entities: Option<&EntityMap>, domains: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    match entities {
        Some(map) => map.organizations(domains),
        None => domains.into_iter().map(str::to_string).collect(),
    }
}

/// Build all report tables from the corpus rows of one run.
pub fn build_report(
    summaries: &[DomainSummary],
    entities: Option<&EntityMap>,
    options: &ReportOptions,
) -> Result<CorpusReport, ReportError> {
    let mut policies = Aggregator::with_buckets("declared-policies", options.buckets);
    let mut leaked = Aggregator::with_buckets("leaked-organizations", options.buckets);
    let mut third_parties = Aggregator::with_buckets("third-party-organizations", options.buckets);
    let mut referrer = Aggregator::with_buckets("referrer-leak-organizations", options.buckets);
    let mut safety = Aggregator::with_buckets("declared-policy-safety", options.buckets);

    for summary in summaries {
        let cmp = summary.cmp.as_deref();

        policies.record_observation(summary.rank, cmp, summary.declared_policy_labels(), true);
        safety.record_observation(summary.rank, cmp, [summary.policy_safety().as_str()], true);

        let leaked_domains = summary.leaked_domains();
        leaked.record_observation(
            summary.rank,
            cmp,
            organizations(entities, leaked_domains.iter().map(String::as_str)),
            true,
        );

        third_parties.record_observation(
            summary.rank,
            cmp,
            organizations(entities, summary.third_parties.iter().map(String::as_str)),
            false,
        );

        referrer.record_observation(
            summary.rank,
            cmp,
            organizations(entities, summary.referrer_leakage.iter().map(String::as_str)),
            true,
        );
    }

    let sections = vec![
        ReportSection {
            key: "declared-policies",
            title: "DECLARED REFERRER POLICIES",
            description: "Share of sites declaring each policy on their pages",
            aggregate: policies.finalize().report(options.top)?,
        },
        ReportSection {
            key: "leaked-organizations",
            title: "URL LEAKAGE IN REQUESTS",
            description: "Share of sites whose page URLs reach each organization in request URLs",
            aggregate: leaked.finalize().report(options.top)?,
        },
        ReportSection {
            key: "third-party-organizations",
            title: "THIRD PARTIES",
            description: "Share of sites with mapped third parties that contact each organization",
            aggregate: third_parties.finalize().report(options.top)?,
        },
        ReportSection {
            key: "referrer-leak-organizations",
            title: "FULL-URL REFERRERS",
            description: "Share of sites sending full page URLs to each organization in the Referer header",
            aggregate: referrer.finalize().report(options.top)?,
        },
        ReportSection {
            key: "declared-policy-safety",
            title: "DECLARED POLICY SAFETY",
            description: "Share of sites whose declared policies are all safe, include an unsafe one, or are unset",
            aggregate: safety.finalize().report(options.top)?,
        },
    ];

    Ok(CorpusReport {
        run: None,
        domains: summaries.len(),
        pages: summaries.iter().map(|s| s.pages).sum(),
        unranked_domains: summaries.iter().filter(|s| s.rank.is_none()).count(),
        cmp_domains: summaries.iter().filter(|s| s.cmp.is_some()).count(),
        sections,
    })
}

/// Load the corpus rows of `run_id` (or the latest completed run) and build the report.
pub fn gather_report_data(
    db: &Database,
    run_id: Option<&str>,
    entities: Option<&EntityMap>,
    options: &ReportOptions,
) -> Result<Option<CorpusReport>, ReportError> {
    let run = match run_id {
        Some(id) => db.get_run(id)?,
        None => db.latest_run()?,
    };
    let Some(run) = run else {
        return Ok(None);
    };

    let summaries = db.get_domain_summaries(&run.id)?;
    let mut report = build_report(&summaries, entities, options)?;
    report.run = Some(run);
    Ok(Some(report))
}

pub fn render_report(report: &CorpusReport, format: ReportFormat) -> Result<String, ReportError> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(report)),
        ReportFormat::Json => generate_json_report(report),
        ReportFormat::Csv => generate_csv_report(report),
    }
}

fn section_header(report: &mut String, title: &str) {
    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str(title);
    report.push('\n');
    report.push_str(HEAVY_RULE);
    report.push_str("\n\n");
}

pub fn generate_text_report(data: &CorpusReport) -> String {
    let mut report = String::new();

    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str("                    REFSCOPE REFERRER-POLICY LEAKAGE REPORT\n");
    report.push_str(HEAVY_RULE);
    report.push_str("\n\n");

    if let Some(ref run) = data.run {
        report.push_str(&format!("Run ID:       {}\n", run.id));
        report.push_str(&format!("Status:       {}\n", run.status));
        report.push_str(&format!("Started:      {}\n", format_timestamp(run.start_time)));
        if let Some(end_time) = run.end_time {
            report.push_str(&format!("Duration:     {} seconds\n", end_time - run.start_time));
        }
        report.push_str(&format!("Data root:    {}\n", run.data_root));
    }
    report.push_str(&format!("Sites:        {}\n", data.domains));
    report.push_str(&format!("Pages:        {}\n", data.pages));
    report.push_str(&format!("With CMP:     {}\n", data.cmp_domains));
    report.push_str(&format!("Unranked:     {}\n\n", data.unranked_domains));

    for section in &data.sections {
        section_header(&mut report, section.title);
        report.push_str(&format!("{}.\n", section.description));
        report.push_str(&format!("Sites counted: {}\n\n", section.aggregate.total_entries));

        for table in &section.aggregate.tables {
            let heading = match table.scope {
                TableScope::Total => "All sites".to_string(),
                TableScope::Consent => format!("Consent: {}", table.bucket),
                TableScope::Rank => format!("Rank {}", table.bucket),
            };
            report.push_str(&format!("-{}- (n = {})\n", heading, table.denominator));

            if table.entries.is_empty() {
                report.push_str("  (none)\n");
            }
            for entry in &table.entries {
                report.push_str(&format!(
                    "  {:<40} {:>6}  ({:.1}%)\n",
                    entry.item, entry.count, entry.percentage
                ));
            }
            report.push('\n');
        }
    }

    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str("                                End of Report\n");
    report.push_str(HEAVY_RULE);
    report.push('\n');
    report.push_str("\nGenerated by Refscope - referrer-policy circumvention analysis\n\n");

    report
}

pub fn generate_json_report(data: &CorpusReport) -> Result<String, ReportError> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Refscope",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json",
            },
            "run": data.run.as_ref().map(|run| serde_json::json!({
                "id": run.id,
                "status": run.status,
                "start_time": format_iso8601_timestamp(run.start_time),
                "end_time": run.end_time.map(format_iso8601_timestamp),
                "data_root": run.data_root,
            })),
            "summary": {
                "sites": data.domains,
                "pages": data.pages,
                "cmp_sites": data.cmp_domains,
                "unranked_sites": data.unranked_domains,
            },
            "sections": data.sections,
        }
    });

    Ok(serde_json::to_string_pretty(&json_report)?)
}

/// One line per (section, table, item).
pub fn generate_csv_report(data: &CorpusReport) -> Result<String, ReportError> {
    let mut csv = csv::Writer::from_writer(Vec::new());
    csv.write_record(["section", "scope", "bucket", "item", "count", "denominator", "percentage"])?;

    for section in &data.sections {
        for table in &section.aggregate.tables {
            let scope = match table.scope {
                TableScope::Total => "total",
                TableScope::Consent => "consent",
                TableScope::Rank => "rank",
            };
            for entry in &table.entries {
                csv.write_record([
                    section.key.to_string(),
                    scope.to_string(),
                    table.bucket.clone(),
                    entry.item.clone(),
                    entry.count.to_string(),
                    table.denominator.to_string(),
                    format!("{:.1}", entry.percentage),
                ])?;
            }
        }
    }

    let bytes = csv
        .into_inner()
        .map_err(|e| ReportError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8(bytes)?)
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);
    datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_iso8601_timestamp(timestamp: i64) -> String {
    use chrono::{DateTime, Utc};
    let datetime = DateTime::<Utc>::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);
    datetime.to_rfc3339()
}
