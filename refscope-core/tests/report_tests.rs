// Tests for report generation functionality

use refscope_core::counter::{RankBuckets, TableScope};
use refscope_core::data::Database;
use refscope_core::entities::EntityMap;
use refscope_core::error::ReportError;
use refscope_core::report::{
    CorpusReport, ReportFormat, ReportOptions, build_report, gather_report_data,
    generate_csv_report, generate_json_report, generate_text_report, render_report, save_report,
};
use refscope_core::summary::DomainSummary;
use refscope_scanner::ReferrerPolicy;
use tempfile::TempDir;

fn summary(
    domain: &str,
    rank: Option<usize>,
    cmp: Option<&str>,
    policies: &[ReferrerPolicy],
    leaked: &[&str],
    third_parties: &[&str],
    referrer: &[&str],
) -> DomainSummary {
    let mut summary = DomainSummary::new(domain, rank);
    summary.cmp = cmp.map(str::to_string);
    summary.declared_policies = policies.to_vec();
    summary.leaked_endpoints = leaked.iter().map(|s| s.to_string()).collect();
    summary.third_parties = third_parties.iter().map(|s| s.to_string()).collect();
    summary.referrer_leakage = referrer.iter().map(|s| s.to_string()).collect();
    summary.pages = 3;
    summary
}

fn corpus() -> Vec<DomainSummary> {
    vec![
        summary(
            "shop.com",
            Some(500),
            None,
            &[ReferrerPolicy::StrictOriginWhenCrossOrigin],
            &["tracker.com/collect", "px.doubleclick.net/p"],
            &["tracker.com", "doubleclick.net"],
            &[],
        ),
        summary(
            "store.net",
            Some(15_000),
            Some("OneTrust"),
            &[ReferrerPolicy::NoReferrer, ReferrerPolicy::UnsafeUrl],
            &["tracker.com/c"],
            &["tracker.com"],
            &["doubleclick.net"],
        ),
        summary("quiet.org", None, None, &[], &[], &[], &[]),
    ]
}

fn entity_map() -> EntityMap {
    let mut map = EntityMap::new();
    map.insert("doubleclick.net", "Google");
    map.insert("tracker.com", "Tracker Inc");
    map
}

fn table_items(report: &CorpusReport, section: &str, bucket: &str) -> Vec<(String, u64)> {
    report
        .sections
        .iter()
        .find(|s| s.key == section)
        .unwrap()
        .aggregate
        .tables
        .iter()
        .find(|t| t.bucket == bucket)
        .unwrap()
        .entries
        .iter()
        .map(|e| (e.item.clone(), e.count))
        .collect()
}

// ============================================================================
// Report Format Tests
// ============================================================================

#[test]
fn test_report_format_from_str() {
    assert!(matches!(ReportFormat::from_str("text"), Some(ReportFormat::Text)));
    assert!(matches!(ReportFormat::from_str("JSON"), Some(ReportFormat::Json)));
    assert!(matches!(ReportFormat::from_str("csv"), Some(ReportFormat::Csv)));
    assert!(ReportFormat::from_str("html").is_none());
}

#[test]
fn test_report_format_extension() {
    assert_eq!(ReportFormat::Text.extension(), "txt");
    assert_eq!(ReportFormat::Csv.extension(), "csv");
}

// ============================================================================
// Report Building Tests
// ============================================================================

#[test]
fn test_report_sections() {
    let report = build_report(&corpus(), Some(&entity_map()), &ReportOptions::default()).unwrap();
    let keys: Vec<&str> = report.sections.iter().map(|s| s.key).collect();

    assert_eq!(
        keys,
        vec![
            "declared-policies",
            "leaked-organizations",
            "third-party-organizations",
            "referrer-leak-organizations",
            "declared-policy-safety"
        ]
    );
    assert_eq!(report.domains, 3);
    assert_eq!(report.pages, 9);
    assert_eq!(report.unranked_domains, 1);
    assert_eq!(report.cmp_domains, 1);
}

#[test]
fn test_policy_table_counts_every_domain() {
    let report = build_report(&corpus(), Some(&entity_map()), &ReportOptions::default()).unwrap();
    let section = &report.sections[0];

    assert_eq!(section.aggregate.total_entries, 3);
    let total = &section.aggregate.tables[0];
    assert_eq!(total.scope, TableScope::Total);
    assert_eq!(total.denominator, 3);
    assert_eq!(total.entries.len(), 3);
    assert!(total.entries.iter().all(|e| e.count == 1));
}

#[test]
fn test_policy_safety_breakdown() {
    let report = build_report(&corpus(), None, &ReportOptions::default()).unwrap();

    let mut total = table_items(&report, "declared-policy-safety", "total");
    total.sort();
    assert_eq!(
        total,
        vec![
            ("safe".to_string(), 1),
            ("unsafe".to_string(), 1),
            ("unset".to_string(), 1)
        ]
    );
    assert_eq!(
        table_items(&report, "declared-policy-safety", "cmp"),
        vec![("unsafe".to_string(), 1)]
    );

    let text = generate_text_report(&report);
    assert!(text.contains("DECLARED POLICY SAFETY"));
}

#[test]
fn test_leakage_mapped_to_organizations() {
    let report = build_report(&corpus(), Some(&entity_map()), &ReportOptions::default()).unwrap();

    assert_eq!(
        table_items(&report, "leaked-organizations", "total"),
        vec![("Tracker Inc".to_string(), 2), ("Google".to_string(), 1)]
    );
    assert_eq!(
        table_items(&report, "leaked-organizations", "12001-24000"),
        vec![("Tracker Inc".to_string(), 1)]
    );
    assert_eq!(
        table_items(&report, "referrer-leak-organizations", "cmp"),
        vec![("Google".to_string(), 1)]
    );
}

#[test]
fn test_third_party_denominator_excludes_sites_without_third_parties() {
    let report = build_report(&corpus(), Some(&entity_map()), &ReportOptions::default()).unwrap();
    let section = report
        .sections
        .iter()
        .find(|s| s.key == "third-party-organizations")
        .unwrap();

    assert_eq!(section.aggregate.total_entries, 2);
    assert_eq!(section.aggregate.tables[0].entries[0].item, "Tracker Inc");
    assert!((section.aggregate.tables[0].entries[0].percentage - 100.0).abs() < 1e-9);
}

#[test]
fn test_without_entity_map_domains_are_items() {
    let report = build_report(&corpus(), None, &ReportOptions::default()).unwrap();

    assert_eq!(
        table_items(&report, "leaked-organizations", "total"),
        vec![("tracker.com".to_string(), 2), ("doubleclick.net".to_string(), 1)]
    );
}

#[test]
fn test_custom_buckets_and_top() {
    let options = ReportOptions {
        top: 1,
        buckets: RankBuckets::new(1_000, 1),
    };
    let report = build_report(&corpus(), None, &options).unwrap();

    assert_eq!(report.sections[0].aggregate.tables.len(), 4);
    assert_eq!(table_items(&report, "leaked-organizations", "total").len(), 1);
    assert_eq!(report.sections[1].aggregate.tables[3].bucket, "1-1000");
}

#[test]
fn test_empty_corpus_is_zero_denominator() {
    let result = build_report(&[], None, &ReportOptions::default());
    assert!(matches!(result, Err(ReportError::ZeroDenominator { .. })));
}

#[test]
fn test_unmapped_third_parties_is_zero_denominator() {
    let result = build_report(&corpus(), Some(&EntityMap::new()), &ReportOptions::default());

    match result {
        Err(ReportError::ZeroDenominator { table, .. }) => {
            assert_eq!(table, "third-party-organizations")
        }
        other => panic!("expected zero denominator, got {:?}", other.map(|r| r.domains)),
    }
}

// ============================================================================
// Rendering Tests
// ============================================================================

#[test]
fn test_text_report() {
    let report = build_report(&corpus(), Some(&entity_map()), &ReportOptions::default()).unwrap();
    let text = generate_text_report(&report);

    assert!(text.contains("REFSCOPE REFERRER-POLICY LEAKAGE REPORT"));
    assert!(text.contains("Sites:        3"));
    assert!(text.contains("URL LEAKAGE IN REQUESTS"));
    assert!(text.contains("Tracker Inc"));
    assert!(text.contains("(66.7%)"));
    assert!(text.contains("-Rank 1-12000- (n = 1)"));
    assert!(text.contains("End of Report"));
}

#[test]
fn test_json_report() {
    let report = build_report(&corpus(), Some(&entity_map()), &ReportOptions::default()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&generate_json_report(&report).unwrap()).unwrap();

    assert_eq!(json["report"]["metadata"]["generator"], "Refscope");
    assert_eq!(json["report"]["summary"]["sites"], 3);
    assert_eq!(json["report"]["sections"][1]["key"], "leaked-organizations");
    assert_eq!(
        json["report"]["sections"][1]["aggregate"]["tables"][0]["entries"][0]["item"],
        "Tracker Inc"
    );
    assert!(json["report"]["run"].is_null());
}

#[test]
fn test_csv_report() {
    let report = build_report(&corpus(), Some(&entity_map()), &ReportOptions::default()).unwrap();
    let csv = generate_csv_report(&report).unwrap();
    let mut lines = csv.lines();

    assert_eq!(
        lines.next(),
        Some("section,scope,bucket,item,count,denominator,percentage")
    );
    assert!(csv.contains("leaked-organizations,total,total,Tracker Inc,2,3,66.7"));
    assert!(csv.contains("leaked-organizations,rank,12001-24000,Tracker Inc,1,1,100.0"));
}

#[test]
fn test_render_dispatches_on_format() {
    let report = build_report(&corpus(), None, &ReportOptions::default()).unwrap();

    assert!(render_report(&report, ReportFormat::Text).unwrap().contains("End of Report"));
    assert!(render_report(&report, ReportFormat::Json).unwrap().starts_with('{'));
    assert!(render_report(&report, ReportFormat::Csv).unwrap().starts_with("section,"));
}

#[test]
fn test_save_report() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("report.txt");

    save_report("hello", &path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
}

// ============================================================================
// Store Integration Tests
// ============================================================================

#[test]
fn test_gather_report_data_uses_latest_completed_run() {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::new(&temp_dir.path().join("test.db")).unwrap();
    assert!(
        gather_report_data(&db, None, None, &ReportOptions::default())
            .unwrap()
            .is_none()
    );

    let run_id = db.create_run("/data", None).unwrap();
    for summary in corpus() {
        db.insert_domain_summary(&run_id, &summary).unwrap();
    }
    db.complete_run(&run_id).unwrap();

    let report = gather_report_data(&db, None, None, &ReportOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(report.run.as_ref().unwrap().id, run_id);
    assert_eq!(report.domains, 3);
    assert!(generate_text_report(&report).contains(&run_id));
}
