// Tests for the statistical aggregator

use refscope_core::counter::{
    Aggregator, AggregatorState, Consent, RankBuckets, TableScope, percentage,
};
use refscope_core::error::ReportError;

const NO_ITEMS: [&str; 0] = [];

// ============================================================================
// Rank Bucket Tests
// ============================================================================

#[test]
fn test_default_buckets() {
    let buckets = RankBuckets::default();
    assert_eq!(buckets.len(), 5);
    assert_eq!(
        buckets.labels(),
        vec!["1-12000", "12001-24000", "24001-36000", "36001-48000", "48001-60000"]
    );
}

#[test]
fn test_bucket_boundaries() {
    let buckets = RankBuckets::default();
    assert_eq!(buckets.index_of(0), Some(0));
    assert_eq!(buckets.index_of(11_999), Some(0));
    assert_eq!(buckets.index_of(12_000), Some(1));
    assert_eq!(buckets.index_of(59_999), Some(4));
    assert_eq!(buckets.index_of(60_000), None);
}

#[test]
fn test_custom_buckets() {
    let buckets = RankBuckets::new(100, 2);
    assert_eq!(buckets.labels(), vec!["1-100", "101-200"]);
    assert_eq!(buckets.index_of(150), Some(1));
    assert_eq!(buckets.index_of(200), None);
}

// ============================================================================
// Observation Tests
// ============================================================================

#[test]
fn test_two_ranks_land_in_two_buckets() {
    let mut agg = Aggregator::new("leakage");
    agg.record_observation(Some(500), None, ["tracker.example"], false);
    agg.record_observation(Some(15_000), None, ["tracker.example"], false);

    assert_eq!(agg.count("tracker.example"), 2);
    assert_eq!(agg.consent_count(Consent::NoCmp, "tracker.example"), 2);
    assert_eq!(agg.consent_count(Consent::Cmp, "tracker.example"), 0);
    assert_eq!(agg.bucket_count(0, "tracker.example"), 1);
    assert_eq!(agg.bucket_count(1, "tracker.example"), 1);
    assert_eq!(agg.total_entries(), 2);
}

#[test]
fn test_empty_items_is_noop_unless_total_counter() {
    let mut agg = Aggregator::new("policies");
    agg.record_observation(Some(1), Some("OneTrust"), NO_ITEMS, false);
    assert_eq!(agg.total_entries(), 0);
    assert_eq!(agg.state(), AggregatorState::Idle);

    agg.record_observation(Some(1), Some("OneTrust"), NO_ITEMS, true);
    assert_eq!(agg.total_entries(), 1);
    assert_eq!(agg.consent_entries(Consent::Cmp), 1);
    assert_eq!(agg.bucket_entries(0), 1);
    assert_eq!(agg.state(), AggregatorState::Accumulating);
}

#[test]
fn test_cmp_label_selects_consent_table() {
    let mut agg = Aggregator::new("leakage");
    agg.record_observation(None, Some("Didomi"), ["a.com"], false);
    agg.record_observation(None, Some(""), ["a.com"], false);

    assert_eq!(agg.consent_entries(Consent::Cmp), 1);
    assert_eq!(agg.consent_entries(Consent::NoCmp), 1);
    assert_eq!(agg.consent_count(Consent::Cmp, "a.com"), 1);
}

#[test]
fn test_unranked_entries_skip_rank_buckets() {
    let mut agg = Aggregator::new("leakage");
    agg.record_observation(None, None, ["a.com"], false);
    agg.record_observation(Some(100_000), None, ["a.com"], false);

    assert_eq!(agg.count("a.com"), 2);
    assert_eq!((0..5).map(|b| agg.bucket_count(b, "a.com")).sum::<u64>(), 0);
    assert_eq!((0..5).map(|b| agg.bucket_entries(b)).sum::<u64>(), 0);
}

#[test]
fn test_duplicate_items_counted_once_per_entry() {
    let mut agg = Aggregator::new("leakage");
    agg.record_observation(Some(3), None, ["a.com", "a.com", "b.com"], false);

    assert_eq!(agg.count("a.com"), 1);
    assert_eq!(agg.count("b.com"), 1);
    assert_eq!(agg.total_entries(), 1);
}

#[test]
fn test_repeated_observation_doubles_counters() {
    let mut once = Aggregator::new("leakage");
    once.record_observation(Some(13_000), Some("Cookiebot"), ["a.com", "b.com"], false);

    let mut twice = Aggregator::new("leakage");
    for _ in 0..2 {
        twice.record_observation(Some(13_000), Some("Cookiebot"), ["a.com", "b.com"], false);
    }

    for item in ["a.com", "b.com"] {
        assert_eq!(twice.count(item), 2 * once.count(item));
        assert_eq!(
            twice.consent_count(Consent::Cmp, item),
            2 * once.consent_count(Consent::Cmp, item)
        );
        assert_eq!(twice.bucket_count(1, item), 2 * once.bucket_count(1, item));
    }
    assert_eq!(twice.total_entries(), 2 * once.total_entries());
    assert_eq!(twice.bucket_entries(1), 2 * once.bucket_entries(1));
}

#[test]
fn test_merge_matches_sequential_recording() {
    let mut left = Aggregator::new("leakage");
    left.record_observation(Some(10), None, ["a.com"], false);
    let mut right = Aggregator::new("leakage");
    right.record_observation(Some(20_000), Some("Quantcast"), ["a.com", "b.com"], false);

    let mut sequential = Aggregator::new("leakage");
    sequential.record_observation(Some(10), None, ["a.com"], false);
    sequential.record_observation(Some(20_000), Some("Quantcast"), ["a.com", "b.com"], false);

    left.merge(&right);

    assert_eq!(left.total_entries(), sequential.total_entries());
    assert_eq!(left.count("a.com"), sequential.count("a.com"));
    assert_eq!(left.consent_entries(Consent::Cmp), 1);
    assert_eq!(left.bucket_count(1, "b.com"), 1);
}

// ============================================================================
// Reporting Tests
// ============================================================================

#[test]
fn test_report_percentages() {
    let mut agg = Aggregator::new("leakage");
    agg.record_observation(Some(1), None, ["a.com"], true);
    agg.record_observation(Some(2), None, ["a.com", "b.com"], true);
    agg.record_observation(Some(3), Some("OneTrust"), NO_ITEMS, true);
    agg.record_observation(Some(4), None, ["c.com"], true);

    let report = agg.finalize().report(10).unwrap();
    let total = &report.tables[0];

    assert_eq!(total.scope, TableScope::Total);
    assert_eq!(total.denominator, 4);
    assert_eq!(total.entries[0].item, "a.com");
    assert_eq!(total.entries[0].count, 2);
    assert!((total.entries[0].percentage - 50.0).abs() < 1e-9);

    let cmp = &report.tables[1];
    assert_eq!(cmp.bucket, "cmp");
    assert_eq!(cmp.denominator, 1);
    assert!(cmp.entries.is_empty());

    let no_cmp = &report.tables[2];
    assert_eq!(no_cmp.bucket, "no-cmp");
    assert_eq!(no_cmp.denominator, 3);
}

#[test]
fn test_report_ties_broken_by_name_and_truncated() {
    let mut agg = Aggregator::new("leakage");
    agg.record_observation(Some(1), None, ["zeta.com", "alpha.com", "mid.com"], false);
    agg.record_observation(Some(2), None, ["mid.com"], false);

    let report = agg.finalize().report(2).unwrap();
    let items: Vec<&str> = report.tables[0]
        .entries
        .iter()
        .map(|e| e.item.as_str())
        .collect();

    assert_eq!(items, vec!["mid.com", "alpha.com"]);
}

#[test]
fn test_report_table_layout() {
    let mut agg = Aggregator::with_buckets("leakage", RankBuckets::new(10, 3));
    agg.record_observation(Some(25), None, ["a.com"], false);

    let report = agg.finalize().report(5).unwrap();
    let buckets: Vec<&str> = report.tables.iter().map(|t| t.bucket.as_str()).collect();

    assert_eq!(buckets, vec!["total", "cmp", "no-cmp", "1-10", "11-20", "21-30"]);
    assert_eq!(report.tables[5].denominator, 1);
    assert!(report.tables[3].entries.is_empty());
}

#[test]
fn test_percentages_in_table_bounded_by_items_per_entry() {
    let mut agg = Aggregator::new("leakage");
    agg.record_observation(Some(1), None, ["a.com", "b.com"], false);
    agg.record_observation(Some(2), None, ["a.com"], false);

    let report = agg.finalize().report(10).unwrap();
    let sum: f64 = report.tables[0].entries.iter().map(|e| e.percentage).sum();
    assert!(sum <= 200.0 + 1e-9);
}

#[test]
fn test_empty_aggregator_reports_zero_denominator() {
    let agg = Aggregator::new("third-parties");
    let result = agg.finalize().report(10);

    match result {
        Err(ReportError::ZeroDenominator { table, bucket }) => {
            assert_eq!(table, "third-parties");
            assert_eq!(bucket, "total");
        }
        other => panic!("expected zero denominator, got {:?}", other),
    }
}

#[test]
fn test_percentage_guards_zero() {
    assert!(matches!(
        percentage(1, 0, "t", "b"),
        Err(ReportError::ZeroDenominator { .. })
    ));
    assert!((percentage(1, 4, "t", "b").unwrap() - 25.0).abs() < 1e-9);
}

#[test]
fn test_finalized_counts_are_readable() {
    let mut agg = Aggregator::new("leakage");
    agg.record_observation(Some(1), None, ["a.com"], false);
    let finalized = agg.finalize();

    assert_eq!(finalized.counts().count("a.com"), 1);
    assert_eq!(finalized.counts().name(), "leakage");
}
