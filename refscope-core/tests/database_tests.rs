// Tests for the results store

use refscope_core::data::{Database, RunStatus};
use refscope_core::summary::DomainSummary;
use refscope_scanner::{PageVisit, ReferrerPolicy, RequestRecord, analyze_page};
use tempfile::TempDir;

fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, db)
}

fn sample_summary() -> DomainSummary {
    let visit = PageVisit::new("https://shop.com/account", "https://shop.com/account")
        .with_request(
            RequestRecord::new("https://shop.com/account")
                .with_policy("strict-origin-when-cross-origin")
                .with_response_policy("no-referrer"),
        )
        .with_request(
            RequestRecord::new("https://tracker.com/c?u=https://shop.com/account")
                .with_policy("no-referrer")
                .with_response_policy("unsafe-url"),
        );
    let mut summary = DomainSummary::new("shop.com", Some(41));
    summary.add_page(&analyze_page(&visit, Some("OneTrust")));
    summary
}

// ============================================================================
// Database Creation Tests
// ============================================================================

#[test]
fn test_database_creation() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let db = Database::new(&db_path);
    assert!(db.is_ok());
    assert!(db_path.exists());
}

#[test]
fn test_database_exists_and_drop() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    assert!(!Database::exists(&db_path));

    let db = Database::new(&db_path).unwrap();
    assert!(Database::exists(&db_path));
    drop(db);

    Database::drop(&db_path).unwrap();
    assert!(!Database::exists(&db_path));
}

#[test]
fn test_reopen_keeps_schema() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let run_id = {
        let db = Database::new(&db_path).unwrap();
        db.create_run("/data", None).unwrap()
    };
    let db = Database::new(&db_path).unwrap();
    assert!(db.get_run(&run_id).unwrap().is_some());
}

// ============================================================================
// Run Tests
// ============================================================================

#[test]
fn test_create_run() {
    let (_temp_dir, db) = create_test_db();

    let run_id = db.create_run("/data/crawl", Some("{\"workers\":4}")).unwrap();
    let run = db.get_run(&run_id).unwrap().unwrap();

    assert_eq!(run.status, RunStatus::Running.as_str());
    assert_eq!(run.data_root, "/data/crawl");
    assert_eq!(run.configuration.as_deref(), Some("{\"workers\":4}"));
    assert!(run.end_time.is_none());
}

#[test]
fn test_complete_and_fail_run() {
    let (_temp_dir, db) = create_test_db();

    let done = db.create_run("/a", None).unwrap();
    let broken = db.create_run("/b", None).unwrap();
    db.complete_run(&done).unwrap();
    db.fail_run(&broken).unwrap();

    let done = db.get_run(&done).unwrap().unwrap();
    assert_eq!(RunStatus::from_str(&done.status), Some(RunStatus::Completed));
    assert!(done.end_time.is_some());
    assert_eq!(db.get_run(&broken).unwrap().unwrap().status, "failed");
}

#[test]
fn test_latest_run_ignores_unfinished() {
    let (_temp_dir, db) = create_test_db();
    assert!(db.latest_run().unwrap().is_none());

    let first = db.create_run("/a", None).unwrap();
    db.complete_run(&first).unwrap();
    let _running = db.create_run("/b", None).unwrap();

    assert_eq!(db.latest_run().unwrap().unwrap().id, first);
    assert_eq!(db.list_runs().unwrap().len(), 2);
}

#[test]
fn test_get_missing_run() {
    let (_temp_dir, db) = create_test_db();
    assert!(db.get_run("no-such-run").unwrap().is_none());
}

// ============================================================================
// Result Tests
// ============================================================================

#[test]
fn test_domain_summary_round_trip() {
    let (_temp_dir, db) = create_test_db();
    let run_id = db.create_run("/data", None).unwrap();
    let summary = sample_summary();

    db.insert_domain_summary(&run_id, &summary).unwrap();
    let stored = db.get_domain_summaries(&run_id).unwrap();

    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], summary);
    assert_eq!(stored[0].declared_policies, vec![ReferrerPolicy::NoReferrer]);
    assert!(stored[0].policy.third_party_response["tracker.com"].contains(&ReferrerPolicy::UnsafeUrl));
}

#[test]
fn test_unranked_domain_stored_as_minus_one() {
    let (_temp_dir, db) = create_test_db();
    let run_id = db.create_run("/data", None).unwrap();
    db.insert_domain_summary(&run_id, &DomainSummary::new("unlisted.org", None))
        .unwrap();

    let rank: i64 = db
        .get_connection()
        .query_row("SELECT rank FROM domain_results WHERE domain = 'unlisted.org'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rank, -1);
    assert_eq!(db.get_domain_summaries(&run_id).unwrap()[0].rank, None);
}

#[test]
fn test_duplicate_domain_in_run_rejected() {
    let (_temp_dir, db) = create_test_db();
    let run_id = db.create_run("/data", None).unwrap();
    db.insert_domain_summary(&run_id, &DomainSummary::new("shop.com", None))
        .unwrap();

    assert!(
        db.insert_domain_summary(&run_id, &DomainSummary::new("shop.com", None))
            .is_err()
    );
}

#[test]
fn test_page_records() {
    let (_temp_dir, db) = create_test_db();
    let run_id = db.create_run("/data", None).unwrap();

    let leaking = PageVisit::new("https://shop.com/a", "https://shop.com/a")
        .with_request(RequestRecord::new("https://tracker.com/c?u=https://shop.com/a"));
    let clean = PageVisit::new("https://shop.com/b", "https://shop.com/b")
        .with_request(RequestRecord::new("https://cdn.shop.com/app.js"));

    for visit in [&leaking, &clean] {
        db.insert_page_record(&run_id, "shop.com", &analyze_page(visit, None).to_record())
            .unwrap();
    }

    let records = db.get_page_records(&run_id, "shop.com").unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].crawled_url, "https://shop.com/a");
    assert_eq!(records[0].request_leakage.len(), 1);
    assert_eq!(db.count_leaking_pages(&run_id).unwrap(), 1);
}

#[test]
fn test_clear_results() {
    let (_temp_dir, db) = create_test_db();
    let run_id = db.create_run("/data", None).unwrap();
    db.insert_domain_summary(&run_id, &sample_summary()).unwrap();

    assert_eq!(db.clear_results().unwrap(), 1);
    assert!(db.list_runs().unwrap().is_empty());
    assert!(db.get_domain_summaries(&run_id).unwrap().is_empty());
}
