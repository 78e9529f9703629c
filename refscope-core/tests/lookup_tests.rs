// Tests for the entity map, Tranco ranking and CMP log lookups

use refscope_core::cmp::{CmpLookup, parse_log_line};
use refscope_core::entities::EntityMap;
use refscope_core::ranking::{TrancoRanking, rank_value};
use std::fs;
use tempfile::TempDir;

// ============================================================================
// Entity Map Tests
// ============================================================================

#[test]
fn test_flat_entity_map() {
    let map = EntityMap::from_json(r#"{"doubleclick.net": "Google", "facebook.net": "Meta"}"#).unwrap();

    assert_eq!(map.len(), 2);
    assert_eq!(map.organization("doubleclick.net"), Some("Google"));
    assert_eq!(map.organization("unknown.com"), None);
}

#[test]
fn test_tracker_radar_entity_map() {
    let json = r#"{
        "entities": {
            "Google LLC": {"displayName": "Google", "properties": ["google.com", "doubleclick.net"]},
            "Criteo SA": {"properties": ["criteo.com"]}
        }
    }"#;
    let map = EntityMap::from_json(json).unwrap();

    assert_eq!(map.organization("doubleclick.net"), Some("Google"));
    assert_eq!(map.organization("criteo.com"), Some("Criteo SA"));
}

#[test]
fn test_entity_lookup_falls_back_to_registrable_domain() {
    let mut map = EntityMap::new();
    map.insert("doubleclick.net", "Google");

    assert_eq!(map.organization("stats.g.doubleclick.net"), Some("Google"));
    assert_eq!(map.organization("DoubleClick.NET"), Some("Google"));
}

#[test]
fn test_missing_entities_are_skipped() {
    let mut map = EntityMap::new();
    map.insert("doubleclick.net", "Google");
    map.insert("google-analytics.com", "Google");

    let orgs = map.organizations(["doubleclick.net", "unmapped.io", "google-analytics.com"]);
    assert_eq!(orgs.into_iter().collect::<Vec<_>>(), vec!["Google"]);
}

#[test]
fn test_entity_map_rejects_invalid_json() {
    assert!(EntityMap::from_json("not json").is_err());
}

// ============================================================================
// Ranking Tests
// ============================================================================

#[test]
fn test_ranking_from_csv_lines() {
    let ranking = TrancoRanking::parse("1,google.com\n2,facebook.com\n3,shop.com\n");

    assert_eq!(ranking.rank("google.com"), Some(0));
    assert_eq!(ranking.rank("shop.com"), Some(2));
    assert_eq!(ranking.rank("missing.com"), None);
}

#[test]
fn test_ranking_from_bare_domains() {
    let ranking = TrancoRanking::parse("# top sites\ngoogle.com\n\nshop.com\ngoogle.com\n");

    assert_eq!(ranking.len(), 2);
    assert_eq!(ranking.rank("shop.com"), Some(1));
    assert_eq!(ranking.rank("google.com"), Some(0));
}

#[test]
fn test_rank_value_for_unlisted() {
    assert_eq!(rank_value(None), -1);
    assert_eq!(rank_value(Some(42)), 42);
}

// ============================================================================
// CMP Log Tests
// ============================================================================

#[test]
fn test_parse_cmp_log_line() {
    let line = r#"[2023-04-01T10:00:00Z] CMP detected on https://www.shop.com/: {"cmpName":"OneTrust","cmpVersion":"6.1"}"#;
    let (url, cmp) = parse_log_line(line).unwrap();

    assert_eq!(url, "https://www.shop.com/");
    assert_eq!(cmp, "OneTrust");
}

#[test]
fn test_parse_cmp_log_line_with_trailing_text() {
    let line = r#"CMP detected on https://shop.com/a: {"cmpName":"Didomi"} (after 1200ms)"#;
    let (_, cmp) = parse_log_line(line).unwrap();
    assert_eq!(cmp, "Didomi");
}

#[test]
fn test_unrelated_log_lines_ignored() {
    assert!(parse_log_line("Will wait 1000ms after CMP detected!").is_none());
    assert!(parse_log_line("Visiting https://shop.com/").is_none());
}

#[test]
fn test_cmp_lookup_normalizes_urls() {
    let lookup = CmpLookup::parse(r#"x CMP detected on https://shop.com: {"cmpName":"Cookiebot"}"#);

    assert_eq!(lookup.lookup("https://shop.com/"), Some("Cookiebot"));
    assert_eq!(lookup.lookup("https://other.com/"), None);
}

#[test]
fn test_cmp_lookup_from_log_dir() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("crawl-1.log"),
        "CMP detected on https://a.com/: {\"cmpName\":\"OneTrust\"}\nnoise\n",
    )
    .unwrap();
    fs::write(
        temp_dir.path().join("crawl-2.log"),
        "CMP detected on https://b.com/x: {\"cmpName\":\"Didomi\"}\n",
    )
    .unwrap();
    fs::write(
        temp_dir.path().join("notes.txt"),
        "CMP detected on https://c.com/: {\"cmpName\":\"Ignored\"}\n",
    )
    .unwrap();

    let lookup = CmpLookup::from_log_dir(temp_dir.path()).unwrap();

    assert_eq!(lookup.len(), 2);
    assert_eq!(lookup.lookup("https://b.com/x"), Some("Didomi"));
    assert_eq!(lookup.lookup("https://c.com/"), None);
}
