//! Per-page aggregation: folds every request of one [`PageVisit`] into a
//! single [`PageAnalysis`], and compacts it into a sparse [`PageRecord`] at the
//! serialization boundary.

use crate::fingerprint::UrlMatcher;
use crate::leakage::{LeakageDetector, LeakageFinding, referrer_leakage_occurs};
use crate::normalize::{self, endpoint, strip_blob};
use crate::policy::{PolicyTracker, PolicyUsage, ReferrerPolicy};
use crate::record::{PageUrls, PageVisit};
use crate::third_party::{is_third_party, registrable_domain};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Why a page is excluded from analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageRejection {
    /// The final URL is not an absolute http(s) URL with a registrable host.
    InvalidFinalUrl,
    /// The visit ended on a different registrable domain than intended.
    CrossDomainRedirect,
    /// No requests were captured.
    NoRequests,
}

impl PageRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageRejection::InvalidFinalUrl => "invalid_final_url",
            PageRejection::CrossDomainRedirect => "cross_domain_redirect",
            PageRejection::NoRequests => "no_requests",
        }
    }
}

impl fmt::Display for PageRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PageVisit {
    /// Checks run in order: final URL syntax, same registrable domain, requests present.
    pub fn validate(&self) -> Result<(), PageRejection> {
        if !is_valid_final_url(&self.final_url) {
            return Err(PageRejection::InvalidFinalUrl);
        }

        match (
            registrable_domain(&self.initial_url),
            registrable_domain(&self.final_url),
        ) {
            (Some(intended), Some(actual)) if intended == actual => {}
            _ => return Err(PageRejection::CrossDomainRedirect),
        }

        if self.requests().is_empty() {
            return Err(PageRejection::NoRequests);
        }

        Ok(())
    }
}

fn is_valid_final_url(url: &str) -> bool {
    normalize::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
        && registrable_domain(url).is_some()
}

/// Everything inferred about one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageAnalysis {
    pub crawled_url: String,
    pub redirected_url: Option<String>,
    pub cmp: Option<String>,
    pub policy: PolicyUsage,
    pub request_leakage: Vec<LeakageFinding>,
    pub unsafe_outbound: Vec<String>,
    /// Registrable domains of every third party contacted.
    pub third_parties: BTreeSet<String>,
    /// Endpoints (host and path) that received the page URL in their request URL.
    pub leaked_endpoints: BTreeSet<String>,
    /// Registrable domains that received the full page URL in a `Referer`.
    pub referrer_leakage: BTreeSet<String>,
}

impl PageAnalysis {
    pub fn declared_policy(&self) -> Option<ReferrerPolicy> {
        self.policy.effective_policy
    }

    pub fn has_leakage(&self) -> bool {
        !self.request_leakage.is_empty() || !self.referrer_leakage.is_empty()
    }

    /// Drop empty fields; policy maps are summarised per domain elsewhere.
    pub fn to_record(&self) -> PageRecord {
        PageRecord {
            crawled_url: self.crawled_url.clone(),
            redirected_url: self.redirected_url.clone(),
            cmp: self.cmp.clone(),
            referrer_policy: self.policy.effective_policy,
            policy_set_via_http: self.policy.policy_set_via_http,
            request_leakage: self.request_leakage.clone(),
            unsafe_outbound: self.unsafe_outbound.clone(),
            third_parties: self.third_parties.iter().cloned().collect(),
            referrer_leakage: self.referrer_leakage.iter().cloned().collect(),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Sparse per-page output record: absent keys mean "nothing observed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    #[serde(rename = "crawled-url")]
    pub crawled_url: String,
    #[serde(rename = "redirected-url", default, skip_serializing_if = "Option::is_none")]
    pub redirected_url: Option<String>,
    #[serde(rename = "CMP-encountered", default, skip_serializing_if = "Option::is_none")]
    pub cmp: Option<String>,
    #[serde(rename = "referrer-policy", default, skip_serializing_if = "Option::is_none")]
    pub referrer_policy: Option<ReferrerPolicy>,
    #[serde(rename = "referrer-policy-set", default, skip_serializing_if = "is_false")]
    pub policy_set_via_http: bool,
    #[serde(rename = "request-leakage", default, skip_serializing_if = "Vec::is_empty")]
    pub request_leakage: Vec<LeakageFinding>,
    #[serde(rename = "unsafe-outbound", default, skip_serializing_if = "Vec::is_empty")]
    pub unsafe_outbound: Vec<String>,
    #[serde(rename = "third-parties", default, skip_serializing_if = "Vec::is_empty")]
    pub third_parties: Vec<String>,
    #[serde(rename = "referrer_leakage", default, skip_serializing_if = "Vec::is_empty")]
    pub referrer_leakage: Vec<String>,
}

/// Digests only match the URL exactly as visited, so the unmodified page URLs
/// are tried before their trailing-slash-trimmed forms.
fn detect_request_leakage<M: UrlMatcher>(
    detector: &LeakageDetector<M>,
    visit: &PageVisit,
    urls: &PageUrls,
    request_url: &str,
) -> Option<LeakageFinding> {
    let (intended, actual) = (visit.initial_url.as_str(), visit.actual_url());
    detector.detect(intended, actual, request_url).or_else(|| {
        if urls.intended == intended && urls.actual == actual {
            return None;
        }
        detector.detect(&urls.intended, &urls.actual, request_url)
    })
}

pub fn analyze_page(visit: &PageVisit, cmp: Option<&str>) -> PageAnalysis {
    analyze_page_with(visit, cmp, &LeakageDetector::new())
}

/// Fold all requests of a page in visit order. WebSocket requests carry no
/// referrer semantics and are skipped.
pub fn analyze_page_with<M: UrlMatcher>(
    visit: &PageVisit,
    cmp: Option<&str>,
    detector: &LeakageDetector<M>,
) -> PageAnalysis {
    let urls = visit.page_urls();
    let mut tracker = PolicyTracker::new();
    let mut analysis = PageAnalysis {
        crawled_url: visit.initial_url.clone(),
        redirected_url: visit.was_redirected().then(|| visit.actual_url().to_string()),
        cmp: cmp.filter(|c| !c.is_empty()).map(str::to_string),
        ..PageAnalysis::default()
    };

    for request in visit.requests().iter().filter(|r| !r.is_websocket()) {
        tracker.record_request(request, &urls);

        if !is_third_party(&urls.intended, &urls.actual, &request.url) {
            continue;
        }

        let target = strip_blob(&request.url);
        let referrer_leaked = request
            .referer
            .as_deref()
            .is_some_and(|referer| referrer_leakage_occurs(&urls.intended, &urls.actual, referer));

        if let Some(domain) = registrable_domain(target) {
            if referrer_leaked {
                analysis.referrer_leakage.insert(domain.clone());
            }
            analysis.third_parties.insert(domain);
        }

        // A full-URL referrer already explains the disclosure; only leaks that
        // get past a trimmed (or absent) referrer count as circumvention.
        if referrer_leaked {
            continue;
        }
        if let Some(finding) = detect_request_leakage(detector, visit, &urls, &request.url) {
            if let Ok(leaked_to) = endpoint(target) {
                analysis.leaked_endpoints.insert(leaked_to);
            }
            analysis.request_leakage.push(finding);
        }
    }

    let (policy, unsafe_outbound) = tracker.into_parts();
    analysis.policy = policy;
    analysis.unsafe_outbound = unsafe_outbound;

    debug!(
        "Analyzed {}: {} third parties, {} leakages, {} referrer leakages",
        analysis.crawled_url,
        analysis.third_parties.len(),
        analysis.request_leakage.len(),
        analysis.referrer_leakage.len()
    );

    analysis
}
