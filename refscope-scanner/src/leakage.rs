// Leakage detection: third-party requests carrying the visited URL

use crate::fingerprint::{Encoding, Part, SubstringMatcher, UrlMatcher};
use crate::normalize::{has_significant_path, strip_scheme_query_and_fragment};
use crate::third_party::is_third_party;
use serde::{Deserialize, Serialize};

/// A third-party request whose URL discloses (part of) the visited page's URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakageFinding {
    #[serde(rename = "request-url")]
    pub target_url: String,
    #[serde(rename = "part-found")]
    pub part: Part,
    pub encoding: Encoding,
}

/// Combines third-party classification with fingerprint matching. Generic over
/// the matcher so the substring primitive can be swapped out.
#[derive(Debug, Clone, Default)]
pub struct LeakageDetector<M: UrlMatcher = SubstringMatcher> {
    matcher: M,
}

impl LeakageDetector<SubstringMatcher> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M: UrlMatcher> LeakageDetector<M> {
    pub fn with_matcher(matcher: M) -> Self {
        Self { matcher }
    }

    /// First-party requests never produce a finding, whatever they contain.
    pub fn detect(
        &self,
        page_url: &str,
        alternate_page_url: &str,
        request_url: &str,
    ) -> Option<LeakageFinding> {
        if !is_third_party(page_url, alternate_page_url, request_url) {
            return None;
        }

        self.matcher
            .find(page_url, alternate_page_url, request_url)
            .map(|found| LeakageFinding {
                target_url: request_url.to_string(),
                part: found.part,
                encoding: found.encoding,
            })
    }
}

pub fn detect_leakage(
    page_url: &str,
    alternate_page_url: &str,
    request_url: &str,
) -> Option<LeakageFinding> {
    LeakageDetector::new().detect(page_url, alternate_page_url, request_url)
}

/// Whether a `Referer` header carries more than the bare origin of the page:
/// the page's URL, or its scheme/query/fragment-trimmed form, must appear in
/// it. Pages without a meaningful path can never leak this way.
pub fn referrer_leakage_occurs(page_url: &str, alternate_page_url: &str, referrer: &str) -> bool {
    [page_url, alternate_page_url]
        .into_iter()
        .any(|url| leaks_into(url, referrer))
}

fn leaks_into(url: &str, referrer: &str) -> bool {
    if !has_significant_path(url) {
        return false;
    }
    if referrer.contains(url) {
        return true;
    }
    strip_scheme_query_and_fragment(url)
        .map(|trimmed| referrer.contains(&trimmed))
        .unwrap_or(false)
}
