// Registrable-domain (eTLD+1) computation and first/third-party classification

use crate::normalize::strip_blob;
use url::{Host, Url};

/// Registrable domain of a URL, a scheme-less `//host/path` string or a bare host.
///
/// Returns `None` for URLs without a domain host (data URLs, `about:blank`,
/// IP addresses) and for anything the URL parser rejects.
pub fn registrable_domain(url: &str) -> Option<String> {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(_) => Url::parse(&format!("http://{}", url.trim_start_matches('/'))).ok()?,
    };

    match parsed.host()? {
        Host::Domain(host) => psl::domain_str(host.trim_end_matches('.')).map(str::to_string),
        Host::Ipv4(_) | Host::Ipv6(_) => None,
    }
}

/// Decide whether `request_url` targets a third party relative to the page's
/// two possible origins (intended and post-redirect).
///
/// Any domain computation failure yields `false`: an unparseable request is
/// treated as first-party so it can never produce a leakage finding.
pub fn is_third_party(page_url: &str, alternate_page_url: &str, request_url: &str) -> bool {
    let Some(request_domain) = registrable_domain(strip_blob(request_url)) else {
        return false;
    };
    let (Some(page_domain), Some(alternate_domain)) = (
        registrable_domain(page_url),
        registrable_domain(alternate_page_url),
    ) else {
        return false;
    };

    request_domain != page_domain && request_domain != alternate_domain
}
