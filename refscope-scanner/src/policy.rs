// Referrer-Policy parsing, safety classification and per-page usage tracking

use crate::normalize::{self, strip_blob};
use crate::record::{PageUrls, RequestRecord};
use crate::third_party::{is_third_party, registrable_domain};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferrerPolicy {
    NoReferrer,
    NoReferrerWhenDowngrade,
    Origin,
    OriginWhenCrossOrigin,
    SameOrigin,
    StrictOrigin,
    StrictOriginWhenCrossOrigin,
    UnsafeUrl,
}

impl ReferrerPolicy {
    pub const SAFE: [ReferrerPolicy; 6] = [
        ReferrerPolicy::NoReferrer,
        ReferrerPolicy::Origin,
        ReferrerPolicy::OriginWhenCrossOrigin,
        ReferrerPolicy::SameOrigin,
        ReferrerPolicy::StrictOrigin,
        ReferrerPolicy::StrictOriginWhenCrossOrigin,
    ];

    pub const UNSAFE: [ReferrerPolicy; 2] = [
        ReferrerPolicy::UnsafeUrl,
        ReferrerPolicy::NoReferrerWhenDowngrade,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferrerPolicy::NoReferrer => "no-referrer",
            ReferrerPolicy::NoReferrerWhenDowngrade => "no-referrer-when-downgrade",
            ReferrerPolicy::Origin => "origin",
            ReferrerPolicy::OriginWhenCrossOrigin => "origin-when-cross-origin",
            ReferrerPolicy::SameOrigin => "same-origin",
            ReferrerPolicy::StrictOrigin => "strict-origin",
            ReferrerPolicy::StrictOriginWhenCrossOrigin => "strict-origin-when-cross-origin",
            ReferrerPolicy::UnsafeUrl => "unsafe-url",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "no-referrer" => Some(ReferrerPolicy::NoReferrer),
            "no-referrer-when-downgrade" => Some(ReferrerPolicy::NoReferrerWhenDowngrade),
            "origin" => Some(ReferrerPolicy::Origin),
            "origin-when-cross-origin" => Some(ReferrerPolicy::OriginWhenCrossOrigin),
            "same-origin" => Some(ReferrerPolicy::SameOrigin),
            "strict-origin" => Some(ReferrerPolicy::StrictOrigin),
            "strict-origin-when-cross-origin" => Some(ReferrerPolicy::StrictOriginWhenCrossOrigin),
            "unsafe-url" => Some(ReferrerPolicy::UnsafeUrl),
            _ => None,
        }
    }

    /// Parse a `Referrer-Policy` header value.
    ///
    /// Collectors join repeated headers with newlines and sites send comma
    /// separated fallback lists; the last recognised token wins, as in browsers.
    pub fn parse_header(value: &str) -> Option<Self> {
        value
            .split([',', '\n'])
            .filter_map(ReferrerPolicy::from_str)
            .last()
    }

    pub fn is_safe(&self) -> bool {
        Self::SAFE.contains(self)
    }

    /// Whether a request to `target_url` under this policy sends the full URL
    /// cross-site: always for `unsafe-url`, and for `no-referrer-when-downgrade`
    /// only when the target uses plain HTTP.
    pub fn is_unsafe_for(&self, target_url: &str) -> bool {
        match self {
            ReferrerPolicy::UnsafeUrl => true,
            ReferrerPolicy::NoReferrerWhenDowngrade => normalize::parse(strip_blob(target_url))
                .map(|u| u.scheme() == "http")
                .unwrap_or(false),
            _ => false,
        }
    }
}

impl fmt::Display for ReferrerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a declared policy keeps full page URLs away from third parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicySafety {
    Safe,
    Unsafe,
    /// Nothing declared; the browser default applies.
    Unset,
}

impl PolicySafety {
    pub fn of(policy: Option<ReferrerPolicy>) -> Self {
        match policy {
            Some(policy) if policy.is_safe() => PolicySafety::Safe,
            Some(_) => PolicySafety::Unsafe,
            None => PolicySafety::Unset,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicySafety::Safe => "safe",
            PolicySafety::Unsafe => "unsafe",
            PolicySafety::Unset => "unset",
        }
    }
}

impl fmt::Display for PolicySafety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which referrer policies a page declared and which its requests used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUsage {
    /// Declared policy: the main document's response header if present,
    /// otherwise the policy the browser applied to the navigation request.
    pub effective_policy: Option<ReferrerPolicy>,
    pub policy_set_via_http: bool,
    pub first_party_request: BTreeSet<ReferrerPolicy>,
    pub third_party_request: BTreeMap<String, BTreeSet<ReferrerPolicy>>,
    pub third_party_response: BTreeMap<String, BTreeSet<ReferrerPolicy>>,
}

impl PolicyUsage {
    /// Fold another page's usage into this one (domain-level summaries).
    pub fn merge(&mut self, other: &PolicyUsage) {
        if self.effective_policy.is_none() {
            self.effective_policy = other.effective_policy;
        }
        self.policy_set_via_http |= other.policy_set_via_http;
        self.first_party_request
            .extend(other.first_party_request.iter().copied());
        for (domain, policies) in &other.third_party_request {
            self.third_party_request
                .entry(domain.clone())
                .or_default()
                .extend(policies.iter().copied());
        }
        for (domain, policies) in &other.third_party_response {
            self.third_party_response
                .entry(domain.clone())
                .or_default()
                .extend(policies.iter().copied());
        }
    }

    pub fn safety(&self) -> PolicySafety {
        PolicySafety::of(self.effective_policy)
    }

    /// Third parties whose response-declared policy differs from what the
    /// browser applied on the requests sent to them.
    pub fn divergent_third_parties(&self) -> Vec<&str> {
        self.third_party_response
            .iter()
            .filter(|(domain, declared)| {
                self.third_party_request
                    .get(*domain)
                    .is_some_and(|applied| applied != *declared)
            })
            .map(|(domain, _)| domain.as_str())
            .collect()
    }
}

/// Per-page referrer-policy state, fed one request at a time in visit order.
#[derive(Debug, Clone, Default)]
pub struct PolicyTracker {
    usage: PolicyUsage,
    unsafe_outbound: Vec<String>,
}

impl PolicyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&mut self, request: &RequestRecord, page: &PageUrls) {
        if request.is_websocket() {
            return;
        }

        let request_policy = request.request_policy();
        let response_policy = request.response_policy();

        if page.is_main_request(&request.url) {
            match response_policy {
                Some(policy) => {
                    self.usage.effective_policy = Some(policy);
                    self.usage.policy_set_via_http = true;
                }
                None if !self.usage.policy_set_via_http && request_policy.is_some() => {
                    self.usage.effective_policy = request_policy;
                }
                None => {}
            }
        }

        if !is_third_party(&page.intended, &page.actual, &request.url) {
            if let Some(policy) = request_policy {
                self.usage.first_party_request.insert(policy);
            }
            return;
        }

        if let Some(domain) = registrable_domain(strip_blob(&request.url)) {
            if let Some(policy) = request_policy {
                self.usage
                    .third_party_request
                    .entry(domain.clone())
                    .or_default()
                    .insert(policy);
            }
            if let Some(policy) = response_policy {
                self.usage
                    .third_party_response
                    .entry(domain)
                    .or_default()
                    .insert(policy);
            }
        }

        if let Some(policy) = request_policy
            && policy.is_unsafe_for(&request.url)
            && !self.unsafe_outbound.contains(&request.url)
        {
            self.unsafe_outbound.push(request.url.clone());
        }
    }

    pub fn usage(&self) -> &PolicyUsage {
        &self.usage
    }

    pub fn unsafe_outbound(&self) -> &[String] {
        &self.unsafe_outbound
    }

    pub fn into_parts(self) -> (PolicyUsage, Vec<String>) {
        (self.usage, self.unsafe_outbound)
    }
}
