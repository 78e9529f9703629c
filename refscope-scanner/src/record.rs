use crate::error::Result;
use crate::normalize::{strip_fragment, strip_trailing_slash};
use crate::policy::ReferrerPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// One crawled page as written by the crawl collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVisit {
    #[serde(default)]
    pub initial_url: String,
    #[serde(default)]
    pub final_url: String,
    #[serde(default)]
    pub data: PageData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageData {
    #[serde(default)]
    pub requests: Vec<RequestRecord>,
}

/// One outbound request observed during a page visit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    #[serde(default)]
    pub url: String,
    /// Policy the browser applied when issuing the request.
    #[serde(default)]
    pub referrer_policy: String,
    /// The `Referer` header actually sent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub response_headers: HashMap<String, String>,
    #[serde(default, rename = "type")]
    pub request_type: String,
}

impl PageVisit {
    pub fn new(initial_url: &str, final_url: &str) -> Self {
        Self {
            initial_url: initial_url.to_string(),
            final_url: final_url.to_string(),
            data: PageData::default(),
        }
    }

    pub fn with_request(mut self, request: RequestRecord) -> Self {
        self.data.requests.push(request);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn requests(&self) -> &[RequestRecord] {
        &self.data.requests
    }

    /// The URL actually landed on; collectors leave `finalUrl` empty when the
    /// visit never committed, in which case the intended URL stands in.
    pub fn actual_url(&self) -> &str {
        if self.final_url.is_empty() {
            &self.initial_url
        } else {
            &self.final_url
        }
    }

    pub fn was_redirected(&self) -> bool {
        self.actual_url() != self.initial_url
    }

    pub fn page_urls(&self) -> PageUrls {
        PageUrls::new(&self.initial_url, self.actual_url())
    }
}

impl RequestRecord {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: &str) -> Self {
        self.referrer_policy = policy.to_string();
        self
    }

    pub fn with_referer(mut self, referer: &str) -> Self {
        self.referer = Some(referer.to_string());
        self
    }

    pub fn with_response_policy(mut self, policy: &str) -> Self {
        self.response_headers
            .insert("referrer-policy".to_string(), policy.to_string());
        self
    }

    pub fn with_type(mut self, request_type: &str) -> Self {
        self.request_type = request_type.to_string();
        self
    }

    pub fn request_policy(&self) -> Option<ReferrerPolicy> {
        ReferrerPolicy::from_str(&self.referrer_policy)
    }

    /// Policy declared by the response's `Referrer-Policy` header.
    pub fn response_policy(&self) -> Option<ReferrerPolicy> {
        self.response_headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("referrer-policy"))
            .and_then(|(_, value)| ReferrerPolicy::parse_header(value))
    }

    pub fn is_websocket(&self) -> bool {
        self.request_type.eq_ignore_ascii_case("websocket")
    }
}

/// The two URLs a page can be known by: the one the crawler asked for and the
/// one it ended up on. Both are kept without trailing slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageUrls {
    pub intended: String,
    pub actual: String,
}

impl PageUrls {
    pub fn new(intended: &str, actual: &str) -> Self {
        Self {
            intended: strip_trailing_slash(intended).to_string(),
            actual: strip_trailing_slash(actual).to_string(),
        }
    }

    /// The main navigation request targets the page itself, ignoring trailing
    /// slashes and fragments.
    pub fn is_main_request(&self, request_url: &str) -> bool {
        let request = strip_trailing_slash(request_url);
        [&self.intended, &self.actual].into_iter().any(|page| {
            page == request
                || strip_fragment(page)
                    .map(|stripped| strip_trailing_slash(&stripped) == request)
                    .unwrap_or(false)
        })
    }
}
