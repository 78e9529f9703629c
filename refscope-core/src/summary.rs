//! Per-domain fold of every valid page crawled on one site: the corpus row
//! the report is computed from, plus the site's referrer-policy summary.

use crate::ranking::rank_value;
use refscope_scanner::{PageAnalysis, PolicySafety, PolicyUsage, ReferrerPolicy, registrable_domain};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSummary {
    pub domain: String,
    pub rank: Option<usize>,
    /// First CMP seen on any page of the site.
    pub cmp: Option<String>,
    pub leaked_endpoints: BTreeSet<String>,
    pub third_parties: BTreeSet<String>,
    pub referrer_leakage: BTreeSet<String>,
    /// Distinct declared policies, in the order pages first declared them.
    pub declared_policies: Vec<ReferrerPolicy>,
    pub policy: PolicyUsage,
    pub pages: usize,
}

/// Export shape of a site's policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySummary {
    /// Declared policies joined with `;`.
    pub set_policy: String,
    pub set_via_http: bool,
    #[serde(rename = "1st_party_req")]
    pub first_party_request: Vec<ReferrerPolicy>,
    #[serde(rename = "3rd_party_req")]
    pub third_party_request: BTreeMap<String, Vec<ReferrerPolicy>>,
    #[serde(rename = "3rd_party_resp")]
    pub third_party_response: BTreeMap<String, Vec<ReferrerPolicy>>,
    pub policy_safety: PolicySafety,
    /// Third parties that answered with a policy other than the one applied to them.
    pub divergent_third_parties: Vec<String>,
}

impl DomainSummary {
    pub fn new(domain: &str, rank: Option<usize>) -> Self {
        Self {
            domain: domain.to_string(),
            rank,
            ..Self::default()
        }
    }

    pub fn add_page(&mut self, page: &PageAnalysis) {
        self.pages += 1;

        if self.cmp.is_none() {
            self.cmp = page.cmp.clone();
        }
        if let Some(policy) = page.declared_policy()
            && !self.declared_policies.contains(&policy)
        {
            self.declared_policies.push(policy);
        }

        self.policy.merge(&page.policy);
        self.leaked_endpoints
            .extend(page.leaked_endpoints.iter().cloned());
        self.third_parties.extend(page.third_parties.iter().cloned());
        self.referrer_leakage
            .extend(page.referrer_leakage.iter().cloned());
    }

    pub fn rank_value(&self) -> i64 {
        rank_value(self.rank)
    }

    /// Registrable domains the site's URLs were leaked to through request URLs.
    pub fn leaked_domains(&self) -> BTreeSet<String> {
        self.leaked_endpoints
            .iter()
            .filter_map(|endpoint| registrable_domain(endpoint))
            .collect()
    }

    pub fn declared_policy_labels(&self) -> Vec<&'static str> {
        self.declared_policies.iter().map(|p| p.as_str()).collect()
    }

    /// A site is unsafe as soon as one of its pages declared an unsafe policy.
    pub fn policy_safety(&self) -> PolicySafety {
        if self.declared_policies.is_empty() {
            PolicySafety::Unset
        } else if self.declared_policies.iter().all(ReferrerPolicy::is_safe) {
            PolicySafety::Safe
        } else {
            PolicySafety::Unsafe
        }
    }

    pub fn policy_summary(&self) -> PolicySummary {
        PolicySummary {
            set_policy: self.declared_policy_labels().join(";"),
            set_via_http: self.policy.policy_set_via_http,
            first_party_request: self.policy.first_party_request.iter().copied().collect(),
            third_party_request: flatten(&self.policy.third_party_request),
            third_party_response: flatten(&self.policy.third_party_response),
            policy_safety: self.policy_safety(),
            divergent_third_parties: self
                .policy
                .divergent_third_parties()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

fn flatten(
    map: &BTreeMap<String, BTreeSet<ReferrerPolicy>>,
) -> BTreeMap<String, Vec<ReferrerPolicy>> {
    map.iter()
        .map(|(domain, policies)| (domain.clone(), policies.iter().copied().collect()))
        .collect()
}
