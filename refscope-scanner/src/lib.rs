pub mod error;
pub mod fingerprint;
pub mod leakage;
pub mod normalize;
pub mod page;
pub mod policy;
pub mod record;
pub mod third_party;

pub use error::ScanError;
pub use fingerprint::{
    Encoding, FingerprintMatch, FingerprintSet, Part, SubstringMatcher, UrlMatcher,
    match_fingerprint,
};
pub use leakage::{LeakageDetector, LeakageFinding, detect_leakage, referrer_leakage_occurs};
pub use page::{PageAnalysis, PageRecord, PageRejection, analyze_page, analyze_page_with};
pub use policy::{PolicySafety, PolicyTracker, PolicyUsage, ReferrerPolicy};
pub use record::{PageUrls, PageVisit, RequestRecord};
pub use third_party::{is_third_party, registrable_domain};
