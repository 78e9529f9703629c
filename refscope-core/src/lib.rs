pub mod admin;
pub mod analysis;
pub mod cmp;
pub mod counter;
pub mod data;
pub mod entities;
pub mod error;
pub mod export;
pub mod ranking;
pub mod report;
pub mod sanity;
pub mod summary;

use colored::Colorize;

pub use counter::{Aggregator, AggregatorState, Consent, FinalizedAggregator, RankBuckets};
pub use error::{AnalysisError, ReportError};
pub use summary::DomainSummary;

pub fn print_banner() {
    let banner = r#"
    ╔════════════════════════════════════════════════════════╗
    ║                 R E F S C O P E                        ║
    ║                                                        ║
    ║    referrer-policy circumvention analysis              ║
    ╚════════════════════════════════════════════════════════╝
    "#;
    println!("{}", banner.cyan());
    println!("    v{}\n", env!("CARGO_PKG_VERSION").dimmed());
}
