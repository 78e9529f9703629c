// Validity ledger: counts of everything skipped or suspicious during analysis

use refscope_scanner::PageRejection;
use serde::Serialize;
use std::fmt;

/// Pages the crawler visits per site: the landing page plus twenty subpages.
pub const PAGES_PER_SITE: usize = 21;

/// Histogram of page files per data directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageCounts {
    pub equals_zero: u64,
    pub fewer: u64,
    pub exact: u64,
    pub more: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SanityLedger {
    pub directories: u64,
    /// Directories skipped for holding too few page files.
    pub invalid_directories: u64,
    /// JSON files in data directories that are not page records (links, metadata).
    pub skipped_files: u64,
    pub files: u64,
    pub malformed_files: u64,
    pub invalid_urls: u64,
    pub redirects: u64,
    pub requestless: u64,
    pub page_counts: PageCounts,
    /// Directories with fewer page files than the admin file lists as visited.
    pub fewer_results: u64,
    pub more_results: u64,
}

impl SanityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_page_count(&mut self, pages: usize) {
        match pages {
            0 => self.page_counts.equals_zero += 1,
            n if n < PAGES_PER_SITE => self.page_counts.fewer += 1,
            PAGES_PER_SITE => self.page_counts.exact += 1,
            _ => self.page_counts.more += 1,
        }
    }

    pub fn record_results_ratio(&mut self, results: usize, visited: usize) {
        if results < visited {
            self.fewer_results += 1;
        } else if results > visited {
            self.more_results += 1;
        }
    }

    pub fn record_rejection(&mut self, rejection: PageRejection) {
        match rejection {
            PageRejection::InvalidFinalUrl => self.invalid_urls += 1,
            PageRejection::CrossDomainRedirect => self.redirects += 1,
            PageRejection::NoRequests => self.requestless += 1,
        }
    }

    pub fn rejected_pages(&self) -> u64 {
        self.invalid_urls + self.redirects + self.requestless
    }

    pub fn merge(&mut self, other: &SanityLedger) {
        self.directories += other.directories;
        self.invalid_directories += other.invalid_directories;
        self.skipped_files += other.skipped_files;
        self.files += other.files;
        self.malformed_files += other.malformed_files;
        self.invalid_urls += other.invalid_urls;
        self.redirects += other.redirects;
        self.requestless += other.requestless;
        self.page_counts.equals_zero += other.page_counts.equals_zero;
        self.page_counts.fewer += other.page_counts.fewer;
        self.page_counts.exact += other.page_counts.exact;
        self.page_counts.more += other.page_counts.more;
        self.fewer_results += other.fewer_results;
        self.more_results += other.more_results;
    }
}

impl fmt::Display for SanityLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data directories:                  {}", self.directories)?;
        writeln!(f, "Directories with too few pages:    {}", self.invalid_directories)?;
        writeln!(f, "Non-page files skipped:            {}", self.skipped_files)?;
        writeln!(f, "Page files read:                   {}", self.files)?;
        writeln!(f, "Malformed page files:              {}", self.malformed_files)?;
        writeln!(f, "Pages with invalid final URL:      {}", self.invalid_urls)?;
        writeln!(f, "Pages redirected to other domain:  {}", self.redirects)?;
        writeln!(f, "Pages without requests:            {}", self.requestless)?;
        writeln!(f, "Pages per directory:")?;
        writeln!(f, "  ={:<3} {}", 0, self.page_counts.equals_zero)?;
        writeln!(f, "  <{:<3} {}", PAGES_PER_SITE, self.page_counts.fewer)?;
        writeln!(f, "  ={:<3} {}", PAGES_PER_SITE, self.page_counts.exact)?;
        writeln!(f, "  >{:<3} {}", PAGES_PER_SITE, self.page_counts.more)?;
        writeln!(f, "Results vs. visited:")?;
        writeln!(f, "  #results < #visited: {}", self.fewer_results)?;
        write!(f, "  #results > #visited: {}", self.more_results)
    }
}
