use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading a crawl corpus or writing analysis output.
///
/// Per-page problems (bad JSON, invalid URLs, redirects) never surface here;
/// they are tallied in the [`crate::sanity::SanityLedger`] instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Data root not found: {}", .0.display())]
    MissingDataRoot(PathBuf),

    #[error("No admin.*.json file in {}", .0.display())]
    MissingAdminFile(PathBuf),

    #[error("Admin file is not a JSON object: {}", .0.display())]
    MalformedAdminFile(PathBuf),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Cannot compute percentages for table '{table}' ({bucket}): denominator is zero")]
    ZeroDenominator { table: String, bucket: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Report output is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}
