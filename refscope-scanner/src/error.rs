use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScanError>;
