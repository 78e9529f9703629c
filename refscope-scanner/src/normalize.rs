//! String-level URL transforms shared by the matcher, the third-party
//! classifier and the per-page aggregator.
//!
//! All transforms go through [`url::Url`], so inputs come back in their
//! WHATWG-serialized form. Crawl records are produced by a browser and are
//! already serialized that way, which keeps the transforms faithful to the
//! captured strings.

use crate::error::{Result, ScanError};
use url::{Position, Url};

/// Parse an absolute URL, mapping the parser error into [`ScanError::InvalidUrl`].
pub fn parse(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| ScanError::InvalidUrl(format!("{}: {}", url, e)))
}

/// Remove the fragment component and reassemble.
pub fn strip_fragment(url: &str) -> Result<String> {
    let mut parsed = parse(url)?;
    parsed.set_fragment(None);
    Ok(parsed.into())
}

/// Remove the scheme component, leaving the `//netloc/path?query#fragment` form.
pub fn strip_scheme(url: &str) -> Result<String> {
    let parsed = parse(url)?;
    Ok(schemeless(&parsed, Position::AfterFragment))
}

/// `strip_scheme` composed with `strip_fragment`.
pub fn strip_scheme_and_fragment(url: &str) -> Result<String> {
    let parsed = parse(url)?;
    Ok(schemeless(&parsed, Position::AfterQuery))
}

/// Scheme-less, query-less and fragment-less form: `//netloc/path`.
pub fn strip_scheme_query_and_fragment(url: &str) -> Result<String> {
    let parsed = parse(url)?;
    Ok(schemeless(&parsed, Position::AfterPath))
}

/// The endpoint a request targets: host and path, without the leading `//`.
pub fn endpoint(url: &str) -> Result<String> {
    let trimmed = strip_scheme_query_and_fragment(url)?;
    Ok(trimmed
        .strip_prefix("//")
        .map(str::to_string)
        .unwrap_or(trimmed))
}

/// The path component of an absolute URL.
pub fn path(url: &str) -> Result<String> {
    Ok(parse(url)?.path().to_string())
}

/// True when the URL parses and its path is something other than `""` or `/`.
pub fn has_significant_path(url: &str) -> bool {
    path(url).map(|p| !p.is_empty() && p != "/").unwrap_or(false)
}

pub fn strip_trailing_slash(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Browsers report blob URLs with the creating origin embedded: `blob:https://host/uuid`.
pub fn strip_blob(url: &str) -> &str {
    url.strip_prefix("blob:").unwrap_or(url)
}

fn schemeless(parsed: &Url, end: Position) -> String {
    let start = parsed.scheme().len() + 1;
    parsed[..end][start..].to_string()
}
