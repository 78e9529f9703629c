//! Fingerprint matching: does a candidate URL carry (part of) a protected URL?
//!
//! For the page's intended URL and its post-redirect alternate, a set of
//! base strings is derived (full URL, path, scheme-stripped form, scheme- and
//! fragment-stripped form). Every base string is searched for in five
//! encodings: verbatim, percent-encoded, MD5 hex, SHA-1 hex and URL-safe
//! base64. The primitive is a plain substring test on the candidate string,
//! so accidental collisions across URL fields count as matches.

use crate::error::Result;
use crate::normalize;
use base64::{Engine as _, engine::general_purpose};
use md5::Md5;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use tracing::debug;

/// Everything except the RFC 3986 unreserved characters gets escaped.
const ESCAPE_ALL: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Which base string of the protected URLs matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Source,
    Redirected,
    SourcePath,
    RedirectedPath,
    SourceSchemeless,
    RedirectedSchemeless,
    SourceFragmentless,
    RedirectedFragmentless,
}

impl Part {
    /// Search order. Earlier parts win when several would match.
    pub const ALL: [Part; 8] = [
        Part::Source,
        Part::Redirected,
        Part::SourcePath,
        Part::RedirectedPath,
        Part::SourceSchemeless,
        Part::RedirectedSchemeless,
        Part::SourceFragmentless,
        Part::RedirectedFragmentless,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Part::Source => "source",
            Part::Redirected => "redirected",
            Part::SourcePath => "source_path",
            Part::RedirectedPath => "redirected_path",
            Part::SourceSchemeless => "source_schemeless",
            Part::RedirectedSchemeless => "redirected_schemeless",
            Part::SourceFragmentless => "source_fragmentless",
            Part::RedirectedFragmentless => "redirected_fragmentless",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    None,
    Percent,
    Md5,
    Sha1,
    Base64,
}

impl Encoding {
    pub const ALL: [Encoding; 5] = [
        Encoding::None,
        Encoding::Percent,
        Encoding::Md5,
        Encoding::Sha1,
        Encoding::Base64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::None => "none",
            Encoding::Percent => "percent",
            Encoding::Md5 => "md5",
            Encoding::Sha1 => "sha1",
            Encoding::Base64 => "base64",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Encoding::None),
            "percent" => Some(Encoding::Percent),
            "md5" => Some(Encoding::Md5),
            "sha1" => Some(Encoding::Sha1),
            "base64" => Some(Encoding::Base64),
            _ => None,
        }
    }

    pub fn encode(&self, value: &str) -> String {
        match self {
            Encoding::None => value.to_string(),
            Encoding::Percent => utf8_percent_encode(value, ESCAPE_ALL).to_string(),
            Encoding::Md5 => hex::encode(Md5::digest(value.as_bytes())),
            Encoding::Sha1 => hex::encode(Sha1::digest(value.as_bytes())),
            Encoding::Base64 => general_purpose::URL_SAFE.encode(value.as_bytes()),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintMatch {
    pub part: Part,
    pub encoding: Encoding,
    /// The exact string found in the candidate.
    pub needle: String,
}

/// Base strings derived from a protected URL and its alternate.
///
/// Built per check and dropped afterwards; encodings are computed lazily while
/// searching so a verbatim hit never pays for hashing.
#[derive(Debug, Clone)]
pub struct FingerprintSet {
    bases: Vec<(Part, String)>,
}

impl FingerprintSet {
    pub fn build(source: &str, redirected: &str) -> Result<Self> {
        let source_forms = BaseForms::of(source)?;
        let redirected_forms = BaseForms::of(redirected)?;

        let candidates = [
            (Part::Source, Some(source.to_string())),
            (Part::Redirected, Some(redirected.to_string())),
            (Part::SourcePath, source_forms.path),
            (Part::RedirectedPath, redirected_forms.path),
            (Part::SourceSchemeless, Some(source_forms.schemeless)),
            (Part::RedirectedSchemeless, Some(redirected_forms.schemeless)),
            (Part::SourceFragmentless, Some(source_forms.fragmentless)),
            (Part::RedirectedFragmentless, Some(redirected_forms.fragmentless)),
        ];

        let bases = candidates
            .into_iter()
            .filter_map(|(part, base)| base.filter(|b| !b.is_empty()).map(|b| (part, b)))
            .collect();

        Ok(Self { bases })
    }

    pub fn bases(&self) -> &[(Part, String)] {
        &self.bases
    }

    pub fn len(&self) -> usize {
        self.bases.len() * Encoding::ALL.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Every needle in search order: base-string-major, encoding-minor.
    pub fn needles(&self) -> impl Iterator<Item = (Part, Encoding, String)> + '_ {
        self.bases.iter().flat_map(|(part, base)| {
            Encoding::ALL
                .iter()
                .map(move |encoding| (*part, *encoding, encoding.encode(base)))
        })
    }

    /// First needle that occurs as a literal substring of `candidate`.
    pub fn find_in(&self, candidate: &str) -> Option<FingerprintMatch> {
        self.needles()
            .find(|(_, _, needle)| candidate.contains(needle.as_str()))
            .map(|(part, encoding, needle)| FingerprintMatch {
                part,
                encoding,
                needle,
            })
    }
}

struct BaseForms {
    /// `None` when the path is empty or `/`.
    path: Option<String>,
    schemeless: String,
    fragmentless: String,
}

impl BaseForms {
    fn of(url: &str) -> Result<Self> {
        let path = normalize::path(url)?;
        Ok(Self {
            path: (!path.is_empty() && path != "/").then_some(path),
            schemeless: normalize::strip_scheme(url)?,
            fragmentless: normalize::strip_scheme_and_fragment(url)?,
        })
    }
}

/// Seam for the matching primitive, so a stricter structural matcher can
/// replace substring search without touching the leakage detector.
pub trait UrlMatcher {
    fn find(&self, source: &str, redirected: &str, candidate: &str) -> Option<FingerprintMatch>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringMatcher;

impl UrlMatcher for SubstringMatcher {
    fn find(&self, source: &str, redirected: &str, candidate: &str) -> Option<FingerprintMatch> {
        match FingerprintSet::build(source, redirected) {
            Ok(set) => set.find_in(candidate),
            Err(e) => {
                debug!("Skipping fingerprint check against {}: {}", candidate, e);
                None
            }
        }
    }
}

pub fn match_fingerprint(source: &str, redirected: &str, candidate: &str) -> Option<FingerprintMatch> {
    SubstringMatcher.find(source, redirected, candidate)
}
