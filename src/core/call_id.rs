//! Normalized telephony call identifiers.
//!
//! Telnyx prefixes call control ids with a version tag (`v3:...`) in some
//! payloads and not in others. Every id is normalized once at the edge so the
//! registry key and the Call Control API parameter are always the same string.

use std::fmt;
use thiserror::Error;

/// Errors raised while normalizing a call id.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallIdError {
    #[error("Call id is empty")]
    Empty,

    #[error("Call id contains invalid characters: {0}")]
    InvalidCharacters(String),
}

/// Opaque call identifier with vendor version prefixes removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(String);

impl CallId {
    /// Normalize a raw id taken from a webhook or media stream.
    ///
    /// Strips surrounding whitespace and any leading `v<digits>:` tags.
    /// Fails on ids that are empty after stripping or that contain
    /// characters unusable in a URL path segment.
    pub fn normalize(raw: &str) -> Result<Self, CallIdError> {
        let mut id = raw.trim();
        while let Some(rest) = strip_version_prefix(id) {
            id = rest;
        }

        if id.is_empty() {
            return Err(CallIdError::Empty);
        }
        if id
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#'))
        {
            return Err(CallIdError::InvalidCharacters(id.to_string()));
        }

        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn strip_version_prefix(id: &str) -> Option<&str> {
    let (tag, rest) = id.split_once(':')?;
    let digits = tag.strip_prefix('v').or_else(|| tag.strip_prefix('V'))?;
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(rest)
    } else {
        None
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CallId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for CallId {
    type Err = CallIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}
