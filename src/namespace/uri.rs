//! Namespace URIs
//!
//! A URI is an ordered list of path segments joined by `.`. The empty
//! string denotes the namespace root.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Segment delimiter.
pub const DELIMITER: char = '.';

/// Returns true if `segment` can be used as a single URI segment.
///
/// Segments are non-empty and limited to ASCII alphanumerics, `_` and `-`.
pub fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Address of a node in a [`Namespace`](super::Namespace).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uri {
    segments: Vec<String>,
}

impl Uri {
    /// The namespace root (no segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a dot-delimited URI.
    ///
    /// # Example
    ///
    /// ```
    /// use opflow::namespace::Uri;
    ///
    /// let uri = Uri::parse("scale.outputs.y").unwrap();
    /// assert_eq!(uri.len(), 3);
    /// assert_eq!(uri.first(), Some("scale"));
    /// assert!(Uri::parse("scale..y").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Self::root());
        }
        Self::from_segments(text.split(DELIMITER))
    }

    /// Builds a URI from individual segments, validating each one.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if let Some(bad) = segments.iter().find(|s| !is_valid_segment(s)) {
            return Err(EngineError::invalid_uri(
                segments.join("."),
                format!("invalid segment '{}'", bad),
            ));
        }
        Ok(Self { segments })
    }

    /// Segments already known to be valid (taken from live namespace entries).
    pub(crate) fn from_trusted(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Segment at `index`, if present.
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// Parent URI. The root has no parent.
    pub fn parent(&self) -> Option<Uri> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Appends one validated segment.
    pub fn child(&self, segment: &str) -> Result<Uri> {
        if !is_valid_segment(segment) {
            return Err(EngineError::invalid_uri(
                format!("{}{}{}", self, DELIMITER, segment),
                format!("invalid segment '{}'", segment),
            ));
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// True if `prefix` is this URI or one of its ancestors.
    pub fn starts_with(&self, prefix: &Uri) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl FromStr for Uri {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Uri {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Uri> for String {
    fn from(uri: Uri) -> Self {
        uri.to_string()
    }
}
