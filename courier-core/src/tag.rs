//! Request tags.
//!
//! A [`Tag`] correlates an in-flight or cached request with the logical
//! resource it addresses. Tags are derived deterministically from request
//! parameters, usually as a fixed prefix plus an identifier.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Opaque string identity of a logical resource.
///
/// ```
/// use courier_core::Tag;
///
/// let tag = Tag::with_prefix("stub_item_id:", "42");
/// assert_eq!(tag.as_str(), "stub_item_id:42");
/// assert_eq!(tag.strip_prefix("stub_item_id:"), Some("42"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag(SmolStr);

impl Tag {
    /// Creates a tag.
    #[inline]
    pub fn new(s: impl Into<SmolStr>) -> Self {
        Self(s.into())
    }

    /// Creates a tag from a static string (no allocation).
    #[inline]
    pub const fn new_static(s: &'static str) -> Self {
        Self(SmolStr::new_static(s))
    }

    /// Joins a fixed prefix and an identifier.
    pub fn with_prefix(prefix: &str, id: &str) -> Self {
        let mut tag = String::with_capacity(prefix.len() + id.len());
        tag.push_str(prefix);
        tag.push_str(id);
        Self(SmolStr::from(tag))
    }

    /// Identifier part of a prefixed tag.
    pub fn strip_prefix(&self, prefix: &str) -> Option<&str> {
        self.0.strip_prefix(prefix)
    }

    /// Returns the tag as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Tag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self(SmolStr::new(s))
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self(SmolStr::from(s))
    }
}

impl From<SmolStr> for Tag {
    fn from(s: SmolStr) -> Self {
        Self(s)
    }
}
