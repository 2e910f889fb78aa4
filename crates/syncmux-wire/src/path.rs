use serde::{Deserialize, Serialize};
use std::fmt;

/// One segment of a path into a JSON value: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        PathSegment::Key(s.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        PathSegment::Key(s)
    }
}

impl From<usize> for PathSegment {
    fn from(i: usize) -> Self {
        PathSegment::Index(i)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{k}"),
            PathSegment::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A path from a state root down to some nested value.
///
/// The empty path refers to the root itself; it is a legal path that
/// subsumes every other path.
pub type Path = Vec<PathSegment>;

/// Build a `Path` from a slice of segment-convertible items, e.g.
/// `path(["value"])` or `path(["items", 0, "name"])`.
pub fn path<const N: usize>(segments: [PathSegment; N]) -> Path {
    segments.into_iter().collect()
}

/// Returns true if `prefix` is a proper prefix of `candidate` (shorter, and
/// every element matches).
pub fn is_proper_prefix(prefix: &[PathSegment], candidate: &[PathSegment]) -> bool {
    prefix.len() < candidate.len() && prefix.iter().zip(candidate.iter()).all(|(a, b)| a == b)
}
