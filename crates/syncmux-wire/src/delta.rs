use crate::path::Path;
use serde::{Deserialize, Serialize};

/// One edit in a delta.
///
/// `Replace` and `Delete` are absolute-or-relative depending on the
/// containing delta: a root-level delta's paths are absolute from state
/// root; a delta returned by [`wrap_delta_at_path`](crate::wrap_delta_at_path)
/// nests entries under a `Nested` wrapper instead of rewriting them, so
/// paths inside a `Nested` wrapper are relative to that wrapper's path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeltaEntry {
    /// Replace (or create) the value at `path`.
    Replace { path: Path, value: serde_json::Value },
    /// Delete the key/index at `path`. Distinguished on the wire from a
    /// present-but-null value.
    Delete { path: Path },
    /// A subtree delta lifted to `path`: `entries` are relative to it.
    Nested { path: Path, entries: Delta },
}

/// An ordered list of edit entries applied in order.
pub type Delta = Vec<DeltaEntry>;

/// Prefix every entry of `inner` with `path`, without rewriting their
/// individual paths — implemented as a single `Nested` wrapper.
pub fn wrap_delta_at_path(path: Path, inner: Delta) -> Delta {
    if inner.is_empty() {
        return Vec::new();
    }
    if path.is_empty() {
        return inner;
    }
    vec![DeltaEntry::Nested {
        path,
        entries: inner,
    }]
}
