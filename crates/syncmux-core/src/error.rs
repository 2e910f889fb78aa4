use syncmux_wire::path::Path;

/// Errors raised by the core replication machinery (path navigation, delta
/// application, schema resolution). Distinct from [`syncmux_wire::SyncMuxError`],
/// which covers the wire-level/RPC vocabulary — these are lower-level and
/// get folded into a `ValidationFailed`/divergence condition by the caller.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("path {path:?} does not exist")]
    PathNotFound { path: Path },

    #[error("path {path:?} expected a {expected}, found {found}")]
    TypeMismatch {
        path: Path,
        expected: &'static str,
        found: &'static str,
    },

    #[error("index {index} out of bounds for array of length {len} at {path:?}")]
    IndexOutOfBounds {
        path: Path,
        index: usize,
        len: usize,
    },

    #[error("root value must be a plain object or array, found {found}")]
    InvalidRootKind { found: &'static str },

    #[error("root container kind changed from {from} to {to}; treat as divergence")]
    RootKindChanged {
        from: &'static str,
        to: &'static str,
    },

    #[error("mutation attempted through a read-only view at {path:?}")]
    ReadOnly { path: Path },

    #[error("schema validation failed at {path:?}: {message}")]
    SchemaInvalid { path: Path, message: String },

    #[error("cannot apply delta: {0}")]
    DeltaApplyFailed(String),
}

pub(crate) fn kind_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
