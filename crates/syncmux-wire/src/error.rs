use crate::frame::WireError;

/// The frozen error vocabulary shared by the server and client crates, so
/// RPC error payloads and local error handling speak the same codes.
#[derive(Debug, thiserror::Error)]
pub enum SyncMuxError {
    #[error("validation failed{}: {message}", endpoint_suffix(endpoint))]
    ValidationFailed {
        endpoint: Option<String>,
        message: String,
    },

    #[error("timed out waiting for {what}")]
    Timeout { what: String },

    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("version mismatch on {endpoint}: expected {expected}, got {actual}")]
    VersionMismatch {
        endpoint: String,
        expected: u64,
        actual: u64,
    },

    #[error("descriptor hash mismatch: local {local}, server {server}")]
    DescriptorMismatch { local: String, server: String },

    #[error("no handler registered for endpoint {0}")]
    MissingHandler(String),

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
}

fn endpoint_suffix(endpoint: &Option<String>) -> String {
    match endpoint {
        Some(e) => format!(" on {e}"),
        None => String::new(),
    }
}

impl SyncMuxError {
    /// The frozen error code carried on the wire and used for classification.
    pub fn code(&self) -> &'static str {
        match self {
            SyncMuxError::ValidationFailed { .. } => "validation-failed",
            SyncMuxError::Timeout { .. } => "timeout",
            SyncMuxError::ConnectionFailed { .. } => "connection-failed",
            SyncMuxError::VersionMismatch { .. } => "version-mismatch",
            SyncMuxError::DescriptorMismatch { .. } => "descriptor-mismatch",
            SyncMuxError::MissingHandler(_) => "missing-handler",
            SyncMuxError::UnknownEndpoint(_) => "unknown-endpoint",
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            SyncMuxError::ValidationFailed { endpoint, .. } => endpoint.as_deref(),
            SyncMuxError::VersionMismatch { endpoint, .. } => Some(endpoint),
            SyncMuxError::MissingHandler(e) | SyncMuxError::UnknownEndpoint(e) => Some(e),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            SyncMuxError::ValidationFailed { .. } => "ValidationFailed",
            SyncMuxError::Timeout { .. } => "Timeout",
            SyncMuxError::ConnectionFailed { .. } => "ConnectionFailed",
            SyncMuxError::VersionMismatch { .. } => "VersionMismatch",
            SyncMuxError::DescriptorMismatch { .. } => "DescriptorMismatch",
            SyncMuxError::MissingHandler(_) => "MissingHandler",
            SyncMuxError::UnknownEndpoint(_) => "UnknownEndpoint",
        }
    }

    /// Serialize into the RPC wire's error envelope.
    pub fn to_wire(&self) -> WireError {
        WireError {
            name: self.name().to_owned(),
            message: self.to_string(),
            code: self.code().to_owned(),
            stack: None,
        }
    }

    /// Reconstruct an error from its wire envelope, for a client that
    /// receives `rpc:res.err`. Best-effort: the original's structured
    /// fields don't survive serialization, so non-code-carrying variants
    /// fold into [`SyncMuxError::ValidationFailed`] with the wire message.
    pub fn from_wire(wire: &WireError) -> Self {
        match wire.code.as_str() {
            "timeout" => SyncMuxError::Timeout {
                what: wire.message.clone(),
            },
            "connection-failed" => SyncMuxError::ConnectionFailed {
                message: wire.message.clone(),
            },
            "missing-handler" => SyncMuxError::MissingHandler(wire.message.clone()),
            "unknown-endpoint" => SyncMuxError::UnknownEndpoint(wire.message.clone()),
            _ => SyncMuxError::ValidationFailed {
                endpoint: None,
                message: wire.message.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_frozen_v1_vocabulary() {
        let err = SyncMuxError::UnknownEndpoint("ghost".to_owned());
        assert_eq!(err.code(), "unknown-endpoint");
        assert_eq!(err.endpoint(), Some("ghost"));
    }

    #[test]
    fn to_wire_carries_code_and_message() {
        let err = SyncMuxError::Timeout {
            what: "init".to_owned(),
        };
        let wire = err.to_wire();
        assert_eq!(wire.code, "timeout");
        assert!(wire.message.contains("init"));
        assert_eq!(wire.name, "Timeout");
    }

    #[test]
    fn from_wire_recovers_a_matching_code() {
        let original = SyncMuxError::UnknownEndpoint("ghost".to_owned());
        let reconstructed = SyncMuxError::from_wire(&original.to_wire());
        assert_eq!(reconstructed.code(), original.code());
    }
}
