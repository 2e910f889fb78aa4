use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The four endpoint patterns a descriptor can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EndpointKind {
    Rpc,
    PubSub,
    PushPull,
    SharedObject,
}

/// One endpoint's descriptor, as carried in the shared descriptor array
/// exchanged between client and server. `schemas` is left as opaque JSON —
/// compiling it is the job of the schema-compiler collaborator, not this
/// crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub name: String,
    pub kind: EndpointKind,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub schemas: serde_json::Map<String, serde_json::Value>,
    /// SharedObject-only: the schema of the replicated value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_schema: Option<serde_json::Value>,
    /// SharedObject-only; defaults to `true`.
    #[serde(default = "default_auto_notify", skip_serializing_if = "Option::is_none")]
    pub auto_notify: Option<bool>,
}

fn default_auto_notify() -> Option<bool> {
    Some(true)
}

impl EndpointDescriptor {
    pub fn auto_notify(&self) -> bool {
        self.auto_notify.unwrap_or(true)
    }
}

/// The full set of endpoints a server and its clients agree on.
///
/// Endpoint names must be unique; this is checked by [`Descriptor::new`]
/// rather than assumed, since a duplicate name would silently shadow an
/// endpoint's subscriber set in the multiplexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    endpoints: Vec<EndpointDescriptor>,
}

#[derive(Debug, thiserror::Error)]
#[error("duplicate endpoint name: {0}")]
pub struct DuplicateEndpointName(pub String);

impl Descriptor {
    pub fn new(endpoints: Vec<EndpointDescriptor>) -> Result<Self, DuplicateEndpointName> {
        let mut seen = std::collections::HashSet::new();
        for ep in &endpoints {
            if !seen.insert(ep.name.clone()) {
                return Err(DuplicateEndpointName(ep.name.clone()));
            }
        }
        Ok(Self { endpoints })
    }

    pub fn endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub fn find(&self, name: &str) -> Option<&EndpointDescriptor> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    /// SHA-256 over a canonical JSON serialization of the endpoints array,
    /// excluding any transport configuration (there is none on this type —
    /// transport config lives outside the descriptor entirely).
    pub fn hash(&self) -> String {
        // serde_json's map serialization is insertion-order for our
        // Vec<EndpointDescriptor>, and each EndpointDescriptor's fields are
        // serialized in declaration order, so this is already canonical
        // without a separate key-sorting pass.
        let canonical =
            serde_json::to_vec(&self.endpoints).expect("descriptor serializes to JSON");
        let digest = Sha256::digest(&canonical);
        hex_encode(&digest)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to a String cannot fail");
    }
    out
}
