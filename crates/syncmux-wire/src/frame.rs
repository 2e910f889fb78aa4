use crate::delta::Delta;
use serde::{Deserialize, Serialize};

/// Frames sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Sub {
        endpoint: String,
    },
    Unsub {
        endpoint: String,
    },
    #[serde(rename = "rpc:req")]
    RpcReq {
        id: String,
        endpoint: String,
        input: serde_json::Value,
    },
}

/// A serialized RPC error, carried in `rpc:res` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireError {
    pub name: String,
    pub message: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Frames sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Heartbeat {
        #[serde(rename = "frequencyMs")]
        frequency_ms: u64,
    },
    #[serde(rename = "rpc:res")]
    RpcRes {
        id: String,
        endpoint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        err: Option<WireError>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        res: Option<serde_json::Value>,
    },
    EndpointMessage {
        endpoint: String,
        message: serde_json::Value,
    },
    Init {
        endpoint: String,
        data: serde_json::Value,
        v: u64,
    },
    Update {
        endpoint: String,
        delta: Delta,
        v: u64,
        now: String,
    },
}

impl ServerFrame {
    /// The endpoint name this frame concerns, when it has one. Heartbeats
    /// return `None`; this helper covers the common "route by endpoint"
    /// dispatch path.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ServerFrame::Heartbeat { .. } => None,
            ServerFrame::RpcRes { endpoint, .. } => Some(endpoint),
            ServerFrame::EndpointMessage { endpoint, .. } => Some(endpoint),
            ServerFrame::Init { endpoint, .. } => Some(endpoint),
            ServerFrame::Update { endpoint, .. } => Some(endpoint),
        }
    }
}
