//! The server half: a [`Hub`] multiplexes one text-frame connection per
//! client across however many RPC, PubSub, PushPull, and SharedObject
//! endpoints a descriptor declares; [`SharedObjectServer`] is the
//! authoritative side of one SharedObject endpoint.

pub mod hub;
pub mod shared_object;

pub use hub::{Hub, HubConfig, InitHandler, RpcHandler};
pub use shared_object::SharedObjectServer;
