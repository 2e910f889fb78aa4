//! The client half: a [`ClientMux`] owns one reconnecting connection across
//! however many endpoints are subscribed; [`SharedObjectClient`] is the
//! replica side of one SharedObject endpoint.

pub mod mux;
pub mod shared_object;

pub use mux::{ClientConfig, ClientEvent, ClientMux, DuplexFactory, EndpointHandler};
pub use shared_object::{SharedObjectClient, SharedObjectEvent};
