//! `RawDuplex` implementations over real WebSockets: [`server::AxumDuplex`]
//! for an accepted axum upgrade, [`client::TungsteniteDuplex`] for an
//! outbound connection. Everything else (framing, multiplexing, fanout)
//! lives in `syncmux-server`/`syncmux-client` and doesn't know a socket is
//! involved.

pub mod client;
pub mod server;

pub use client::TungsteniteDuplex;
pub use server::AxumDuplex;
