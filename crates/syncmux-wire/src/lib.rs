//! Wire-level types shared by `syncmux-server` and `syncmux-client`:
//! endpoint descriptors and their hash, the client/server frame unions, and
//! the path/delta types a `SharedObject` update carries.
//!
//! Nothing in this crate touches a socket or a JSON-Schema compiler — both
//! are external collaborators reached through traits and library
//! crates one layer up.

pub mod delta;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod path;

pub use delta::{wrap_delta_at_path, Delta, DeltaEntry};
pub use descriptor::{Descriptor, DuplicateEndpointName, EndpointDescriptor, EndpointKind};
pub use error::SyncMuxError;
pub use frame::{ClientFrame, ServerFrame, WireError};
pub use path::{is_proper_prefix, path, Path, PathSegment};

/// Reserved endpoint name clients use to fetch the server's descriptor hash.
pub const DESCRIPTOR_ENDPOINT: &str = "_descriptor";

/// Reserved endpoint name the client multiplexer uses as an RPC barrier to
/// confirm the server has processed prior `sub` frames.
pub const FLUSH_ENDPOINT: &str = "_flush";
