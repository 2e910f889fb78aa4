//! The SharedObject replication core: path tracking, mutation interception,
//! schema resolution, and delta computation. Transport, framing, and
//! subscriber fanout live in `syncmux-server`/`syncmux-client`, which build
//! on top of this crate.

pub mod date_format;
pub mod delta_engine;
pub mod error;
pub mod intercept;
pub mod nav;
pub mod path_tree;
pub mod readonly;
pub mod schema;

pub use delta_engine::{compute_delta, compute_delta_for_path, apply_delta};
pub use error::CoreError;
pub use intercept::Intercepted;
pub use path_tree::PathTree;
pub use readonly::ReadOnlyView;
pub use schema::{ResolvedSchema, SchemaKind, SchemaResolver};
