//! Shared data model for schemata.
//!
//! This crate mirrors what the remote repository owns: packages, the
//! lightweight workspace items listed inside them, and the schema payloads
//! loaded on demand. It has **no internal schemata dependencies**: a pure
//! leaf crate that the client and kernel build on.
//!
//! ```text
//! Package (PackageUid)
//!     └── contains WorkspaceItem (SchemaUid, SchemaType, flags)
//!             └── loads lazily into Schema (body, less, parent → SchemaUid)
//! ```
//!
//! Everything that crosses the remote boundary is decoded into these
//! statically known shapes exactly once; the rest of the workspace never
//! inspects raw JSON.

pub mod ids;
pub mod item;
pub mod response;
pub mod schema;

pub use ids::{PackageUid, SchemaUid};
pub use item::{PackageInfo, SchemaType, WorkspaceItem};
pub use response::{BuildMessage, BuildResponse, ErrorInfo, RemoteResponse, SaveResponse};
pub use schema::{LocalizedValue, ParentRef, Schema};
