//! Virtual filesystem contract.
//!
//! - [`VfsOps`] - the operations an editor's filesystem provider calls
//! - [`VfsPath`] - the `bpmsoft://<root>/<package>/<file>` path scheme
//! - [`VfsError`] - the error taxonomy, convertible to `std::io::Error`
//!
//! The only implementation is [`Engine`](crate::Engine).

mod error;
mod ops;
mod path;
mod types;

pub use error::{VfsError, VfsResult};
pub use ops::VfsOps;
pub use path::{LESS_SUFFIX, SCHEME, VfsPath};
pub use types::{DirEntry, FileAttr, FileType, WriteOptions};
