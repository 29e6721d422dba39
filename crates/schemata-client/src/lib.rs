//! Remote repository access for schemata.
//!
//! The network transport itself lives outside this workspace. What this
//! crate provides is the seam it plugs into, plus the plumbing every
//! engine needs on top of it:
//!
//! - [`RemoteRepository`] - the capability interface a transport implements
//! - [`spawn_queue`] - wraps any repository in a serializing actor with
//!   transparent re-login on session expiry
//! - [`MemoryRepository`] - in-memory repository with call counters and
//!   failure injection, used by tests and the offline CLI
//!
//! ```text
//!   Engine ──▶ QueuedRepository ──mpsc──▶ QueueActor ──▶ Arc<dyn RemoteRepository>
//!              (Clone, Send+Sync)         one call at a time, re-login once
//! ```

pub mod constants;
pub mod memory;
pub mod queue;
pub mod repository;

pub use memory::{MemoryRepository, Operation};
pub use queue::{QueueOptions, QueuedRepository, spawn_queue};
pub use repository::{Credentials, RemoteError, RemoteRepository, RemoteResult};
