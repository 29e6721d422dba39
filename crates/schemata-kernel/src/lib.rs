//! # schemata-kernel
//!
//! Remote-backed virtual filesystem engine for schemata.
//!
//! An [`Engine`] presents one remote package repository as a file tree:
//! - `/<root>` lists the packages the remote reports
//! - `/<root>/<package>` lists that package's schemas as files, named by
//!   type-derived extension
//! - reads are served from a write-through [`DiskCache`], fetching from the
//!   remote on a miss; saves, locks and restores go back to the remote
//! - a dropped session is restored through a reconnect prompt, at most one
//!   per host at a time
//!
//! The remote seam is [`schemata_client::RemoteRepository`]; user prompts go
//! through [`Interaction`].

pub mod cache;
pub mod config;
pub mod engine;
pub mod interact;
pub mod model;
pub mod notify;
pub mod tree;
pub mod vfs;

pub use cache::DiskCache;
pub use config::{ConfigError, ConnectionInfo, FileTypeConfig, RetryPolicy, SchemataConfig};
pub use engine::{
    BuildReport, CacheProgress, CacheSummary, Engine, EngineBuilder, FileChain, ReloadError,
    ReloadSummary,
};
pub use interact::{Interaction, ReconnectChoice, ScriptedInteraction};
pub use model::{EntryIndex, File};
pub use notify::{ChangeKind, ChangeQueue, FileChange, FlushScheduler, ManualScheduler, TokioScheduler};
pub use tree::{FileNode, InnerFolder, PackageNode, build_tree};
pub use vfs::{DirEntry, FileAttr, FileType, VfsError, VfsOps, VfsPath, VfsResult, WriteOptions};
