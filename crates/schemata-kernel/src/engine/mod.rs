//! The virtual filesystem engine.
//!
//! One [`Engine`] per remote session. It owns the session's file and package
//! indices and orchestrates everything between them, the disk cache and the
//! remote repository:
//!
//! ```text
//!                      ┌──────────────────────────── Engine ───────────────────────────┐
//!   VfsOps ──────────▶ │ Mutex<EngineState>  files / folders / prompts / verifying     │
//!   get_file, save,    │ reload slot: Shared<BoxFuture>  (one reload in flight)       │
//!   lock, restore ...  │ TaskTracker: background staleness checks                     │
//!                      └───────┬───────────────────┬──────────────────────┬───────────┘
//!                              │                   │                      │
//!                        DiskCache          Arc<dyn RemoteRepository>   ChangeQueue ──▶ broadcast
//! ```
//!
//! The state lock is a `parking_lot::Mutex` and is never held across an
//! `.await`: every operation reads what it needs, releases, suspends on I/O,
//! then re-acquires to commit.

mod files;
mod ops;
mod reload;

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::task::TaskTracker;

use schemata_client::RemoteRepository;
use schemata_types::{PackageInfo, SchemaType, SchemaUid};

use crate::cache::DiskCache;
use crate::config::SchemataConfig;
use crate::interact::{Interaction, ScriptedInteraction};
use crate::model::{EntryIndex, File};
use crate::notify::{ChangeQueue, FileChange, FlushScheduler, TokioScheduler};
use crate::vfs::{VfsError, VfsPath, VfsResult};

pub use files::{BuildReport, CacheProgress, CacheSummary, FileChain};
pub use reload::{ReloadError, ReloadSummary};

type SharedReload = Shared<BoxFuture<'static, Result<ReloadSummary, ReloadError>>>;

#[derive(Default)]
struct EngineState {
    index: EntryIndex,
    /// Hosts with a reconnect prompt on screen.
    reconnect_prompts: HashSet<String>,
    /// Paths with a staleness check in flight.
    verifying: HashSet<VfsPath>,
    reload: Option<SharedReload>,
}

/// Remote-backed virtual filesystem for one session root.
pub struct Engine {
    root: String,
    config: Arc<SchemataConfig>,
    remote: Arc<dyn RemoteRepository>,
    interaction: Arc<dyn Interaction>,
    cache: DiskCache,
    changes: Arc<ChangeQueue>,
    tree: watch::Sender<u64>,
    state: Mutex<EngineState>,
    tasks: TaskTracker,
    this: Weak<Engine>,
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    root: String,
    remote: Arc<dyn RemoteRepository>,
    config: Arc<SchemataConfig>,
    interaction: Arc<dyn Interaction>,
    scheduler: Arc<dyn FlushScheduler>,
}

impl EngineBuilder {
    pub fn config(mut self, config: impl Into<Arc<SchemataConfig>>) -> Self {
        self.config = config.into();
        self
    }

    pub fn interaction(mut self, interaction: Arc<dyn Interaction>) -> Self {
        self.interaction = interaction;
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn FlushScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn build(self) -> Arc<Engine> {
        let changes = ChangeQueue::new(self.config.debounce(), self.scheduler);
        let cache = DiskCache::new(self.config.clone(), self.root.clone());
        let (tree, _) = watch::channel(0);
        Arc::new_cyclic(|this| Engine {
            root: self.root,
            config: self.config,
            remote: self.remote,
            interaction: self.interaction,
            cache,
            changes,
            tree,
            state: Mutex::new(EngineState::default()),
            tasks: TaskTracker::new(),
            this: this.clone(),
        })
    }
}

impl Engine {
    /// Start building an engine for `root` (the remote host name).
    ///
    /// Defaults: default configuration, an interaction that declines every
    /// prompt, and a tokio timer for change batching.
    pub fn builder(root: impl Into<String>, remote: Arc<dyn RemoteRepository>) -> EngineBuilder {
        EngineBuilder {
            root: root.into(),
            remote,
            config: Arc::new(SchemataConfig::default()),
            interaction: Arc::new(ScriptedInteraction::new()),
            scheduler: Arc::new(TokioScheduler),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn config(&self) -> &SchemataConfig {
        &self.config
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    /// Snapshot of all files, in remote order.
    pub fn files(&self) -> Vec<File> {
        self.state.lock().index.files.values().cloned().collect()
    }

    /// Snapshot of all packages, in remote order.
    pub fn packages(&self) -> Vec<PackageInfo> {
        self.state.lock().index.folders.values().cloned().collect()
    }

    pub fn file(&self, uid: SchemaUid) -> Option<File> {
        self.state.lock().index.files.get(&uid).cloned()
    }

    /// Virtual path of a file.
    pub fn path_of(&self, file: &File) -> VfsPath {
        self.cache.get_path(&file.item)
    }

    pub fn package_path(&self, package: &PackageInfo) -> VfsPath {
        VfsPath::package(&self.root, &package.name)
    }

    /// Paths of every client module named `name`, across packages.
    pub fn paths_by_name(&self, name: &str) -> Vec<VfsPath> {
        self.state
            .lock()
            .index
            .files
            .values()
            .filter(|f| f.item.name == name && f.schema_type() == SchemaType::ClientUnit)
            .map(|f| self.cache.get_path(&f.item))
            .collect()
    }

    /// Batched change notifications.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<Vec<FileChange>> {
        self.changes.subscribe()
    }

    /// Tree generation, bumped whenever the package/file set is replaced.
    pub fn subscribe_tree(&self) -> watch::Receiver<u64> {
        self.tree.subscribe()
    }

    /// Publish pending change notifications now.
    pub fn flush_changes(&self) -> usize {
        self.changes.flush()
    }

    /// Wait for every background staleness check to finish.
    pub async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    // ── Internals ────────────────────────────────────────────────────────

    fn arc(&self) -> Option<Arc<Engine>> {
        self.this.upgrade()
    }

    fn bump_tree(&self) {
        self.tree.send_modify(|generation| *generation += 1);
    }

    fn notify_changed(&self, path: VfsPath) {
        self.changes.push(FileChange::changed(path));
    }

    /// Locate the in-memory file a path names.
    ///
    /// A `.less` path resolves to the client module of the same stem.
    fn find_file(&self, path: &VfsPath) -> Option<File> {
        if path.root_name() != self.root {
            return None;
        }
        let package = path.package_name()?;
        let name = path.file_name()?;
        let less_stem = path.less_stem();
        let state = self.state.lock();
        state
            .index
            .files
            .values()
            .find(|f| {
                f.item.package_name == package
                    && (f.file_name(&self.config) == name
                        || (less_stem == Some(f.item.name.as_str())
                            && f.schema_type() == SchemaType::ClientUnit))
            })
            .cloned()
    }

    fn find_package(&self, path: &VfsPath) -> Option<PackageInfo> {
        if path.root_name() != self.root {
            return None;
        }
        let name = path.package_name()?;
        self.state.lock().index.package_by_name(name).cloned()
    }

    /// Replace the in-memory copy of a file that is still indexed.
    ///
    /// A file dropped by a concurrent reload or cache clear stays dropped.
    fn store(&self, file: &File) {
        if let Some(slot) = self.state.lock().index.files.get_mut(&file.uid()) {
            *slot = file.clone();
        }
    }

    /// Write a file through to disk, then commit it in memory.
    async fn persist(&self, file: &File) -> VfsResult<File> {
        let written = self.cache.update(file).await?;
        self.store(&written);
        Ok(written)
    }

    fn require_file(&self, path: &VfsPath) -> VfsResult<File> {
        self.find_file(path)
            .ok_or_else(|| VfsError::not_found(path.to_string()))
    }
}

/// Editor settings paths live outside the remote repository.
fn is_settings_path(raw: &str) -> bool {
    raw.contains(".vscode")
}

/// Remote `modifiedOn` format: milliseconds since the epoch.
fn now_millis() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string()
}
