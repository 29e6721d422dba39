//! Single-flight reload and cache clearing.

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::model::EntryIndex;
use crate::notify::FileChange;
use crate::vfs::{VfsError, VfsResult};

use super::Engine;

/// Why a reload produced no tree.
///
/// `Clone` so one result can be handed to every caller sharing the reload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReloadError {
    #[error("not connected to {0}")]
    NotConnected(String),
    #[error("remote returned no packages")]
    NoPackages,
    #[error("remote returned no schemas of enabled types")]
    NoSchemas,
    #[error("reload cancelled")]
    Cancelled,
    #[error("remote error: {0}")]
    Remote(String),
}

impl From<ReloadError> for VfsError {
    fn from(e: ReloadError) -> Self {
        match e {
            ReloadError::NotConnected(host) => VfsError::connection(format!("not connected to {host}")),
            ReloadError::Cancelled => VfsError::Cancelled,
            other => VfsError::Remote(other.to_string()),
        }
    }
}

/// Outcome of a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSummary {
    pub packages: usize,
    pub files: usize,
}

impl Engine {
    /// Rebuild the package and file indices from the remote.
    ///
    /// Concurrent callers share one execution and receive the same result;
    /// only the first caller's `token` is observed. On failure or
    /// cancellation the engine is left empty.
    pub async fn reload(&self, token: CancellationToken) -> Result<ReloadSummary, ReloadError> {
        let shared = {
            let mut state = self.state.lock();
            if let Some(in_flight) = state.reload.clone() {
                in_flight
            } else {
                let Some(this) = self.arc() else {
                    return Err(ReloadError::Cancelled);
                };
                let fut = async move {
                    let result = this.run_reload(token).await;
                    this.state.lock().reload = None;
                    result
                }
                .boxed()
                .shared();
                state.reload = Some(fut.clone());
                fut
            }
        };
        shared.await
    }

    async fn run_reload(&self, token: CancellationToken) -> Result<ReloadSummary, ReloadError> {
        let result = self.reload_stages(&token).await;
        match &result {
            Ok(summary) => info!(
                root = %self.root,
                packages = summary.packages,
                files = summary.files,
                "reload complete"
            ),
            Err(ReloadError::Cancelled) => info!(root = %self.root, "reload cancelled"),
            Err(e) => {
                warn!(root = %self.root, "reload failed: {e}");
                self.interaction.report_error(&format!("Reload failed: {e}"));
            }
        }
        result
    }

    async fn reload_stages(&self, token: &CancellationToken) -> Result<ReloadSummary, ReloadError> {
        // 1. Start from nothing so failure never leaves a half tree.
        {
            let mut state = self.state.lock();
            state.index = EntryIndex::default();
            state.verifying.clear();
        }
        self.bump_tree();

        if !self.remote.is_connected() {
            self.login_saved()
                .await
                .map_err(|_| ReloadError::NotConnected(self.root.clone()))?;
        }
        check(token)?;

        // 2. Packages.
        info!(root = %self.root, "fetching packages");
        let packages = self
            .remote
            .get_packages()
            .await
            .map_err(|e| ReloadError::Remote(e.to_string()))?;
        if packages.is_empty() {
            return Err(ReloadError::NoPackages);
        }
        check(token)?;

        // 3. Workspace items, filtered to enabled types.
        info!(root = %self.root, packages = packages.len(), "fetching workspace items");
        let items = self
            .remote
            .get_workspace_items()
            .await
            .map_err(|e| ReloadError::Remote(e.to_string()))?;
        let mut index = EntryIndex::build(packages, items, &self.config);
        if index.files.is_empty() {
            return Err(ReloadError::NoSchemas);
        }
        check(token)?;

        // 4. Write through, keeping bodies already cached from earlier sessions.
        for file in index.files.values_mut() {
            match self.cache.update(file).await {
                Ok(written) => file.last_synced = written.last_synced.max(file.last_synced),
                Err(e) => warn!(name = %file.item.name, "failed to cache file metadata: {e}"),
            }
            check(token)?;
        }

        // 5. Commit.
        let mut created: Vec<FileChange> = index
            .folders
            .values()
            .map(|p| FileChange::created(self.package_path(p)))
            .collect();
        created.extend(
            index
                .files
                .values()
                .map(|f| FileChange::created(self.cache.get_path(&f.item))),
        );
        let summary = ReloadSummary {
            packages: index.folders.len(),
            files: index.files.len(),
        };
        self.state.lock().index = index;
        self.changes.push_all(created);
        self.bump_tree();
        Ok(summary)
    }

    /// Log in with the saved connection for this root.
    pub(super) async fn login_saved(&self) -> VfsResult<()> {
        let connection = self
            .config
            .connection_for(&self.root)
            .ok_or_else(|| VfsError::connection(format!("no saved login for {}", self.root)))?;
        self.remote.login(&connection.credentials()).await?;
        info!(root = %self.root, login = %connection.login, "logged in");
        Ok(())
    }

    /// Delete every cached artifact for this root and empty the indices,
    /// after the user confirms. Returns whether anything was cleared.
    pub async fn clear_cache(&self) -> VfsResult<bool> {
        let message = format!("Clear all cached files for {}?", self.root);
        if !self.interaction.confirm(&message).await {
            return Ok(false);
        }
        self.cache.delete_all().await?;
        {
            let mut state = self.state.lock();
            state.index = EntryIndex::default();
            state.verifying.clear();
        }
        self.bump_tree();
        self.interaction.report_info(&format!("Cache cleared for {}", self.root));
        Ok(true)
    }
}

fn check(token: &CancellationToken) -> Result<(), ReloadError> {
    if token.is_cancelled() {
        Err(ReloadError::Cancelled)
    } else {
        Ok(())
    }
}
