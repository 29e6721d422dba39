//! File-level operations: the read path with its reconnect flow, staleness
//! verification, local edits, and the remote mutations.

use std::collections::HashSet;
use std::time::SystemTime;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use schemata_types::{BuildMessage, BuildResponse, PackageUid, Schema, SchemaUid};

use crate::interact::ReconnectChoice;
use crate::model::File;
use crate::vfs::{VfsError, VfsPath, VfsResult, WriteOptions};

use super::{Engine, now_millis};

/// Files returned by a chain walk, and whether the walk was cut short.
#[derive(Debug, Clone, Default)]
pub struct FileChain {
    pub files: Vec<File>,
    pub cancelled: bool,
}

/// Progress of a bulk cache warm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheProgress {
    pub done: usize,
    pub total: usize,
    pub name: String,
}

/// Result of a bulk cache warm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheSummary {
    pub loaded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Outcome of a remote build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub success: bool,
    pub message: Option<String>,
    pub errors: Vec<BuildMessage>,
}

impl From<BuildResponse> for BuildReport {
    fn from(resp: BuildResponse) -> Self {
        Self {
            success: resp.success,
            message: resp.message.filter(|m| !m.is_empty()),
            errors: resp.errors.unwrap_or_default(),
        }
    }
}

/// What to do after a reconnect prompt.
enum Reconnect<'a> {
    /// Session restored and tree reloaded.
    Restored,
    /// Prompt went unanswered; try again after the backoff. The host stays
    /// claimed until the next prompt.
    Retry(PromptGuard<'a>),
}

/// Removes a host from the outstanding-prompt set however the prompt ends.
struct PromptGuard<'a> {
    engine: &'a Engine,
    host: String,
}

impl Drop for PromptGuard<'_> {
    fn drop(&mut self) {
        self.engine.state.lock().reconnect_prompts.remove(&self.host);
    }
}

/// Removes a path from the verification set however the check ends.
struct VerifyGuard<'a> {
    engine: &'a Engine,
    path: VfsPath,
}

impl Drop for VerifyGuard<'_> {
    fn drop(&mut self) {
        self.engine.state.lock().verifying.remove(&self.path);
    }
}

impl Engine {
    // ========================================================================
    // Read path
    // ========================================================================

    /// Resolve a path to a loaded file.
    ///
    /// Restores a dropped session first (prompting at most once per host at
    /// a time), then serves from the disk cache or fetches from the remote.
    /// `silent` suppresses careful-mode verification, for bulk reads.
    pub async fn get_file(&self, path: &VfsPath, silent: bool) -> VfsResult<File> {
        let mut unanswered = 0;
        let mut held = None;
        while !self.remote.is_connected() {
            match self.reconnect(path, held.take()).await? {
                Reconnect::Restored => {}
                Reconnect::Retry(guard) => {
                    unanswered += 1;
                    if unanswered >= self.config.max_reconnect_attempts {
                        return Err(VfsError::connection(format!(
                            "no answer to reconnect prompt for {}",
                            self.root
                        )));
                    }
                    tokio::time::sleep(self.config.reconnect_backoff()).await;
                    held = Some(guard);
                }
            }
        }

        let mut file = self.require_file(path)?;

        if let Some(cached) = self.cache.read(&self.path_of(&file)).await {
            if cached.is_loaded() {
                file.schema = cached.schema;
                file.last_synced = file.last_synced.max(cached.last_synced);
                if !self.mark_if_stale(&mut file, silent) {
                    self.store(&file);
                    return Ok(file);
                }
                if let Err(e) = self.cache.update(&file).await {
                    warn!(%path, "failed to persist sync stamp: {e}");
                }
                self.store(&file);
                self.spawn_verify(self.path_of(&file));
                return Ok(file);
            }
        }

        debug!(%path, "cache miss, fetching from remote");
        let schema = self
            .remote
            .get_schema(file.uid(), file.schema_type())
            .await?
            .ok_or_else(|| VfsError::not_found(path.to_string()))?;
        file.schema = Some(schema);
        file.last_synced = SystemTime::now();
        if let Err(e) = self.cache.write(&file).await {
            warn!(%path, "failed to cache fetched schema: {e}");
        }
        self.store(&file);
        Ok(file)
    }

    async fn reconnect<'a>(
        &'a self,
        path: &VfsPath,
        held: Option<PromptGuard<'a>>,
    ) -> VfsResult<Reconnect<'a>> {
        let host = self.root.clone();
        let connection = self
            .config
            .connection_for(&host)
            .cloned()
            .ok_or_else(|| VfsError::connection(format!("no saved login for {host}")))?;

        let guard = match held {
            Some(guard) => guard,
            None => {
                if !self.state.lock().reconnect_prompts.insert(host.clone()) {
                    return Err(VfsError::connection(format!(
                        "reconnect to {host} already pending"
                    )));
                }
                PromptGuard {
                    engine: self,
                    host: host.clone(),
                }
            }
        };

        let choice = tokio::time::timeout(
            self.config.prompt_timeout(),
            self.interaction.confirm_reconnect(&host),
        )
        .await
        .unwrap_or(ReconnectChoice::Dismissed);

        match choice {
            ReconnectChoice::Reconnect => {
                drop(guard);
                if let Err(e) = self.remote.login(&connection.credentials()).await {
                    self.interaction
                        .report_error(&format!("Could not log in to {host}: {e}"));
                    return Err(VfsError::connection(format!("could not connect to {host}")));
                }
                self.reload(CancellationToken::new())
                    .await
                    .map_err(|e| VfsError::connection(format!("could not connect to {host}: {e}")))?;
                Ok(Reconnect::Restored)
            }
            ReconnectChoice::Decline => {
                self.interaction.close_editor(path);
                Err(VfsError::connection(
                    "unable to open file due to lack of connection",
                ))
            }
            ReconnectChoice::Dismissed => {
                debug!(%host, "reconnect prompt unanswered");
                Ok(Reconnect::Retry(guard))
            }
        }
    }

    /// Careful mode: stamp a stale cached file as synced and report that it
    /// needs a background check.
    fn mark_if_stale(&self, file: &mut File, silent: bool) -> bool {
        if !self.config.careful_mode || silent {
            return false;
        }
        let now = SystemTime::now();
        let age = now.duration_since(file.last_synced).unwrap_or_default();
        if age <= self.config.staleness_window() {
            return false;
        }
        file.last_synced = now;
        true
    }

    fn spawn_verify(&self, path: VfsPath) {
        if let Some(this) = self.arc() {
            self.tasks.spawn(async move { this.verify_file(path).await });
        }
    }

    /// Compare the cached body with the remote and offer to pull a newer one.
    ///
    /// Skips paths already being verified. Never fails; problems are logged.
    pub async fn verify_file(&self, path: VfsPath) {
        if !self.state.lock().verifying.insert(path.clone()) {
            debug!(%path, "already verifying");
            return;
        }
        let _guard = VerifyGuard {
            engine: self,
            path: path.clone(),
        };

        let Some(file) = self.find_file(&path) else {
            return;
        };
        let remote = match self.remote.get_schema(file.uid(), file.schema_type()).await {
            Ok(Some(schema)) => schema,
            Ok(None) => {
                warn!(%path, "schema vanished from remote during verification");
                return;
            }
            Err(e) => {
                warn!(%path, "staleness check failed: {e}");
                return;
            }
        };
        if remote.body == file.body() {
            debug!(%path, "cached body is current");
            return;
        }

        info!(%path, "cached body differs from remote");
        if !self.interaction.confirm_pull(&path, &file.item.name).await {
            return;
        }
        if let Err(e) = self.replace_schema(file, remote).await {
            warn!(%path, "failed to store pulled schema: {e}");
        }
    }

    /// Install a freshly fetched schema in memory and on disk.
    async fn replace_schema(&self, mut file: File, schema: Schema) -> VfsResult<File> {
        let now = SystemTime::now();
        file.schema = Some(schema);
        file.last_synced = now;
        file.mtime = now;
        self.cache.write(&file).await?;
        self.store(&file);
        self.notify_changed(self.path_of(&file));
        Ok(file)
    }

    /// Re-fetch one schema from the remote, bypassing the cache.
    pub async fn reload_file(&self, path: &VfsPath) -> VfsResult<File> {
        let file = self.require_file(path)?;
        let schema = self
            .remote
            .get_schema(file.uid(), file.schema_type())
            .await?
            .ok_or_else(|| VfsError::not_found(path.to_string()))?;
        self.replace_schema(file, schema).await
    }

    // ========================================================================
    // Local edits and save
    // ========================================================================

    /// Replace a file's body (or stylesheet, for a `.less` path) in the
    /// cache. With `overwrite`, also saves it to the remote.
    pub async fn write_file(
        &self,
        path: &VfsPath,
        content: &[u8],
        options: WriteOptions,
    ) -> VfsResult<()> {
        let text = std::str::from_utf8(content)
            .map_err(|_| VfsError::invalid_path(format!("{path}: content is not UTF-8")))?;

        let mut found = None;
        if let Some(file) = self.find_file(path) {
            let cached = self.cache.read(&self.path_of(&file)).await;
            let schema = cached.and_then(|c| c.schema).or_else(|| file.schema.clone());
            found = schema.map(|s| (file, s));
        }
        let Some((mut file, mut schema)) = found else {
            if options.create {
                return Err(VfsError::unsupported(
                    "creating schemas; use the remote repository",
                ));
            }
            return Err(VfsError::not_found(path.to_string()));
        };

        if path.is_less() {
            schema.less = Some(text.to_string());
        } else {
            schema.body = text.to_string();
        }
        file.schema = Some(schema);
        file.mtime = SystemTime::now();
        self.cache.write(&file).await?;
        self.store(&file);
        self.notify_changed(self.path_of(&file));

        if options.overwrite {
            self.save_file(path).await?;
        }
        Ok(())
    }

    /// Send the current schema to the remote.
    ///
    /// On success the file is marked changed and locked. On refusal nothing
    /// local changes. A file with no loaded schema is left alone.
    pub async fn save_file(&self, path: &VfsPath) -> VfsResult<()> {
        let mut file = self.require_file(path)?;
        if file.schema.is_none() {
            file.schema = self
                .cache
                .read(&self.path_of(&file))
                .await
                .and_then(|c| c.schema);
        }
        let Some(schema) = file.schema.as_ref() else {
            debug!(%path, "nothing to save");
            return Ok(());
        };

        let resp = match self.remote.save_schema(schema, file.schema_type()).await {
            Ok(resp) => resp,
            Err(e) => {
                self.interaction.report_error(&format!("Error saving {}: {e}", file.item.name));
                return Err(e.into());
            }
        };
        if !resp.success {
            let message = resp.error_message();
            self.interaction.report_error(&message);
            return Err(VfsError::rejected(message));
        }

        let file = self
            .commit_flags(file, |f| {
                f.item.is_changed = true;
                f.item.is_locked = true;
                f.item.modified_on = now_millis();
                f.mtime = SystemTime::now();
            })
            .await?;
        self.notify_changed(self.path_of(&file));
        info!(%path, "saved");
        Ok(())
    }

    // ========================================================================
    // Locking and restore
    // ========================================================================

    pub async fn lock_schema(&self, paths: &[VfsPath]) -> VfsResult<()> {
        self.set_locked(paths, true).await
    }

    pub async fn unlock_schema(&self, paths: &[VfsPath]) -> VfsResult<()> {
        self.set_locked(paths, false).await
    }

    /// One remote call for the whole batch; flags change only if it succeeds.
    async fn set_locked(&self, paths: &[VfsPath], locked: bool) -> VfsResult<()> {
        let files = paths
            .iter()
            .map(|p| self.require_file(p))
            .collect::<VfsResult<Vec<_>>>()?;
        let items: Vec<_> = files.iter().map(|f| f.item.clone()).collect();

        let result = if locked {
            self.remote.lock_schema(&items).await
        } else {
            self.remote.unlock_schema(&items).await
        };
        let action = if locked { "lock" } else { "unlock" };
        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                self.interaction.report_error(&format!("Failed to {action}: {e}"));
                return Err(e.into());
            }
        };
        if !resp.success {
            let message = resp.error_message();
            self.interaction.report_error(&format!("Failed to {action}: {message}"));
            return Err(VfsError::rejected(message));
        }

        for file in files {
            let file = self.commit_flags(file, |f| f.item.is_locked = locked).await?;
            self.notify_changed(self.path_of(&file));
        }
        Ok(())
    }

    /// Apply `apply` to the current in-memory copy of `snapshot` and write
    /// it through, so edits made while a remote call was in flight survive.
    async fn commit_flags(&self, snapshot: File, apply: impl FnOnce(&mut File)) -> VfsResult<File> {
        let mut file = self.file(snapshot.uid()).unwrap_or(snapshot);
        apply(&mut file);
        self.persist(&file).await
    }

    /// Discard remote changes to a schema and reload its content.
    pub async fn restore_schema(&self, path: &VfsPath) -> VfsResult<File> {
        let file = self.require_file(path)?;
        if !file.item.is_changed {
            self.interaction.report_error("Schema is not changed!");
            return Err(VfsError::NotChanged(path.to_string()));
        }

        let name = file.item.name.clone();
        let resp = match self.remote.revert_elements(std::slice::from_ref(&file.item)).await {
            Ok(resp) => resp,
            Err(e) => {
                self.interaction.report_error(&format!("Failed to restore {name}: {e}"));
                return Err(e.into());
            }
        };
        if !resp.success {
            let message = resp.error_message();
            self.interaction.report_error(&message);
            return Err(VfsError::rejected(message));
        }

        // The remote is reverted from here on, whatever the re-fetch does.
        let file = self
            .commit_flags(file, |f| {
                f.item.is_changed = false;
                f.item.is_locked = false;
            })
            .await?;
        let schema = match self.remote.get_schema(file.uid(), file.schema_type()).await {
            Ok(Some(schema)) => schema,
            Ok(None) => {
                self.interaction.report_error(&format!("{name} vanished after restore"));
                self.notify_changed(self.path_of(&file));
                return Err(VfsError::not_found(path.to_string()));
            }
            Err(e) => {
                self.interaction.report_error(&format!("Failed to reload {name}: {e}"));
                self.notify_changed(self.path_of(&file));
                return Err(e.into());
            }
        };
        let file = self.replace_schema(file, schema).await?;
        info!(%path, "restored");
        Ok(file)
    }

    // ========================================================================
    // Inheritance
    // ========================================================================

    /// Walk the parent chain starting at `file`, loading each ancestor.
    ///
    /// Stops at a missing parent, on cancellation, or when an identity
    /// repeats, so a cyclic chain terminates.
    pub async fn get_parent_files(&self, file: &File, token: &CancellationToken) -> FileChain {
        let mut chain = FileChain::default();
        let mut visited: HashSet<SchemaUid> = HashSet::new();

        let mut current = match self.get_file(&self.path_of(file), true).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(name = %file.item.name, "cannot load start of parent chain: {e}");
                chain.cancelled = token.is_cancelled();
                return chain;
            }
        };
        visited.insert(current.uid());
        chain.files.push(current.clone());

        while !token.is_cancelled() {
            let Some(parent_uid) = current.schema.as_ref().and_then(Schema::parent_uid) else {
                break;
            };
            if !visited.insert(parent_uid) {
                debug!(uid = %parent_uid, "parent chain cycles, stopping");
                break;
            }
            let Some(parent) = self.file(parent_uid) else {
                break;
            };
            match self.get_file(&self.path_of(&parent), true).await {
                Ok(loaded) => {
                    chain.files.push(loaded.clone());
                    current = loaded;
                }
                Err(e) => {
                    warn!(name = %parent.item.name, "cannot load parent: {e}");
                    break;
                }
            }
        }
        chain.cancelled = token.is_cancelled();
        chain
    }

    /// Files sharing `name` across packages, ordered from the root of their
    /// replacement chain downwards when the chain can be followed.
    pub async fn get_related_files(&self, name: &str, token: &CancellationToken) -> FileChain {
        let mut files = Vec::new();
        for path in self.paths_by_name(name) {
            if token.is_cancelled() {
                return FileChain {
                    files: Vec::new(),
                    cancelled: true,
                };
            }
            match self.get_file(&path, true).await {
                Ok(file) => files.push(file),
                Err(e) => warn!(%path, "cannot load related file: {e}"),
            }
        }

        let uids: HashSet<SchemaUid> = files.iter().map(File::uid).collect();
        let parent_in_set = |f: &File| {
            f.schema
                .as_ref()
                .and_then(Schema::parent_uid)
                .filter(|p| uids.contains(p))
        };
        let Some(root_pos) = files.iter().position(|f| parent_in_set(f).is_none()) else {
            return FileChain { files, cancelled: false };
        };

        let mut ordered = vec![files.swap_remove(root_pos)];
        while let Some(pos) = files
            .iter()
            .position(|f| parent_in_set(f) == ordered.last().map(File::uid))
        {
            ordered.push(files.swap_remove(pos));
        }
        ordered.extend(files);
        FileChain {
            files: ordered,
            cancelled: false,
        }
    }

    // ========================================================================
    // Bulk and build
    // ========================================================================

    /// Load every file of a package into the cache, best effort.
    pub async fn cache_folder(
        &self,
        package_path: &VfsPath,
        token: &CancellationToken,
        mut progress: impl FnMut(CacheProgress) + Send,
    ) -> VfsResult<CacheSummary> {
        let package = self
            .find_package(package_path)
            .ok_or_else(|| VfsError::not_found(package_path.to_string()))?;
        let files = self.package_files(package.uid);
        let total = files.len();
        let mut summary = CacheSummary::default();

        for (done, file) in files.into_iter().enumerate() {
            if token.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let path = self.path_of(&file);
            match self.get_file(&path, true).await {
                Ok(_) => summary.loaded += 1,
                Err(e) => {
                    warn!(%path, "skipping file during bulk cache: {e}");
                    summary.failed += 1;
                }
            }
            progress(CacheProgress {
                done: done + 1,
                total,
                name: file.item.name,
            });
        }
        info!(package = %package.name, loaded = summary.loaded, failed = summary.failed, "bulk cache finished");
        Ok(summary)
    }

    pub(super) fn package_files(&self, package: PackageUid) -> Vec<File> {
        self.state.lock().index.files_in_package(package).cloned().collect()
    }

    /// Compile changed sources on the remote.
    pub async fn build(&self) -> VfsResult<BuildReport> {
        let report = BuildReport::from(self.remote.build().await?);
        self.report_build("Build", &report);
        Ok(report)
    }

    /// Compile everything on the remote.
    pub async fn rebuild(&self) -> VfsResult<BuildReport> {
        let report = BuildReport::from(self.remote.rebuild().await?);
        self.report_build("Rebuild", &report);
        Ok(report)
    }

    fn report_build(&self, what: &str, report: &BuildReport) {
        if report.errors.is_empty() && report.success {
            self.interaction.report_info(&format!("{what} completed"));
            return;
        }
        for error in &report.errors {
            self.interaction.report_error(&format!(
                "{}({},{}): {} {}",
                error.file_name, error.line, error.column, error.error_number, error.error_text
            ));
        }
        if let Some(message) = &report.message {
            self.interaction.report_error(message);
        }
    }
}
