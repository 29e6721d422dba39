//! In-memory remote repository.
//!
//! Holds packages, workspace items and schemas in maps and answers every
//! [`RemoteRepository`] call from them. Counts calls per [`Operation`] and
//! supports switchable failure injection, which makes it the test double for
//! the engine and the backing store of the offline CLI.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use strum::{Display, EnumIter};
use tracing::debug;

use schemata_types::{
    BuildResponse, PackageInfo, RemoteResponse, SaveResponse, Schema, SchemaType, SchemaUid,
    WorkspaceItem,
};

use crate::repository::{Credentials, RemoteError, RemoteRepository, RemoteResult};

/// One kind of remote call, used for counters and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Operation {
    Login,
    GetPackages,
    GetWorkspaceItems,
    GetSchema,
    SaveSchema,
    LockSchema,
    UnlockSchema,
    RevertElements,
    Build,
    Rebuild,
}

#[derive(Default)]
struct MemoryState {
    packages: Vec<PackageInfo>,
    items: Vec<WorkspaceItem>,
    schemas: HashMap<SchemaUid, Schema>,
    calls: HashMap<Operation, usize>,
    /// Hard failures returned as `Err`.
    errors: HashMap<Operation, RemoteError>,
    /// Operations answered with `success: false`.
    rejected: HashMap<Operation, String>,
    credentials: Option<Credentials>,
    build_errors: Vec<schemata_types::BuildMessage>,
}

/// Repository backed by in-process maps.
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
    connected: AtomicBool,
    /// Calls that must be answered with `Unauthorized` before the next login.
    expired: AtomicBool,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    /// Empty, connected repository that accepts any login.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            connected: AtomicBool::new(true),
            expired: AtomicBool::new(false),
            latency: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    // ── Fixture setup ────────────────────────────────────────────────────

    pub fn add_package(&self, package: PackageInfo) {
        self.state.lock().packages.push(package);
    }

    /// Add an item, optionally with the schema the remote will serve for it.
    pub fn add_item(&self, item: WorkspaceItem, schema: Option<Schema>) {
        let mut state = self.state.lock();
        if let Some(schema) = schema {
            state.schemas.insert(item.uid, schema);
        }
        state.items.push(item);
    }

    /// Replace the schema served for `uid`, as if edited by someone else.
    pub fn set_schema(&self, uid: SchemaUid, schema: Schema) {
        self.state.lock().schemas.insert(uid, schema);
    }

    pub fn remove_schema(&self, uid: SchemaUid) {
        self.state.lock().schemas.remove(&uid);
    }

    pub fn schema(&self, uid: SchemaUid) -> Option<Schema> {
        self.state.lock().schemas.get(&uid).cloned()
    }

    pub fn item(&self, uid: SchemaUid) -> Option<WorkspaceItem> {
        self.state.lock().items.iter().find(|i| i.uid == uid).cloned()
    }

    /// Only accept these credentials on login. Without this any login works.
    pub fn require_credentials(&self, credentials: Credentials) {
        self.state.lock().credentials = Some(credentials);
    }

    pub fn set_build_errors(&self, errors: Vec<schemata_types::BuildMessage>) {
        self.state.lock().build_errors = errors;
    }

    // ── Failure injection ────────────────────────────────────────────────

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Answer every call with `Unauthorized` until the next successful login.
    pub fn expire_session(&self) {
        self.expired.store(true, Ordering::SeqCst);
    }

    /// Make `op` fail with `error` until cleared.
    pub fn fail(&self, op: Operation, error: RemoteError) {
        self.state.lock().errors.insert(op, error);
    }

    /// Make `op` answer `success: false` with `message` until cleared.
    pub fn reject(&self, op: Operation, message: impl Into<String>) {
        self.state.lock().rejected.insert(op, message.into());
    }

    /// Remove any injected failure or rejection for `op`.
    pub fn clear_failure(&self, op: Operation) {
        let mut state = self.state.lock();
        state.errors.remove(&op);
        state.rejected.remove(&op);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    // ── Observation ──────────────────────────────────────────────────────

    pub fn calls(&self, op: Operation) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Highest number of calls observed executing at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    // ── Internals ────────────────────────────────────────────────────────

    async fn enter(&self, op: Operation) -> RemoteResult<InFlight<'_>> {
        *self.state.lock().calls.entry(op).or_default() += 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if op != Operation::Login && self.expired.load(Ordering::SeqCst) {
            return Err(RemoteError::Unauthorized("session expired".into()));
        }
        if let Some(err) = self.state.lock().errors.get(&op).cloned() {
            return Err(err);
        }
        debug!(%op, "memory repository call");
        Ok(guard)
    }

    fn rejection(&self, op: Operation) -> Option<String> {
        self.state.lock().rejected.get(&op).cloned()
    }

    fn flag_items(&self, op: Operation, items: &[WorkspaceItem], apply: impl Fn(&mut WorkspaceItem)) -> RemoteResponse {
        if let Some(message) = self.rejection(op) {
            return RemoteResponse::failed(message);
        }
        let mut state = self.state.lock();
        for target in items {
            if let Some(item) = state.items.iter_mut().find(|i| i.uid == target.uid) {
                apply(item);
            }
        }
        RemoteResponse::ok()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteRepository for MemoryRepository {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn login(&self, credentials: &Credentials) -> RemoteResult<()> {
        let _guard = self.enter(Operation::Login).await?;
        let required = self.state.lock().credentials.clone();
        if required.is_some_and(|r| &r != credentials) {
            return Err(RemoteError::Unauthorized("invalid login or password".into()));
        }
        self.expired.store(false, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get_packages(&self) -> RemoteResult<Vec<PackageInfo>> {
        let _guard = self.enter(Operation::GetPackages).await?;
        Ok(self.state.lock().packages.clone())
    }

    async fn get_workspace_items(&self) -> RemoteResult<Vec<WorkspaceItem>> {
        let _guard = self.enter(Operation::GetWorkspaceItems).await?;
        Ok(self.state.lock().items.clone())
    }

    async fn get_schema(
        &self,
        uid: SchemaUid,
        _schema_type: SchemaType,
    ) -> RemoteResult<Option<Schema>> {
        let _guard = self.enter(Operation::GetSchema).await?;
        Ok(self.state.lock().schemas.get(&uid).cloned())
    }

    async fn save_schema(
        &self,
        schema: &Schema,
        _schema_type: SchemaType,
    ) -> RemoteResult<SaveResponse> {
        let _guard = self.enter(Operation::SaveSchema).await?;
        if let Some(message) = self.rejection(Operation::SaveSchema) {
            return Ok(SaveResponse {
                success: false,
                message: Some(message),
                ..SaveResponse::default()
            });
        }
        let mut state = self.state.lock();
        state.schemas.insert(schema.uid, schema.clone());
        if let Some(item) = state.items.iter_mut().find(|i| i.uid == schema.uid) {
            item.is_changed = true;
            item.is_locked = true;
        }
        Ok(SaveResponse::ok())
    }

    async fn lock_schema(&self, items: &[WorkspaceItem]) -> RemoteResult<RemoteResponse> {
        let _guard = self.enter(Operation::LockSchema).await?;
        Ok(self.flag_items(Operation::LockSchema, items, |i| i.is_locked = true))
    }

    async fn unlock_schema(&self, items: &[WorkspaceItem]) -> RemoteResult<RemoteResponse> {
        let _guard = self.enter(Operation::UnlockSchema).await?;
        Ok(self.flag_items(Operation::UnlockSchema, items, |i| i.is_locked = false))
    }

    async fn revert_elements(&self, items: &[WorkspaceItem]) -> RemoteResult<RemoteResponse> {
        let _guard = self.enter(Operation::RevertElements).await?;
        Ok(self.flag_items(Operation::RevertElements, items, |i| {
            i.is_changed = false;
            i.is_locked = false;
        }))
    }

    async fn build(&self) -> RemoteResult<BuildResponse> {
        let _guard = self.enter(Operation::Build).await?;
        Ok(self.build_response())
    }

    async fn rebuild(&self) -> RemoteResult<BuildResponse> {
        let _guard = self.enter(Operation::Rebuild).await?;
        Ok(self.build_response())
    }
}

impl MemoryRepository {
    fn build_response(&self) -> BuildResponse {
        let errors = self.state.lock().build_errors.clone();
        BuildResponse {
            success: errors.is_empty(),
            build_result: if errors.is_empty() { 0 } else { 1 },
            message: None,
            errors: (!errors.is_empty()).then_some(errors),
        }
    }
}
