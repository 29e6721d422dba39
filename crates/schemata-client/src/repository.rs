//! The remote repository capability interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use schemata_types::{
    BuildResponse, PackageInfo, RemoteResponse, SaveResponse, Schema, SchemaType, SchemaUid,
    WorkspaceItem,
};

/// Errors from the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The session is missing or expired; logging in again may fix it.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The request never got a usable answer.
    #[error("transport error: {0}")]
    Transport(String),
    /// The remote understood the request and refused it.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The remote answered with something we could not decode.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The request queue is gone.
    #[error("request queue shut down")]
    Shutdown,
}

impl RemoteError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Login credentials for one remote host.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// Operations the engine needs from the remote repository.
///
/// Everything that crosses this boundary is already decoded into
/// `schemata_types` shapes. Business-level refusals of lock, unlock,
/// revert and save come back as `success: false` responses; `Err` is
/// reserved for calls that could not be completed at all.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Whether the session is currently authenticated.
    fn is_connected(&self) -> bool;

    async fn login(&self, credentials: &Credentials) -> RemoteResult<()>;

    async fn get_packages(&self) -> RemoteResult<Vec<PackageInfo>>;

    async fn get_workspace_items(&self) -> RemoteResult<Vec<WorkspaceItem>>;

    /// Load one schema. `Ok(None)` means the remote has no such object.
    async fn get_schema(
        &self,
        uid: SchemaUid,
        schema_type: SchemaType,
    ) -> RemoteResult<Option<Schema>>;

    async fn save_schema(
        &self,
        schema: &Schema,
        schema_type: SchemaType,
    ) -> RemoteResult<SaveResponse>;

    async fn lock_schema(&self, items: &[WorkspaceItem]) -> RemoteResult<RemoteResponse>;

    async fn unlock_schema(&self, items: &[WorkspaceItem]) -> RemoteResult<RemoteResponse>;

    async fn revert_elements(&self, items: &[WorkspaceItem]) -> RemoteResult<RemoteResponse>;

    async fn build(&self) -> RemoteResult<BuildResponse>;

    async fn rebuild(&self) -> RemoteResult<BuildResponse>;
}
