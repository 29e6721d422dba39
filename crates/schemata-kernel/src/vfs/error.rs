//! VFS error types.

use std::io;
use thiserror::Error;

use schemata_client::RemoteError;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// No known remote object at this path, or the remote has no schema for it.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote session is unauthenticated or could not be restored.
    #[error("connection error: {0}")]
    Connection(String),

    /// The remote refused a save, lock, unlock or revert.
    #[error("rejected by remote: {0}")]
    Rejected(String),

    /// Restore was requested for a schema without local changes.
    #[error("schema has no changes to restore: {0}")]
    NotChanged(String),

    /// Structural changes belong to the remote repository.
    #[error("not supported: {0}")]
    Unsupported(String),

    /// Path does not fit the `<root>/<package>/<file>` scheme.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The remote call failed without a business answer.
    #[error("remote error: {0}")]
    Remote(String),

    /// Operation cancelled through its token.
    #[error("cancelled")]
    Cancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a Connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a Rejected error.
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<RemoteError> for VfsError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Unauthorized(msg) => VfsError::Connection(msg),
            RemoteError::Shutdown => VfsError::Connection("request queue shut down".into()),
            RemoteError::Rejected(msg) => VfsError::Rejected(msg),
            RemoteError::Transport(msg) | RemoteError::Protocol(msg) => VfsError::Remote(msg),
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::Connection(msg) => io::Error::new(io::ErrorKind::NotConnected, msg),
            VfsError::Rejected(msg) => io::Error::new(io::ErrorKind::PermissionDenied, msg),
            VfsError::NotChanged(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::Unsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::Remote(msg) => io::Error::other(msg),
            VfsError::Cancelled => io::Error::new(io::ErrorKind::Interrupted, "cancelled"),
            VfsError::Io(e) => e,
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
