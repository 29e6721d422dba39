//! VFS operations trait.
//!
//! The contract an editor's filesystem provider consumes. Paths are strings
//! in either URI form (`bpmsoft://<root>/<package>/<file>`) or plain path
//! form (`/<root>/<package>/<file>`).

use async_trait::async_trait;

use super::types::{DirEntry, FileAttr, WriteOptions};
use super::{VfsError, VfsResult};

/// Core VFS operations trait.
///
/// Only files are writable, and only in place: the remote repository alone
/// decides which objects exist, so structural operations are rejected.
#[async_trait]
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get attributes for the root, a package directory or a file.
    async fn stat(&self, path: &str) -> VfsResult<FileAttr>;

    /// Read entire file contents.
    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>>;

    /// Read directory entries.
    async fn read_directory(&self, path: &str) -> VfsResult<Vec<DirEntry>>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Replace a file's contents.
    async fn write_file(&self, path: &str, content: &[u8], options: WriteOptions) -> VfsResult<()>;

    async fn create_directory(&self, path: &str) -> VfsResult<()> {
        Err(VfsError::unsupported(format!("create directory {path}")))
    }

    async fn delete(&self, path: &str) -> VfsResult<()> {
        Err(VfsError::unsupported(format!("delete {path}")))
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        Err(VfsError::unsupported(format!("rename {from} to {to}")))
    }

    // ========================================================================
    // Watching
    // ========================================================================

    /// Subscribe to changes under `path`.
    ///
    /// Changes are always published on the engine's change channel, so this
    /// is a no-op.
    fn watch(&self, _path: &str) -> VfsResult<()> {
        Ok(())
    }

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Read a file as UTF-8 text.
    async fn read_to_string(&self, path: &str) -> VfsResult<String> {
        let bytes = self.read_file(path).await?;
        String::from_utf8(bytes).map_err(|_| VfsError::invalid_path(format!("{path}: not UTF-8")))
    }
}
