//! Core VFS types.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    File,
    Directory,
}

impl FileType {
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// Result of `stat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAttr {
    /// Size in bytes of the primary content.
    pub size: u64,
    pub kind: FileType,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    /// Remote marks the object or package read-only.
    pub read_only: bool,
}

impl FileAttr {
    pub fn file(size: u64, mtime: SystemTime, read_only: bool) -> Self {
        Self {
            size,
            kind: FileType::File,
            mtime,
            ctime: mtime,
            read_only,
        }
    }

    pub fn directory(read_only: bool) -> Self {
        let now = SystemTime::now();
        Self {
            size: 0,
            kind: FileType::Directory,
            mtime: now,
            ctime: now,
            read_only,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    pub kind: FileType,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileType::File,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileType::Directory,
        }
    }
}

/// Flags for `write_file`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Caller wants the file created if missing.
    pub create: bool,
    /// Caller wants the content pushed to the remote.
    pub overwrite: bool,
}

impl WriteOptions {
    /// A local-only edit of an existing file.
    pub fn edit() -> Self {
        Self::default()
    }

    /// Edit and save to the remote.
    pub fn save() -> Self {
        Self {
            create: false,
            overwrite: true,
        }
    }
}
