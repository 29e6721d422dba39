//! [`VfsOps`] over the engine.

use async_trait::async_trait;
use tracing::debug;

use crate::model::File;
use crate::vfs::{
    DirEntry, FileAttr, LESS_SUFFIX, VfsError, VfsOps, VfsPath, VfsResult, WriteOptions,
};

use super::{Engine, is_settings_path};

impl Engine {
    fn attr_of(&self, file: &File, path: &VfsPath) -> FileAttr {
        let size = if path.is_less() {
            file.less().map_or(0, str::len)
        } else {
            file.body().len()
        };
        FileAttr::file(size as u64, file.mtime, file.item.is_read_only)
    }

    /// A `.less` path exists only while its client module has a stylesheet.
    fn require_less(file: &File, path: &VfsPath) -> VfsResult<()> {
        if path.is_less() && file.less().is_none() {
            return Err(VfsError::not_found(path.to_string()));
        }
        Ok(())
    }

    fn content_of(file: &File, path: &VfsPath) -> Vec<u8> {
        if path.is_less() {
            file.less().unwrap_or_default().as_bytes().to_vec()
        } else {
            file.body().as_bytes().to_vec()
        }
    }
}

#[async_trait]
impl VfsOps for Engine {
    async fn stat(&self, path: &str) -> VfsResult<FileAttr> {
        if is_settings_path(path) {
            return Err(VfsError::not_found(path));
        }
        let path = VfsPath::parse(path)?;
        if path.root_name() != self.root {
            return Err(VfsError::not_found(path.to_string()));
        }
        if path.is_root() {
            return Ok(FileAttr::directory(true));
        }
        if path.is_package() {
            return self
                .find_package(&path)
                .map(|p| FileAttr::directory(p.is_read_only))
                .ok_or_else(|| VfsError::not_found(path.to_string()));
        }
        if let Some(file) = self.find_file(&path) {
            if !path.is_less() || file.less().is_some() {
                return Ok(self.attr_of(&file, &path));
            }
        }
        let file = self.get_file(&path, false).await?;
        Self::require_less(&file, &path)?;
        Ok(self.attr_of(&file, &path))
    }

    async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        if is_settings_path(path) {
            debug!(path, "editor settings read as empty");
            return Ok(Vec::new());
        }
        let path = VfsPath::parse(path)?;
        if path.is_root() || path.is_package() {
            return Err(VfsError::IsADirectory(path.to_string()));
        }
        let file = self.get_file(&path, false).await?;
        Self::require_less(&file, &path)?;
        Ok(Self::content_of(&file, &path))
    }

    async fn read_directory(&self, path: &str) -> VfsResult<Vec<DirEntry>> {
        let path = VfsPath::parse(path)?;
        if path.root_name() != self.root {
            return Err(VfsError::not_found(path.to_string()));
        }
        if path.is_root() {
            return Ok(self
                .packages()
                .into_iter()
                .map(|p| DirEntry::directory(p.name))
                .collect());
        }
        let package = self
            .find_package(&path)
            .filter(|_| path.is_package())
            .ok_or_else(|| VfsError::not_found(path.to_string()))?;

        let mut entries = Vec::new();
        for file in self.package_files(package.uid) {
            entries.push(DirEntry::file(file.file_name(&self.config)));
            if file.is_loaded() && file.less().is_some() {
                entries.push(DirEntry::file(format!("{}{LESS_SUFFIX}", file.item.name)));
            }
        }
        Ok(entries)
    }

    async fn write_file(&self, path: &str, content: &[u8], options: WriteOptions) -> VfsResult<()> {
        if is_settings_path(path) {
            debug!(path, "ignoring write to editor settings");
            return Ok(());
        }
        let path = VfsPath::parse(path)?;
        Engine::write_file(self, &path, content, options).await
    }
}
