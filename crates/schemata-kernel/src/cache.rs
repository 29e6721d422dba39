//! Disk cache of files, one tree per remote host.
//!
//! A file is stored as a metadata document plus raw content siblings:
//!
//! ```text
//! <base>/cache/<root>/<package>/<file>.metadata.json   item + schema, content blanked
//! <data>/<root>/<package>/<file>                        body
//! <data>/<root>/<package>/<stem>.less                   stylesheet, client modules only
//! ```
//!
//! The metadata document decides presence: content files without one are a
//! cache miss, and so is a document that fails to parse.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, warn};

use schemata_types::{Schema, WorkspaceItem};

use crate::config::SchemataConfig;
use crate::model::File;
use crate::vfs::{LESS_SUFFIX, VfsError, VfsPath, VfsResult};

const METADATA_SUFFIX: &str = ".metadata.json";
const BODY_SUFFIX: &str = ".js";

/// Name of the stylesheet sibling for a primary content file name.
pub fn less_sibling(file_name: &str) -> String {
    match file_name.strip_suffix(BODY_SUFFIX) {
        Some(stem) => format!("{stem}{LESS_SUFFIX}"),
        None => format!("{file_name}{LESS_SUFFIX}"),
    }
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty() && segment != "." && segment != ".." && !segment.contains(['/', '\\'])
}

/// Disk cache for one session root.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: String,
    metadata_dir: PathBuf,
    data_dir: PathBuf,
    config: Arc<SchemataConfig>,
}

impl DiskCache {
    pub fn new(config: Arc<SchemataConfig>, root: impl Into<String>) -> Self {
        let root = root.into();
        Self {
            metadata_dir: config.metadata_dir().join(&root),
            data_dir: config.data_dir().join(&root),
            root,
            config,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Virtual path of an item. Depends only on the root, the package name,
    /// the item name and its type's extension.
    pub fn get_path(&self, item: &WorkspaceItem) -> VfsPath {
        VfsPath::file(
            &self.root,
            &item.package_name,
            format!("{}{}", item.name, self.config.extension(item.schema_type)),
        )
    }

    /// On-disk locations for a virtual file path: (metadata, body, less).
    fn locations(&self, path: &VfsPath) -> VfsResult<(PathBuf, PathBuf, PathBuf)> {
        let (Some(package), Some(name)) = (path.package_name(), path.file_name()) else {
            return Err(VfsError::invalid_path(path.to_string()));
        };
        let primary = match path.less_stem() {
            Some(stem) => format!("{stem}{BODY_SUFFIX}"),
            None => name.to_string(),
        };
        if !is_safe_segment(package) || !is_safe_segment(&primary) {
            return Err(VfsError::invalid_path(path.to_string()));
        }
        let metadata = self
            .metadata_dir
            .join(package)
            .join(format!("{primary}{METADATA_SUFFIX}"));
        let data = self.data_dir.join(package);
        let less = data.join(less_sibling(&primary));
        Ok((metadata, data.join(primary), less))
    }

    /// Load a file. Any failure is a cache miss.
    pub async fn read(&self, path: &VfsPath) -> Option<File> {
        let (metadata_path, body_path, less_path) = match self.locations(path) {
            Ok(locations) => locations,
            Err(e) => {
                debug!(%path, "cache miss: {e}");
                return None;
            }
        };

        let metadata = match fs::read_to_string(&metadata_path).await {
            Ok(text) => text,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %metadata_path.display(), "failed to read metadata: {e}");
                }
                return None;
            }
        };
        let mut file: File = match serde_json::from_str(&metadata) {
            Ok(file) => file,
            Err(e) => {
                debug!(path = %metadata_path.display(), "unparseable metadata, treating as miss: {e}");
                return None;
            }
        };

        let body = read_optional(&body_path).await;
        let less = read_optional(&less_path).await;
        if body.is_some() || less.is_some() {
            let schema = file.schema.get_or_insert_with(|| {
                Schema::new(file.item.uid, file.item.name.clone(), String::new())
            });
            if let Some(body) = body {
                schema.body = body;
            }
            if let Some(less) = less {
                schema.less = Some(less);
            }
        }
        Some(file)
    }

    /// Store a file, replacing whatever was cached for its path.
    pub async fn write(&self, file: &File) -> VfsResult<()> {
        let path = self.get_path(&file.item);
        let (metadata_path, body_path, less_path) = self.locations(&path)?;

        let mut metadata = file.clone();
        let (body, less) = match metadata.schema.as_mut() {
            Some(schema) => {
                let body = std::mem::take(&mut schema.body);
                let less = schema.less.as_mut().map(std::mem::take);
                (body, less)
            }
            None => (String::new(), None),
        };

        if let Some(dir) = body_path.parent() {
            fs::create_dir_all(dir).await?;
        }
        write_or_remove(&body_path, &body).await?;
        write_or_remove(&less_path, less.as_deref().unwrap_or_default()).await?;

        if let Some(dir) = metadata_path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_string(&metadata)
            .map_err(|e| VfsError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        fs::write(&metadata_path, json).await?;
        debug!(%path, "cached");
        Ok(())
    }

    /// Write a file, keeping the cached schema when the incoming file has
    /// none, and the later of the two sync stamps. Returns what was written.
    pub async fn update(&self, file: &File) -> VfsResult<File> {
        let mut merged = file.clone();
        if let Some(cached) = self.read(&self.get_path(&file.item)).await {
            if merged.schema.is_none() {
                merged.schema = cached.schema;
            }
            merged.last_synced = merged.last_synced.max(cached.last_synced);
        }
        self.write(&merged).await?;
        Ok(merged)
    }

    /// Remove everything cached for this root.
    pub async fn delete_all(&self) -> VfsResult<()> {
        for dir in [&self.metadata_dir, &self.data_dir] {
            match fs::remove_dir_all(dir).await {
                Ok(()) => debug!(dir = %dir.display(), "cache cleared"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path).await {
        Ok(text) => Some(text),
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), "failed to read cached content: {e}");
            }
            None
        }
    }
}

/// Write non-empty content, or remove a stale file for empty content.
async fn write_or_remove(path: &Path, content: &str) -> io::Result<()> {
    if content.is_empty() {
        match fs::remove_file(path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    } else {
        fs::write(path, content).await
    }
}
