//! Entry model: the in-memory File and the per-reload index built from the
//! two flat remote lists.

use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use schemata_types::{PackageInfo, PackageUid, Schema, SchemaType, SchemaUid, WorkspaceItem};

use crate::config::SchemataConfig;

/// A workspace item plus its lazily loaded schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    #[serde(rename = "workSpaceItem")]
    pub item: WorkspaceItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    /// Last time the cached body was compared with the remote.
    #[serde(default = "epoch")]
    pub last_synced: SystemTime,
    /// Last local modification, reported through `stat`.
    #[serde(default = "epoch")]
    pub mtime: SystemTime,
}

fn epoch() -> SystemTime {
    SystemTime::UNIX_EPOCH
}

impl File {
    pub fn new(item: WorkspaceItem) -> Self {
        Self {
            item,
            schema: None,
            last_synced: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::now(),
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn uid(&self) -> SchemaUid {
        self.item.uid
    }

    pub fn schema_type(&self) -> SchemaType {
        self.item.schema_type
    }

    /// Schema present with a non-empty body.
    pub fn is_loaded(&self) -> bool {
        self.schema.as_ref().is_some_and(|s| !s.body.is_empty())
    }

    pub fn body(&self) -> &str {
        self.schema.as_ref().map(|s| s.body.as_str()).unwrap_or_default()
    }

    pub fn less(&self) -> Option<&str> {
        self.schema.as_ref().and_then(Schema::less_content)
    }

    /// File name in its package directory, e.g. `AccountPageV2.js`.
    pub fn file_name(&self, config: &SchemataConfig) -> String {
        format!("{}{}", self.item.name, config.extension(self.item.schema_type))
    }
}

/// Files and packages of one session, keyed by remote identity.
#[derive(Debug, Default, Clone)]
pub struct EntryIndex {
    pub files: IndexMap<SchemaUid, File>,
    pub folders: IndexMap<PackageUid, PackageInfo>,
}

impl EntryIndex {
    /// Build from the remote lists, dropping items of disabled types.
    ///
    /// Repeated identities keep the last occurrence. Items carry their
    /// package name so paths can be computed without the package list.
    pub fn build(
        packages: Vec<PackageInfo>,
        items: Vec<WorkspaceItem>,
        config: &SchemataConfig,
    ) -> Self {
        let mut index = Self::default();

        for package in packages {
            if let Some(prev) = index.folders.insert(package.uid, package) {
                warn!(uid = %prev.uid, name = %prev.name, "duplicate package uId, keeping last");
            }
        }

        for mut item in items {
            if !config.is_enabled(item.schema_type) {
                continue;
            }
            if item.package_name.is_empty() {
                if let Some(package) = index.folders.get(&item.package_uid) {
                    item.package_name = package.name.clone();
                }
            }
            if let Some(prev) = index.files.insert(item.uid, File::new(item)) {
                warn!(uid = %prev.item.uid, name = %prev.item.name, "duplicate schema uId, keeping last");
            }
        }

        index
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }

    pub fn package_by_name(&self, name: &str) -> Option<&PackageInfo> {
        self.folders.values().find(|p| p.name == name)
    }

    pub fn files_in_package(&self, package: PackageUid) -> impl Iterator<Item = &File> {
        self.files
            .values()
            .filter(move |f| f.item.package_uid == package)
    }
}
