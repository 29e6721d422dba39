//! Sorted tree view of a session for an editor's explorer.
//!
//! Recomputed from a snapshot of the engine's indices every time it is
//! asked for; nothing here is cached or persisted.
//!
//! ```text
//! PackageNode          read-only last, then by name
//!   └── InnerFolder    one per schema type present, in type order
//!         └── FileNode locked+changed, changed, locked, then by name
//! ```

use std::cmp::Ordering;

use strum::IntoEnumIterator;

use schemata_types::{PackageInfo, SchemaType};

use crate::config::SchemataConfig;
use crate::engine::Engine;
use crate::model::File;
use crate::vfs::VfsPath;

#[derive(Debug, Clone, PartialEq)]
pub struct PackageNode {
    pub package: PackageInfo,
    pub path: VfsPath,
    pub description: String,
    pub tooltip: String,
    pub folders: Vec<InnerFolder>,
}

/// Synthetic grouping of one package's files of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerFolder {
    pub schema_type: SchemaType,
    pub label: String,
    pub tooltip: String,
    pub files: Vec<FileNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    pub name: String,
    pub path: VfsPath,
    pub description: Option<String>,
    pub is_locked: bool,
    pub is_changed: bool,
}

/// Build the tree for everything the engine currently knows.
pub fn build_tree(engine: &Engine) -> Vec<PackageNode> {
    let files = engine.files();
    let mut packages = engine.packages();
    packages.sort_by(package_order);

    packages
        .into_iter()
        .map(|package| {
            let own: Vec<&File> = files
                .iter()
                .filter(|f| f.item.package_uid == package.uid)
                .collect();
            package_node(engine, package, &own)
        })
        .collect()
}

fn package_node(engine: &Engine, package: PackageInfo, files: &[&File]) -> PackageNode {
    let config = engine.config();
    let folders = SchemaType::iter()
        .filter_map(|ty| {
            let mut of_type: Vec<&File> = files
                .iter()
                .copied()
                .filter(|f| f.schema_type() == ty)
                .collect();
            if of_type.is_empty() {
                return None;
            }
            of_type.sort_by(|a, b| file_order(a, b));
            Some(inner_folder(engine, config, ty, &of_type))
        })
        .collect();

    PackageNode {
        path: engine.package_path(&package),
        description: format!("{} {} [{} files]", package.maintainer, package.version, files.len()),
        tooltip: format!(
            "Maintainer: {}\nDescription: {}",
            package.maintainer, package.description
        ),
        folders,
        package,
    }
}

fn inner_folder(engine: &Engine, config: &SchemataConfig, ty: SchemaType, files: &[&File]) -> InnerFolder {
    let label = config.label(ty);
    InnerFolder {
        schema_type: ty,
        tooltip: format!("{label} {}", files.len()),
        label,
        files: files
            .iter()
            .map(|f| FileNode {
                name: f.file_name(config),
                path: engine.path_of(f),
                description: file_description(f),
                is_locked: f.item.is_locked,
                is_changed: f.item.is_changed,
            })
            .collect(),
    }
}

/// Title, unless the name already shows it.
fn file_description(file: &File) -> Option<String> {
    file.item
        .title
        .as_ref()
        .filter(|t| !t.is_empty() && !file.item.name.contains(t.as_str()))
        .cloned()
}

/// Writable packages first, then by name.
pub fn package_order(a: &PackageInfo, b: &PackageInfo) -> Ordering {
    a.is_read_only
        .cmp(&b.is_read_only)
        .then_with(|| a.name.cmp(&b.name))
}

/// Files needing attention first: locked and changed, changed, locked, rest.
pub fn file_order(a: &File, b: &File) -> Ordering {
    fn rank(f: &File) -> u8 {
        match (f.item.is_locked, f.item.is_changed) {
            (true, true) => 0,
            (false, true) => 1,
            (true, false) => 2,
            (false, false) => 3,
        }
    }
    rank(a)
        .cmp(&rank(b))
        .then_with(|| a.item.name.cmp(&b.item.name))
}
