//! Workspace items and packages as listed by the remote repository.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::ids::{PackageUid, SchemaUid};

/// Kind of remote object.
///
/// Decoded from the integer the remote sends. Integers outside the known
/// range decode to [`SchemaType::Unknown`] rather than failing, so an item of
/// a newer kind is simply filtered out as a disabled type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
    EnumIter, EnumString,
)]
#[serde(from = "i32", into = "i32")]
pub enum SchemaType {
    SqlScript,
    Data,
    Dll,
    Entity,
    ClientUnit,
    SourceCode,
    Process,
    Case,
    ProcessUserTask,
    Unknown,
}

impl SchemaType {
    /// Wire integer used by the remote.
    pub fn code(self) -> i32 {
        match self {
            SchemaType::SqlScript => 0,
            SchemaType::Data => 1,
            SchemaType::Dll => 2,
            SchemaType::Entity => 3,
            SchemaType::ClientUnit => 4,
            SchemaType::SourceCode => 5,
            SchemaType::Process => 6,
            SchemaType::Case => 7,
            SchemaType::ProcessUserTask => 8,
            SchemaType::Unknown => -1,
        }
    }

    /// Whether the remote exposes a designer service (get/save) for this kind.
    pub fn has_designer(self) -> bool {
        matches!(
            self,
            SchemaType::SqlScript
                | SchemaType::Entity
                | SchemaType::ClientUnit
                | SchemaType::SourceCode
                | SchemaType::ProcessUserTask
        )
    }
}

impl From<i32> for SchemaType {
    fn from(code: i32) -> Self {
        match code {
            0 => SchemaType::SqlScript,
            1 => SchemaType::Data,
            2 => SchemaType::Dll,
            3 => SchemaType::Entity,
            4 => SchemaType::ClientUnit,
            5 => SchemaType::SourceCode,
            6 => SchemaType::Process,
            7 => SchemaType::Case,
            8 => SchemaType::ProcessUserTask,
            _ => SchemaType::Unknown,
        }
    }
}

impl From<SchemaType> for i32 {
    fn from(ty: SchemaType) -> i32 {
        ty.code()
    }
}

/// Lightweight identity and status record for one remote object.
///
/// Independent of whether the object's [`Schema`](crate::Schema) is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceItem {
    #[serde(rename = "uId")]
    pub uid: SchemaUid,
    pub name: String,
    #[serde(rename = "packageUId")]
    pub package_uid: PackageUid,
    #[serde(default)]
    pub package_name: String,
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub is_changed: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub is_read_only: bool,
    #[serde(default)]
    pub modified_on: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl WorkspaceItem {
    /// Create an unlocked, unchanged item.
    pub fn new(
        name: impl Into<String>,
        package_uid: PackageUid,
        package_name: impl Into<String>,
        schema_type: SchemaType,
    ) -> Self {
        Self {
            uid: SchemaUid::new(),
            name: name.into(),
            package_uid,
            package_name: package_name.into(),
            schema_type,
            is_changed: false,
            is_locked: false,
            is_read_only: false,
            modified_on: String::new(),
            title: None,
        }
    }
}

/// Remote package metadata, the root of one subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    #[serde(rename = "uId")]
    pub uid: PackageUid,
    pub name: String,
    #[serde(default)]
    pub maintainer: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub is_read_only: bool,
    #[serde(default)]
    pub description: String,
}

impl PackageInfo {
    /// Create a writable package.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uid: PackageUid::new(),
            name: name.into(),
            maintainer: String::new(),
            version: String::new(),
            is_read_only: false,
            description: String::new(),
        }
    }
}
