//! Schema payloads: the loaded content of one remote object.

use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::SchemaUid;

/// One localized caption value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedValue {
    #[serde(default)]
    pub culture_name: String,
    #[serde(default)]
    pub value: String,
}

/// Reference to a parent schema in the single-inheritance chain.
///
/// The remote sometimes sends an empty object for "no parent", so the
/// identity is optional even when the reference itself is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentRef {
    #[serde(rename = "uId", default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<SchemaUid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Loaded payload for a workspace item.
///
/// Fields the engine does not interpret are kept verbatim in `extra` and
/// serialized back unchanged, since the remote save operation expects the
/// whole document it handed out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "uId", default)]
    pub uid: SchemaUid,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    #[serde(default)]
    pub less: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
    #[serde(default)]
    pub caption: Vec<LocalizedValue>,
    #[serde(default)]
    pub extend_parent: bool,
    #[serde(default)]
    pub is_read_only: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Schema {
    /// Create a schema with the given body and no parent.
    pub fn new(uid: SchemaUid, name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            uid,
            name: name.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Attach a parent reference.
    pub fn with_parent(mut self, parent: SchemaUid) -> Self {
        self.parent = Some(ParentRef {
            uid: Some(parent),
            ..ParentRef::default()
        });
        self
    }

    /// Attach stylesheet content.
    pub fn with_less(mut self, less: impl Into<String>) -> Self {
        self.less = Some(less.into());
        self
    }

    /// Identity of the parent schema, if the chain continues.
    pub fn parent_uid(&self) -> Option<SchemaUid> {
        self.parent.as_ref().and_then(|p| p.uid).filter(|uid| !uid.is_nil())
    }

    /// Stylesheet content, if present and non-empty.
    pub fn less_content(&self) -> Option<&str> {
        self.less.as_deref().filter(|l| !l.is_empty())
    }

    /// Caption for a culture, falling back to the first caption.
    pub fn caption_for(&self, culture: &str) -> Option<&str> {
        self.caption
            .iter()
            .find(|c| c.culture_name == culture)
            .or_else(|| self.caption.first())
            .map(|c| c.value.as_str())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
