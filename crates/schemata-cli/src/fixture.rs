//! Offline repository contents loaded from a JSON document.
//!
//! ```json
//! {
//!   "packages": [{ "uId": "...", "name": "Custom" }],
//!   "items":    [{ "uId": "...", "name": "AccountPageV2", "packageUId": "...", "type": 4 }],
//!   "schemas":  [{ "uId": "...", "name": "AccountPageV2", "body": "define(...)" }]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use schemata_client::MemoryRepository;
use schemata_types::{PackageInfo, Schema, WorkspaceItem};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub packages: Vec<PackageInfo>,
    pub items: Vec<WorkspaceItem>,
    pub schemas: Vec<Schema>,
}

impl Fixture {
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid fixture document")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading fixture {}", path.display()))?;
        Self::parse(&json)
    }

    /// Build a repository serving this fixture. Items without a schema are
    /// listed but return nothing when fetched.
    pub fn into_repository(self) -> MemoryRepository {
        let repo = MemoryRepository::new();
        let mut schemas: HashMap<_, _> = self.schemas.into_iter().map(|s| (s.uid, s)).collect();
        for package in self.packages {
            repo.add_package(package);
        }
        for item in self.items {
            let schema = schemas.remove(&item.uid);
            repo.add_item(item, schema);
        }
        if !schemas.is_empty() {
            tracing::warn!(count = schemas.len(), "fixture schemas without a matching item");
        }
        repo
    }
}
