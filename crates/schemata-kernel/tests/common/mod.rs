//! Shared engine fixture: in-memory remote, scripted prompts, manual change
//! batching, and a throwaway cache directory.

#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use schemata_client::MemoryRepository;
use schemata_kernel::{
    ConnectionInfo, Engine, ManualScheduler, SchemataConfig, ScriptedInteraction, VfsPath,
};
use schemata_types::{PackageInfo, Schema, SchemaType, SchemaUid, WorkspaceItem};

pub const ROOT: &str = "crm.local";

pub struct Fixture {
    pub tmp: TempDir,
    pub repo: Arc<MemoryRepository>,
    pub interaction: Arc<ScriptedInteraction>,
    pub scheduler: Arc<ManualScheduler>,
    pub engine: Arc<Engine>,
}

impl Fixture {
    pub fn new(repo: MemoryRepository) -> Self {
        Self::with(repo, ScriptedInteraction::new(), |_| {})
    }

    pub fn with(
        repo: MemoryRepository,
        interaction: ScriptedInteraction,
        tweak: impl FnOnce(&mut SchemataConfig),
    ) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let tmp = TempDir::new().unwrap();
        let mut config = SchemataConfig {
            cache_base: tmp.path().to_path_buf(),
            connections: vec![ConnectionInfo::new("https://crm.local", "Supervisor", "Supervisor")],
            ..SchemataConfig::default()
        };
        tweak(&mut config);

        let repo = Arc::new(repo);
        let interaction = Arc::new(interaction);
        let scheduler = Arc::new(ManualScheduler::new());
        let engine = Engine::builder(ROOT, repo.clone())
            .config(config)
            .interaction(interaction.clone())
            .scheduler(scheduler.clone())
            .build();

        Self {
            tmp,
            repo,
            interaction,
            scheduler,
            engine,
        }
    }

    /// Reload and publish (then drop) the reload's own notifications.
    pub async fn loaded(self) -> Self {
        self.engine
            .reload(Default::default())
            .await
            .expect("fixture reload");
        self.engine.flush_changes();
        self
    }

    pub fn path(&self, package: &str, file: &str) -> VfsPath {
        VfsPath::file(ROOT, package, file)
    }
}

/// Add an item of `ty` with a served schema.
pub fn add(
    repo: &MemoryRepository,
    package: &PackageInfo,
    name: &str,
    ty: SchemaType,
    body: &str,
) -> WorkspaceItem {
    let item = WorkspaceItem::new(name, package.uid, package.name.clone(), ty);
    repo.add_item(item.clone(), Some(Schema::new(item.uid, name, body)));
    item
}

/// Add a client module whose schema extends `parent`.
pub fn add_child(
    repo: &MemoryRepository,
    package: &PackageInfo,
    name: &str,
    parent: SchemaUid,
) -> WorkspaceItem {
    let item = WorkspaceItem::new(name, package.uid, package.name.clone(), SchemaType::ClientUnit);
    let schema = Schema::new(item.uid, name, format!("define(\"{name}\")")).with_parent(parent);
    repo.add_item(item.clone(), Some(schema));
    item
}

/// One writable package `Custom` with a client module and a source file.
pub struct Crm {
    pub repo: MemoryRepository,
    pub custom: PackageInfo,
    pub page: WorkspaceItem,
    pub helper: WorkspaceItem,
}

pub fn crm() -> Crm {
    let repo = MemoryRepository::new();
    let custom = PackageInfo::new("Custom");
    repo.add_package(custom.clone());
    let page = add(&repo, &custom, "AccountPageV2", SchemaType::ClientUnit, "define(\"AccountPageV2\", {})");
    let helper = add(&repo, &custom, "AccountHelper", SchemaType::SourceCode, "namespace Custom {}");
    Crm {
        repo,
        custom,
        page,
        helper,
    }
}
