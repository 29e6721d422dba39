//! Engine behavior against the in-memory repository.

mod common;

use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;

use common::{Fixture, ROOT, add, add_child, crm};
use schemata_client::{MemoryRepository, Operation, RemoteError};
use schemata_kernel::{
    ChangeKind, FileChange, ReconnectChoice, ReloadError, ScriptedInteraction, VfsError, VfsOps,
    VfsPath, WriteOptions, build_tree,
};
use schemata_types::{BuildMessage, PackageInfo, Schema, SchemaType, SchemaUid, WorkspaceItem};

// ============================================================================
// Reload
// ============================================================================

#[tokio::test]
async fn test_reload_builds_tree_from_two_packages() {
    let repo = MemoryRepository::new();
    let custom = PackageInfo::new("Custom");
    let base = PackageInfo::new("Base");
    repo.add_package(custom.clone());
    repo.add_package(base.clone());
    add(&repo, &custom, "AccountPageV2", SchemaType::ClientUnit, "a");
    add(&repo, &custom, "AccountHelper", SchemaType::SourceCode, "b");
    add(&repo, &base, "BaseScript", SchemaType::SqlScript, "c");
    let fx = Fixture::new(repo);

    let summary = fx.engine.reload(CancellationToken::new()).await.unwrap();
    assert_eq!(summary.packages, 2);
    assert_eq!(summary.files, 3);
    assert_eq!(fx.engine.packages().len(), 2);
    assert_eq!(fx.engine.files().len(), 3);
    assert!(fx.engine.files().iter().all(|f| !f.is_loaded()));
}

#[tokio::test]
async fn test_reload_with_only_disabled_types_fails_empty() {
    let repo = MemoryRepository::new();
    let custom = PackageInfo::new("Custom");
    repo.add_package(custom.clone());
    add(&repo, &custom, "Account", SchemaType::Entity, "{}");
    add(&repo, &custom, "AccountData", SchemaType::Data, "{}");
    let fx = Fixture::new(repo);

    let err = fx.engine.reload(CancellationToken::new()).await.unwrap_err();
    assert_eq!(err, ReloadError::NoSchemas);
    assert!(fx.engine.files().is_empty());
    assert!(fx.engine.packages().is_empty());
    assert_eq!(fx.interaction.errors().len(), 1);
}

#[tokio::test]
async fn test_reload_without_packages_fails() {
    let fx = Fixture::new(MemoryRepository::new());
    let err = fx.engine.reload(CancellationToken::new()).await.unwrap_err();
    assert_eq!(err, ReloadError::NoPackages);
}

#[tokio::test]
async fn test_concurrent_reloads_share_one_execution() {
    let crm = crm();
    crm.repo.set_latency(Some(Duration::from_millis(20)));
    let fx = Fixture::new(crm.repo);

    let (a, b) = tokio::join!(
        fx.engine.reload(CancellationToken::new()),
        fx.engine.reload(CancellationToken::new()),
    );
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(fx.repo.calls(Operation::GetPackages), 1);
    assert_eq!(fx.repo.calls(Operation::GetWorkspaceItems), 1);

    // Slot is free again afterwards.
    fx.engine.reload(CancellationToken::new()).await.unwrap();
    assert_eq!(fx.repo.calls(Operation::GetPackages), 2);
}

#[tokio::test]
async fn test_cancelled_reload_leaves_empty_state() {
    let fx = Fixture::new(crm().repo).loaded().await;
    assert_eq!(fx.engine.files().len(), 2);

    let token = CancellationToken::new();
    token.cancel();
    let err = fx.engine.reload(token).await.unwrap_err();
    assert_eq!(err, ReloadError::Cancelled);
    assert!(fx.engine.files().is_empty());
    assert!(fx.engine.packages().is_empty());
    assert!(fx.interaction.errors().is_empty());
}

#[tokio::test]
async fn test_reload_logs_in_with_saved_connection() {
    let crm = crm();
    crm.repo.set_connected(false);
    let fx = Fixture::new(crm.repo);

    fx.engine.reload(CancellationToken::new()).await.unwrap();
    assert_eq!(fx.repo.calls(Operation::Login), 1);
}

#[tokio::test]
async fn test_reload_keeps_previously_cached_bodies() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let path = fx.path("Custom", "AccountPageV2.js");
    fx.engine.get_file(&path, true).await.unwrap();

    fx.engine.reload(CancellationToken::new()).await.unwrap();
    let cached = fx.engine.cache().read(&path).await.unwrap();
    assert!(cached.is_loaded());
    fx.engine.get_file(&path, true).await.unwrap();
    assert_eq!(fx.repo.calls(Operation::GetSchema), 1);
}

#[tokio::test]
async fn test_reload_publishes_one_batch() {
    let fx = Fixture::new(crm().repo);
    let mut rx = fx.engine.subscribe_changes();
    let tree = fx.engine.subscribe_tree();

    fx.engine.reload(CancellationToken::new()).await.unwrap();
    assert!(tree.has_changed().unwrap());
    assert_eq!(fx.scheduler.pending(), 1);
    assert_eq!(fx.scheduler.fire(), 1);

    let batch = rx.try_recv().unwrap();
    assert_eq!(batch.len(), 3);
    assert!(batch.iter().all(|c| c.kind == ChangeKind::Created));
    assert!(rx.try_recv().is_err());
}

// ============================================================================
// Read path
// ============================================================================

#[tokio::test]
async fn test_uncached_get_fetches_once_and_caches() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let path = fx.path("Custom", "AccountPageV2.js");

    let file = fx.engine.get_file(&path, false).await.unwrap();
    assert_eq!(file.body(), "define(\"AccountPageV2\", {})");
    assert_eq!(fx.repo.calls(Operation::GetSchema), 1);

    let cached = fx.engine.cache().read(&path).await.unwrap();
    assert!(cached.is_loaded());
    assert_eq!(cached.uid(), crm.page.uid);

    fx.engine.get_file(&path, false).await.unwrap();
    assert_eq!(fx.repo.calls(Operation::GetSchema), 1);
}

#[tokio::test]
async fn test_get_unknown_path_is_not_found() {
    let fx = Fixture::new(crm().repo).loaded().await;
    let err = fx
        .engine
        .get_file(&fx.path("Custom", "Missing.js"), false)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_get_without_remote_schema_is_not_found() {
    let crm = crm();
    crm.repo.remove_schema(crm.page.uid);
    let fx = Fixture::new(crm.repo).loaded().await;
    let err = fx
        .engine
        .get_file(&fx.path("Custom", "AccountPageV2.js"), false)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_concurrent_disconnected_reads_prompt_once() {
    let interaction = ScriptedInteraction::new()
        .with_reconnect(ReconnectChoice::Reconnect)
        .with_reconnect_delay(Duration::from_millis(50));
    let fx = Fixture::with(crm().repo, interaction, |_| {}).loaded().await;
    fx.repo.set_connected(false);
    let page = fx.path("Custom", "AccountPageV2.js");
    let helper = fx.path("Custom", "AccountHelper.cs");

    let (a, b) = tokio::join!(fx.engine.get_file(&page, false), fx.engine.get_file(&helper, false));
    assert_eq!(fx.interaction.reconnect_prompts(), 1);
    assert!(a.is_ok());
    assert!(b.unwrap_err().is_connection());
    assert!(fx.repo.calls(Operation::Login) >= 1);

    // Prompt slot released: the helper now reads normally.
    fx.engine.get_file(&helper, false).await.unwrap();
    assert_eq!(fx.interaction.reconnect_prompts(), 1);
}

#[tokio::test]
async fn test_declined_reconnect_closes_editor() {
    let fx = Fixture::new(crm().repo).loaded().await;
    fx.repo.set_connected(false);
    let path = fx.path("Custom", "AccountPageV2.js");

    let err = fx.engine.get_file(&path, false).await.unwrap_err();
    assert!(err.is_connection());
    assert_eq!(fx.interaction.closed_editors(), vec![path]);
}

#[tokio::test]
async fn test_disconnected_without_saved_login_fails_fast() {
    let fx = Fixture::with(crm().repo, ScriptedInteraction::new(), |c| c.connections.clear());
    let fx = fx.loaded().await;
    fx.repo.set_connected(false);

    let err = fx
        .engine
        .get_file(&fx.path("Custom", "AccountPageV2.js"), false)
        .await
        .unwrap_err();
    assert!(err.is_connection());
    assert_eq!(fx.interaction.reconnect_prompts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_reconnect_gives_up_after_attempts() {
    let interaction = ScriptedInteraction::new()
        .with_reconnect(ReconnectChoice::Dismissed)
        .with_reconnect_delay(Duration::from_secs(1));
    let fx = Fixture::with(crm().repo, interaction, |c| c.max_reconnect_attempts = 2).loaded().await;
    fx.repo.set_connected(false);

    let err = fx
        .engine
        .get_file(&fx.path("Custom", "AccountPageV2.js"), false)
        .await
        .unwrap_err();
    assert!(err.is_connection());
    assert_eq!(fx.interaction.reconnect_prompts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_host_stays_claimed_during_reconnect_backoff() {
    let interaction = ScriptedInteraction::new()
        .with_reconnect(ReconnectChoice::Dismissed)
        .with_reconnect_delay(Duration::from_secs(1));
    let fx = Fixture::with(crm().repo, interaction, |c| {
        c.max_reconnect_attempts = 2;
        c.reconnect_backoff_secs = 4;
    })
    .loaded()
    .await;
    fx.repo.set_connected(false);
    let page = fx.path("Custom", "AccountPageV2.js");
    let helper = fx.path("Custom", "AccountHelper.cs");

    // Arrives after the first prompt was dismissed, while its reader backs off.
    let late = async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        fx.engine.get_file(&helper, false).await
    };
    let (first, second) = tokio::join!(fx.engine.get_file(&page, false), late);
    assert!(first.unwrap_err().is_connection());
    assert!(second.unwrap_err().is_connection());
    assert_eq!(fx.interaction.reconnect_prompts(), 2);
}

// ============================================================================
// Staleness verification
// ============================================================================

async fn stale_fixture(accept: bool) -> (Fixture, VfsPath, SchemaUid) {
    let crm = crm();
    let interaction = ScriptedInteraction::new().with_pull(accept);
    let fx = Fixture::with(crm.repo, interaction, |c| c.careful_mode = true).loaded().await;
    let uid = crm.page.uid;
    let path = fx.path("Custom", "AccountPageV2.js");

    let mut cached = fx.engine.file(uid).unwrap();
    cached.schema = Some(Schema::new(uid, "AccountPageV2", "cached body"));
    cached.last_synced = SystemTime::UNIX_EPOCH;
    fx.engine.cache().write(&cached).await.unwrap();
    fx.repo.set_schema(uid, Schema::new(uid, "AccountPageV2", "remote body"));
    (fx, path, uid)
}

#[tokio::test]
async fn test_stale_cache_prompts_once_and_pulls() {
    let (fx, path, uid) = stale_fixture(true).await;
    let mut rx = fx.engine.subscribe_changes();

    let file = fx.engine.get_file(&path, false).await.unwrap();
    assert_eq!(file.body(), "cached body");
    fx.engine.settle().await;
    assert_eq!(fx.interaction.pull_prompts(), 1);

    assert_eq!(fx.engine.file(uid).unwrap().body(), "remote body");
    let on_disk = fx.engine.cache().read(&path).await.unwrap();
    assert_eq!(on_disk.body(), "remote body");

    fx.engine.flush_changes();
    assert_eq!(rx.try_recv().unwrap(), vec![FileChange::changed(path.clone())]);

    // Freshly stamped: no second check.
    fx.engine.get_file(&path, false).await.unwrap();
    fx.engine.settle().await;
    assert_eq!(fx.interaction.pull_prompts(), 1);
}

#[tokio::test]
async fn test_stale_cache_decline_keeps_cached_body() {
    let (fx, path, uid) = stale_fixture(false).await;

    fx.engine.get_file(&path, false).await.unwrap();
    fx.engine.settle().await;
    assert_eq!(fx.interaction.pull_prompts(), 1);
    assert_eq!(fx.engine.file(uid).unwrap().body(), "cached body");
    assert_eq!(fx.engine.cache().read(&path).await.unwrap().body(), "cached body");
}

#[tokio::test]
async fn test_silent_reads_skip_verification() {
    let (fx, path, _) = stale_fixture(true).await;
    fx.engine.get_file(&path, true).await.unwrap();
    fx.engine.settle().await;
    assert_eq!(fx.interaction.pull_prompts(), 0);
}

#[tokio::test]
async fn test_matching_body_does_not_prompt() {
    let (fx, path, uid) = stale_fixture(true).await;
    fx.repo.set_schema(uid, Schema::new(uid, "AccountPageV2", "cached body"));
    fx.engine.get_file(&path, false).await.unwrap();
    fx.engine.settle().await;
    assert_eq!(fx.interaction.pull_prompts(), 0);
    assert_eq!(fx.repo.calls(Operation::GetSchema), 1);
}

#[tokio::test]
async fn test_sync_stamp_survives_reload() {
    let (fx, path, _) = stale_fixture(false).await;

    fx.engine.get_file(&path, false).await.unwrap();
    fx.engine.settle().await;
    assert_eq!(fx.interaction.pull_prompts(), 1);

    fx.engine.reload(CancellationToken::new()).await.unwrap();
    fx.engine.get_file(&path, false).await.unwrap();
    fx.engine.settle().await;
    assert_eq!(fx.interaction.pull_prompts(), 1);
    assert_eq!(fx.repo.calls(Operation::GetSchema), 1);
}

// ============================================================================
// Edits, save, locking, restore
// ============================================================================

#[tokio::test]
async fn test_local_write_stays_local() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let path = fx.path("Custom", "AccountPageV2.js");
    fx.engine.get_file(&path, false).await.unwrap();

    fx.engine.write_file(&path, b"define(\"edited\")", WriteOptions::edit()).await.unwrap();
    assert_eq!(fx.engine.cache().read(&path).await.unwrap().body(), "define(\"edited\")");
    assert_eq!(fx.repo.calls(Operation::SaveSchema), 0);
    assert!(!fx.engine.file(crm.page.uid).unwrap().item.is_changed);
}

#[tokio::test]
async fn test_write_with_overwrite_saves_and_marks() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let path = fx.path("Custom", "AccountPageV2.js");
    fx.engine.get_file(&path, false).await.unwrap();
    let mut rx = fx.engine.subscribe_changes();

    fx.engine.write_file(&path, b"saved", WriteOptions::save()).await.unwrap();
    assert_eq!(fx.repo.schema(crm.page.uid).unwrap().body, "saved");

    let file = fx.engine.file(crm.page.uid).unwrap();
    assert!(file.item.is_changed);
    assert!(file.item.is_locked);
    assert!(!file.item.modified_on.is_empty());
    let on_disk = fx.engine.cache().read(&path).await.unwrap();
    assert!(on_disk.item.is_changed && on_disk.item.is_locked);

    fx.engine.flush_changes();
    let batch = rx.try_recv().unwrap();
    assert!(batch.iter().all(|c| c.kind == ChangeKind::Changed && c.path == path));
}

#[tokio::test]
async fn test_rejected_save_leaves_flags() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let path = fx.path("Custom", "AccountPageV2.js");
    fx.engine.get_file(&path, false).await.unwrap();
    fx.repo.reject(Operation::SaveSchema, "syntax error");

    let err = fx.engine.write_file(&path, b"broken", WriteOptions::save()).await.unwrap_err();
    assert!(matches!(err, VfsError::Rejected(_)));
    let file = fx.engine.file(crm.page.uid).unwrap();
    assert!(!file.item.is_changed);
    assert!(!file.item.is_locked);
    assert_eq!(fx.interaction.errors(), vec!["syntax error".to_string()]);
}

#[tokio::test]
async fn test_save_keeps_edit_made_while_in_flight() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let path = fx.path("Custom", "AccountPageV2.js");
    fx.engine.get_file(&path, false).await.unwrap();
    fx.repo.set_latency(Some(Duration::from_millis(50)));

    let edit = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        fx.engine.write_file(&path, b"edited", WriteOptions::edit()).await
    };
    let (saved, edited) = tokio::join!(fx.engine.save_file(&path), edit);
    saved.unwrap();
    edited.unwrap();

    let file = fx.engine.file(crm.page.uid).unwrap();
    assert_eq!(file.body(), "edited");
    assert!(file.item.is_changed && file.item.is_locked);
    let on_disk = fx.engine.cache().read(&path).await.unwrap();
    assert_eq!(on_disk.body(), "edited");
    assert!(on_disk.item.is_changed);
}

#[tokio::test]
async fn test_write_less_content() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    fx.engine.get_file(&fx.path("Custom", "AccountPageV2.js"), false).await.unwrap();

    let less = fx.path("Custom", "AccountPageV2.less");
    fx.engine.write_file(&less, b".page { }", WriteOptions::edit()).await.unwrap();
    let file = fx.engine.file(crm.page.uid).unwrap();
    assert_eq!(file.less(), Some(".page { }"));
    assert_eq!(file.body(), "define(\"AccountPageV2\", {})");
}

#[tokio::test]
async fn test_write_without_cached_file() {
    let fx = Fixture::new(crm().repo).loaded().await;
    let path = fx.path("Custom", "AccountPageV2.js");

    let err = fx.engine.write_file(&path, b"x", WriteOptions::edit()).await.unwrap_err();
    assert!(err.is_not_found());
    let create = WriteOptions {
        create: true,
        overwrite: false,
    };
    let err = fx.engine.write_file(&fx.path("Custom", "New.js"), b"x", create).await.unwrap_err();
    assert!(matches!(err, VfsError::Unsupported(_)));
}

#[tokio::test]
async fn test_lock_mirrors_to_memory_and_disk() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let page = fx.path("Custom", "AccountPageV2.js");
    let helper = fx.path("Custom", "AccountHelper.cs");

    fx.engine.lock_schema(&[page.clone(), helper.clone()]).await.unwrap();
    assert_eq!(fx.repo.calls(Operation::LockSchema), 1);
    for (path, uid) in [(&page, crm.page.uid), (&helper, crm.helper.uid)] {
        assert!(fx.engine.file(uid).unwrap().item.is_locked);
        assert!(fx.engine.cache().read(path).await.unwrap().item.is_locked);
    }

    fx.engine.unlock_schema(&[page.clone()]).await.unwrap();
    assert!(!fx.engine.file(crm.page.uid).unwrap().item.is_locked);
    assert!(!fx.engine.cache().read(&page).await.unwrap().item.is_locked);
}

#[tokio::test]
async fn test_failed_lock_leaves_unlocked() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let page = fx.path("Custom", "AccountPageV2.js");
    fx.repo.reject(Operation::LockSchema, "locked by another user");

    let err = fx.engine.lock_schema(&[page.clone()]).await.unwrap_err();
    assert!(matches!(err, VfsError::Rejected(_)));
    assert!(!fx.engine.file(crm.page.uid).unwrap().item.is_locked);
    assert!(!fx.engine.cache().read(&page).await.unwrap().item.is_locked);
    assert_eq!(fx.interaction.errors().len(), 1);
}

#[tokio::test]
async fn test_lock_keeps_edit_made_while_in_flight() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let page = fx.path("Custom", "AccountPageV2.js");
    fx.engine.get_file(&page, false).await.unwrap();
    fx.repo.set_latency(Some(Duration::from_millis(50)));

    let edit = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        fx.engine.write_file(&page, b"edited", WriteOptions::edit()).await
    };
    let (locked, edited) = tokio::join!(fx.engine.lock_schema(std::slice::from_ref(&page)), edit);
    locked.unwrap();
    edited.unwrap();

    let file = fx.engine.file(crm.page.uid).unwrap();
    assert_eq!(file.body(), "edited");
    assert!(file.item.is_locked);
    let on_disk = fx.engine.cache().read(&page).await.unwrap();
    assert_eq!(on_disk.body(), "edited");
    assert!(on_disk.item.is_locked);
}

#[tokio::test]
async fn test_restore_requires_changes() {
    let fx = Fixture::new(crm().repo).loaded().await;
    let err = fx
        .engine
        .restore_schema(&fx.path("Custom", "AccountPageV2.js"))
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::NotChanged(_)));
    assert_eq!(fx.repo.calls(Operation::RevertElements), 0);
}

#[tokio::test]
async fn test_restore_reverts_and_reloads() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let path = fx.path("Custom", "AccountPageV2.js");
    fx.engine.get_file(&path, false).await.unwrap();
    fx.engine.write_file(&path, b"mine", WriteOptions::save()).await.unwrap();
    fx.repo.set_schema(crm.page.uid, Schema::new(crm.page.uid, "AccountPageV2", "theirs"));

    let file = fx.engine.restore_schema(&path).await.unwrap();
    assert_eq!(file.body(), "theirs");
    assert!(!file.item.is_changed && !file.item.is_locked);
    let on_disk = fx.engine.cache().read(&path).await.unwrap();
    assert_eq!(on_disk.body(), "theirs");
    assert!(!on_disk.item.is_changed);
}

async fn saved_page() -> (Fixture, VfsPath, SchemaUid) {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let path = fx.path("Custom", "AccountPageV2.js");
    fx.engine.get_file(&path, false).await.unwrap();
    fx.engine.write_file(&path, b"mine", WriteOptions::save()).await.unwrap();
    (fx, path, crm.page.uid)
}

#[tokio::test]
async fn test_restore_reports_transport_failure() {
    let (fx, path, uid) = saved_page().await;
    fx.repo.fail(Operation::RevertElements, RemoteError::Transport("reset".into()));

    let err = fx.engine.restore_schema(&path).await.unwrap_err();
    assert!(matches!(err, VfsError::Remote(_)));
    assert_eq!(fx.interaction.errors().len(), 1);
    assert!(fx.engine.file(uid).unwrap().item.is_changed);
}

#[tokio::test]
async fn test_restore_clears_flags_when_refetch_fails() {
    let (fx, path, uid) = saved_page().await;
    fx.repo.fail(Operation::GetSchema, RemoteError::Transport("reset".into()));

    let err = fx.engine.restore_schema(&path).await.unwrap_err();
    assert!(matches!(err, VfsError::Remote(_)));
    assert_eq!(fx.repo.calls(Operation::RevertElements), 1);
    assert_eq!(fx.interaction.errors().len(), 1);

    let file = fx.engine.file(uid).unwrap();
    assert!(!file.item.is_changed && !file.item.is_locked);
    let on_disk = fx.engine.cache().read(&path).await.unwrap();
    assert!(!on_disk.item.is_changed && !on_disk.item.is_locked);
}

#[tokio::test]
async fn test_reload_file_refetches() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let path = fx.path("Custom", "AccountPageV2.js");
    fx.engine.get_file(&path, false).await.unwrap();
    fx.repo.set_schema(crm.page.uid, Schema::new(crm.page.uid, "AccountPageV2", "newer"));

    let file = fx.engine.reload_file(&path).await.unwrap();
    assert_eq!(file.body(), "newer");
    assert_eq!(fx.engine.get_file(&path, false).await.unwrap().body(), "newer");
}

// ============================================================================
// Inheritance
// ============================================================================

#[tokio::test]
async fn test_parent_chain_stops_on_cycle() {
    let repo = MemoryRepository::new();
    let custom = PackageInfo::new("Custom");
    repo.add_package(custom.clone());
    let a = WorkspaceItem::new("A", custom.uid, "Custom", SchemaType::ClientUnit);
    let b = WorkspaceItem::new("B", custom.uid, "Custom", SchemaType::ClientUnit);
    repo.add_item(a.clone(), Some(Schema::new(a.uid, "A", "a").with_parent(b.uid)));
    repo.add_item(b.clone(), Some(Schema::new(b.uid, "B", "b").with_parent(a.uid)));
    let fx = Fixture::new(repo).loaded().await;

    let start = fx.engine.file(a.uid).unwrap();
    let chain = fx.engine.get_parent_files(&start, &CancellationToken::new()).await;
    let names: Vec<_> = chain.files.iter().map(|f| f.item.name.as_str()).collect();
    assert_eq!(names, ["A", "B"]);
    assert!(!chain.cancelled);
}

#[tokio::test]
async fn test_parent_chain_stops_at_missing_parent() {
    let repo = MemoryRepository::new();
    let custom = PackageInfo::new("Custom");
    repo.add_package(custom.clone());
    let base = add(&repo, &custom, "Base", SchemaType::ClientUnit, "base");
    let child = add_child(&repo, &custom, "Child", base.uid);
    let orphan = add_child(&repo, &custom, "Orphan", SchemaUid::new());
    let fx = Fixture::new(repo).loaded().await;

    let chain = fx
        .engine
        .get_parent_files(&fx.engine.file(child.uid).unwrap(), &CancellationToken::new())
        .await;
    assert_eq!(chain.files.len(), 2);

    let chain = fx
        .engine
        .get_parent_files(&fx.engine.file(orphan.uid).unwrap(), &CancellationToken::new())
        .await;
    assert_eq!(chain.files.len(), 1);
}

#[tokio::test]
async fn test_parent_chain_honors_cancellation() {
    let repo = MemoryRepository::new();
    let custom = PackageInfo::new("Custom");
    repo.add_package(custom.clone());
    let base = add(&repo, &custom, "Base", SchemaType::ClientUnit, "base");
    let child = add_child(&repo, &custom, "Child", base.uid);
    let fx = Fixture::new(repo).loaded().await;

    let token = CancellationToken::new();
    token.cancel();
    let chain = fx.engine.get_parent_files(&fx.engine.file(child.uid).unwrap(), &token).await;
    assert_eq!(chain.files.len(), 1);
    assert!(chain.cancelled);
}

#[tokio::test]
async fn test_related_files_follow_replacement_chain() {
    let repo = MemoryRepository::new();
    let custom = PackageInfo::new("Custom");
    let base = PackageInfo::new("Base");
    repo.add_package(custom.clone());
    repo.add_package(base.clone());
    // Listed before its parent so the ordering has to come from the chain.
    let original = WorkspaceItem::new("AccountPageV2", base.uid, "Base", SchemaType::ClientUnit);
    add_child(&repo, &custom, "AccountPageV2", original.uid);
    repo.add_item(original.clone(), Some(Schema::new(original.uid, "AccountPageV2", "base page")));
    let fx = Fixture::new(repo).loaded().await;

    let related = fx.engine.get_related_files("AccountPageV2", &CancellationToken::new()).await;
    let packages: Vec<_> = related.files.iter().map(|f| f.item.package_name.as_str()).collect();
    assert_eq!(packages, ["Base", "Custom"]);
}

#[tokio::test]
async fn test_related_files_only_client_modules() {
    let crm = crm();
    let base = PackageInfo::new("Base");
    crm.repo.add_package(base.clone());
    add(&crm.repo, &base, "AccountPageV2", SchemaType::SourceCode, "namespace Base {}");
    let fx = Fixture::new(crm.repo).loaded().await;

    let related = fx.engine.get_related_files("AccountPageV2", &CancellationToken::new()).await;
    assert_eq!(related.files.len(), 1);
    assert_eq!(related.files[0].uid(), crm.page.uid);
}

// ============================================================================
// Bulk, build, clear
// ============================================================================

#[tokio::test]
async fn test_cache_folder_reports_progress() {
    let crm = crm();
    crm.repo.remove_schema(crm.helper.uid);
    let fx = Fixture::new(crm.repo).loaded().await;

    let mut seen = Vec::new();
    let summary = fx
        .engine
        .cache_folder(&VfsPath::package(ROOT, "Custom"), &CancellationToken::new(), |p| {
            seen.push((p.done, p.total))
        })
        .await
        .unwrap();
    assert_eq!(summary.loaded, 1);
    assert_eq!(summary.failed, 1);
    assert!(!summary.cancelled);
    assert_eq!(seen, [(1, 2), (2, 2)]);
    assert!(fx.engine.cache().read(&fx.path("Custom", "AccountPageV2.js")).await.unwrap().is_loaded());
}

#[tokio::test]
async fn test_cache_folder_cancelled() {
    let fx = Fixture::new(crm().repo).loaded().await;
    let token = CancellationToken::new();
    token.cancel();
    let summary = fx
        .engine
        .cache_folder(&VfsPath::package(ROOT, "Custom"), &token, |_| {})
        .await
        .unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.loaded, 0);
    assert_eq!(fx.repo.calls(Operation::GetSchema), 0);
}

#[tokio::test]
async fn test_build_reports_compiler_errors() {
    let fx = Fixture::new(crm().repo).loaded().await;
    assert!(fx.engine.build().await.unwrap().success);

    fx.repo.set_build_errors(vec![BuildMessage {
        file_name: "AccountHelper.cs".into(),
        line: 3,
        column: 7,
        error_number: "CS1002".into(),
        error_text: "; expected".into(),
    }]);
    let report = fx.engine.rebuild().await.unwrap();
    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert!(fx.interaction.errors()[0].contains("CS1002"));
}

#[tokio::test]
async fn test_clear_cache_after_confirmation() {
    let interaction = ScriptedInteraction::new().with_confirm(true);
    let fx = Fixture::with(crm().repo, interaction, |_| {}).loaded().await;
    let path = fx.path("Custom", "AccountPageV2.js");
    fx.engine.get_file(&path, false).await.unwrap();

    assert!(fx.engine.clear_cache().await.unwrap());
    assert!(fx.engine.files().is_empty());
    assert!(fx.engine.cache().read(&path).await.is_none());
}

#[tokio::test]
async fn test_clear_cache_declined() {
    let fx = Fixture::new(crm().repo).loaded().await;
    assert!(!fx.engine.clear_cache().await.unwrap());
    assert_eq!(fx.engine.files().len(), 2);
    assert_eq!(fx.interaction.confirm_prompts(), 1);
}

// ============================================================================
// VfsOps and tree
// ============================================================================

#[tokio::test]
async fn test_vfs_listing_and_reads() {
    let crm = crm();
    let fx = Fixture::new(crm.repo).loaded().await;
    let ops: &dyn VfsOps = fx.engine.as_ref();

    let root = ops.read_directory("bpmsoft://crm.local").await.unwrap();
    assert_eq!(root.len(), 1);
    assert_eq!(root[0].name, "Custom");
    assert!(ops.stat("/crm.local/Custom").await.unwrap().is_dir());

    let text = ops.read_to_string("bpmsoft://crm.local/Custom/AccountHelper.cs").await.unwrap();
    assert_eq!(text, "namespace Custom {}");

    let names: Vec<_> = ops
        .read_directory("/crm.local/Custom")
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["AccountPageV2.js", "AccountHelper.cs"]);
}

#[tokio::test]
async fn test_vfs_less_entry_after_load() {
    let repo = MemoryRepository::new();
    let custom = PackageInfo::new("Custom");
    repo.add_package(custom.clone());
    let page = WorkspaceItem::new("Page", custom.uid, "Custom", SchemaType::ClientUnit);
    repo.add_item(page.clone(), Some(Schema::new(page.uid, "Page", "body").with_less(".p {}")));
    let fx = Fixture::new(repo).loaded().await;
    let ops: &dyn VfsOps = fx.engine.as_ref();

    assert_eq!(ops.read_directory("/crm.local/Custom").await.unwrap().len(), 1);
    assert_eq!(ops.read_to_string("/crm.local/Custom/Page.less").await.unwrap(), ".p {}");
    assert_eq!(ops.read_directory("/crm.local/Custom").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_vfs_missing_stylesheet_is_not_found() {
    let fx = Fixture::new(crm().repo).loaded().await;
    let ops: &dyn VfsOps = fx.engine.as_ref();

    let less = "/crm.local/Custom/AccountPageV2.less";
    assert!(ops.stat(less).await.unwrap_err().is_not_found());
    assert!(ops.read_file(less).await.unwrap_err().is_not_found());
    assert!(ops.stat("/crm.local/Custom/AccountPageV2.js").await.unwrap().is_file());
}

#[tokio::test]
async fn test_vfs_settings_and_structure() {
    let fx = Fixture::new(crm().repo).loaded().await;
    let ops: &dyn VfsOps = fx.engine.as_ref();

    assert!(ops.stat("/crm.local/.vscode/settings.json").await.unwrap_err().is_not_found());
    assert!(ops.read_file("/crm.local/.vscode/settings.json").await.unwrap().is_empty());
    ops.write_file("/crm.local/.vscode/settings.json", b"{}", WriteOptions::save())
        .await
        .unwrap();
    assert!(matches!(
        ops.rename("/crm.local/Custom/A.js", "/crm.local/Custom/B.js").await,
        Err(VfsError::Unsupported(_))
    ));
    assert!(matches!(ops.delete("/crm.local/Custom").await, Err(VfsError::Unsupported(_))));
    assert!(ops.watch("/crm.local").is_ok());
}

#[tokio::test]
async fn test_stat_known_file_does_not_fetch() {
    let fx = Fixture::new(crm().repo).loaded().await;
    let ops: &dyn VfsOps = fx.engine.as_ref();
    let attr = ops.stat("/crm.local/Custom/AccountPageV2.js").await.unwrap();
    assert!(attr.is_file());
    assert_eq!(fx.repo.calls(Operation::GetSchema), 0);
}

#[tokio::test]
async fn test_tree_groups_by_type() {
    let crm = crm();
    let mut base = PackageInfo::new("Base");
    base.is_read_only = true;
    crm.repo.add_package(base.clone());
    add(&crm.repo, &base, "BaseScript", SchemaType::SqlScript, "select 1");
    let fx = Fixture::new(crm.repo).loaded().await;
    fx.engine.lock_schema(&[fx.path("Custom", "AccountHelper.cs")]).await.unwrap();

    let tree = build_tree(&fx.engine);
    let names: Vec<_> = tree.iter().map(|p| p.package.name.as_str()).collect();
    assert_eq!(names, ["Custom", "Base"]);

    let custom = &tree[0];
    assert!(custom.description.ends_with("[2 files]"));
    let labels: Vec<_> = custom.folders.iter().map(|f| f.label.as_str()).collect();
    assert_eq!(labels, ["Client modules", "Source code"]);
    assert!(custom.folders.iter().all(|f| f.tooltip.ends_with(" 1")));
    assert!(custom.folders.iter().flat_map(|f| &f.files).any(|f| f.is_locked));
}
