//! User interaction seam.
//!
//! The engine suspends on the user in three places: offering to reconnect a
//! dropped session, offering to pull a newer remote body, and confirming a
//! destructive action. An editor integration implements [`Interaction`];
//! [`ScriptedInteraction`] answers from a fixed script and counts prompts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, info};

use crate::vfs::VfsPath;

/// Answer to a reconnect prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectChoice {
    Reconnect,
    Decline,
    /// Prompt closed without an answer.
    Dismissed,
}

#[async_trait]
pub trait Interaction: Send + Sync {
    async fn confirm_reconnect(&self, host: &str) -> ReconnectChoice;

    /// Remote `name` differs from the cached copy at `path`; pull it?
    async fn confirm_pull(&self, path: &VfsPath, name: &str) -> bool;

    async fn confirm(&self, message: &str) -> bool;

    /// Close any editor showing `path`.
    fn close_editor(&self, _path: &VfsPath) {}

    fn report_error(&self, message: &str) {
        error!("{message}");
    }

    fn report_info(&self, message: &str) {
        info!("{message}");
    }
}

/// Prompt counters kept by [`ScriptedInteraction`].
#[derive(Debug, Default)]
struct Counters {
    reconnect: AtomicUsize,
    pull: AtomicUsize,
    confirm: AtomicUsize,
}

/// Answers every prompt from fixed settings.
pub struct ScriptedInteraction {
    reconnect: Mutex<ReconnectChoice>,
    pull: Mutex<bool>,
    confirm: Mutex<bool>,
    /// Time each reconnect prompt stays open before answering.
    reconnect_delay: Mutex<Option<Duration>>,
    counters: Counters,
    closed: Mutex<Vec<VfsPath>>,
    errors: Mutex<Vec<String>>,
}

impl Default for ScriptedInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedInteraction {
    /// Declines everything.
    pub fn new() -> Self {
        Self {
            reconnect: Mutex::new(ReconnectChoice::Decline),
            pull: Mutex::new(false),
            confirm: Mutex::new(false),
            reconnect_delay: Mutex::new(None),
            counters: Counters::default(),
            closed: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reconnect(self, choice: ReconnectChoice) -> Self {
        *self.reconnect.lock() = choice;
        self
    }

    pub fn with_pull(self, accept: bool) -> Self {
        *self.pull.lock() = accept;
        self
    }

    pub fn with_confirm(self, accept: bool) -> Self {
        *self.confirm.lock() = accept;
        self
    }

    pub fn with_reconnect_delay(self, delay: Duration) -> Self {
        *self.reconnect_delay.lock() = Some(delay);
        self
    }

    pub fn set_reconnect(&self, choice: ReconnectChoice) {
        *self.reconnect.lock() = choice;
    }

    pub fn set_pull(&self, accept: bool) {
        *self.pull.lock() = accept;
    }

    pub fn reconnect_prompts(&self) -> usize {
        self.counters.reconnect.load(Ordering::SeqCst)
    }

    pub fn pull_prompts(&self) -> usize {
        self.counters.pull.load(Ordering::SeqCst)
    }

    pub fn confirm_prompts(&self) -> usize {
        self.counters.confirm.load(Ordering::SeqCst)
    }

    pub fn closed_editors(&self) -> Vec<VfsPath> {
        self.closed.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }
}

#[async_trait]
impl Interaction for ScriptedInteraction {
    async fn confirm_reconnect(&self, host: &str) -> ReconnectChoice {
        self.counters.reconnect.fetch_add(1, Ordering::SeqCst);
        let delay = *self.reconnect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let choice = *self.reconnect.lock();
        info!(host, ?choice, "reconnect prompt answered");
        choice
    }

    async fn confirm_pull(&self, path: &VfsPath, name: &str) -> bool {
        self.counters.pull.fetch_add(1, Ordering::SeqCst);
        let accept = *self.pull.lock();
        info!(%path, name, accept, "pull prompt answered");
        accept
    }

    async fn confirm(&self, message: &str) -> bool {
        self.counters.confirm.fetch_add(1, Ordering::SeqCst);
        let accept = *self.confirm.lock();
        info!(message, accept, "confirmation answered");
        accept
    }

    fn close_editor(&self, path: &VfsPath) {
        self.closed.lock().push(path.clone());
    }

    fn report_error(&self, message: &str) {
        error!("{message}");
        self.errors.lock().push(message.to_string());
    }
}
