//! Serialized request queue in front of a remote repository.
//!
//! Provides a cloneable [`QueuedRepository`] that forwards every call to a
//! single actor task over an mpsc channel. The actor runs calls strictly one
//! at a time, so a re-login triggered by an expired session can never
//! interleave with an unrelated request.
//!
//! ```text
//!   QueuedRepository (Clone)    mpsc      QueueActor (tokio::spawn)
//!   ┌─────────────────────┐  ────────▶  ┌──────────────────────────────┐
//!   │ .get_schema()       │             │ Arc<dyn RemoteRepository>    │
//!   │ .save_schema()      │  ◀────────  │ re-login once on Unauthorized│
//!   │ .lock_schema()      │   oneshot   │ retry transport errors       │
//!   └─────────────────────┘             └──────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use schemata_types::{
    BuildResponse, PackageInfo, RemoteResponse, SaveResponse, Schema, SchemaType, SchemaUid,
    WorkspaceItem,
};

use crate::constants::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::repository::{Credentials, RemoteError, RemoteRepository, RemoteResult};

/// Tuning for the queue actor.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Attempts per call on transport failure, including the first.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Credentials used for transparent re-login before any explicit login.
    pub credentials: Option<Credentials>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            credentials: None,
        }
    }
}

// ============================================================================
// Commands (internal)
// ============================================================================

type Reply<T> = oneshot::Sender<RemoteResult<T>>;

enum QueueCommand {
    Login {
        credentials: Credentials,
        reply: Reply<()>,
    },
    GetPackages {
        reply: Reply<Vec<PackageInfo>>,
    },
    GetWorkspaceItems {
        reply: Reply<Vec<WorkspaceItem>>,
    },
    GetSchema {
        uid: SchemaUid,
        schema_type: SchemaType,
        reply: Reply<Option<Schema>>,
    },
    SaveSchema {
        schema: Box<Schema>,
        schema_type: SchemaType,
        reply: Reply<SaveResponse>,
    },
    LockSchema {
        items: Vec<WorkspaceItem>,
        reply: Reply<RemoteResponse>,
    },
    UnlockSchema {
        items: Vec<WorkspaceItem>,
        reply: Reply<RemoteResponse>,
    },
    RevertElements {
        items: Vec<WorkspaceItem>,
        reply: Reply<RemoteResponse>,
    },
    Build {
        reply: Reply<BuildResponse>,
    },
    Rebuild {
        reply: Reply<BuildResponse>,
    },
}

// ============================================================================
// QueuedRepository (public handle)
// ============================================================================

/// Handle to a queue actor. Implements [`RemoteRepository`] itself, so the
/// engine cannot tell it apart from a direct transport.
#[derive(Clone)]
pub struct QueuedRepository {
    tx: mpsc::UnboundedSender<QueueCommand>,
    inner: Arc<dyn RemoteRepository>,
}

/// Spawn a queue actor owning `inner` and return its handle.
///
/// Must be called from within a tokio runtime. The actor exits once every
/// handle has been dropped.
pub fn spawn_queue(inner: Arc<dyn RemoteRepository>, options: QueueOptions) -> QueuedRepository {
    let (tx, rx) = mpsc::unbounded_channel();
    let actor = QueueActor {
        inner: inner.clone(),
        options,
    };
    tokio::spawn(actor.run(rx));
    QueuedRepository { tx, inner }
}

impl QueuedRepository {
    async fn send<T>(&self, make: impl FnOnce(Reply<T>) -> QueueCommand) -> RemoteResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).map_err(|_| RemoteError::Shutdown)?;
        rx.await.map_err(|_| RemoteError::Shutdown)?
    }
}

#[async_trait]
impl RemoteRepository for QueuedRepository {
    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn login(&self, credentials: &Credentials) -> RemoteResult<()> {
        let credentials = credentials.clone();
        self.send(|reply| QueueCommand::Login { credentials, reply }).await
    }

    async fn get_packages(&self) -> RemoteResult<Vec<PackageInfo>> {
        self.send(|reply| QueueCommand::GetPackages { reply }).await
    }

    async fn get_workspace_items(&self) -> RemoteResult<Vec<WorkspaceItem>> {
        self.send(|reply| QueueCommand::GetWorkspaceItems { reply }).await
    }

    async fn get_schema(
        &self,
        uid: SchemaUid,
        schema_type: SchemaType,
    ) -> RemoteResult<Option<Schema>> {
        self.send(|reply| QueueCommand::GetSchema { uid, schema_type, reply })
            .await
    }

    async fn save_schema(
        &self,
        schema: &Schema,
        schema_type: SchemaType,
    ) -> RemoteResult<SaveResponse> {
        let schema = Box::new(schema.clone());
        self.send(|reply| QueueCommand::SaveSchema { schema, schema_type, reply })
            .await
    }

    async fn lock_schema(&self, items: &[WorkspaceItem]) -> RemoteResult<RemoteResponse> {
        let items = items.to_vec();
        self.send(|reply| QueueCommand::LockSchema { items, reply }).await
    }

    async fn unlock_schema(&self, items: &[WorkspaceItem]) -> RemoteResult<RemoteResponse> {
        let items = items.to_vec();
        self.send(|reply| QueueCommand::UnlockSchema { items, reply }).await
    }

    async fn revert_elements(&self, items: &[WorkspaceItem]) -> RemoteResult<RemoteResponse> {
        let items = items.to_vec();
        self.send(|reply| QueueCommand::RevertElements { items, reply }).await
    }

    async fn build(&self) -> RemoteResult<BuildResponse> {
        self.send(|reply| QueueCommand::Build { reply }).await
    }

    async fn rebuild(&self) -> RemoteResult<BuildResponse> {
        self.send(|reply| QueueCommand::Rebuild { reply }).await
    }
}

// ============================================================================
// QueueActor (internal)
// ============================================================================

struct QueueActor {
    inner: Arc<dyn RemoteRepository>,
    options: QueueOptions,
}

/// Run one remote call with re-login and transport retry, then reply.
///
/// A macro rather than a generic closure so each retry re-evaluates the call
/// expression with fresh borrows of the command's fields.
macro_rules! remote_call {
    ($self:ident, $reply:ident, $r:ident, $call:expr) => {{
        let mut attempt: u32 = 1;
        let mut relogged = false;
        let result = loop {
            let $r = &$self.inner;
            match $call.await {
                Ok(val) => break Ok(val),
                Err(RemoteError::Unauthorized(msg)) if !relogged => {
                    relogged = true;
                    if let Err(e) = $self.relogin(msg).await {
                        break Err(e);
                    }
                }
                Err(RemoteError::Transport(msg)) if attempt < $self.options.retry_attempts => {
                    warn!(attempt, "transport error, retrying: {msg}");
                    attempt += 1;
                    tokio::time::sleep($self.options.retry_delay).await;
                }
                Err(e) => break Err(e),
            }
        };
        let _ = $reply.send(result);
    }};
}

impl QueueActor {
    /// Process commands until the channel closes.
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<QueueCommand>) {
        while let Some(cmd) = rx.recv().await {
            self.handle_command(cmd).await;
        }
        debug!("request queue shutting down: channel closed");
    }

    async fn relogin(&self, reason: String) -> RemoteResult<()> {
        let Some(credentials) = self.options.credentials.as_ref() else {
            return Err(RemoteError::Unauthorized(reason));
        };
        info!(login = %credentials.login, "session expired, logging in again");
        self.inner.login(credentials).await
    }

    async fn handle_command(&mut self, cmd: QueueCommand) {
        match cmd {
            QueueCommand::Login { credentials, reply } => {
                let result = self.inner.login(&credentials).await;
                if result.is_ok() {
                    self.options.credentials = Some(credentials);
                }
                let _ = reply.send(result);
            }
            QueueCommand::GetPackages { reply } => {
                remote_call!(self, reply, r, r.get_packages());
            }
            QueueCommand::GetWorkspaceItems { reply } => {
                remote_call!(self, reply, r, r.get_workspace_items());
            }
            QueueCommand::GetSchema { uid, schema_type, reply } => {
                remote_call!(self, reply, r, r.get_schema(uid, schema_type));
            }
            QueueCommand::SaveSchema { schema, schema_type, reply } => {
                remote_call!(self, reply, r, r.save_schema(&schema, schema_type));
            }
            QueueCommand::LockSchema { items, reply } => {
                remote_call!(self, reply, r, r.lock_schema(&items));
            }
            QueueCommand::UnlockSchema { items, reply } => {
                remote_call!(self, reply, r, r.unlock_schema(&items));
            }
            QueueCommand::RevertElements { items, reply } => {
                remote_call!(self, reply, r, r.revert_elements(&items));
            }
            QueueCommand::Build { reply } => {
                remote_call!(self, reply, r, r.build());
            }
            QueueCommand::Rebuild { reply } => {
                remote_call!(self, reply, r, r.rebuild());
            }
        }
    }
}
