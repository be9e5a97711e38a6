//! Best-effort mirroring of highlights and classifications to a cloud store.
//!
//! Writes are fire-and-forget: they are queued to a single writer task and
//! never block or fail the local operation. The writer applies them in the
//! order they were queued, so a delete never overtakes its insert and an
//! older status never lands after a newer one. Reads (`pull_*`) are used for
//! merging on startup and by the `sync` command. With no signed-in user every
//! mirror is a no-op.

mod identity;
mod remote;

pub use identity::{Anonymous, IdentityProvider, StaticIdentity, User};
pub use remote::{Classification, HttpRemoteTable, NoRemote, RemoteTable};

use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::content::ContentError;
use crate::highlights::Highlight;
use crate::storage::{PostStatus, StorageError};
use crate::util::catch_task_panic;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not signed in")]
    NotAuthenticated,
    #[error("Remote store error: {0}")]
    Remote(#[from] ContentError),
    #[error("Local store error: {0}")]
    Storage(#[from] StorageError),
}

/// One queued remote write.
#[derive(Debug)]
enum MirrorWrite {
    HighlightInsert(Highlight),
    HighlightDelete { article_url: String, text: String },
    Classification(Classification),
}

impl MirrorWrite {
    fn op(&self) -> &'static str {
        match self {
            Self::HighlightInsert(_) => "highlight_insert",
            Self::HighlightDelete { .. } => "highlight_delete",
            Self::Classification(_) => "classification_upsert",
        }
    }

    async fn apply(&self, remote: &dyn RemoteTable, user: &User) -> Result<(), SyncError> {
        match self {
            Self::HighlightInsert(highlight) => remote.insert_highlight(user, highlight).await,
            Self::HighlightDelete { article_url, text } => {
                remote.delete_highlight(user, article_url, text).await
            }
            Self::Classification(classification) => {
                remote.upsert_classification(user, classification).await
            }
        }
    }
}

/// The running writer task and its queue.
struct Writer {
    tx: mpsc::UnboundedSender<(User, MirrorWrite)>,
    task: JoinHandle<()>,
}

async fn run_writer(
    remote: Arc<dyn RemoteTable>,
    mut rx: mpsc::UnboundedReceiver<(User, MirrorWrite)>,
) {
    while let Some((user, write)) = rx.recv().await {
        let op = write.op();
        match catch_task_panic(write.apply(remote.as_ref(), &user)).await {
            Ok(Ok(())) => tracing::trace!(op, "Cloud mirror applied"),
            Ok(Err(e)) => tracing::warn!(op, error = %e, "Cloud mirror failed"),
            Err(panic) => tracing::error!(op, error = %panic, "Cloud mirror panicked"),
        }
    }
}

#[derive(Clone)]
pub struct CloudSync {
    identity: Arc<dyn IdentityProvider>,
    remote: Arc<dyn RemoteTable>,
    writer: Arc<Mutex<Option<Writer>>>,
}

impl std::fmt::Debug for CloudSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSync")
            .field("authenticated", &self.identity.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl CloudSync {
    pub fn new(identity: Arc<dyn IdentityProvider>, remote: Arc<dyn RemoteTable>) -> Self {
        Self {
            identity,
            remote,
            writer: Arc::new(Mutex::new(None)),
        }
    }

    /// No user and no remote: every mirror is skipped.
    pub fn disabled() -> Self {
        Self::new(Arc::new(Anonymous), Arc::new(NoRemote))
    }

    pub fn is_enabled(&self) -> bool {
        self.identity.is_authenticated()
    }

    fn user(&self) -> Option<User> {
        if self.identity.is_authenticated() {
            self.identity.user()
        } else {
            None
        }
    }

    /// Queue a remote write for the current user. Returns false if skipped.
    ///
    /// The writer task starts on first use and after each [`flush`](Self::flush).
    fn enqueue(&self, write: MirrorWrite) -> bool {
        let Some(user) = self.user() else {
            tracing::trace!(op = write.op(), "Not signed in, skipping cloud mirror");
            return false;
        };

        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.as_ref().is_some_and(|w| w.tx.is_closed()) {
            *guard = None;
        }
        let writer = guard.get_or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            let task = tokio::spawn(run_writer(Arc::clone(&self.remote), rx));
            Writer { tx, task }
        });
        if let Err(mpsc::error::SendError((_, write))) = writer.tx.send((user, write)) {
            tracing::error!(op = write.op(), "Cloud writer stopped, mirror dropped");
            return false;
        }
        true
    }

    pub fn mirror_highlight_added(&self, highlight: &Highlight) -> bool {
        self.enqueue(MirrorWrite::HighlightInsert(highlight.clone()))
    }

    pub fn mirror_highlight_removed(&self, article_url: &str, text: &str) -> bool {
        self.enqueue(MirrorWrite::HighlightDelete {
            article_url: article_url.to_string(),
            text: text.to_string(),
        })
    }

    pub fn mirror_status(&self, link: &str, status: PostStatus, updated_at: i64) -> bool {
        self.enqueue(MirrorWrite::Classification(Classification {
            link: link.to_string(),
            status,
            updated_at,
        }))
    }

    /// # Errors
    ///
    /// [`SyncError::NotAuthenticated`] when signed out, otherwise the remote
    /// store's error.
    pub async fn pull_highlights(&self) -> Result<Vec<Highlight>, SyncError> {
        let user = self.user().ok_or(SyncError::NotAuthenticated)?;
        self.remote.select_highlights(&user).await
    }

    /// # Errors
    ///
    /// [`SyncError::NotAuthenticated`] when signed out, otherwise the remote
    /// store's error.
    pub async fn pull_classifications(&self) -> Result<Vec<Classification>, SyncError> {
        let user = self.user().ok_or(SyncError::NotAuthenticated)?;
        self.remote.select_classifications(&user).await
    }

    /// Wait for every queued mirror write. Called before exit and before
    /// reading back from the cloud.
    pub async fn flush(&self) {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Writer { tx, task }) = writer else {
            return;
        };
        // Closing the queue lets the writer drain and exit
        drop(tx);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Cloud writer task failed");
        }
    }
}
