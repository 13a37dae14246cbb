//! The capabilities the timeline needs from the outside world.
//!
//! [`Backend`] is implemented by [`LocalBackend`] over the SQLite store and an
//! outbound frame channel; tests and embedders can provide their own.

use std::future::Future;
use std::sync::{Arc, Mutex};

use onechat_shared::protocol::OutboundRequest;
use onechat_shared::types::{LocalId, RemoteId, RequestStatus};
use onechat_shared::ProtocolError;
use onechat_store::{Database, MessageFilter, StoreError, StoredMessage, StoredRequest};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The transport is gone; nothing can be sent.
    #[error("Not connected")]
    NotConnected,

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A fire-and-forget write to durable storage.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistJob {
    SaveMessage(StoredMessage),
    AssignRemoteId { local_id: LocalId, remote_id: RemoteId },
    MarkRecalled(RemoteId),
    MarkFailed(LocalId),
    UpdateContent { local_id: LocalId, content: String },
    SaveRequest(StoredRequest),
    SetRequestStatus { flag: String, status: RequestStatus },
    MarkRequestsRead,
}

impl PersistJob {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SaveMessage(_) => "save_message",
            Self::AssignRemoteId { .. } => "assign_remote_id",
            Self::MarkRecalled(_) => "mark_recalled",
            Self::MarkFailed(_) => "mark_failed",
            Self::UpdateContent { .. } => "update_content",
            Self::SaveRequest(_) => "save_request",
            Self::SetRequestStatus { .. } => "set_request_status",
            Self::MarkRequestsRead => "mark_requests_read",
        }
    }

    /// Run the job against an open database.
    pub fn apply(self, db: &Database) -> Result<(), StoreError> {
        match self {
            Self::SaveMessage(message) => db.save_message(&message),
            Self::AssignRemoteId {
                local_id,
                remote_id,
            } => {
                if !db.update_message_id(local_id.as_str(), remote_id.0)? {
                    tracing::debug!(local_id = %local_id, remote_id = %remote_id, "No row took the remote id");
                }
                Ok(())
            }
            Self::MarkRecalled(remote_id) => {
                let rows = db.mark_recalled(remote_id.0)?;
                tracing::debug!(remote_id = %remote_id, rows, "Recall persisted");
                Ok(())
            }
            Self::MarkFailed(local_id) => db.mark_send_failed(local_id.as_str()).map(|_| ()),
            Self::UpdateContent { local_id, content } => db
                .update_message_content(local_id.as_str(), &content)
                .map(|_| ()),
            Self::SaveRequest(request) => db.save_request(&request).map(|_| ()),
            Self::SetRequestStatus { flag, status } => {
                db.set_request_status(&flag, status).map(|_| ())
            }
            Self::MarkRequestsRead => db.mark_requests_read().map(|_| ()),
        }
    }
}

pub trait Backend: Send + Sync + 'static {
    /// Stored rows matching `filter`, newest first.
    fn load_history(
        &self,
        filter: MessageFilter,
    ) -> impl Future<Output = Result<Vec<StoredMessage>, BackendError>> + Send;

    fn load_requests(&self) -> impl Future<Output = Result<Vec<StoredRequest>, BackendError>> + Send;

    /// Hand a frame to the transport. Only an immediate rejection is reported
    /// here; the gateway's verdict arrives later as an `api_response`.
    fn send_outbound(
        &self,
        request: OutboundRequest,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn persist(&self, job: PersistJob) -> impl Future<Output = Result<(), BackendError>> + Send;
}

/// [`Backend`] over the local SQLite store and an outbound frame channel.
#[derive(Clone)]
pub struct LocalBackend {
    db: Arc<Mutex<Database>>,
    outbound: mpsc::Sender<String>,
}

impl LocalBackend {
    pub fn new(db: Database, outbound: mpsc::Sender<String>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            outbound,
        }
    }

    /// Shared handle to the database, e.g. for search or maintenance.
    pub fn database(&self) -> Arc<Mutex<Database>> {
        self.db.clone()
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| BackendError::LockPoisoned)?;
            f(&guard).map_err(BackendError::from)
        })
        .await?
    }
}

impl Backend for LocalBackend {
    async fn load_history(&self, filter: MessageFilter) -> Result<Vec<StoredMessage>, BackendError> {
        self.with_db(move |db| db.get_messages(&filter)).await
    }

    async fn load_requests(&self) -> Result<Vec<StoredRequest>, BackendError> {
        self.with_db(|db| db.list_requests(false)).await
    }

    async fn send_outbound(&self, request: OutboundRequest) -> Result<(), BackendError> {
        let frame = request.to_frame()?;
        self.outbound
            .send(frame)
            .await
            .map_err(|_| BackendError::NotConnected)
    }

    async fn persist(&self, job: PersistJob) -> Result<(), BackendError> {
        self.with_db(move |db| job.apply(db)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onechat_shared::types::Scope;

    fn backend() -> (tempfile::TempDir, LocalBackend, mpsc::Receiver<String>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        let (tx, rx) = mpsc::channel(8);
        (dir, LocalBackend::new(db, tx), rx)
    }

    #[tokio::test]
    async fn send_forwards_frame() {
        let (_dir, backend, mut rx) = backend();
        let id = LocalId::from("abc");
        backend
            .send_outbound(OutboundRequest::send_message(Scope::private(1001), "hi", &id))
            .await
            .unwrap();

        let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["action"], "send_private_msg");
        assert_eq!(frame["echo"], "abc");
    }

    #[tokio::test]
    async fn send_without_transport_is_rejected() {
        let (_dir, backend, rx) = backend();
        drop(rx);

        let id = LocalId::from("abc");
        let result = backend
            .send_outbound(OutboundRequest::send_message(Scope::group(42), "hi", &id))
            .await;
        assert!(matches!(result, Err(BackendError::NotConnected)));
    }

    #[tokio::test]
    async fn persist_jobs_reach_the_store() {
        let (_dir, backend, _rx) = backend();
        let scope = Scope::private(1001);
        let row = StoredMessage {
            local_message_id: Some("abc".into()),
            timestamp: 1402,
            post_type: onechat_store::POST_TYPE_MESSAGE_SENT.into(),
            scope,
            sender_id: 10,
            sender_name: None,
            message_id: None,
            content: "hi".into(),
            send_state: Some(onechat_shared::types::SendState::Pending),
            recalled: false,
            data: None,
        };

        backend.persist(PersistJob::SaveMessage(row)).await.unwrap();
        backend
            .persist(PersistJob::AssignRemoteId {
                local_id: LocalId::from("abc"),
                remote_id: RemoteId(999),
            })
            .await
            .unwrap();
        backend
            .persist(PersistJob::MarkRecalled(RemoteId(999)))
            .await
            .unwrap();
        backend
            .persist(PersistJob::UpdateContent {
                local_id: LocalId::from("abc"),
                content: "hi again".into(),
            })
            .await
            .unwrap();

        let rows = backend
            .load_history(MessageFilter::scope(scope, 200))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message_id, Some(999));
        assert!(rows[0].recalled);
        assert_eq!(rows[0].content, "hi again");
    }
}
