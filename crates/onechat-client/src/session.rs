//! The session task: owns the [`Timeline`] and serializes everything that
//! touches it.
//!
//! One spawned loop `select!`s over raw push frames, UI commands and the
//! completions of backend calls it spawned itself. Backend calls never run
//! inside the loop, so a slow history load or send does not hold up push
//! handling. Persistence goes through a separate queue drained by its own
//! worker, in order.

use std::sync::Arc;

use chrono::Utc;
use onechat_shared::types::{LocalId, RequestStatus, Scope, UserId};
use onechat_store::{StoredMessage, StoredRequest};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendError, PersistJob};
use crate::config::TimelineConfig;
use crate::error::{SendError, SessionError};
use crate::grouper::ClusterView;
use crate::inbox::PendingRequest;
use crate::mutation::ContentOutcome;
use crate::record::MessageRecord;
use crate::timeline::{ChatPreview, Timeline};

/// Commands accepted by the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Focus a conversation and load its latest history window.
    Open {
        scope: Scope,
        reply: oneshot::Sender<Vec<ClusterView>>,
    },
    /// Load the window before the earliest held record of `scope`.
    LoadOlder {
        scope: Scope,
        reply: oneshot::Sender<usize>,
    },
    /// Bulk-load recent rows of every conversation for the chat list.
    LoadPreviews {
        reply: oneshot::Sender<Vec<ChatPreview>>,
    },
    Send {
        scope: Scope,
        content: String,
        reply: oneshot::Sender<Result<LocalId, SendError>>,
    },
    /// Clusters of the active conversation as they are now.
    Snapshot {
        reply: oneshot::Sender<Vec<ClusterView>>,
    },
    Record {
        local_id: LocalId,
        reply: oneshot::Sender<Option<MessageRecord>>,
    },
    /// Replace a record's body in place; ordering is unaffected.
    UpdateContent {
        local_id: LocalId,
        content: String,
        reply: oneshot::Sender<ContentOutcome>,
    },
    Requests {
        pending_only: bool,
        reply: oneshot::Sender<Vec<PendingRequest>>,
    },
    ResolveRequest {
        flag: String,
        status: RequestStatus,
        reply: oneshot::Sender<bool>,
    },
    MarkRequestsRead {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

/// Results of backend calls spawned by the loop.
enum Completion {
    History {
        purpose: HistoryPurpose,
        result: Result<Vec<StoredMessage>, BackendError>,
    },
    Requests(Result<Vec<StoredRequest>, BackendError>),
    Sent {
        local_id: LocalId,
        result: Result<(), BackendError>,
        reply: oneshot::Sender<Result<LocalId, SendError>>,
    },
}

enum HistoryPurpose {
    Open {
        scope: Scope,
        reply: oneshot::Sender<Vec<ClusterView>>,
    },
    Older {
        reply: oneshot::Sender<usize>,
    },
    Previews {
        reply: oneshot::Sender<Vec<ChatPreview>>,
    },
}

/// Cheap, cloneable handle used by the UI layer.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn open(&self, scope: Scope) -> Result<Vec<ClusterView>, SessionError> {
        self.request(|reply| SessionCommand::Open { scope, reply })
            .await
    }

    pub async fn load_older(&self, scope: Scope) -> Result<usize, SessionError> {
        self.request(|reply| SessionCommand::LoadOlder { scope, reply })
            .await
    }

    pub async fn load_previews(&self) -> Result<Vec<ChatPreview>, SessionError> {
        self.request(|reply| SessionCommand::LoadPreviews { reply })
            .await
    }

    pub async fn send(&self, scope: Scope, content: impl Into<String>) -> Result<LocalId, SendError> {
        let content = content.into();
        self.request(|reply| SessionCommand::Send {
            scope,
            content,
            reply,
        })
        .await?
    }

    pub async fn snapshot(&self) -> Result<Vec<ClusterView>, SessionError> {
        self.request(|reply| SessionCommand::Snapshot { reply })
            .await
    }

    pub async fn record(&self, local_id: LocalId) -> Result<Option<MessageRecord>, SessionError> {
        self.request(|reply| SessionCommand::Record { local_id, reply })
            .await
    }

    pub async fn update_content(
        &self,
        local_id: LocalId,
        content: impl Into<String>,
    ) -> Result<ContentOutcome, SessionError> {
        let content = content.into();
        self.request(|reply| SessionCommand::UpdateContent {
            local_id,
            content,
            reply,
        })
        .await
    }

    pub async fn requests(&self, pending_only: bool) -> Result<Vec<PendingRequest>, SessionError> {
        self.request(|reply| SessionCommand::Requests {
            pending_only,
            reply,
        })
        .await
    }

    pub async fn resolve_request(
        &self,
        flag: impl Into<String>,
        status: RequestStatus,
    ) -> Result<bool, SessionError> {
        let flag = flag.into();
        self.request(|reply| SessionCommand::ResolveRequest {
            flag,
            status,
            reply,
        })
        .await
    }

    pub async fn mark_requests_read(&self) -> Result<usize, SessionError> {
        self.request(|reply| SessionCommand::MarkRequestsRead { reply })
            .await
    }

    /// Ask the session to stop. Pending persistence is flushed before the
    /// session's join handle resolves.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown).await;
    }
}

/// Spawn the session task.
///
/// `frames` carries raw OneBot frames from the transport. The returned join
/// handle resolves once the session has stopped and every queued persistence
/// job has been handed to the backend.
pub fn spawn_session<B: Backend>(
    backend: Arc<B>,
    config: TimelineConfig,
    self_id: Option<UserId>,
    frames: mpsc::Receiver<String>,
) -> (SessionHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(256);
    let (persist_tx, persist_rx) = mpsc::unbounded_channel::<PersistJob>();

    let persist_worker = spawn_persist_worker(backend.clone(), persist_rx);
    let timeline = Timeline::new(config, self_id, persist_tx);

    let join = tokio::spawn(run_session(backend, timeline, frames, cmd_rx, persist_worker));

    (SessionHandle { cmd_tx }, join)
}

fn spawn_persist_worker<B: Backend>(
    backend: Arc<B>,
    mut rx: mpsc::UnboundedReceiver<PersistJob>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            let kind = job.kind();
            if let Err(e) = backend.persist(job).await {
                warn!(job = kind, error = %e, "Persistence failed");
            }
        }
        debug!("Persistence worker stopped");
    })
}

async fn run_session<B: Backend>(
    backend: Arc<B>,
    mut timeline: Timeline,
    mut frames: mpsc::Receiver<String>,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    persist_worker: JoinHandle<()>,
) {
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    let mut frames_open = true;

    info!(self_id = ?timeline.self_id(), "Session started");

    {
        let backend = backend.clone();
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let result = backend.load_requests().await;
            let _ = done_tx.send(Completion::Requests(result));
        });
    }

    loop {
        tokio::select! {
            biased;

            frame = frames.recv(), if frames_open => match frame {
                Some(frame) => {
                    timeline.ingest_frame(&frame);
                }
                None => {
                    info!("Push stream closed");
                    frames_open = false;
                }
            },

            Some(done) = done_rx.recv() => handle_completion(&mut timeline, done),

            cmd = cmd_rx.recv() => match cmd {
                Some(SessionCommand::Shutdown) | None => break,
                Some(cmd) => handle_command(&backend, &mut timeline, &done_tx, cmd),
            },
        }
    }

    info!(records = timeline.len(), "Session stopping");

    // Closing the queue lets the worker drain and exit.
    drop(timeline);
    if let Err(e) = persist_worker.await {
        error!(error = %e, "Persistence worker panicked");
    }
}

fn handle_command<B: Backend>(
    backend: &Arc<B>,
    timeline: &mut Timeline,
    done_tx: &mpsc::UnboundedSender<Completion>,
    cmd: SessionCommand,
) {
    match cmd {
        SessionCommand::Open { scope, reply } => {
            timeline.set_active_scope(scope);
            let filter = timeline.history_filter(scope, false);
            spawn_history_load(backend, done_tx, filter, HistoryPurpose::Open { scope, reply });
        }

        SessionCommand::LoadOlder { scope, reply } => {
            let filter = timeline.history_filter(scope, true);
            spawn_history_load(backend, done_tx, filter, HistoryPurpose::Older { reply });
        }

        SessionCommand::LoadPreviews { reply } => {
            let filter = timeline.preview_filter();
            spawn_history_load(backend, done_tx, filter, HistoryPurpose::Previews { reply });
        }

        SessionCommand::Send {
            scope,
            content,
            reply,
        } => match timeline.begin_send(scope, content, Utc::now().timestamp()) {
            Ok((local_id, request)) => {
                let backend = backend.clone();
                let done_tx = done_tx.clone();
                tokio::spawn(async move {
                    let result = backend.send_outbound(request).await;
                    let _ = done_tx.send(Completion::Sent {
                        local_id,
                        result,
                        reply,
                    });
                });
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "Send refused");
                let _ = reply.send(Err(e));
            }
        },

        SessionCommand::Snapshot { reply } => {
            let _ = reply.send(timeline.clusters());
        }

        SessionCommand::Record { local_id, reply } => {
            let _ = reply.send(timeline.record(&local_id).cloned());
        }

        SessionCommand::UpdateContent {
            local_id,
            content,
            reply,
        } => {
            let _ = reply.send(timeline.apply_content_update(&local_id, &content));
        }

        SessionCommand::Requests {
            pending_only,
            reply,
        } => {
            let _ = reply.send(timeline.requests(pending_only));
        }

        SessionCommand::ResolveRequest {
            flag,
            status,
            reply,
        } => {
            let _ = reply.send(timeline.resolve_request(&flag, status));
        }

        SessionCommand::MarkRequestsRead { reply } => {
            let _ = reply.send(timeline.mark_requests_read());
        }

        // Handled by the loop.
        SessionCommand::Shutdown => {}
    }
}

fn handle_completion(timeline: &mut Timeline, done: Completion) {
    match done {
        Completion::History { purpose, result } => {
            let rows = result.unwrap_or_else(|e| {
                error!(error = %e, "History load failed");
                Vec::new()
            });
            let accepted = timeline.ingest_history(rows);

            match purpose {
                HistoryPurpose::Open { scope, reply } => {
                    // The user may have switched away while loading.
                    let clusters = if timeline.active_scope() == Some(scope) {
                        timeline.clusters()
                    } else {
                        Vec::new()
                    };
                    let _ = reply.send(clusters);
                }
                HistoryPurpose::Older { reply } => {
                    let _ = reply.send(accepted);
                }
                HistoryPurpose::Previews { reply } => {
                    let _ = reply.send(timeline.chat_previews());
                }
            }
        }

        Completion::Requests(result) => match result {
            Ok(rows) => {
                let added =
                    timeline.load_requests(rows.into_iter().map(PendingRequest::from).collect());
                debug!(added, "Requests loaded");
            }
            Err(e) => error!(error = %e, "Loading requests failed"),
        },

        Completion::Sent {
            local_id,
            result,
            reply,
        } => {
            let outcome = match result {
                Ok(()) => {
                    debug!(local_id = %local_id, "Outbound frame handed to transport");
                    Ok(local_id)
                }
                Err(e) => {
                    timeline.apply_failure(&local_id);
                    Err(SendError::Rejected(e))
                }
            };
            let _ = reply.send(outcome);
        }
    }
}

fn spawn_history_load<B: Backend>(
    backend: &Arc<B>,
    done_tx: &mpsc::UnboundedSender<Completion>,
    filter: onechat_store::MessageFilter,
    purpose: HistoryPurpose,
) {
    let backend = backend.clone();
    let done_tx = done_tx.clone();
    tokio::spawn(async move {
        let result = backend.load_history(filter).await;
        let _ = done_tx.send(Completion::History { purpose, result });
    });
}
