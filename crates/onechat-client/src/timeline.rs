//! The timeline engine: one owned record set fed by history loads, live push
//! frames and optimistic sends, with views derived on demand.

use std::collections::HashMap;

use onechat_shared::protocol::{ApiResponse, MessageEvent, OutboundRequest, PushEvent, RecallNotice};
use onechat_shared::types::{
    Direction, LocalId, RemoteId, RequestStatus, Scope, SendState, UserId,
};
use onechat_store::{MessageFilter, StoredMessage};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::backend::PersistJob;
use crate::config::TimelineConfig;
use crate::error::SendError;
use crate::grouper::{self, ClusterView};
use crate::inbox::{PendingRequest, RequestInbox};
use crate::mutation::{self, AckOutcome, ContentOutcome, FailureOutcome, RecallOutcome};
use crate::record::{remote_id_of, MessageRecord};
use crate::record_set::{Admission, RecordSet};
use crate::scope_filter;

/// Latest record of one conversation, for the chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPreview {
    pub scope: Scope,
    pub latest: MessageRecord,
}

/// What a push frame did to the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Admitted(LocalId),
    Duplicate(LocalId),
    Acked(AckOutcome),
    SendFailed(FailureOutcome),
    Recalled(RecallOutcome),
    Request { inserted: bool },
    Ignored,
    Malformed,
}

pub struct Timeline {
    config: TimelineConfig,
    self_id: Option<UserId>,
    records: RecordSet,
    active_scope: Option<Scope>,
    inbox: RequestInbox,
    persist_tx: mpsc::UnboundedSender<PersistJob>,
}

impl Timeline {
    pub fn new(
        config: TimelineConfig,
        self_id: Option<UserId>,
        persist_tx: mpsc::UnboundedSender<PersistJob>,
    ) -> Self {
        Self {
            config,
            self_id,
            records: RecordSet::new(),
            active_scope: None,
            inbox: RequestInbox::new(),
            persist_tx,
        }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn self_id(&self) -> Option<UserId> {
        self.self_id
    }

    pub fn active_scope(&self) -> Option<Scope> {
        self.active_scope
    }

    pub fn set_active_scope(&mut self, scope: Scope) {
        if self.active_scope != Some(scope) {
            debug!(scope = %scope, "Active conversation changed");
            self.active_scope = Some(scope);
        }
    }

    pub fn record(&self, local_id: &LocalId) -> Option<&MessageRecord> {
        self.records.get(local_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // -- Ingest ------------------------------------------------------------

    /// Filter for the next history window of `scope`: the most recent rows
    /// on first open, then rows at or before the earliest held timestamp.
    /// Rows already held at that timestamp are skipped by offset so a run of
    /// equal timestamps longer than one window stays reachable.
    pub fn history_filter(&self, scope: Scope, older: bool) -> MessageFilter {
        let filter = MessageFilter::scope(scope, self.config.history_window);
        match self.earliest_timestamp(scope) {
            Some(earliest) if older => {
                let held = scope_filter::visible(self.records.iter(), &scope)
                    .iter()
                    .filter(|r| r.timestamp == earliest)
                    .count();
                filter
                    .until(earliest)
                    .offset(u32::try_from(held).unwrap_or(u32::MAX))
            }
            _ => filter,
        }
    }

    pub fn preview_filter(&self) -> MessageFilter {
        MessageFilter::all(self.config.preview_window)
    }

    /// Admit stored rows (newest first, as the store returns them).
    /// Returns the number of records newly accepted.
    pub fn ingest_history(&mut self, rows: Vec<StoredMessage>) -> usize {
        let mut accepted = 0;
        // Oldest first so equal timestamps keep storage order.
        for row in rows.into_iter().rev() {
            let record = MessageRecord::from_stored(&row);
            // Rows without a stored id get a derived one that matches no row.
            let stale = row.send_state == Some(SendState::Pending)
                && record.send_state == Some(SendState::Failed)
                && row.local_message_id.as_deref().is_some_and(|id| !id.is_empty());
            let local_id = record.local_id.clone();

            if self.records.admit(record) == Admission::Accepted {
                accepted += 1;
                if stale {
                    debug!(local_id = %local_id, "Stale pending send loaded as failed");
                    self.persist(PersistJob::MarkFailed(local_id));
                }
            }
        }
        debug!(accepted, total = self.records.len(), "History ingested");
        accepted
    }

    /// Decode and apply one raw push frame. Malformed frames are dropped.
    pub fn ingest_frame(&mut self, frame: &str) -> PushOutcome {
        match PushEvent::decode(frame) {
            Ok(event) => self.ingest_push(event, Some(frame)),
            Err(e) => {
                warn!(error = %e, len = frame.len(), "Dropping malformed push frame");
                PushOutcome::Malformed
            }
        }
    }

    pub fn ingest_push(&mut self, event: PushEvent, raw: Option<&str>) -> PushOutcome {
        if self.self_id.is_none() {
            if let Some(id) = event.self_id() {
                info!(self_id = id, "Discovered logged-in account");
                self.self_id = Some(UserId(id));
            }
        }

        match event {
            PushEvent::Message(msg) => self.ingest_message(&msg, Direction::Received, raw),
            PushEvent::MessageSent(msg) => self.ingest_message(&msg, Direction::Sent, raw),
            PushEvent::Recall(notice) => self.ingest_recall(&notice),
            PushEvent::ApiResponse(resp) => self.ingest_api_response(&resp),
            PushEvent::Request(req) => {
                let request = PendingRequest::from_event(&req);
                let inserted = self.inbox.insert(request.clone());
                if inserted {
                    info!(
                        flag = %request.flag,
                        request_type = %request.request_type,
                        user_id = request.user_id,
                        "New request"
                    );
                    self.persist(PersistJob::SaveRequest(request.to_stored()));
                }
                PushOutcome::Request { inserted }
            }
            PushEvent::Notice(notice) => {
                debug!(notice_type = %notice.notice_type, "Ignoring notice");
                PushOutcome::Ignored
            }
            PushEvent::Meta(meta) => {
                debug!(meta_event_type = %meta.meta_event_type, "Ignoring meta event");
                PushOutcome::Ignored
            }
        }
    }

    fn ingest_message(
        &mut self,
        msg: &MessageEvent,
        direction: Direction,
        raw: Option<&str>,
    ) -> PushOutcome {
        let scope = match msg.scope(direction) {
            Ok(scope) => scope,
            Err(e) => {
                warn!(error = %e, message_id = msg.message_id, "Dropping message without scope");
                return PushOutcome::Malformed;
            }
        };

        let local_id = self.correlate(msg, scope);
        let record = match MessageRecord::from_event(msg, direction, local_id.clone()) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable message");
                return PushOutcome::Malformed;
            }
        };

        match self.records.admit(record.clone()) {
            Admission::Accepted => {
                debug!(
                    local_id = %local_id,
                    scope = %scope,
                    direction = ?direction,
                    "Message admitted"
                );
                self.persist(PersistJob::SaveMessage(
                    record.to_stored(raw.map(str::to_string)),
                ));
                PushOutcome::Admitted(local_id)
            }
            Admission::RejectedAsDuplicate => {
                debug!(local_id = %local_id, "Duplicate message ignored");
                PushOutcome::Duplicate(local_id)
            }
        }
    }

    /// Pick the local id for a pushed message: the id the sender attached,
    /// else the id of a held record with the same gateway id, else a new one.
    fn correlate(&self, msg: &MessageEvent, scope: Scope) -> LocalId {
        if let Some(id) = msg.local_message_id.as_deref().filter(|id| !id.is_empty()) {
            return LocalId::from(id);
        }
        if let Some(remote) = remote_id_of(msg) {
            if let Some(existing) = self.records.find_remote_in_scope(remote, scope) {
                return existing.clone();
            }
        }
        LocalId::new()
    }

    fn ingest_recall(&mut self, notice: &RecallNotice) -> PushOutcome {
        let outcome = self.apply_recall(notice.message_id);
        debug!(scope = %notice.scope, remote_id = %notice.message_id, outcome = ?outcome, "Recall notice");
        PushOutcome::Recalled(outcome)
    }

    fn ingest_api_response(&mut self, resp: &ApiResponse) -> PushOutcome {
        let Some(echo) = resp.echo_str() else {
            debug!(retcode = resp.retcode, "API response without echo");
            return PushOutcome::Ignored;
        };
        let local_id = LocalId::from(echo);

        if !resp.is_ok() {
            warn!(local_id = %local_id, error = %resp.error_text(), "Gateway rejected send");
            return PushOutcome::SendFailed(self.apply_failure(&local_id));
        }

        match resp.message_id() {
            Some(remote_id) => PushOutcome::Acked(self.apply_ack(&local_id, remote_id)),
            None => {
                debug!(local_id = %local_id, "Successful response carries no message id");
                PushOutcome::Ignored
            }
        }
    }

    /// Insert an optimistic record for a message about to be sent and build
    /// the outbound frame that carries its id as echo.
    pub fn begin_send(
        &mut self,
        scope: Scope,
        content: String,
        now: i64,
    ) -> Result<(LocalId, OutboundRequest), SendError> {
        let self_id = self.self_id.ok_or(SendError::UnknownAccount)?;
        if content.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let record = MessageRecord::optimistic(scope, self_id, content, now);
        let local_id = record.local_id.clone();
        let request = OutboundRequest::send_message(scope, &record.content, &local_id);

        self.records.admit(record.clone());
        self.persist(PersistJob::SaveMessage(record.to_stored(None)));

        info!(local_id = %local_id, scope = %scope, "Optimistic send queued");
        Ok((local_id, request))
    }

    // -- Mutations ---------------------------------------------------------

    pub fn apply_ack(&mut self, local_id: &LocalId, remote_id: RemoteId) -> AckOutcome {
        let outcome = mutation::apply_ack(&mut self.records, local_id, remote_id);
        match outcome {
            AckOutcome::Acknowledged => {
                debug!(local_id = %local_id, remote_id = %remote_id, "Send acknowledged");
                self.persist(PersistJob::AssignRemoteId {
                    local_id: local_id.clone(),
                    remote_id,
                });
            }
            AckOutcome::AlreadyAcknowledged => {}
            AckOutcome::Conflict { existing } => {
                warn!(
                    local_id = %local_id,
                    existing = %existing,
                    received = %remote_id,
                    "Ignoring ack with a different remote id"
                );
            }
            AckOutcome::NotSent | AckOutcome::NotFound => {
                debug!(local_id = %local_id, outcome = ?outcome, "Ack without target");
            }
        }
        outcome
    }

    pub fn apply_failure(&mut self, local_id: &LocalId) -> FailureOutcome {
        let outcome = mutation::apply_failure(&mut self.records, local_id);
        match outcome {
            FailureOutcome::Failed => {
                warn!(local_id = %local_id, "Send failed");
                self.persist(PersistJob::MarkFailed(local_id.clone()));
            }
            FailureOutcome::AlreadyAcknowledged => {
                warn!(local_id = %local_id, "Failure after ack ignored");
            }
            _ => debug!(local_id = %local_id, outcome = ?outcome, "Failure without target"),
        }
        outcome
    }

    pub fn apply_recall(&mut self, remote_id: RemoteId) -> RecallOutcome {
        let outcome = mutation::apply_recall(&mut self.records, remote_id);
        if outcome == RecallOutcome::NotLoaded {
            debug!(remote_id = %remote_id, "Recalled message not loaded, updating store only");
        }
        self.persist(PersistJob::MarkRecalled(remote_id));
        outcome
    }

    /// Replace the body of a held record, e.g. once a media placeholder
    /// resolves. Ordering and identity are untouched.
    pub fn apply_content_update(&mut self, local_id: &LocalId, content: &str) -> ContentOutcome {
        let outcome = mutation::apply_content_update(&mut self.records, local_id, content);
        match outcome {
            ContentOutcome::Updated => {
                debug!(local_id = %local_id, len = content.len(), "Content updated");
                self.persist(PersistJob::UpdateContent {
                    local_id: local_id.clone(),
                    content: content.to_string(),
                });
            }
            ContentOutcome::Unchanged => {}
            ContentOutcome::NotFound => {
                debug!(local_id = %local_id, "Content update without target");
            }
        }
        outcome
    }

    // -- Requests ----------------------------------------------------------

    pub fn load_requests(&mut self, rows: Vec<PendingRequest>) -> usize {
        let mut added = 0;
        for request in rows {
            if self.inbox.insert(request) {
                added += 1;
            }
        }
        added
    }

    pub fn requests(&self, pending_only: bool) -> Vec<PendingRequest> {
        self.inbox.list(pending_only)
    }

    pub fn unread_requests(&self) -> usize {
        self.inbox.unread_count()
    }

    pub fn resolve_request(&mut self, flag: &str, status: RequestStatus) -> bool {
        let found = self.inbox.resolve(flag, status);
        if found {
            info!(flag, status = status.as_str(), "Request resolved");
            self.persist(PersistJob::SetRequestStatus {
                flag: flag.to_string(),
                status,
            });
        }
        found
    }

    pub fn mark_requests_read(&mut self) -> usize {
        let changed = self.inbox.mark_all_read();
        if changed > 0 {
            self.persist(PersistJob::MarkRequestsRead);
        }
        changed
    }

    // -- Views -------------------------------------------------------------

    /// Records of the active conversation, in admission order.
    pub fn visible(&self) -> Vec<&MessageRecord> {
        match &self.active_scope {
            Some(scope) => scope_filter::visible(self.records.iter(), scope),
            None => Vec::new(),
        }
    }

    pub fn clusters(&self) -> Vec<ClusterView> {
        grouper::group(&self.visible(), &self.config)
            .iter()
            .map(ClusterView::from)
            .collect()
    }

    /// Latest record per conversation, newest conversation first.
    pub fn chat_previews(&self) -> Vec<ChatPreview> {
        let mut latest: HashMap<Scope, &MessageRecord> = HashMap::new();
        for record in self.records.iter() {
            latest
                .entry(record.scope)
                .and_modify(|held| {
                    // `>=` keeps the later-admitted record on ties.
                    if record.timestamp >= held.timestamp {
                        *held = record;
                    }
                })
                .or_insert(record);
        }

        let mut previews: Vec<_> = latest
            .into_iter()
            .map(|(scope, record)| ChatPreview {
                scope,
                latest: record.clone(),
            })
            .collect();
        previews.sort_by(|a, b| {
            b.latest
                .timestamp
                .cmp(&a.latest.timestamp)
                .then_with(|| a.scope.id.cmp(&b.scope.id))
        });
        previews
    }

    pub fn earliest_timestamp(&self, scope: Scope) -> Option<i64> {
        scope_filter::visible(self.records.iter(), &scope)
            .iter()
            .map(|r| r.timestamp)
            .min()
    }

    fn persist(&self, job: PersistJob) {
        let kind = job.kind();
        if self.persist_tx.send(job).is_err() {
            warn!(job = kind, "Persistence queue closed, dropping job");
        }
    }
}
