//! Friend and group requests waiting for the user.

use std::collections::HashMap;

use onechat_shared::protocol::RequestEvent;
use onechat_shared::types::RequestStatus;
use onechat_store::StoredRequest;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: String,
    pub request_type: String,
    pub sub_type: Option<String>,
    pub user_id: i64,
    pub group_id: Option<i64>,
    pub comment: String,
    /// Handle the gateway expects when answering.
    pub flag: String,
    pub time: i64,
    pub status: RequestStatus,
    pub is_read: bool,
}

impl PendingRequest {
    pub fn from_event(event: &RequestEvent) -> Self {
        Self {
            id: StoredRequest::make_id(&event.request_type, &event.flag, event.time),
            request_type: event.request_type.clone(),
            sub_type: event.sub_type.clone(),
            user_id: event.user_id,
            group_id: event.group_id,
            comment: event.comment.clone(),
            flag: event.flag.clone(),
            time: event.time,
            status: RequestStatus::Pending,
            is_read: false,
        }
    }

    pub fn to_stored(&self) -> StoredRequest {
        StoredRequest {
            id: self.id.clone(),
            flag: self.flag.clone(),
            time: self.time,
            request_type: self.request_type.clone(),
            sub_type: self.sub_type.clone(),
            user_id: self.user_id,
            group_id: self.group_id,
            comment: self.comment.clone(),
            status: self.status,
            is_read: self.is_read,
        }
    }
}

impl From<StoredRequest> for PendingRequest {
    fn from(row: StoredRequest) -> Self {
        Self {
            id: row.id,
            request_type: row.request_type,
            sub_type: row.sub_type,
            user_id: row.user_id,
            group_id: row.group_id,
            comment: row.comment,
            flag: row.flag,
            time: row.time,
            status: row.status,
            is_read: row.is_read,
        }
    }
}

/// In-memory request list keyed by flag.
#[derive(Debug, Default)]
pub struct RequestInbox {
    requests: Vec<PendingRequest>,
    by_flag: HashMap<String, usize>,
}

impl RequestInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request. Returns `false` if one with the same flag is already held.
    pub fn insert(&mut self, request: PendingRequest) -> bool {
        if self.by_flag.contains_key(&request.flag) {
            return false;
        }
        self.by_flag
            .insert(request.flag.clone(), self.requests.len());
        self.requests.push(request);
        true
    }

    /// Requests newest first.
    pub fn list(&self, pending_only: bool) -> Vec<PendingRequest> {
        let mut out: Vec<_> = self
            .requests
            .iter()
            .filter(|r| !pending_only || r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.time.cmp(&a.time));
        out
    }

    pub fn unread_count(&self) -> usize {
        self.requests.iter().filter(|r| !r.is_read).count()
    }

    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for request in self.requests.iter_mut().filter(|r| !r.is_read) {
            request.is_read = true;
            changed += 1;
        }
        changed
    }

    /// Record the user's decision. Returns `false` for an unknown flag.
    pub fn resolve(&mut self, flag: &str, status: RequestStatus) -> bool {
        let Some(&index) = self.by_flag.get(flag) else {
            return false;
        };
        let request = &mut self.requests[index];
        request.status = status;
        request.is_read = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(flag: &str, time: i64) -> RequestEvent {
        RequestEvent {
            time,
            self_id: 10,
            request_type: "group".into(),
            sub_type: Some("invite".into()),
            user_id: 2002,
            group_id: Some(42),
            comment: String::new(),
            flag: flag.into(),
        }
    }

    #[test]
    fn duplicate_flags_are_ignored() {
        let mut inbox = RequestInbox::new();
        assert!(inbox.insert(PendingRequest::from_event(&event("f1", 100))));
        assert!(!inbox.insert(PendingRequest::from_event(&event("f1", 100))));
        assert_eq!(inbox.list(false).len(), 1);
        assert_eq!(inbox.list(false)[0].id, "group_f1_100");
    }

    #[test]
    fn resolve_and_read_tracking() {
        let mut inbox = RequestInbox::new();
        inbox.insert(PendingRequest::from_event(&event("f1", 100)));
        inbox.insert(PendingRequest::from_event(&event("f2", 200)));
        assert_eq!(inbox.unread_count(), 2);

        assert!(inbox.resolve("f1", RequestStatus::Rejected));
        assert!(!inbox.resolve("nope", RequestStatus::Approved));
        assert_eq!(inbox.unread_count(), 1);

        let pending = inbox.list(true);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].flag, "f2");

        assert_eq!(inbox.mark_all_read(), 1);
        assert_eq!(inbox.unread_count(), 0);
    }
}
