//! In-place transitions on records already in the set.
//!
//! Every operation is total: a missing target is reported in the outcome,
//! never as an error. Callers decide what to log and persist.

use onechat_shared::types::{Direction, LocalId, RemoteId, SendState};

use crate::record_set::RecordSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged,
    /// Same remote id delivered again.
    AlreadyAcknowledged,
    /// The record already carries a different remote id, which is kept.
    Conflict { existing: RemoteId },
    /// Received records are never ack targets.
    NotSent,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Failed,
    AlreadyFailed,
    /// An ack arrived first; the record stays acknowledged.
    AlreadyAcknowledged,
    NotSent,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallOutcome {
    /// Number of records newly flagged.
    Recalled(usize),
    AlreadyRecalled,
    /// No loaded record carries the id; only the store can be updated.
    NotLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOutcome {
    Updated,
    Unchanged,
    NotFound,
}

pub fn apply_ack(set: &mut RecordSet, local_id: &LocalId, remote_id: RemoteId) -> AckOutcome {
    let Some(record) = set.get_mut(local_id) else {
        return AckOutcome::NotFound;
    };
    if record.direction != Direction::Sent {
        return AckOutcome::NotSent;
    }

    let current = record.remote_id;
    match current {
        Some(existing) if existing == remote_id => {
            record.send_state = Some(SendState::Acknowledged);
            AckOutcome::AlreadyAcknowledged
        }
        Some(existing) => AckOutcome::Conflict { existing },
        None => {
            record.send_state = Some(SendState::Acknowledged);
            set.link_remote(local_id, remote_id);
            AckOutcome::Acknowledged
        }
    }
}

pub fn apply_failure(set: &mut RecordSet, local_id: &LocalId) -> FailureOutcome {
    let Some(record) = set.get_mut(local_id) else {
        return FailureOutcome::NotFound;
    };

    match record.send_state {
        None => FailureOutcome::NotSent,
        Some(SendState::Acknowledged) => FailureOutcome::AlreadyAcknowledged,
        Some(SendState::Failed) => FailureOutcome::AlreadyFailed,
        Some(SendState::Pending) => {
            record.send_state = Some(SendState::Failed);
            FailureOutcome::Failed
        }
    }
}

/// Replace a record's body. Identity, timestamp and states are untouched.
pub fn apply_content_update(set: &mut RecordSet, local_id: &LocalId, content: &str) -> ContentOutcome {
    let Some(record) = set.get_mut(local_id) else {
        return ContentOutcome::NotFound;
    };
    if record.content == content {
        return ContentOutcome::Unchanged;
    }
    record.content = content.to_string();
    ContentOutcome::Updated
}

pub fn apply_recall(set: &mut RecordSet, remote_id: RemoteId) -> RecallOutcome {
    let indices = set.indices_for_remote(remote_id);
    if indices.is_empty() {
        return RecallOutcome::NotLoaded;
    }

    let mut newly = 0;
    for index in indices {
        let record = set.record_at_mut(index);
        if !record.recalled {
            record.recalled = true;
            newly += 1;
        }
    }

    if newly == 0 {
        RecallOutcome::AlreadyRecalled
    } else {
        RecallOutcome::Recalled(newly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MessageRecord;
    use onechat_shared::types::{Scope, UserId};

    fn pending(set: &mut RecordSet, local: &str) -> LocalId {
        let mut r = MessageRecord::optimistic(Scope::private(1001), UserId(10), "hi".into(), 1);
        r.local_id = LocalId::from(local);
        let id = r.local_id.clone();
        set.admit(r);
        id
    }

    #[test]
    fn ack_converges_pending_send() {
        let mut set = RecordSet::new();
        let x = pending(&mut set, "x");

        assert_eq!(apply_ack(&mut set, &x, RemoteId(42)), AckOutcome::Acknowledged);

        let record = set.get(&x).unwrap();
        assert_eq!(record.send_state, Some(SendState::Acknowledged));
        assert_eq!(record.remote_id, Some(RemoteId(42)));
        assert_eq!(set.iter().filter(|r| r.local_id == x).count(), 1);
    }

    #[test]
    fn ack_never_changes_remote_id() {
        let mut set = RecordSet::new();
        let x = pending(&mut set, "x");
        apply_ack(&mut set, &x, RemoteId(42));

        assert_eq!(
            apply_ack(&mut set, &x, RemoteId(42)),
            AckOutcome::AlreadyAcknowledged
        );
        assert_eq!(
            apply_ack(&mut set, &x, RemoteId(43)),
            AckOutcome::Conflict {
                existing: RemoteId(42)
            }
        );
        assert_eq!(set.get(&x).unwrap().remote_id, Some(RemoteId(42)));
    }

    #[test]
    fn ack_and_failure_on_unknown_ids_are_noops() {
        let mut set = RecordSet::new();
        let ghost = LocalId::from("ghost");

        assert_eq!(apply_ack(&mut set, &ghost, RemoteId(1)), AckOutcome::NotFound);
        assert_eq!(apply_failure(&mut set, &ghost), FailureOutcome::NotFound);
        assert!(set.is_empty());
    }

    #[test]
    fn received_records_are_not_send_targets() {
        let mut set = RecordSet::new();
        let mut r = MessageRecord::optimistic(Scope::group(42), UserId(7), "hi".into(), 1);
        r.direction = Direction::Received;
        r.send_state = None;
        let id = r.local_id.clone();
        set.admit(r);

        assert_eq!(apply_ack(&mut set, &id, RemoteId(1)), AckOutcome::NotSent);
        assert_eq!(apply_failure(&mut set, &id), FailureOutcome::NotSent);
        assert_eq!(set.get(&id).unwrap().remote_id, None);
    }

    #[test]
    fn failure_after_ack_keeps_ack() {
        let mut set = RecordSet::new();
        let x = pending(&mut set, "x");
        let y = pending(&mut set, "y");
        apply_ack(&mut set, &x, RemoteId(42));

        assert_eq!(apply_failure(&mut set, &x), FailureOutcome::AlreadyAcknowledged);
        assert_eq!(apply_failure(&mut set, &y), FailureOutcome::Failed);
        assert_eq!(apply_failure(&mut set, &y), FailureOutcome::AlreadyFailed);
        assert_eq!(set.get(&y).unwrap().send_state, Some(SendState::Failed));
    }

    #[test]
    fn content_update_patches_in_place() {
        let mut set = RecordSet::new();
        let x = pending(&mut set, "x");
        apply_ack(&mut set, &x, RemoteId(42));
        let before = set.get(&x).unwrap().clone();

        assert_eq!(
            apply_content_update(&mut set, &x, "[CQ:image,url=a.png]"),
            ContentOutcome::Updated
        );
        assert_eq!(
            apply_content_update(&mut set, &x, "[CQ:image,url=a.png]"),
            ContentOutcome::Unchanged
        );
        assert_eq!(
            apply_content_update(&mut set, &LocalId::from("ghost"), "x"),
            ContentOutcome::NotFound
        );

        let after = set.get(&x).unwrap();
        assert_eq!(after.content, "[CQ:image,url=a.png]");
        assert_eq!(after.local_id, before.local_id);
        assert_eq!(after.remote_id, before.remote_id);
        assert_eq!(after.timestamp, before.timestamp);
        assert_eq!(after.send_state, before.send_state);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn recall_is_monotonic() {
        let mut set = RecordSet::new();
        let x = pending(&mut set, "x");
        apply_ack(&mut set, &x, RemoteId(999));

        assert_eq!(apply_recall(&mut set, RemoteId(999)), RecallOutcome::Recalled(1));
        assert_eq!(apply_recall(&mut set, RemoteId(999)), RecallOutcome::AlreadyRecalled);
        // A later ack replay does not revert it.
        apply_ack(&mut set, &x, RemoteId(999));
        assert!(set.get(&x).unwrap().recalled);
    }

    #[test]
    fn recall_of_unloaded_id_reports_not_loaded() {
        let mut set = RecordSet::new();
        pending(&mut set, "x");
        assert_eq!(apply_recall(&mut set, RemoteId(5)), RecallOutcome::NotLoaded);
        assert!(set.iter().all(|r| !r.recalled));
    }
}
