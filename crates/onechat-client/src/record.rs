//! The normalized message record every source is mapped to.

use onechat_shared::protocol::MessageEvent;
use onechat_shared::types::{Direction, LocalId, RemoteId, Scope, SendState, UserId};
use onechat_shared::ProtocolError;
use onechat_store::{StoredMessage, POST_TYPE_MESSAGE, POST_TYPE_MESSAGE_SENT};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub local_id: LocalId,
    pub remote_id: Option<RemoteId>,
    /// Unix seconds; the only ordering key.
    pub timestamp: i64,
    pub direction: Direction,
    pub scope: Scope,
    pub sender_id: UserId,
    pub sender_name: Option<String>,
    /// Raw CQ markup.
    pub content: String,
    /// `None` for received messages.
    pub send_state: Option<SendState>,
    pub recalled: bool,
}

impl MessageRecord {
    /// Optimistic record for a message the user is about to send.
    pub fn optimistic(scope: Scope, self_id: UserId, content: String, now: i64) -> Self {
        Self {
            local_id: LocalId::new(),
            remote_id: None,
            timestamp: now,
            direction: Direction::Sent,
            scope,
            sender_id: self_id,
            sender_name: None,
            content,
            send_state: Some(SendState::Pending),
            recalled: false,
        }
    }

    /// Record for a live `message` / `message_sent` event.
    pub fn from_event(
        event: &MessageEvent,
        direction: Direction,
        local_id: LocalId,
    ) -> Result<Self, ProtocolError> {
        let remote_id = remote_id_of(event);
        let send_state = match direction {
            Direction::Received => None,
            // An echo already carries the gateway id, so the send went through.
            Direction::Sent if remote_id.is_some() => Some(SendState::Acknowledged),
            Direction::Sent => Some(SendState::Pending),
        };

        Ok(Self {
            local_id,
            remote_id,
            timestamp: event.time,
            direction,
            scope: event.scope(direction)?,
            sender_id: UserId(event.user_id),
            sender_name: event.sender_name(),
            content: event.content(),
            send_state,
            recalled: false,
        })
    }

    /// Record for a persisted row.
    ///
    /// Rows without a local id get one derived from their stable fields, so
    /// loading the same row twice yields the same identity. A sent row still
    /// pending belongs to an earlier session and can no longer be acked; it
    /// is loaded as failed.
    pub fn from_stored(row: &StoredMessage) -> Self {
        let direction = if row.is_sent() {
            Direction::Sent
        } else {
            Direction::Received
        };

        let local_id = match &row.local_message_id {
            Some(id) if !id.is_empty() => LocalId::from(id.as_str()),
            _ => LocalId::derived(&derivation_seed(row)),
        };

        let send_state = match direction {
            Direction::Received => None,
            Direction::Sent => Some(match row.send_state {
                Some(SendState::Pending) => SendState::Failed,
                Some(state) => state,
                None if row.message_id.is_some() => SendState::Acknowledged,
                None => SendState::Failed,
            }),
        };

        Self {
            local_id,
            remote_id: row.message_id.map(RemoteId),
            timestamp: row.timestamp,
            direction,
            scope: row.scope,
            sender_id: UserId(row.sender_id),
            sender_name: row.sender_name.clone(),
            content: row.content.clone(),
            send_state,
            recalled: row.recalled,
        }
    }

    pub fn to_stored(&self, data: Option<String>) -> StoredMessage {
        let post_type = match self.direction {
            Direction::Received => POST_TYPE_MESSAGE,
            Direction::Sent => POST_TYPE_MESSAGE_SENT,
        };

        StoredMessage {
            local_message_id: Some(self.local_id.as_str().to_string()),
            timestamp: self.timestamp,
            post_type: post_type.to_string(),
            scope: self.scope,
            sender_id: self.sender_id.0,
            sender_name: self.sender_name.clone(),
            message_id: self.remote_id.map(|r| r.0),
            content: self.content.clone(),
            send_state: self.send_state,
            recalled: self.recalled,
            data,
        }
    }

    /// Name shown on the cluster header.
    pub fn sender_label(&self) -> String {
        match &self.sender_name {
            Some(name) => name.clone(),
            None => self.sender_id.to_string(),
        }
    }
}

/// Gateway id of an event; `0` means the gateway did not assign one.
pub(crate) fn remote_id_of(event: &MessageEvent) -> Option<RemoteId> {
    (event.message_id != 0).then_some(RemoteId(event.message_id))
}

fn derivation_seed(row: &StoredMessage) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}",
        row.post_type,
        row.scope,
        row.message_id.map(|id| id.to_string()).unwrap_or_default(),
        row.timestamp,
        row.sender_id,
        row.content,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_row() -> StoredMessage {
        StoredMessage {
            local_message_id: None,
            timestamp: 1000,
            post_type: POST_TYPE_MESSAGE.to_string(),
            scope: Scope::private(1001),
            sender_id: 1001,
            sender_name: None,
            message_id: Some(77),
            content: "hi".to_string(),
            send_state: None,
            recalled: false,
            data: None,
        }
    }

    #[test]
    fn missing_local_id_is_derived_deterministically() {
        let a = MessageRecord::from_stored(&legacy_row());
        let b = MessageRecord::from_stored(&legacy_row());
        assert_eq!(a.local_id, b.local_id);

        let mut other = legacy_row();
        other.message_id = Some(78);
        assert_ne!(MessageRecord::from_stored(&other).local_id, a.local_id);
    }

    #[test]
    fn stale_pending_row_loads_as_failed() {
        let mut row = legacy_row();
        row.post_type = POST_TYPE_MESSAGE_SENT.to_string();
        row.local_message_id = Some("abc".to_string());
        row.message_id = None;
        row.send_state = Some(SendState::Pending);

        let record = MessageRecord::from_stored(&row);
        assert_eq!(record.direction, Direction::Sent);
        assert_eq!(record.local_id, LocalId::from("abc"));
        assert_eq!(record.send_state, Some(SendState::Failed));
    }

    #[test]
    fn stored_round_trip_keeps_identity() {
        let record = MessageRecord::optimistic(Scope::group(42), UserId(10), "yo".into(), 5);
        let back = MessageRecord::from_stored(&record.to_stored(None));
        // Pending does not survive a reload.
        assert_eq!(back.send_state, Some(SendState::Failed));
        assert_eq!(back.local_id, record.local_id);
        assert_eq!(back.scope, record.scope);
    }

    #[test]
    fn sender_label_falls_back_to_id() {
        let mut record = MessageRecord::from_stored(&legacy_row());
        assert_eq!(record.sender_label(), "1001");
        record.sender_name = Some("alice".into());
        assert_eq!(record.sender_label(), "alice");
    }
}
