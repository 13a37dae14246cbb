//! Rows persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.

use onechat_shared::types::{RequestStatus, Scope, SendState};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// `post_type` of messages received from others.
pub const POST_TYPE_MESSAGE: &str = "message";
/// `post_type` of messages sent by the logged-in account.
pub const POST_TYPE_MESSAGE_SENT: &str = "message_sent";

/// A single chat message row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredMessage {
    /// Client-generated id. Rows written by older clients may lack one.
    pub local_message_id: Option<String>,
    /// Unix seconds.
    pub timestamp: i64,
    /// `message` or `message_sent`.
    pub post_type: String,
    pub scope: Scope,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    /// Gateway message id, unknown until the send is acknowledged.
    pub message_id: Option<i64>,
    /// Raw CQ markup.
    pub content: String,
    /// Only set for sent messages.
    pub send_state: Option<SendState>,
    pub recalled: bool,
    /// Original event JSON, kept for later re-interpretation.
    pub data: Option<String>,
}

impl StoredMessage {
    pub fn is_sent(&self) -> bool {
        self.post_type == POST_TYPE_MESSAGE_SENT
    }
}

/// Which rows [`Database::get_messages`] returns.
///
/// [`Database::get_messages`]: crate::Database::get_messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFilter {
    /// Restrict to one conversation; `None` loads every conversation.
    pub scope: Option<Scope>,
    /// Only rows strictly older than this timestamp.
    pub before: Option<i64>,
    /// Only rows at or older than this timestamp.
    pub until: Option<i64>,
    pub limit: u32,
    pub offset: u32,
}

impl MessageFilter {
    pub fn scope(scope: Scope, limit: u32) -> Self {
        Self {
            scope: Some(scope),
            before: None,
            until: None,
            limit,
            offset: 0,
        }
    }

    pub fn all(limit: u32) -> Self {
        Self {
            scope: None,
            before: None,
            until: None,
            limit,
            offset: 0,
        }
    }

    pub fn before(mut self, timestamp: i64) -> Self {
        self.before = Some(timestamp);
        self
    }

    pub fn until(mut self, timestamp: i64) -> Self {
        self.until = Some(timestamp);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}

/// Aggregate counters shown in the storage settings page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStats {
    pub total: u64,
    pub private: u64,
    pub group: u64,
    pub recalled: u64,
    pub oldest: Option<i64>,
    pub newest: Option<i64>,
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A friend or group request waiting for the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredRequest {
    /// `{request_type}_{flag}_{time}`
    pub id: String,
    pub flag: String,
    pub time: i64,
    /// `friend` or `group`.
    pub request_type: String,
    pub sub_type: Option<String>,
    pub user_id: i64,
    pub group_id: Option<i64>,
    pub comment: String,
    pub status: RequestStatus,
    pub is_read: bool,
}

impl StoredRequest {
    pub fn make_id(request_type: &str, flag: &str, time: i64) -> String {
        format!("{request_type}_{flag}_{time}")
    }
}
