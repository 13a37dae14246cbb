//! OneBot v11 frames as seen by the client.
//!
//! Inbound frames arrive on a single socket and are classified by their
//! `post_type` discriminant. API responses carry no `post_type`; they are
//! recognised by their `status`/`retcode` fields and correlated through
//! `echo`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{ACTION_SEND_GROUP_MSG, ACTION_SEND_PRIVATE_MSG};
use crate::error::ProtocolError;
use crate::types::{Direction, LocalId, RemoteId, Scope, ScopeKind};

/// All inbound frames the client understands.
#[derive(Debug, Clone)]
pub enum PushEvent {
    /// A message received from a friend or group member.
    Message(MessageEvent),
    /// Echo of a message sent by the logged-in account (possibly from another device).
    MessageSent(MessageEvent),
    /// `friend_recall` / `group_recall` notice.
    Recall(RecallNotice),
    /// Any other notice (membership changes, uploads, bans, ...).
    Notice(OtherNotice),
    /// Friend or group application.
    Request(RequestEvent),
    /// Response to an action previously sent with an `echo`.
    ApiResponse(ApiResponse),
    /// Lifecycle / heartbeat.
    Meta(MetaEvent),
}

impl PushEvent {
    /// Decode one raw frame.
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(frame)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let post_type = value
            .get("post_type")
            .and_then(Value::as_str)
            .map(str::to_string);

        let Some(post_type) = post_type else {
            if value.get("retcode").is_some() || value.get("status").is_some() {
                return Ok(Self::ApiResponse(serde_json::from_value(value)?));
            }
            return Err(ProtocolError::MissingField("post_type"));
        };

        match post_type.as_str() {
            "message" => Ok(Self::Message(serde_json::from_value(value)?)),
            "message_sent" => Ok(Self::MessageSent(serde_json::from_value(value)?)),
            "notice" => decode_notice(value),
            "request" => Ok(Self::Request(serde_json::from_value(value)?)),
            "meta_event" => Ok(Self::Meta(serde_json::from_value(value)?)),
            "api_response" => {
                // Some bridges wrap the response under `raw`.
                let inner = value.get("raw").cloned().unwrap_or(value);
                Ok(Self::ApiResponse(serde_json::from_value(inner)?))
            }
            other => Err(ProtocolError::UnknownPostType(other.to_string())),
        }
    }

    /// Account id of the bot this frame was delivered to, if carried.
    pub fn self_id(&self) -> Option<i64> {
        let id = match self {
            Self::Message(m) | Self::MessageSent(m) => m.self_id,
            Self::Recall(r) => r.self_id,
            Self::Notice(n) => n.self_id,
            Self::Request(r) => r.self_id,
            Self::Meta(m) => m.self_id,
            Self::ApiResponse(_) => 0,
        };
        (id > 0).then_some(id)
    }

    /// Short discriminant used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::MessageSent(_) => "message_sent",
            Self::Recall(_) => "notice:recall",
            Self::Notice(_) => "notice",
            Self::Request(_) => "request",
            Self::ApiResponse(_) => "api_response",
            Self::Meta(_) => "meta_event",
        }
    }
}

fn decode_notice(value: Value) -> Result<PushEvent, ProtocolError> {
    let notice_type = value
        .get("notice_type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingField("notice_type"))?;

    let self_id = value.get("self_id").and_then(Value::as_i64).unwrap_or(0);
    let time = value.get("time").and_then(Value::as_i64).unwrap_or(0);

    let scope = match notice_type {
        "group_recall" => Some(Scope::group(require_i64(&value, "group_id")?)),
        "friend_recall" => Some(Scope::private(require_i64(&value, "user_id")?)),
        _ => None,
    };

    match scope {
        Some(scope) => Ok(PushEvent::Recall(RecallNotice {
            self_id,
            time,
            scope,
            message_id: RemoteId(require_i64(&value, "message_id")?),
            operator_id: value.get("operator_id").and_then(Value::as_i64),
        })),
        None => Ok(PushEvent::Notice(OtherNotice {
            self_id,
            time,
            notice_type: notice_type.to_string(),
            user_id: value.get("user_id").and_then(Value::as_i64),
            group_id: value.get("group_id").and_then(Value::as_i64),
        })),
    }
}

fn require_i64(value: &Value, field: &'static str) -> Result<i64, ProtocolError> {
    value
        .get(field)
        .and_then(Value::as_i64)
        .ok_or(ProtocolError::MissingField(field))
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageSender {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub nickname: Option<String>,
    /// Group card (per-group display name).
    #[serde(default)]
    pub card: Option<String>,
}

/// `message` and `message_sent` share one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub self_id: i64,
    pub message_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    pub message_id: i64,
    pub user_id: i64,
    #[serde(default)]
    pub group_id: Option<i64>,
    /// Counterpart of a private `message_sent` (where `user_id` is ourselves).
    #[serde(default)]
    pub target_id: Option<i64>,
    #[serde(default)]
    pub raw_message: Option<String>,
    /// Either a CQ string or an array of segments.
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub sender: Option<MessageSender>,
    /// Correlation id attached by a cooperating backend to echoes of our own sends.
    #[serde(default)]
    pub local_message_id: Option<String>,
}

impl MessageEvent {
    /// Conversation this message belongs to, seen from our side.
    pub fn scope(&self, direction: Direction) -> Result<Scope, ProtocolError> {
        match ScopeKind::parse(&self.message_type) {
            Some(ScopeKind::Group) => self
                .group_id
                .map(Scope::group)
                .ok_or(ProtocolError::MissingField("group_id")),
            Some(ScopeKind::Private) => {
                let counterpart = match direction {
                    Direction::Received => self.user_id,
                    Direction::Sent => self.target_id.unwrap_or(self.user_id),
                };
                Ok(Scope::private(counterpart))
            }
            None => Err(ProtocolError::UnsupportedMessageType(
                self.message_type.clone(),
            )),
        }
    }

    /// Raw CQ markup of the message body.
    pub fn content(&self) -> String {
        if let Some(raw) = self.raw_message.as_deref().filter(|r| !r.is_empty()) {
            return raw.to_string();
        }
        match &self.message {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(segments)) => segments_to_cq(segments),
            _ => String::new(),
        }
    }

    /// Display name carried by the event: group card first, then nickname.
    pub fn sender_name(&self) -> Option<String> {
        let sender = self.sender.as_ref()?;
        sender
            .card
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| sender.nickname.clone().filter(|n| !n.is_empty()))
    }
}

/// Flatten array-form segments into CQ markup.
pub fn segments_to_cq(segments: &[Value]) -> String {
    let mut out = String::new();
    for segment in segments {
        let Some(kind) = segment.get("type").and_then(Value::as_str) else {
            continue;
        };
        let data = segment.get("data").and_then(Value::as_object);

        if kind == "text" {
            if let Some(text) = data.and_then(|d| d.get("text")).and_then(Value::as_str) {
                out.push_str(text);
            }
            continue;
        }

        out.push_str("[CQ:");
        out.push_str(kind);
        if let Some(data) = data {
            for (key, val) in data {
                let rendered = match val {
                    Value::String(s) => s.clone(),
                    Value::Null => continue,
                    other => other.to_string(),
                };
                out.push(',');
                out.push_str(key);
                out.push('=');
                out.push_str(&rendered);
            }
        }
        out.push(']');
    }
    out
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecallNotice {
    pub self_id: i64,
    pub time: i64,
    pub scope: Scope,
    pub message_id: RemoteId,
    pub operator_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct OtherNotice {
    pub self_id: i64,
    pub time: i64,
    pub notice_type: String,
    pub user_id: Option<i64>,
    pub group_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub self_id: i64,
    /// `friend` or `group`
    pub request_type: String,
    /// `add` or `invite` for group requests
    #[serde(default)]
    pub sub_type: Option<String>,
    pub user_id: i64,
    #[serde(default)]
    pub group_id: Option<i64>,
    #[serde(default)]
    pub comment: String,
    pub flag: String,
}

// ---------------------------------------------------------------------------
// API responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub wording: Option<String>,
    #[serde(default)]
    pub echo: Option<Value>,
}

impl ApiResponse {
    pub fn is_ok(&self) -> bool {
        self.retcode == 0 && (self.status == "ok" || self.status == "async")
    }

    /// The echo as a string, whatever JSON type the gateway returned it as.
    pub fn echo_str(&self) -> Option<String> {
        match self.echo.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// `data.message_id` of a successful send action.
    pub fn message_id(&self) -> Option<RemoteId> {
        self.data.get("message_id").and_then(Value::as_i64).map(RemoteId)
    }

    pub fn error_text(&self) -> String {
        self.wording
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| format!("retcode {}", self.retcode))
    }
}

// ---------------------------------------------------------------------------
// Meta events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaEvent {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub self_id: i64,
    pub meta_event_type: String,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// An action frame sent to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    pub action: String,
    pub params: Value,
    /// Correlation id echoed back in the matching [`ApiResponse`].
    pub echo: String,
}

impl OutboundRequest {
    /// `send_private_msg` / `send_group_msg` carrying the optimistic record's id as echo.
    pub fn send_message(scope: Scope, content: &str, correlation: &LocalId) -> Self {
        let (action, params) = match scope.kind {
            ScopeKind::Private => (
                ACTION_SEND_PRIVATE_MSG,
                serde_json::json!({ "user_id": scope.id, "message": content }),
            ),
            ScopeKind::Group => (
                ACTION_SEND_GROUP_MSG,
                serde_json::json!({ "group_id": scope.id, "message": content }),
            ),
        };
        Self {
            action: action.to_string(),
            params,
            echo: correlation.as_str().to_string(),
        }
    }

    pub fn to_frame(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_group_message() {
        let frame = r#"{
            "time": 1000, "self_id": 10, "post_type": "message",
            "message_type": "group", "sub_type": "normal",
            "message_id": 77, "user_id": 1001, "group_id": 42,
            "raw_message": "hi [CQ:face,id=14]",
            "sender": {"user_id": 1001, "nickname": "alice", "card": ""}
        }"#;

        let PushEvent::Message(msg) = PushEvent::decode(frame).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(msg.scope(Direction::Received).unwrap(), Scope::group(42));
        assert_eq!(msg.content(), "hi [CQ:face,id=14]");
        assert_eq!(msg.sender_name().as_deref(), Some("alice"));
    }

    #[test]
    fn test_private_message_sent_uses_target() {
        let frame = r#"{
            "time": 1402, "self_id": 10, "post_type": "message_sent",
            "message_type": "private", "message_id": 5,
            "user_id": 10, "target_id": 1001, "raw_message": "yo"
        }"#;

        let PushEvent::MessageSent(msg) = PushEvent::decode(frame).unwrap() else {
            panic!("expected message_sent");
        };
        assert_eq!(msg.scope(Direction::Sent).unwrap(), Scope::private(1001));
    }

    #[test]
    fn test_array_message_flattened_to_cq() {
        let frame = r#"{
            "post_type": "message", "message_type": "private",
            "message_id": 1, "user_id": 1001,
            "message": [
                {"type": "text", "data": {"text": "look "}},
                {"type": "image", "data": {"file": "a.png"}}
            ]
        }"#;

        let PushEvent::Message(msg) = PushEvent::decode(frame).unwrap() else {
            panic!("expected message");
        };
        assert_eq!(msg.content(), "look [CQ:image,file=a.png]");
    }

    #[test]
    fn test_decode_recall_notices() {
        let group = r#"{"post_type":"notice","notice_type":"group_recall",
            "group_id":42,"user_id":1001,"operator_id":1001,"message_id":999}"#;
        let PushEvent::Recall(recall) = PushEvent::decode(group).unwrap() else {
            panic!("expected recall");
        };
        assert_eq!(recall.scope, Scope::group(42));
        assert_eq!(recall.message_id, RemoteId(999));

        let friend = r#"{"post_type":"notice","notice_type":"friend_recall",
            "user_id":1001,"message_id":5}"#;
        let PushEvent::Recall(recall) = PushEvent::decode(friend).unwrap() else {
            panic!("expected recall");
        };
        assert_eq!(recall.scope, Scope::private(1001));
    }

    #[test]
    fn test_other_notice_is_not_recall() {
        let frame = r#"{"post_type":"notice","notice_type":"group_increase",
            "group_id":42,"user_id":7}"#;
        assert!(matches!(
            PushEvent::decode(frame).unwrap(),
            PushEvent::Notice(n) if n.notice_type == "group_increase"
        ));
    }

    #[test]
    fn test_decode_api_response_without_post_type() {
        let frame = r#"{"status":"ok","retcode":0,"data":{"message_id":999},"echo":"abc"}"#;
        let PushEvent::ApiResponse(resp) = PushEvent::decode(frame).unwrap() else {
            panic!("expected api response");
        };
        assert!(resp.is_ok());
        assert_eq!(resp.echo_str().as_deref(), Some("abc"));
        assert_eq!(resp.message_id(), Some(RemoteId(999)));
    }

    #[test]
    fn test_malformed_frames_rejected() {
        assert!(matches!(
            PushEvent::decode("not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            PushEvent::decode(r#"{"post_type":"weird"}"#),
            Err(ProtocolError::UnknownPostType(_))
        ));
        assert!(matches!(
            PushEvent::decode(r#"{"time":1}"#),
            Err(ProtocolError::MissingField("post_type"))
        ));
    }

    #[test]
    fn test_outbound_frame_carries_echo() {
        let id = LocalId::from("abc");
        let req = OutboundRequest::send_message(Scope::group(42), "hello", &id);
        assert_eq!(req.action, "send_group_msg");
        assert_eq!(req.params["group_id"], 42);

        let frame: Value = serde_json::from_str(&req.to_frame().unwrap()).unwrap();
        assert_eq!(frame["echo"], "abc");
        assert_eq!(frame["params"]["message"], "hello");
    }
}
