use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deterministic local ids derived from persisted rows.
const LOCAL_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f6e_6563_6861_7400_8000_0000_6c6f_6361);

// QQ-style numeric account id (user or bot)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Gateway-assigned message id (`message_id` in OneBot v11).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RemoteId(pub i64);

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-generated message identity. Opaque, immutable once assigned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    /// A fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// A stable id derived from `seed`: the same seed always yields the same id.
    pub fn derived(seed: &str) -> Self {
        Self(Uuid::new_v5(&LOCAL_ID_NAMESPACE, seed.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for LocalId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LocalId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for LocalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Private,
    Group,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(Self::Private),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// One conversation: a private chat with a user, or a group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Scope {
    pub kind: ScopeKind,
    pub id: i64,
}

impl Scope {
    pub fn private(user_id: i64) -> Self {
        Self {
            kind: ScopeKind::Private,
            id: user_id,
        }
    }

    pub fn group(group_id: i64) -> Self {
        Self {
            kind: ScopeKind::Group,
            id: group_id,
        }
    }

    /// Parse the `kind:id` form, e.g. `private:1001` or `group:42`.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, id) = s.split_once(':')?;
        Some(Self {
            kind: ScopeKind::parse(kind)?,
            id: id.trim().parse().ok()?,
        })
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Received,
    Sent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SendState {
    Pending,
    Acknowledged,
    Failed,
}

impl SendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Acknowledged => "acknowledged",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "acknowledged" => Some(Self::Acknowledged),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Local handling state of a friend/group request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_local_id_is_stable() {
        let a = LocalId::derived("message:private:1001:77:1000");
        let b = LocalId::derived("message:private:1001:77:1000");
        let c = LocalId::derived("message:private:1001:78:1000");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fresh_local_ids_differ() {
        assert_ne!(LocalId::new(), LocalId::new());
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!(Scope::parse("private:1001"), Some(Scope::private(1001)));
        assert_eq!(Scope::parse("group:42"), Some(Scope::group(42)));
        assert_eq!(Scope::parse("channel:42"), None);
        assert_eq!(Scope::parse("group:abc"), None);
        assert_eq!(Scope::group(42).to_string(), "group:42");
    }
}
