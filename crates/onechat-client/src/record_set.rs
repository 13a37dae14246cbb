//! Keyed container of every record seen this session.
//!
//! Records are never removed. Indices into `records` therefore stay valid for
//! the lifetime of the set and double as insertion order.

use std::collections::HashMap;

use onechat_shared::types::{LocalId, RemoteId, Scope};

use crate::record::MessageRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// A record with the same local id already exists; it was left untouched.
    RejectedAsDuplicate,
}

#[derive(Debug, Default)]
pub struct RecordSet {
    records: Vec<MessageRecord>,
    by_local: HashMap<LocalId, usize>,
    by_remote: HashMap<RemoteId, Vec<usize>>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` unless its local id is already present.
    pub fn admit(&mut self, record: MessageRecord) -> Admission {
        if self.by_local.contains_key(&record.local_id) {
            return Admission::RejectedAsDuplicate;
        }

        let index = self.records.len();
        self.by_local.insert(record.local_id.clone(), index);
        if let Some(remote) = record.remote_id {
            self.by_remote.entry(remote).or_default().push(index);
        }
        self.records.push(record);
        Admission::Accepted
    }

    pub fn get(&self, local_id: &LocalId) -> Option<&MessageRecord> {
        self.by_local.get(local_id).map(|&i| &self.records[i])
    }

    pub fn contains(&self, local_id: &LocalId) -> bool {
        self.by_local.contains_key(local_id)
    }

    /// Local id of the record in `scope` that carries `remote`, if any.
    pub fn find_remote_in_scope(&self, remote: RemoteId, scope: Scope) -> Option<&LocalId> {
        self.by_remote
            .get(&remote)?
            .iter()
            .map(|&i| &self.records[i])
            .find(|r| r.scope == scope)
            .map(|r| &r.local_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    // Mutation access for the applier. Identity fields must not be touched
    // through these; remote ids go through `link_remote`.

    pub(crate) fn get_mut(&mut self, local_id: &LocalId) -> Option<&mut MessageRecord> {
        let index = *self.by_local.get(local_id)?;
        Some(&mut self.records[index])
    }

    pub(crate) fn indices_for_remote(&self, remote: RemoteId) -> Vec<usize> {
        self.by_remote.get(&remote).cloned().unwrap_or_default()
    }

    pub(crate) fn record_at_mut(&mut self, index: usize) -> &mut MessageRecord {
        &mut self.records[index]
    }

    /// Set the remote id of a record that has none yet and index it.
    pub(crate) fn link_remote(&mut self, local_id: &LocalId, remote: RemoteId) -> bool {
        let Some(&index) = self.by_local.get(local_id) else {
            return false;
        };
        let record = &mut self.records[index];
        if record.remote_id.is_some() {
            return false;
        }
        record.remote_id = Some(remote);
        self.by_remote.entry(remote).or_default().push(index);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onechat_shared::types::UserId;

    fn record(local: &str, remote: Option<i64>, scope: Scope) -> MessageRecord {
        let mut r = MessageRecord::optimistic(scope, UserId(10), "x".into(), 1);
        r.local_id = LocalId::from(local);
        r.remote_id = remote.map(RemoteId);
        r
    }

    #[test]
    fn admit_is_idempotent() {
        let mut set = RecordSet::new();
        let scope = Scope::private(1001);

        assert_eq!(set.admit(record("a", None, scope)), Admission::Accepted);

        let mut again = record("a", Some(5), scope);
        again.content = "changed".into();
        assert_eq!(set.admit(again), Admission::RejectedAsDuplicate);

        assert_eq!(set.len(), 1);
        let kept = set.get(&LocalId::from("a")).unwrap();
        assert_eq!(kept.content, "x");
        assert_eq!(kept.remote_id, None);
    }

    #[test]
    fn remote_lookup_is_scoped() {
        let mut set = RecordSet::new();
        set.admit(record("a", Some(7), Scope::private(1001)));
        set.admit(record("b", Some(7), Scope::group(42)));

        assert_eq!(
            set.find_remote_in_scope(RemoteId(7), Scope::group(42)),
            Some(&LocalId::from("b"))
        );
        assert_eq!(set.find_remote_in_scope(RemoteId(7), Scope::group(43)), None);
        assert_eq!(set.indices_for_remote(RemoteId(7)).len(), 2);
    }

    #[test]
    fn link_remote_only_once() {
        let mut set = RecordSet::new();
        let scope = Scope::private(1001);
        set.admit(record("a", None, scope));

        assert!(set.link_remote(&LocalId::from("a"), RemoteId(9)));
        assert!(!set.link_remote(&LocalId::from("a"), RemoteId(10)));
        assert_eq!(
            set.find_remote_in_scope(RemoteId(9), scope),
            Some(&LocalId::from("a"))
        );
        assert!(set.indices_for_remote(RemoteId(10)).is_empty());
    }
}
