//! Which records belong to the conversation being viewed.

use onechat_shared::types::Scope;

use crate::record::MessageRecord;

/// True iff `record` belongs to `scope`, whatever its direction.
pub fn is_visible(record: &MessageRecord, scope: &Scope) -> bool {
    record.scope.kind == scope.kind && record.scope.id == scope.id
}

/// The subset of `records` visible in `scope`, in the order given.
pub fn visible<'a>(
    records: impl IntoIterator<Item = &'a MessageRecord>,
    scope: &Scope,
) -> Vec<&'a MessageRecord> {
    records
        .into_iter()
        .filter(|r| is_visible(r, scope))
        .collect()
}
