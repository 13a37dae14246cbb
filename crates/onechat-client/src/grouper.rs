//! Chronological grouping of the visible records into render clusters.
//!
//! Records are sorted by timestamp and walked once. A *bucket* starts at its
//! first record (the anchor) and takes every following record until one lies
//! more than `bucket_gap_secs` after the anchor. Inside a bucket, consecutive
//! records of one sender form a *cluster* of at most `cluster_max` records.
//! Only the first cluster of a bucket shows the time header.

use onechat_shared::types::UserId;
use serde::{Deserialize, Serialize};

use crate::config::TimelineConfig;
use crate::record::MessageRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster<'a> {
    /// Timestamp of the bucket's anchor record.
    pub bucket_ts: i64,
    pub sender_id: UserId,
    pub show_time: bool,
    pub show_sender: bool,
    pub records: Vec<&'a MessageRecord>,
}

/// Owned snapshot of a [`Cluster`] handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterView {
    pub bucket_ts: i64,
    pub sender_id: UserId,
    pub sender_label: String,
    pub show_time: bool,
    pub show_sender: bool,
    pub records: Vec<MessageRecord>,
}

impl From<&Cluster<'_>> for ClusterView {
    fn from(cluster: &Cluster<'_>) -> Self {
        let sender_label = cluster
            .records
            .iter()
            .find_map(|r| r.sender_name.clone())
            .unwrap_or_else(|| cluster.sender_id.to_string());

        Self {
            bucket_ts: cluster.bucket_ts,
            sender_id: cluster.sender_id,
            sender_label,
            show_time: cluster.show_time,
            show_sender: cluster.show_sender,
            records: cluster.records.iter().map(|r| (*r).clone()).collect(),
        }
    }
}

pub fn group<'a>(visible: &[&'a MessageRecord], config: &TimelineConfig) -> Vec<Cluster<'a>> {
    let mut sorted = visible.to_vec();
    // Stable: equal timestamps keep admission order.
    sorted.sort_by_key(|r| r.timestamp);

    let cap = config.cluster_max.max(1);
    let mut clusters = Vec::new();
    let mut open: Option<Cluster<'a>> = None;
    let mut anchor = 0i64;

    for record in sorted {
        if open.is_none() || record.timestamp.saturating_sub(anchor) > config.bucket_gap_secs {
            anchor = record.timestamp;
            clusters.extend(open.replace(new_cluster(anchor, record, true)));
            continue;
        }

        let joins_open = open
            .as_ref()
            .is_some_and(|c| c.sender_id == record.sender_id && c.records.len() < cap);

        if !joins_open {
            clusters.extend(open.replace(new_cluster(anchor, record, false)));
        } else if let Some(current) = open.as_mut() {
            current.records.push(record);
        }
    }

    clusters.extend(open);
    clusters
}

fn new_cluster(bucket_ts: i64, first: &MessageRecord, show_time: bool) -> Cluster<'_> {
    Cluster {
        bucket_ts,
        sender_id: first.sender_id,
        show_time,
        show_sender: true,
        records: vec![first],
    }
}
