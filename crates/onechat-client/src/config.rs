//! Runtime configuration, read from the environment with sane defaults.

use std::path::PathBuf;
use std::str::FromStr;

use onechat_shared::constants::{
    BUCKET_GAP_SECS, CLUSTER_MAX_RECORDS, FOCUSED_HISTORY_WINDOW, PREVIEW_HISTORY_WINDOW,
};
use onechat_shared::types::UserId;
use onechat_store::Database;

/// Knobs of the timeline engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineConfig {
    /// Seconds after a bucket's first record before a new time header is shown.
    pub bucket_gap_secs: i64,
    /// Maximum records in one cluster.
    pub cluster_max: usize,
    /// Rows loaded when a conversation is opened or paged.
    pub history_window: u32,
    /// Rows loaded in bulk for chat-list previews.
    pub preview_window: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            bucket_gap_secs: BUCKET_GAP_SECS,
            cluster_max: CLUSTER_MAX_RECORDS,
            history_window: FOCUSED_HISTORY_WINDOW,
            preview_window: PREVIEW_HISTORY_WINDOW,
        }
    }
}

impl TimelineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(gap) = parse_env::<i64>("ONECHAT_BUCKET_GAP_SECS") {
            if gap >= 0 {
                config.bucket_gap_secs = gap;
            } else {
                tracing::warn!(value = gap, "Negative ONECHAT_BUCKET_GAP_SECS, using default");
            }
        }

        if let Some(max) = parse_env::<usize>("ONECHAT_CLUSTER_MAX") {
            if max > 0 {
                config.cluster_max = max;
            } else {
                tracing::warn!("ONECHAT_CLUSTER_MAX must be at least 1, using default");
            }
        }

        if let Some(window) = parse_env::<u32>("ONECHAT_HISTORY_WINDOW") {
            config.history_window = window;
        }

        if let Some(window) = parse_env::<u32>("ONECHAT_PREVIEW_WINDOW") {
            config.preview_window = window;
        }

        config
    }
}

/// Client-wide configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root under which each account gets a `user_<id>` directory.
    pub data_dir: PathBuf,
    /// Logged-in account, when known up front. Otherwise discovered from the
    /// first push event carrying a `self_id`.
    pub self_id: Option<UserId>,
    pub timeline: TimelineConfig,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let data_dir = match std::env::var("ONECHAT_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => Database::default_data_dir().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "No platform data directory, using ./onechat-data");
                PathBuf::from("onechat-data")
            }),
        };

        let self_id = parse_env::<i64>("ONECHAT_SELF_ID")
            .filter(|id| *id > 0)
            .map(UserId);

        Self {
            data_dir,
            self_id,
            timeline: TimelineConfig::from_env(),
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = TimelineConfig::default();
        assert_eq!(config.bucket_gap_secs, 300);
        assert_eq!(config.cluster_max, 10);
        assert_eq!(config.history_window, 200);
        assert_eq!(config.preview_window, 500);
    }
}
