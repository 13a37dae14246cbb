/// Application name
pub const APP_NAME: &str = "onechat";

/// A gap longer than this (seconds) from the bucket anchor starts a new time bucket
pub const BUCKET_GAP_SECS: i64 = 300;

/// Maximum number of records in one rendered cluster
pub const CLUSTER_MAX_RECORDS: usize = 10;

/// History window loaded when a conversation is focused
pub const FOCUSED_HISTORY_WINDOW: u32 = 200;

/// History window loaded in bulk to build chat-list previews
pub const PREVIEW_HISTORY_WINDOW: u32 = 500;

/// Database file name inside the per-account data directory
pub const DB_FILE_NAME: &str = "onechat.db";

/// OneBot v11 actions used for outbound messages
pub const ACTION_SEND_PRIVATE_MSG: &str = "send_private_msg";
pub const ACTION_SEND_GROUP_MSG: &str = "send_group_msg";
