//! # onechat-client
//!
//! Timeline engine of the onechat desktop client.
//!
//! Chat events reach the client from several places: history rows in the
//! local store, live OneBot v11 push frames, and messages the user sends
//! optimistically. [`Timeline`] merges them into one deduplicated record set
//! per account and derives the chronologically grouped view of the open
//! conversation. [`spawn_session`] runs a timeline inside a tokio task fed
//! by a push-frame channel and driven through a [`SessionHandle`].

pub mod backend;
pub mod config;
pub mod grouper;
pub mod inbox;
pub mod mutation;
pub mod record;
pub mod record_set;
pub mod scope_filter;
pub mod session;
pub mod timeline;

mod error;

use tracing_subscriber::{fmt, EnvFilter};

pub use backend::{Backend, BackendError, LocalBackend, PersistJob};
pub use config::{ClientConfig, TimelineConfig};
pub use error::{SendError, SessionError};
pub use grouper::{Cluster, ClusterView};
pub use inbox::PendingRequest;
pub use mutation::{AckOutcome, ContentOutcome, FailureOutcome, RecallOutcome};
pub use record::MessageRecord;
pub use session::{spawn_session, SessionCommand, SessionHandle};
pub use timeline::{ChatPreview, PushOutcome, Timeline};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("onechat_client=debug,onechat_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
