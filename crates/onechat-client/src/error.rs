use thiserror::Error;

use crate::backend::BackendError;

/// The session task is gone.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session closed")]
    Closed,
}

/// Why a user send was rejected before reaching the gateway.
#[derive(Error, Debug)]
pub enum SendError {
    /// No logged-in account is known yet, so there is no sender identity.
    #[error("Logged-in account unknown")]
    UnknownAccount,

    #[error("Message is empty")]
    EmptyMessage,

    /// The transport refused the frame. The optimistic record is marked failed.
    #[error("Send rejected: {0}")]
    Rejected(#[source] BackendError),

    #[error(transparent)]
    Session(#[from] SessionError),
}
