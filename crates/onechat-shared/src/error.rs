use thiserror::Error;

/// Errors raised while decoding or encoding OneBot v11 frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unknown post type: {0}")]
    UnknownPostType(String),

    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(String),
}
