//! Types shared by the onechat store and client: identifiers, conversation
//! scopes, and the OneBot v11 frames exchanged with the gateway.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
