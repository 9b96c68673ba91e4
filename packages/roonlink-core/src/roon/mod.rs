//! Roon Core connectivity.
//!
//! This module finds a Roon Core on the local network, registers with it as an
//! extension and keeps one MOO connection alive for the lifetime of the
//! process.
//!
//! # Module Structure
//!
//! - `sood` - SOOD UDP discovery of Cores (multicast + broadcast)
//! - `moo` - MOO/1 message framing
//! - `connection` - Request-Id correlation over one WebSocket
//! - `session` - `CoreSession` state machine and capability implementations
//! - `browse` - Preset resolution through the browse service
//! - `token` - Authorization token persistence
//! - `backoff` - Reconnect pacing
//! - `types` - Wire shapes of Core replies
//! - `traits` - Trait abstractions for testability

use thiserror::Error;

use crate::error::CoreError;

mod backoff;
mod browse;
pub(crate) mod connection;
pub mod moo;
mod session;
pub mod sood;
mod token;
pub mod traits;
pub mod types;

pub use session::{CoreSession, SessionState};
pub use sood::CoreEndpoint;
pub use traits::{
    CommandReceipt, ControlAction, CoreBrowse, CoreClient, CoreImages, CorePlayback, CoreStatus,
};

/// Failures that end one connection attempt. The session loop logs them and
/// reconnects; they never reach HTTP clients.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Failed to bind a UDP socket for discovery.
    #[error("failed to bind UDP socket: {0}")]
    SocketBind(#[source] std::io::Error),

    /// No usable network interfaces found.
    #[error("no usable network interfaces found")]
    NoInterfaces,

    /// No Core answered the SOOD query.
    #[error("no Roon Core answered within {configured_ms}ms")]
    DiscoveryTimeout {
        /// The configured timeout in milliseconds.
        configured_ms: u64,
    },

    /// The WebSocket could not be opened or failed mid-stream.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The Core closed the connection.
    #[error("connection closed by Core")]
    Closed,

    /// The Core sent something the handshake did not expect.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The authorization token file could not be written.
    #[error("token store failed: {0}")]
    Token(#[source] std::io::Error),
}

impl From<CoreError> for SessionError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::ServiceUnavailable(_) => Self::Closed,
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<moo::MooError> for SessionError {
    fn from(e: moo::MooError) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Result alias for connection attempts.
pub type SessionResult<T> = Result<T, SessionError>;
