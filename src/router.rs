//! The seam between the relay and its role-specific behavior.
//!
//! The relay never knows which role it is running; it hands every datagram
//! to a [`Router`] chosen once at startup.  [`crate::entry::Entry`] and
//! [`crate::exit::Exit`] are the two implementations.

use async_trait::async_trait;
use thiserror::Error;

use crate::session::Session;

/// Errors a routing operation can report for a single datagram.
///
/// These are logged and the datagram dropped; they never stop a relay loop.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A peer write failed; surfaced, never retried.
    #[error("socket write failed: {0}")]
    Io(#[from] std::io::Error),
    /// A challenge reply arrived without an id to echo back.
    #[error("challenge reply carried no id")]
    EmptyChallengeId,
}

/// Role-specific packet handling for one session.
#[async_trait]
pub trait Router: Send + Sync {
    /// Handle a datagram the client sent to the listening socket.
    async fn from_client(&self, session: &Session, buf: &[u8]) -> Result<(), RouteError>;

    /// Handle a datagram the next hop sent to the session's remote socket.
    async fn from_remote(&self, session: &Session, buf: &[u8]) -> Result<(), RouteError>;
}
