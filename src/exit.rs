//! Exit-side handshake state machine.
//!
//! The exit node faces the real destination.  Toward its client (the
//! previous relay in the chain) it plays a game server: it answers
//! `getchallenge` with a fresh challenge and `connect` with an accept, at
//! which point the session is connected and client traffic flows through to
//! the destination untouched.  The userinfo inside `connect` is accepted but
//! never interpreted.
//!
//! The destination-facing side is pure pass-through in both phases: the
//! handshake only ever happens on the client-facing side of this node.

use async_trait::async_trait;

use crate::protocol::{self, Message};
use crate::router::{RouteError, Router};
use crate::session::Session;

/// The destination-facing role.
#[derive(Default)]
pub struct Exit;

impl Exit {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Router for Exit {
    async fn from_client(&self, session: &Session, buf: &[u8]) -> Result<(), RouteError> {
        if session.is_connected() {
            session.write_remote(buf).await?;
            return Ok(());
        }

        match protocol::parse(buf) {
            Message::GetChallenge => {
                log::debug!("[exit] challenge requested by {}", session.addr());
                session.write_local(&protocol::challenge()).await?;
            }
            Message::Connect => {
                session.write_local(&protocol::accept()).await?;
                session.set_connected();
                log::debug!("[exit] session {} connected", session.addr());
            }
            _ => {}
        }
        Ok(())
    }

    async fn from_remote(&self, session: &Session, buf: &[u8]) -> Result<(), RouteError> {
        session.write_local(buf).await?;
        Ok(())
    }
}
