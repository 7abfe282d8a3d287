//! Entry-side handshake state machine.
//!
//! The entry node faces the real client.  Toward its next hop it plays a
//! game client: it probes with `getchallenge`, answers the challenge with a
//! `connect` carrying the forwarding chain in its userinfo, and treats the
//! accept reply as the signal that the tunnel is up.  Client packets that
//! arrive before then are queued and replayed once, in arrival order.
//!
//! Per session: `unconnected --Challenge--> unconnected (connect sent)
//! --Accept--> connected`.  Connected is terminal; from then on both
//! directions relay verbatim.

use std::time::Duration;

use async_trait::async_trait;

use crate::protocol::{self, Message};
use crate::router::{RouteError, Router};
use crate::session::Session;

/// How long to wait after an accept before replaying queued packets, so
/// proxies further down the chain can finish their own handshakes.
const CHAIN_GRACE: Duration = Duration::from_millis(100);

/// The client-facing role.
pub struct Entry {
    name: String,
    team: String,
    /// Remaining forwarding-chain addresses, pre-joined with `@`.
    chain: String,
}

impl Entry {
    pub fn new(name: &str, team: &str, targets: &[String]) -> Self {
        Self {
            name: name.to_string(),
            team: team.to_string(),
            chain: targets.join("@"),
        }
    }
}

#[async_trait]
impl Router for Entry {
    async fn from_client(&self, session: &Session, buf: &[u8]) -> Result<(), RouteError> {
        if session.is_connected() {
            session.write_remote(buf).await?;
            return Ok(());
        }

        // Hold the packet until the tunnel is up, and (re)probe the next
        // hop.  One probe per client packet; the peer classifies by shape,
        // so duplicates are harmless.
        session.enqueue(buf);
        session.write_remote(&protocol::get_challenge()).await?;
        Ok(())
    }

    async fn from_remote(&self, session: &Session, buf: &[u8]) -> Result<(), RouteError> {
        if session.is_connected() {
            session.write_local(buf).await?;
            return Ok(());
        }

        match protocol::parse(buf) {
            Message::Challenge(id) => {
                if id.is_empty() {
                    return Err(RouteError::EmptyChallengeId);
                }
                log::debug!("[entry] challenge for {}; sending connect", session.addr());
                session
                    .write_remote(&protocol::connect(id, &self.name, &self.team, &self.chain))
                    .await?;
            }
            Message::Accept => {
                tokio::time::sleep(CHAIN_GRACE).await;

                let queued = session.dequeue_all();
                let total = queued.len();
                let mut failed = 0usize;
                for packet in &queued {
                    if session.write_remote(packet).await.is_err() {
                        failed += 1;
                    }
                }
                if failed > 0 {
                    log::warn!(
                        "[entry] lost {failed} of {total} queued packet(s) for {}",
                        session.addr()
                    );
                }

                session.set_connected();
                log::debug!("[entry] session {} connected", session.addr());
            }
            _ => {}
        }
        Ok(())
    }
}
