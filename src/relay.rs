//! The relay: listening socket, session table, and per-session read loops.
//!
//! # Architecture
//!
//! ```text
//!             recv_from                 from_client
//!  clients ──────────────▶ serve loop ──────────────▶ Router
//!                              │ first datagram from a new address
//!                              ▼
//!                      session table (addr → Session)
//!                              │ spawn
//!                              ▼
//!             per-session task: recv_remote ──▶ Router::from_remote
//!                              │ 10 s without a datagram
//!                              ▼
//!                  remove from table, socket closes
//! ```
//!
//! One task services the listening socket and dispatches `from_client`
//! inline.  Each session gets its own task that reads the session's remote
//! socket under a sliding idle deadline; hitting the deadline (or any read
//! error) tears down that session and nothing else.  The table is the single
//! source of truth for which client addresses have a live session.

use std::collections::{hash_map, HashMap};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;

use crate::router::Router;
use crate::session::Session;

/// Largest datagram the relay will read in one go.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// How long a session's remote socket may stay silent before teardown.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that abort startup.  Everything after a successful bind is logged
/// and survived instead.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to resolve address {addr:?}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },
    #[error("address {addr:?} did not resolve to any socket address")]
    NoAddress { addr: String },
    #[error("failed to bind listening socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// A UDP relay driving one [`Router`] over many client sessions.
pub struct Relay<R> {
    router: Arc<R>,
    sessions: Arc<Mutex<HashMap<SocketAddr, Arc<Session>>>>,
    idle_timeout: Duration,
}

impl<R: Router + 'static> Relay<R> {
    pub fn new(router: R) -> Self {
        Self {
            router: Arc::new(router),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    /// Override the idle deadline on remote sockets.  The default suits
    /// production; tests shorten it to observe teardown.
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Resolve both addresses, bind the listener, and serve forever.
    ///
    /// Only resolution and bind failures return; once the loop is running,
    /// per-datagram and per-session failures are logged and survived.
    pub async fn serve(&self, listen_addr: &str, remote_addr: &str) -> Result<(), RelayError> {
        let listen = resolve(listen_addr).await?;
        let remote = resolve(remote_addr).await?;

        let socket = UdpSocket::bind(listen)
            .await
            .map_err(|source| RelayError::Bind {
                addr: listen,
                source,
            })?;

        log::info!("[relay] listening on {listen}, next hop {remote}");
        self.run(socket, remote).await
    }

    /// Serve on an already-bound socket.
    ///
    /// Lets the caller bind to port 0 and learn the OS-assigned address
    /// before the loop starts; [`Relay::serve`] is this plus resolution and
    /// binding.
    pub async fn run(&self, socket: UdpSocket, remote: SocketAddr) -> Result<(), RelayError> {
        let socket = Arc::new(socket);
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (n, client) = match socket.recv_from(&mut buf).await {
                Ok(read) => read,
                Err(e) => {
                    log::error!("[relay] listener read failed: {e}");
                    continue;
                }
            };

            let session = match self.session(client, remote, &socket).await {
                Ok(session) => session,
                Err(e) => {
                    log::error!("[relay] failed to open session for {client}: {e}");
                    continue;
                }
            };

            if let Err(e) = self.router.from_client(&session, &buf[..n]).await {
                log::error!("[relay] client route failed for {client}: {e}");
            }
        }
    }

    /// Look up the session for `client`, dialing a fresh one on a miss.
    async fn session(
        &self,
        client: SocketAddr,
        remote: SocketAddr,
        local: &Arc<UdpSocket>,
    ) -> io::Result<Arc<Session>> {
        if let Some(session) = self.sessions.lock().unwrap().get(&client) {
            return Ok(Arc::clone(session));
        }

        let session = Arc::new(Session::dial(client, Arc::clone(local), remote).await?);

        // Load-or-store: the table decides.  If an insert raced us while we
        // were dialing, that session wins and our fresh socket is dropped.
        {
            let mut table = self.sessions.lock().unwrap();
            match table.entry(client) {
                hash_map::Entry::Occupied(existing) => return Ok(Arc::clone(existing.get())),
                hash_map::Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&session));
                }
            }
        }

        log::debug!("[relay] new session for {client}");
        self.spawn_remote_loop(Arc::clone(&session));
        Ok(session)
    }

    /// Spawn the task that reads this session's remote socket until it goes
    /// idle or fails, then removes the session from the table.
    fn spawn_remote_loop(&self, session: Arc<Session>) {
        let router = Arc::clone(&self.router);
        let sessions = Arc::clone(&self.sessions);
        let idle = self.idle_timeout;

        tokio::spawn(async move {
            let client = session.addr();
            let mut buf = vec![0u8; MAX_DATAGRAM];

            loop {
                match timeout(idle, session.recv_remote(&mut buf)).await {
                    Err(_elapsed) => {
                        log::debug!("[relay] session {client} idle, tearing down");
                        break;
                    }
                    Ok(Err(e)) => {
                        log::error!("[relay] remote read failed for {client}: {e}");
                        break;
                    }
                    Ok(Ok(n)) => {
                        if let Err(e) = router.from_remote(&session, &buf[..n]).await {
                            log::error!("[relay] remote route failed for {client}: {e}");
                        }
                    }
                }
            }

            sessions.lock().unwrap().remove(&client);
            // The table entry is gone; dropping `session` closes the remote
            // socket once the routing of any in-flight datagram finishes.
        });
    }
}

/// Resolve an address string to the first socket address it names.
async fn resolve(addr: &str) -> Result<SocketAddr, RelayError> {
    lookup_host(addr)
        .await
        .map_err(|source| RelayError::Resolve {
            addr: addr.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| RelayError::NoAddress {
            addr: addr.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_loopback() {
        let addr = resolve("127.0.0.1:41820").await.unwrap();
        assert_eq!(addr, "127.0.0.1:41820".parse().unwrap());
    }

    #[tokio::test]
    async fn resolve_rejects_garbage() {
        assert!(matches!(
            resolve("not an address").await,
            Err(RelayError::Resolve { .. })
        ));
    }
}
