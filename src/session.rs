//! Per-client session state.
//!
//! A [`Session`] represents one client's UDP conversation through this node:
//! the client's address, the shared listening socket, an exclusively owned
//! socket dialed to the next hop, a monotonic connected flag, and a queue of
//! packets received before the handshake completed.
//!
//! Sessions are created by the relay on the first datagram from a new client
//! address and torn down when the remote side goes idle.  Dropping the last
//! reference closes the remote socket.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;

/// One client's conversation through the relay.
pub struct Session {
    /// The client's address; identifies the session for its whole life.
    addr: SocketAddr,
    /// The listening socket, shared with every other session.  Writes only;
    /// the relay's receive loop owns all reads.
    local: Arc<UdpSocket>,
    /// Socket dialed to the next hop, exclusively owned by this session.
    remote: UdpSocket,
    /// Starts false, set true exactly once when the handshake completes.
    /// Never reset.
    connected: AtomicBool,
    /// Packets from the client awaiting the end of the handshake.
    queue: Mutex<Vec<Vec<u8>>>,
}

impl Session {
    /// Dial `remote_addr` from an ephemeral port and build a session for the
    /// client at `addr`.
    pub async fn dial(
        addr: SocketAddr,
        local: Arc<UdpSocket>,
        remote_addr: SocketAddr,
    ) -> io::Result<Self> {
        let bind_addr: SocketAddr = if remote_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let remote = UdpSocket::bind(bind_addr).await?;
        remote.connect(remote_addr).await?;

        Ok(Self {
            addr,
            local,
            remote,
            connected: AtomicBool::new(false),
            queue: Mutex::new(Vec::new()),
        })
    }

    /// The client address this session belongs to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Append a copy of `buf` to the pending queue.
    ///
    /// The copy means the caller is free to reuse its buffer immediately.
    /// The queue is unbounded: only pre-handshake traffic lands here, and
    /// that phase is short-lived.
    pub fn enqueue(&self, buf: &[u8]) {
        self.queue.lock().unwrap().push(buf.to_vec());
    }

    /// Atomically take everything queued so far, leaving the queue empty.
    ///
    /// Safe to call repeatedly; once drained it returns nothing until more
    /// packets are enqueued.
    pub fn dequeue_all(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.queue.lock().unwrap())
    }

    /// Mark the handshake complete.  Idempotent; there is no way back.
    pub fn set_connected(&self) {
        self.connected.store(true, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Send `buf` to the client over the shared listening socket.
    pub async fn write_local(&self, buf: &[u8]) -> io::Result<()> {
        self.local.send_to(buf, self.addr).await?;
        Ok(())
    }

    /// Send `buf` to the next hop over the session's own socket.
    pub async fn write_remote(&self, buf: &[u8]) -> io::Result<()> {
        self.remote.send(buf).await?;
        Ok(())
    }

    /// Read the next datagram from the next hop into `buf`.
    pub async fn recv_remote(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.remote.recv(buf).await
    }
}
