//! End-to-end tests for the relay: real sockets, real session table, real
//! per-session read loops.
//!
//! Each test binds the relay's listener itself (port 0) and drives it
//! through [`Relay::run`], so the OS-assigned address is known before the
//! serve loop starts.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use qw_relay::protocol::{self, Message};
use qw_relay::{Entry, Exit, Relay};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn recv(sock: &UdpSocket) -> Vec<u8> {
    recv_from(sock).await.0
}

async fn recv_from(sock: &UdpSocket) -> (Vec<u8>, SocketAddr) {
    let mut buf = vec![0u8; 64 * 1024];
    let (n, addr) = timeout(RECV_TIMEOUT, sock.recv_from(&mut buf))
        .await
        .expect("recv timed out")
        .expect("recv failed");
    buf.truncate(n);
    (buf, addr)
}

/// Walk the spoofed handshake against an exit relay from `client`.
async fn handshake(client: &UdpSocket, relay: SocketAddr) {
    client
        .send_to(&protocol::get_challenge(), relay)
        .await
        .unwrap();
    let challenge = recv(client).await;
    let id = match protocol::parse(&challenge) {
        Message::Challenge(id) => id.to_vec(),
        other => panic!("expected a challenge, got {other:?}"),
    };

    client
        .send_to(&protocol::connect(&id, "qwr", "red", ""), relay)
        .await
        .unwrap();
    let reply = recv(client).await;
    assert_eq!(protocol::parse(&reply), Message::Accept);
}

/// Bind a listener on loopback, spawn `relay.run` on it, and return the
/// listener's address.
async fn spawn_relay<R: qw_relay::Router + 'static>(
    relay: Relay<R>,
    remote: SocketAddr,
) -> SocketAddr {
    let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = relay.run(listener, remote).await;
    });
    addr
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

/// A lone exit relay: the client walks the handshake, then bytes tunnel
/// through to the destination and replies come back.
#[tokio::test]
async fn exit_relay_tunnels_after_the_handshake() {
    let destination = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest_addr = destination.local_addr().unwrap();

    let relay_addr = spawn_relay(Relay::new(Exit::new()), dest_addr).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    handshake(&client, relay_addr).await;

    client.send_to(b"tunnel me", relay_addr).await.unwrap();
    let (payload, tunnel_addr) = recv_from(&destination).await;
    assert_eq!(payload, b"tunnel me");

    destination
        .send_to(b"tunnel reply", tunnel_addr)
        .await
        .unwrap();
    assert_eq!(recv(&client).await, b"tunnel reply");
}

/// The pair cooperates: an entry relay chained into an exit relay spoofs
/// the whole handshake on its own, and a single client datagram comes out
/// at the destination with replies flowing all the way back.
#[tokio::test]
async fn chained_entry_and_exit_tunnel_end_to_end() {
    let destination = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest_addr = destination.local_addr().unwrap();

    let exit_addr = spawn_relay(Relay::new(Exit::new()), dest_addr).await;

    let targets = vec![dest_addr.to_string()];
    let entry_addr = spawn_relay(Relay::new(Entry::new("qwr", "red", &targets)), exit_addr).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(b"knock knock", entry_addr).await.unwrap();

    // The relays handshake among themselves, then replay the queued packet.
    let (payload, reply_addr) = recv_from(&destination).await;
    assert_eq!(payload, b"knock knock");

    destination
        .send_to(b"who's there", reply_addr)
        .await
        .unwrap();
    assert_eq!(recv(&client).await, b"who's there");
}

/// A session whose remote socket stays silent past the idle deadline is
/// removed; the same client address then gets a brand-new session on a
/// freshly dialed socket.
#[tokio::test]
async fn idle_session_is_torn_down_and_replaced() {
    let destination = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let dest_addr = destination.local_addr().unwrap();

    let relay = Relay::new(Exit::new()).idle_timeout(Duration::from_millis(200));
    let relay_addr = spawn_relay(relay, dest_addr).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    handshake(&client, relay_addr).await;
    client.send_to(b"first", relay_addr).await.unwrap();
    let (payload, first_tunnel) = recv_from(&destination).await;
    assert_eq!(payload, b"first");

    // The destination never answers, so the session idles out.
    tokio::time::sleep(Duration::from_millis(600)).await;

    // A connected session would forward this probe verbatim; only a fresh,
    // unconnected session answers it with a challenge.
    handshake(&client, relay_addr).await;
    client.send_to(b"second", relay_addr).await.unwrap();
    let (payload, second_tunnel) = recv_from(&destination).await;
    assert_eq!(payload, b"second");
    assert_ne!(
        first_tunnel, second_tunnel,
        "the replacement session should dial its own socket"
    );
}
