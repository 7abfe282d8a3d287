//! Wire-format definitions for the QuakeWorld out-of-band handshake.
//!
//! Every handshake message exchanged between relay nodes is a connectionless
//! QuakeWorld packet.  This module is responsible for:
//! - Recognising the four handshake message kinds in a raw datagram.
//! - Building byte-exact handshake messages ready for transmission.
//!
//! Nothing here touches a socket; every function is pure in its inputs.
//!
//! # Wire format
//!
//! Every message starts with the 4-byte out-of-band marker `FF FF FF FF`,
//! followed by an ASCII body:
//!
//! | Message        | Body                                                     |
//! |----------------|----------------------------------------------------------|
//! | `GetChallenge` | `getchallenge\n`                                         |
//! | `Challenge`    | `c` + 8 digits (the challenge id)                        |
//! | `Connect`      | `connect 28 ` + 5 digits + ` ` + id + ` ` + userinfo     |
//! | `Accept`       | `j`                                                      |
//!
//! The `Connect` userinfo is a quoted key/value string in the engine's
//! backslash-separated layout: `"\team\<team>\name\<name>\prx\<chain>"`
//! followed by a literal backslash-n.  The 5-digit run after `connect 28 `
//! is a throwaway anti-cache token, not a secret.
//!
//! Classification matches body prefixes in a fixed order (`getchallenge`,
//! `connect`, `c`, `j`) and the first match wins.  `connect` must be tried
//! before `c`, since a connect body also begins with a `c`.  Anything that
//! does not match, including buffers shorter than the marker, classifies as
//! [`Message::Unknown`]; malformed input is never an error at this layer.

use rand::Rng;

/// The out-of-band packet marker every handshake message starts with.
pub const MAGIC: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

// Body literals, in classification priority order.
const GET_CHALLENGE: &[u8] = b"getchallenge\n";
const CONNECT: &[u8] = b"connect 28 ";
const CHALLENGE: &[u8] = b"c";
const ACCEPT: &[u8] = b"j";

/// One classified handshake message.
///
/// `Challenge` borrows the opaque id from the input buffer; the other kinds
/// carry no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message<'a> {
    GetChallenge,
    Challenge(&'a [u8]),
    Connect,
    Accept,
    Unknown,
}

/// Classify a raw datagram.
///
/// The challenge id is every byte after the `c` tag, with one trailing NUL
/// stripped if present (the engine terminates the id that way).  The id may
/// be empty; whether that is acceptable is the caller's decision.
pub fn parse(buf: &[u8]) -> Message<'_> {
    let Some(body) = buf.strip_prefix(&MAGIC) else {
        return Message::Unknown;
    };

    if body.starts_with(GET_CHALLENGE) {
        return Message::GetChallenge;
    }
    if body.starts_with(CONNECT) {
        return Message::Connect;
    }
    if let Some(id) = body.strip_prefix(CHALLENGE) {
        let id = id.strip_suffix(&[0x00]).unwrap_or(id);
        return Message::Challenge(id);
    }
    if body.starts_with(ACCEPT) {
        return Message::Accept;
    }
    Message::Unknown
}

/// Build a `getchallenge` probe.
pub fn get_challenge() -> Vec<u8> {
    let mut out = Vec::with_capacity(MAGIC.len() + GET_CHALLENGE.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(GET_CHALLENGE);
    out
}

/// Build a `connect` message answering `challenge_id`.
///
/// `chain` is the remaining forwarding-chain addresses joined by `@`; it
/// rides along opaquely in the `prx` userinfo key.
pub fn connect(challenge_id: &[u8], name: &str, team: &str, chain: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(CONNECT);
    out.extend_from_slice(&rand_digits(5));
    out.push(b' ');
    out.extend_from_slice(challenge_id);
    out.push(b' ');
    out.extend_from_slice(format!("\"\\team\\{team}\\name\\{name}\\prx\\{chain}\"\\n").as_bytes());
    out
}

/// Build a `challenge` reply carrying a fresh 8-digit id.
pub fn challenge() -> Vec<u8> {
    let mut out = Vec::with_capacity(MAGIC.len() + CHALLENGE.len() + 8);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(CHALLENGE);
    out.extend_from_slice(&rand_digits(8));
    out
}

/// Build a connection-accepted reply.
pub fn accept() -> Vec<u8> {
    let mut out = Vec::with_capacity(MAGIC.len() + ACCEPT.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(ACCEPT);
    out
}

/// `count` ASCII digits, each drawn independently and uniformly from 0–9.
///
/// `thread_rng` is cryptographically strong, which is more than these
/// tokens need; only the digit format matters on the wire.
fn rand_digits(count: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| b'0' + rng.gen_range(0..10u8)).collect()
}
