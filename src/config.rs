//! Role selection and target-chain parsing.
//!
//! A node is either the `entry` or the `exit` of a forwarding chain, and is
//! configured with one or more `host:port` targets separated by `@`.  The
//! first target is the node's next hop; an entry node embeds the remainder
//! in its handshake for the hops further down, so it needs at least two,
//! while an exit node talks straight to the destination and takes exactly
//! one.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown role {0:?}: expected \"entry\" or \"exit\"")]
    UnknownRole(String),
    #[error("entry role needs a next hop plus at least one onward target")]
    TooFewTargets,
    #[error("exit role takes exactly one target address, got {0}")]
    ExactlyOneTarget(usize),
    #[error("target address {0:?} is missing a port")]
    MissingPort(String),
}

/// Which end of the chain this node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Entry,
    Exit,
}

impl FromStr for Role {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entry" => Ok(Role::Entry),
            "exit" => Ok(Role::Exit),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Entry => write!(f, "entry"),
            Role::Exit => write!(f, "exit"),
        }
    }
}

/// A validated `@`-separated list of target addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetChain {
    addrs: Vec<String>,
}

impl TargetChain {
    /// Parse and validate `raw` for the given role.
    ///
    /// Every element must carry a port; surrounding whitespace is trimmed.
    pub fn parse(raw: &str, role: Role) -> Result<Self, ConfigError> {
        let addrs: Vec<String> = raw.split('@').map(|a| a.trim().to_string()).collect();

        for addr in &addrs {
            if !addr.contains(':') {
                return Err(ConfigError::MissingPort(addr.clone()));
            }
        }

        match role {
            Role::Entry if addrs.len() < 2 => Err(ConfigError::TooFewTargets),
            Role::Exit if addrs.len() != 1 => Err(ConfigError::ExactlyOneTarget(addrs.len())),
            _ => Ok(Self { addrs }),
        }
    }

    /// The address this node dials directly.
    pub fn next_hop(&self) -> &str {
        &self.addrs[0]
    }

    /// The addresses beyond the next hop, to ride along in the handshake.
    pub fn rest(&self) -> &[String] {
        &self.addrs[1..]
    }
}
