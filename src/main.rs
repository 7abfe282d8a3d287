//! Entry point for `qw-relay`.
//!
//! Parses CLI arguments, configures logging, and hands off to the library:
//! construct the role chosen by `--role`, then block on the relay's serve
//! loop.  All protocol and session work lives in library modules.

use anyhow::Result;
use clap::Parser;

use qw_relay::{Entry, Exit, Relay, Role, TargetChain};

/// Name reported in the connect userinfo.
const NAME: &str = "qwr";
/// Team reported in the connect userinfo.
const TEAM: &str = "red";

/// UDP relay that hides arbitrary traffic inside a QuakeWorld handshake.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Local address to listen on.
    #[arg(long, default_value = "127.0.0.1:41820")]
    listen_addr: String,

    /// Node role in the forwarding chain: entry or exit.
    #[arg(long)]
    role: Role,

    /// Target addresses separated by `@` (ip1:port1@ip2:port2).
    #[arg(long)]
    target_addrs: String,

    /// Enable debug logging for verbose output.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let chain = TargetChain::parse(&cli.target_addrs, cli.role)?;

    log::info!(
        "qw-relay {} on {}, targets {}",
        cli.role,
        cli.listen_addr,
        cli.target_addrs
    );

    match cli.role {
        Role::Entry => {
            let relay = Relay::new(Entry::new(NAME, TEAM, chain.rest()));
            relay.serve(&cli.listen_addr, chain.next_hop()).await?;
        }
        Role::Exit => {
            let relay = Relay::new(Exit::new());
            relay.serve(&cli.listen_addr, chain.next_hop()).await?;
        }
    }

    Ok(())
}
