use std::{error::Error, net::SocketAddr, time::Duration};

use clap::Parser;
use craftlink::protocol::{Credentials, LocationRecord, PlayerRecord, StubOptions, StubServer};

/// In-memory server speaking the craftlink protocol, for local experiments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for new connections at address
    #[arg(default_value = "127.0.0.1:25575")]
    address: SocketAddr,
    /// Require this username during the handshake
    #[arg(long, requires = "password")]
    username: Option<String>,
    /// Require this password during the handshake
    #[arg(long, requires = "username")]
    password: Option<String>,
    /// Online player to report, may be repeated
    #[arg(long = "player")]
    players: Vec<String>,
    /// Offline player to report, may be repeated
    #[arg(long = "offline")]
    offline: Vec<String>,
    /// Stall every set-blocks request after this many
    #[arg(long)]
    stall_after: Option<usize>,
    /// Seconds a stalled request hangs before the connection drops
    #[arg(long, default_value_t = 30)]
    stall_secs: u64,
    /// Answer set-blocks requests with a server error after this many
    #[arg(long)]
    reject_after: Option<usize>,
    /// Answer set-blocks requests with unreadable bytes after this many
    #[arg(long)]
    garble_after: Option<usize>,
    /// Number of connection worker threads
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let uuid = |i: usize| format!("00000000-0000-4000-8000-{i:012x}");
    let spawn = LocationRecord {
        world: "world".to_string(),
        x: 0,
        y: 64,
        z: 0,
    };

    let players = cli
        .players
        .iter()
        .enumerate()
        .map(|(i, name)| PlayerRecord::online(name, &uuid(i), spawn.clone()))
        .chain(
            cli.offline
                .iter()
                .enumerate()
                .map(|(i, name)| PlayerRecord::offline(name, &uuid(cli.players.len() + i))),
        )
        .collect();

    let options = StubOptions {
        credentials: cli.username.zip(cli.password).map(|(u, p)| Credentials::new(u, p)),
        players,
        stall_set_blocks_after: cli.stall_after,
        stall_for: Duration::from_secs(cli.stall_secs),
        reject_set_blocks_after: cli.reject_after,
        garble_set_blocks_after: cli.garble_after,
        workers: cli.workers,
    };

    let server = StubServer::bind(cli.address, options)?;
    server.listen()?;
    Ok(())
}
