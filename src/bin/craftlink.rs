use std::{
    error::Error,
    io,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use clap::Parser;
use craftlink::{
    BatchResult, BlockListFile, CancelToken, Client, ClientConfig, ClientError, Credentials,
    Input, Progress, Reply, prompt,
    model::{Block, BlockData, Location},
};

/// Interactive console for a craftlink-enabled server.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server host name or address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[arg(long, default_value_t = craftlink::config::DEFAULT_PORT)]
    port: u16,
    /// World used for block operations
    #[arg(long, default_value = craftlink::config::DEFAULT_WORLD)]
    world: String,
    #[arg(long, requires = "password")]
    username: Option<String>,
    #[arg(long, requires = "username")]
    password: Option<String>,
    /// Seconds to wait for each response or batch chunk
    #[arg(long, default_value_t = 10)]
    timeout: u64,
    /// Blocks per set-blocks request during builds
    #[arg(long, default_value_t = craftlink::batch::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let config = ClientConfig::default()
        .with_host(cli.host)
        .with_port(cli.port)
        .with_world(cli.world)
        .with_request_timeout(Duration::from_secs(cli.timeout))
        .with_chunk_size(cli.chunk_size);
    let credentials = cli.username.zip(cli.password).map(|(u, p)| Credentials::new(u, p));

    let client = Client::new(config);
    client.connect(credentials.as_ref())?;
    println!("connected to {}", client.config().endpoint());

    // Ctrl-C stops a running build between chunks, and quits otherwise.
    let cancel = CancelToken::new();
    let building = Arc::new(AtomicBool::new(false));
    {
        let (cancel, building) = (cancel.clone(), Arc::clone(&building));
        ctrlc::set_handler(move || {
            if building.load(Ordering::SeqCst) {
                cancel.cancel();
            } else {
                std::process::exit(130);
            }
        })?;
    }

    let stdin = io::stdin();
    let stdout = io::stdout();

    loop {
        let writer = StdOut {
            inner: stdout.lock(),
        };

        let input = match prompt(stdin.lock(), writer) {
            Ok(i) => i,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let outcome = match input {
            Input::Exit => break,
            Input::Empty => Ok(()),
            Input::Ping => client.ping().map(|r| println!("{:?}", r.status)),
            Input::Players { all } => client.get_players(!all).map(print_players),
            Input::Get(location) => client.get_block(location).map(|r| match r.value {
                Some(block) => println!("{}", block.block_data()),
                None => println!("{:?}: air", r.status),
            }),
            Input::Set { location, data } => match BlockData::parse(&data) {
                Ok(data) => client
                    .set_block(
                        &Block::builder(&data.key.to_string(), location)
                            .states(data.state)
                            .build(),
                    )
                    .map(|r| print_reply(&r, r.value.iter().map(|o| o.exception.as_deref()))),
                Err(e) => Err(e.into()),
            },
            Input::Build { path, origin } => {
                building.store(true, Ordering::SeqCst);
                let res = build(&client, &path, origin, &cancel, false);
                building.store(false, Ordering::SeqCst);
                cancel.reset();
                res
            }
            Input::Clear { path, origin } => {
                building.store(true, Ordering::SeqCst);
                let res = build(&client, &path, origin, &cancel, true);
                building.store(false, Ordering::SeqCst);
                cancel.reset();
                res
            }
            Input::Command(text) => client.execute_command(text).map(|r| {
                for outcome in &r.value {
                    println!("{}", outcome.message);
                }
                if !r.status.is_success() {
                    eprintln!("{:?}", r.status);
                }
            }),
        };

        if let Err(e) = outcome {
            eprintln!("error: {e}");
            if client.state() == craftlink::ChannelState::Disconnected {
                eprintln!("reconnecting to {}", client.config().endpoint());
                if let Err(e) = client.connect(credentials.as_ref()) {
                    eprintln!("reconnect failed: {e}");
                    break;
                }
            }
        }
    }

    client.close();
    Ok(())
}

fn build(
    client: &Client,
    path: &Path,
    origin: Location,
    cancel: &CancelToken,
    clear: bool,
) -> Result<(), ClientError> {
    let file = match BlockListFile::open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            return Ok(());
        }
    };

    let progress = |p: &Progress| {
        println!(
            "chunk {}/{}: {}/{} blocks",
            p.chunk_index + 1,
            p.chunks,
            p.applied,
            p.total
        )
    };
    let result = if clear {
        client.clear_source(&file, origin, &progress, cancel)?
    } else {
        client.place_source(&file, origin, &progress, cancel)?
    };
    print_batch(&result);
    Ok(())
}

fn print_batch(result: &BatchResult) {
    println!(
        "{} of {} blocks applied in {} chunks, {} rejected",
        result.applied, result.total, result.chunks_sent, result.rejected
    );
    if let Some(failure) = &result.failure {
        eprintln!("stopped at chunk {}: {:?}", failure.chunk_index, failure.cause);
    }
}

fn print_players(reply: Reply<Vec<craftlink::model::Player>>) {
    for player in &reply.value {
        match &player.location {
            Some(at) => println!(
                "{} ({}) at {} {:.1} {:.1} {:.1}, facing {}",
                player.name,
                player.uuid,
                at.world,
                at.x,
                at.y,
                at.z,
                at.facing()
            ),
            None => println!("{} ({}) offline", player.name, player.uuid),
        }
    }
    if reply.value.is_empty() {
        println!("no players");
    }
}

fn print_reply<'a, T>(reply: &Reply<T>, errors: impl Iterator<Item = Option<&'a str>>) {
    println!("{:?}", reply.status);
    for e in errors.flatten() {
        eprintln!("  {e}");
    }
    if let Some(message) = &reply.message {
        eprintln!("  {message}");
    }
}

/// StdOut wrapper that automatically flushes content after every write.
struct StdOut<W: io::Write> {
    inner: W,
}

impl<W: io::Write> io::Write for StdOut<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let res = self.inner.write(buf);
        if res.is_ok() {
            self.inner.flush()?
        }
        res
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
