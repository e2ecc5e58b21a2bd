//! In-memory loopback server.
//!
//! Speaks the same protocol as the real server plugin but only keeps a map of
//! block text per location, echoes commands back and lists a fixed set of
//! players. It exists so the client can be exercised end to end without a game
//! server: the integration tests and the `craftlink-stub` binary use it.
use std::{
    collections::HashMap,
    io,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use log::{debug, info, warn};

use crate::model::BlockData;

use super::{
    Credentials, ProtocolTransport, Request, Response, ResponseBody, ThreadPool, TransportError,
    request::{BlockRecord, CommandRecord, ItemRecord, LocationRecord},
    response::{CommandResult, GetResult, PlayerRecord, STATUS_OK, STATUS_PARTIAL, SetResult},
};

#[derive(Debug, Clone)]
pub struct StubOptions {
    /// Required handshake credentials; `None` admits everybody.
    pub credentials: Option<Credentials>,
    pub players: Vec<PlayerRecord>,
    /// Serve this many `SetBlocks` requests, then stall on the next ones.
    pub stall_set_blocks_after: Option<usize>,
    /// How long a stalled request sleeps before the connection is dropped.
    pub stall_for: Duration,
    /// Serve this many `SetBlocks` requests, then answer `500` to the rest.
    pub reject_set_blocks_after: Option<usize>,
    /// Serve this many `SetBlocks` requests, then answer with bytes that are
    /// not a response.
    pub garble_set_blocks_after: Option<usize>,
    pub workers: usize,
}

impl Default for StubOptions {
    fn default() -> Self {
        Self {
            credentials: None,
            players: Vec::new(),
            stall_set_blocks_after: None,
            stall_for: Duration::from_secs(30),
            reject_set_blocks_after: None,
            garble_set_blocks_after: None,
            workers: 4,
        }
    }
}

/// Counters shared between the server and whoever inspects it.
#[derive(Debug, Default)]
pub struct StubStats {
    set_block_requests: AtomicUsize,
    blocks_written: AtomicUsize,
    commands: Mutex<Vec<String>>,
}

impl StubStats {
    /// `SetBlocks` requests received, stalled ones included.
    pub fn set_block_requests(&self) -> usize {
        self.set_block_requests.load(Ordering::SeqCst)
    }

    pub fn blocks_written(&self) -> usize {
        self.blocks_written.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

type WorldKey = (String, i32, i32, i32);

#[derive(Debug, Default)]
struct World {
    blocks: HashMap<WorldKey, (String, Vec<ItemRecord>)>,
}

fn key(location: &LocationRecord) -> WorldKey {
    (location.world.clone(), location.x, location.y, location.z)
}

struct Shared {
    world: Mutex<World>,
    stats: Arc<StubStats>,
    options: StubOptions,
}

pub struct StubServer {
    listener: TcpListener,
    shared: Arc<Shared>,
    pool: ThreadPool,
}

/// A stub server running on a background thread.
#[derive(Debug, Clone)]
pub struct StubHandle {
    pub addr: SocketAddr,
    pub stats: Arc<StubStats>,
}

impl StubServer {
    pub fn bind(address: SocketAddr, options: StubOptions) -> io::Result<Self> {
        let listener = TcpListener::bind(address)?;
        Ok(Self {
            listener,
            pool: ThreadPool::new(options.workers)?,
            shared: Arc::new(Shared {
                world: Mutex::new(World::default()),
                stats: Arc::new(StubStats::default()),
                options,
            }),
        })
    }

    /// Binds an ephemeral loopback port and serves from a background thread.
    pub fn spawn(options: StubOptions) -> io::Result<StubHandle> {
        let server = Self::bind(SocketAddr::from(([127, 0, 0, 1], 0)), options)?;
        let handle = StubHandle {
            addr: server.local_addr()?,
            stats: server.stats(),
        };

        thread::spawn(move || {
            if let Err(e) = server.listen() {
                warn!("stub server stopped: {e}");
            }
        });
        Ok(handle)
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<StubStats> {
        Arc::clone(&self.shared.stats)
    }

    pub fn listen(self) -> Result<(), TransportError> {
        info!("listening at {}", self.listener.local_addr()?);

        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let shared = Arc::clone(&self.shared);
                    self.pool.execute(move || {
                        if let Err(e) = handle_connection(stream, &shared) {
                            debug!("connection ended: {e}");
                        }
                    });
                }
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
        Ok(())
    }
}

fn handle_connection(stream: TcpStream, shared: &Shared) -> Result<(), TransportError> {
    let mut transport = ProtocolTransport::new(stream);

    match transport.read_request()? {
        Request::Authenticate { username, password } => {
            let admitted = shared.options.credentials.as_ref().is_none_or(|c| {
                username.as_deref() == Some(c.username())
                    && password.as_deref() == Some(c.password())
            });
            if !admitted {
                info!("rejected credentials for {username:?}");
                transport.write_response(&Response::error(401, "invalid credentials"))?;
                return Ok(());
            }
            transport.write_response(&Response::ok(ResponseBody::Empty))?;
        }
        other => {
            warn!("{} request before handshake", other.kind());
            transport.write_response(&Response::error(401, "authenticate first"))?;
            return Ok(());
        }
    }

    loop {
        let req = transport.read_request()?;
        debug!("received {} request", req.kind());

        let resp = match req {
            Request::CloseConnection => {
                transport.write_response(&Response::ok(ResponseBody::ConnectionClosed))?;
                return Ok(());
            }
            Request::Ping => Response::ok(ResponseBody::Empty),
            Request::Authenticate { .. } => Response::error(500, "session already authenticated"),
            Request::ExecuteCommands(commands) => execute(shared, commands),
            Request::SetBlocks(blocks) => {
                let served = shared
                    .stats
                    .set_block_requests
                    .fetch_add(1, Ordering::SeqCst);
                let past = |limit: Option<usize>| limit.is_some_and(|after| served >= after);
                let options = &shared.options;

                if past(options.stall_set_blocks_after) {
                    info!("stalling set-blocks request #{served}");
                    thread::sleep(options.stall_for);
                    return Ok(());
                }
                if past(options.garble_set_blocks_after) {
                    info!("garbling set-blocks reply #{served}");
                    transport.write_frame(GARBLED)?;
                    continue;
                }
                if past(options.reject_set_blocks_after) {
                    info!("rejecting set-blocks request #{served}");
                    Response::error(500, "block placement refused")
                } else {
                    set_blocks(shared, blocks)
                }
            }
            Request::GetBlocks(locations) => get_blocks(shared, &locations),
            Request::GetPlayers { only_online } => Response::ok(ResponseBody::Players(
                shared
                    .options
                    .players
                    .iter()
                    .filter(|p| p.online || !only_online)
                    .cloned()
                    .collect(),
            )),
        };

        transport.write_response(&resp)?;
    }
}

// A status code no client knows, followed by nothing.
const GARBLED: &[u8] = &[0x03, 0xe7];

fn status(all_ok: bool) -> u16 {
    if all_ok { STATUS_OK } else { STATUS_PARTIAL }
}

fn execute(shared: &Shared, commands: Vec<CommandRecord>) -> Response {
    let mut seen = shared
        .stats
        .commands
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    let results = commands
        .into_iter()
        .map(|command| {
            let text = command.text.trim().to_string();
            let message = text.strip_prefix("say ").unwrap_or(&text).to_string();
            seen.push(text.clone());
            CommandResult {
                success: !text.is_empty(),
                message,
            }
        })
        .collect::<Vec<_>>();

    Response::new(
        status(results.iter().all(|r| r.success)),
        ResponseBody::Commands(results),
    )
}

fn set_blocks(shared: &Shared, blocks: Vec<BlockRecord>) -> Response {
    let mut world = shared.world.lock().unwrap_or_else(PoisonError::into_inner);

    let results = blocks
        .into_iter()
        .map(|block| match BlockData::parse(&block.block_data) {
            Ok(data) => {
                let at = key(&block.location);
                if data.key.namespace() == "minecraft" && data.key.name() == "air" {
                    world.blocks.remove(&at);
                } else {
                    world.blocks.insert(at, (data.to_string(), block.items));
                }
                shared.stats.blocks_written.fetch_add(1, Ordering::SeqCst);
                SetResult {
                    success: true,
                    exception: None,
                }
            }
            Err(e) => SetResult {
                success: false,
                exception: Some(e.to_string()),
            },
        })
        .collect::<Vec<_>>();

    Response::new(
        status(results.iter().all(|r| r.success)),
        ResponseBody::BlocksSet(results),
    )
}

fn get_blocks(shared: &Shared, locations: &[LocationRecord]) -> Response {
    let world = shared.world.lock().unwrap_or_else(PoisonError::into_inner);

    let results = locations
        .iter()
        .map(|location| {
            let (block_data, items) = match world.blocks.get(&key(location)) {
                Some((data, items)) => (data.clone(), items.clone()),
                None => ("minecraft:air".to_string(), Vec::new()),
            };
            GetResult {
                success: true,
                exception: None,
                block_data: Some(block_data),
                items,
            }
        })
        .collect();

    Response::ok(ResponseBody::Blocks(results))
}
