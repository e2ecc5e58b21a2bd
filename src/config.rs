use std::time::Duration;

use crate::{
    batch::DEFAULT_CHUNK_SIZE,
    protocol::{DEFAULT_MAX_FRAME, Endpoint},
};

pub const DEFAULT_PORT: u16 = 25575;
pub const DEFAULT_WORLD: &str = "world";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for one [`Client`](crate::Client).
///
/// # Defaults
///
/// - `host`: `127.0.0.1`, `port`: 25575
/// - `world`: `world`
/// - `request_timeout`: 10 s, applied per request and per batch chunk
/// - `connect_timeout`: 5 s, covering connect and handshake
/// - `chunk_size`: 10 000 blocks
/// - `max_frame`: 16 MiB
///
/// ```
/// use std::time::Duration;
/// use craftlink::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_port(4000)
///     .with_request_timeout(Duration::from_secs(30));
/// assert_eq!(config.endpoint().to_string(), "127.0.0.1:4000");
/// assert_eq!(config.chunk_size, 10_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// World stamped on every block and location sent.
    pub world: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub chunk_size: usize,
    pub max_frame: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            world: DEFAULT_WORLD.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_frame: DEFAULT_MAX_FRAME,
        }
    }
}

impl ClientConfig {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_world(mut self, world: impl Into<String>) -> Self {
        self.world = world.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Zero is raised to one block per chunk.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }
}
