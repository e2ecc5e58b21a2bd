//! Client for block-world game server plugins.
//!
//! A [`Client`] holds one authenticated [`SessionChannel`] to a server and
//! offers typed operations on top of it: console commands, block reads and
//! writes, player listings, and chunked bulk builds through [`batch`].
//!
//! ```no_run
//! use craftlink::{Client, ClientConfig, Credentials, model::{Block, Location}};
//!
//! # fn main() -> Result<(), craftlink::ClientError> {
//! let client = Client::new(ClientConfig::default().with_host("mc.example.org"));
//! client.connect(Some(&Credentials::new("Admin", "secret")))?;
//!
//! client.execute_command("say hello world!")?;
//! client.set_block(&Block::new("stone", Location::new(0, 64, 0)))?;
//! let stone = client.get_block(Location::new(0, 64, 0))?.value;
//! assert_eq!(stone.map(|b| b.name().to_string()), Some("stone".to_string()));
//! # Ok(())
//! # }
//! ```
pub mod batch;
pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod model;
pub mod protocol;
pub mod source;

pub use batch::{BatchObserver, BatchResult, CancelToken, NoProgress, Progress};
pub use cli::{Input, prompt};
pub use client::Client;
pub use command::{Command, StructuredCommand};
pub use config::ClientConfig;
pub use error::{ClientError, ErrorKind};
pub use protocol::{ChannelState, Credentials, Reply, SessionChannel, Status};
pub use source::{BlockListFile, BlockSource};
