//! Client-server communication protocol.
//!
//! This module defines the command protocol spoken between a craftlink client and
//! the server-side plugin, including message formats, the encode/decode steps
//! that map domain operations onto messages, and the session channel that moves
//! them over the network.
//!
//! # Overview
//!
//! A request travels caller → [`RequestEncoder`] → [`SessionChannel`] → server, and
//! the answer comes back through the channel into the [`decoder`] functions, which
//! turn it into domain values or a [`ProtocolError`](crate::error::ProtocolError).
//!
//! The protocol carries no request identifiers, so a connection holds at most one
//! request in flight. The channel serializes concurrent callers onto that single
//! slot; parallelism needs several independent channels.
//!
//! # Key Components
//!
//! - [`Request`] / [`Response`]: the messages exchanged with the server.
//! - [`RequestEncoder`]: validates domain operations and encodes them as payloads.
//! - [`decoder`]: maps response payloads back into domain values.
//! - [`ProtocolTransport`]: length-delimited framing over any byte stream.
//! - [`SessionChannel`]: one authenticated connection with per-request timeouts.
//! - [`StubServer`]: in-memory loopback server speaking the same protocol.
//!
//! # Binary Format
//!
//! Every message is one frame:
//!
//! - A 4-byte big-endian length prefix.
//! - The payload, a `bincode` encoding with big-endian fixed-width integers.
//!
//! Responses carry an HTTP-style status code (`200`, `207`, `401`, `500`) next to a
//! body whose shape depends on the request kind.
//!
//! # See Also
//!
//! - [`batch`](crate::batch): chunked bulk block operations on top of the channel.
use bincode::config::{BigEndian, Configuration, Fixint};

mod channel;
pub mod decoder;
mod encoder;
mod request;
mod response;
mod server;
mod thread;
mod transport;

use thread::ThreadPool;

pub use channel::{ChannelState, Credentials, Endpoint, SessionChannel};
pub use decoder::{BlockLookup, BlockOutcome, CommandOutcome, Reply, ResponsePayload, Status};
pub use encoder::{Operation, RequestEncoder, RequestPayload};
pub(crate) use encoder::validate_blocks;
pub use request::{BlockRecord, CommandRecord, EnchantmentRecord, ItemRecord, LocationRecord, Request};
pub use response::{
    CommandResult, EntityLocationRecord, GetResult, PlayerRecord, Response, ResponseBody,
    SetResult, STATUS_OK, STATUS_PARTIAL, STATUS_SERVER_ERROR, STATUS_UNAUTHORIZED,
};
pub use server::{StubHandle, StubOptions, StubServer, StubStats};
pub use transport::{DEFAULT_MAX_FRAME, ProtocolTransport, TimedStream, TransportError};

pub(crate) fn wire_config() -> Configuration<BigEndian, Fixint> {
    bincode::config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
}
