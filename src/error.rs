//! Error taxonomy shared by every layer of the client.
//!
//! Each layer owns one error enum. [`ClientError`] wraps them for the public
//! [`Client`](crate::Client) surface and [`ErrorKind`] classifies a failure
//! without matching on every variant.
//!
//! Server-side rejection is never an error here: it travels as a
//! [`Status`](crate::protocol::Status) inside a [`Reply`](crate::protocol::Reply).
use std::{io, time::Duration};

use thiserror::Error;

use crate::protocol::TransportError;

/// Malformed caller input, detected before any network I/O.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty {0} list")]
    Empty(&'static str),

    #[error("{what} name must not be empty")]
    EmptyName { what: &'static str },

    #[error("invalid '{field}', {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("request could not be encoded: {0}")]
    Unencodable(String),
}

/// Payload bytes that arrived intact but do not parse as the expected shape.
///
/// Every variant keeps the raw payload for diagnostics.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed response: {reason}")]
    Undecodable { reason: String, raw: Vec<u8> },

    #[error("malformed response: unknown status code {code}")]
    UnknownStatus { code: u16, raw: Vec<u8> },

    #[error("malformed response: expected {expected}, found {found}")]
    ShapeMismatch {
        expected: String,
        found: String,
        raw: Vec<u8>,
    },
}

impl ProtocolError {
    /// Raw response payload that failed to decode.
    pub fn raw(&self) -> &[u8] {
        match self {
            ProtocolError::Undecodable { raw, .. }
            | ProtocolError::UnknownStatus { raw, .. }
            | ProtocolError::ShapeMismatch { raw, .. } => raw,
        }
    }
}

/// Failures of the session channel itself.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,

    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("authentication rejected: {reason}")]
    Authentication { reason: String },

    #[error("server refused the session: {reason}")]
    Refused { reason: String },

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("transport lost: {0}")]
    Transport(#[from] TransportError),

    #[error("handshake failed: {0}")]
    Handshake(#[source] ProtocolError),
}

impl ChannelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChannelError::NotConnected
            | ChannelError::Connect { .. }
            | ChannelError::Refused { .. }
            | ChannelError::Transport(_) => ErrorKind::Connection,
            ChannelError::Authentication { .. } => ErrorKind::Authentication,
            ChannelError::Timeout(_) => ErrorKind::Timeout,
            ChannelError::Handshake(_) => ErrorKind::Protocol,
        }
    }
}

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authentication,
    Connection,
    Timeout,
    Protocol,
}

/// Any failure surfaced by [`Client`](crate::Client).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Validation(_) => ErrorKind::Validation,
            ClientError::Channel(e) => e.kind(),
            ClientError::Protocol(_) => ErrorKind::Protocol,
        }
    }
}
