//! Response payloads back into domain values.
//!
//! Decoding is total over well-formed payloads: any payload that decodes as a
//! [`Response`] with a known status and the expected body shape yields a
//! [`Reply`]. Everything else becomes a [`ProtocolError`] carrying the raw bytes;
//! a partially decoded value is never returned.
//!
//! Server-side rejection (`401`, `500`) is not an error at this layer. It comes
//! back as a [`Reply`] whose [`Status`] says so, usually with an explanatory
//! message and an empty value.
use bincode::decode_from_slice;

use crate::{
    error::ProtocolError,
    model::{
        Block, BlockData, Enchantment, EntityLocation, ItemStack, Location, NamespacedKey, Player,
    },
};

use super::{
    request::{EnchantmentRecord, ItemRecord},
    response::{
        CommandResult, GetResult, PlayerRecord, Response, ResponseBody, STATUS_OK, STATUS_PARTIAL,
        STATUS_SERVER_ERROR, STATUS_UNAUTHORIZED, SetResult,
    },
    wire_config,
};

/// Raw response bytes as read off the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePayload(Vec<u8>);

impl ResponsePayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Outcome class of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// Some of the request's items failed; see the per-item outcomes.
    PartialSuccess,
    AuthenticationFailed,
    ServerError,
}

impl Status {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            STATUS_OK => Some(Status::Success),
            STATUS_PARTIAL => Some(Status::PartialSuccess),
            STATUS_UNAUTHORIZED => Some(Status::AuthenticationFailed),
            STATUS_SERVER_ERROR => Some(Status::ServerError),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Status::Success => STATUS_OK,
            Status::PartialSuccess => STATUS_PARTIAL,
            Status::AuthenticationFailed => STATUS_UNAUTHORIZED,
            Status::ServerError => STATUS_SERVER_ERROR,
        }
    }

    /// Whether the server carried out the request, at least in part.
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success | Status::PartialSuccess)
    }
}

/// Status plus decoded value of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    pub status: Status,
    /// Explanation attached by the server, mostly on failures.
    pub message: Option<String>,
    pub value: T,
}

impl<T> Reply<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reply<U> {
        Reply {
            status: self.status,
            message: self.message,
            value: f(self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutcome {
    pub success: bool,
    pub exception: Option<String>,
}

/// Result of looking up one location.
///
/// `block` is `None` when the location holds air, holds nothing, or the lookup
/// failed (then `exception` says why).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLookup {
    pub location: Location,
    pub success: bool,
    pub exception: Option<String>,
    pub block: Option<Block>,
}

/// Decoded value of any reply shape, see [`decode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Ack,
    Commands(Vec<CommandOutcome>),
    BlocksSet(Vec<BlockOutcome>),
    Blocks(Vec<BlockLookup>),
    Players(Vec<Player>),
}

/// What the caller expects a payload to contain.
#[derive(Debug, Clone, Copy)]
pub enum Shape<'a> {
    Ack,
    /// Outcomes for this many submitted commands.
    Commands(usize),
    /// Outcomes for this many submitted blocks.
    BlocksSet(usize),
    /// Lookups for these queried locations, in order.
    Blocks(&'a [Location]),
    Players,
}

pub fn decode(payload: &ResponsePayload, shape: Shape<'_>) -> Result<Reply<Decoded>, ProtocolError> {
    match shape {
        Shape::Ack => Ok(decode_ack(payload)?.map(|()| Decoded::Ack)),
        Shape::Commands(n) => Ok(decode_commands(payload, n)?.map(Decoded::Commands)),
        Shape::BlocksSet(n) => Ok(decode_set_blocks(payload, n)?.map(Decoded::BlocksSet)),
        Shape::Blocks(locations) => {
            Ok(decode_get_blocks(payload, locations)?.map(Decoded::Blocks))
        }
        Shape::Players => Ok(decode_players(payload)?.map(Decoded::Players)),
    }
}

/// Replies that carry no value: handshake, ping, close.
pub fn decode_ack(payload: &ResponsePayload) -> Result<Reply<()>, ProtocolError> {
    let (status, body) = envelope(payload)?;
    let message = match body {
        ResponseBody::Empty | ResponseBody::ConnectionClosed => None,
        ResponseBody::Message(message) => Some(message),
        other => return Err(mismatch("acknowledgement", other.kind(), payload)),
    };
    Ok(Reply {
        status,
        message,
        value: (),
    })
}

pub fn decode_commands(
    payload: &ResponsePayload,
    submitted: usize,
) -> Result<Reply<Vec<CommandOutcome>>, ProtocolError> {
    let reply = shaped(payload, "command outcomes", |body| match body {
        ResponseBody::Commands(results) => Ok(results),
        other => Err(other),
    })?;
    check_len(payload, "command outcomes", submitted, &reply)?;

    Ok(reply.map(|results| {
        results
            .into_iter()
            .map(|CommandResult { success, message }| CommandOutcome { success, message })
            .collect()
    }))
}

pub fn decode_set_blocks(
    payload: &ResponsePayload,
    submitted: usize,
) -> Result<Reply<Vec<BlockOutcome>>, ProtocolError> {
    let reply = shaped(payload, "block outcomes", |body| match body {
        ResponseBody::BlocksSet(results) => Ok(results),
        other => Err(other),
    })?;
    check_len(payload, "block outcomes", submitted, &reply)?;

    Ok(reply.map(|results| {
        results
            .into_iter()
            .map(|SetResult { success, exception }| BlockOutcome { success, exception })
            .collect()
    }))
}

pub fn decode_get_blocks(
    payload: &ResponsePayload,
    locations: &[Location],
) -> Result<Reply<Vec<BlockLookup>>, ProtocolError> {
    let reply = shaped(payload, "block lookups", |body| match body {
        ResponseBody::Blocks(results) => Ok(results),
        other => Err(other),
    })?;
    check_len(payload, "block lookups", locations.len(), &reply)?;

    let lookups = locations
        .iter()
        .zip(&reply.value)
        .map(|(location, result)| lookup(payload, *location, result))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Reply {
        status: reply.status,
        message: reply.message,
        value: lookups,
    })
}

pub fn decode_players(payload: &ResponsePayload) -> Result<Reply<Vec<Player>>, ProtocolError> {
    let reply = shaped(payload, "players", |body| match body {
        ResponseBody::Players(players) => Ok(players),
        other => Err(other),
    })?;
    Ok(reply.map(|players| players.into_iter().map(player).collect()))
}

fn envelope(payload: &ResponsePayload) -> Result<(Status, ResponseBody), ProtocolError> {
    let raw = payload.as_bytes();
    let (response, read): (Response, usize) =
        decode_from_slice(raw, wire_config()).map_err(|e| ProtocolError::Undecodable {
            reason: e.to_string(),
            raw: raw.to_vec(),
        })?;

    if read != raw.len() {
        return Err(ProtocolError::Undecodable {
            reason: format!("{} trailing bytes", raw.len() - read),
            raw: raw.to_vec(),
        });
    }

    let status = Status::from_code(response.status).ok_or_else(|| ProtocolError::UnknownStatus {
        code: response.status,
        raw: raw.to_vec(),
    })?;
    Ok((status, response.body))
}

/// Accepts the expected body, or a bare message/empty body on failure statuses.
fn shaped<T: Default>(
    payload: &ResponsePayload,
    expected: &str,
    extract: impl FnOnce(ResponseBody) -> Result<T, ResponseBody>,
) -> Result<Reply<T>, ProtocolError> {
    let (status, body) = envelope(payload)?;
    match body {
        ResponseBody::Message(message) if !status.is_success() => Ok(Reply {
            status,
            message: Some(message),
            value: T::default(),
        }),
        ResponseBody::Empty if !status.is_success() => Ok(Reply {
            status,
            message: None,
            value: T::default(),
        }),
        body => match extract(body) {
            Ok(value) => Ok(Reply {
                status,
                message: None,
                value,
            }),
            Err(other) => Err(mismatch(expected, other.kind(), payload)),
        },
    }
}

fn check_len<T>(
    payload: &ResponsePayload,
    expected: &str,
    submitted: usize,
    reply: &Reply<Vec<T>>,
) -> Result<(), ProtocolError> {
    let empty_failure = !reply.status.is_success() && reply.value.is_empty();
    if reply.value.len() != submitted && !empty_failure {
        return Err(ProtocolError::ShapeMismatch {
            expected: format!("{submitted} {expected}"),
            found: format!("{} entries", reply.value.len()),
            raw: payload.as_bytes().to_vec(),
        });
    }
    Ok(())
}

fn mismatch(expected: &str, found: &str, payload: &ResponsePayload) -> ProtocolError {
    ProtocolError::ShapeMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
        raw: payload.as_bytes().to_vec(),
    }
}

fn lookup(
    payload: &ResponsePayload,
    location: Location,
    result: &GetResult,
) -> Result<BlockLookup, ProtocolError> {
    let block = match (&result.block_data, result.success) {
        (Some(data), true) => {
            let data = BlockData::parse(data).map_err(|e| ProtocolError::Undecodable {
                reason: e.to_string(),
                raw: payload.as_bytes().to_vec(),
            })?;
            let inventory = result.items.iter().cloned().map(item).collect();
            Some(Block::from_data(data, location, inventory)).filter(|b| !b.is_air())
        }
        _ => None,
    };

    Ok(BlockLookup {
        location,
        success: result.success,
        exception: result.exception.clone(),
        block,
    })
}

fn item(record: ItemRecord) -> ItemStack {
    ItemStack::from_parts(
        NamespacedKey::new(record.namespace, record.key),
        u32::try_from(record.index).ok(),
        record.count,
        record
            .enchantments
            .into_iter()
            .map(|EnchantmentRecord { namespace, key, level }| Enchantment {
                key: NamespacedKey::new(namespace, key),
                level,
            })
            .collect(),
    )
}

fn player(record: PlayerRecord) -> Player {
    Player {
        name: record.name,
        uuid: record.uuid,
        online: record.online,
        location: record.location.map(|l| EntityLocation {
            world: l.world,
            x: l.x,
            y: l.y,
            z: l.z,
            yaw: l.yaw,
            pitch: l.pitch,
        }),
        health: record.health,
        address: record.address,
        inventory: record.items.into_iter().map(item).collect(),
    }
}
