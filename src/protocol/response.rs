use bincode::{Decode, Encode};

use super::request::{ItemRecord, LocationRecord};

pub const STATUS_OK: u16 = 200;
pub const STATUS_PARTIAL: u16 = 207;
pub const STATUS_UNAUTHORIZED: u16 = 401;
pub const STATUS_SERVER_ERROR: u16 = 500;

/// Server-to-client message: a status code plus a request-specific body.
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: ResponseBody,
}

impl Response {
    pub fn new(status: u16, body: ResponseBody) -> Self {
        Self { status, body }
    }

    pub fn ok(body: ResponseBody) -> Self {
        Self::new(STATUS_OK, body)
    }

    pub fn error(status: u16, description: impl Into<String>) -> Self {
        Self::new(status, ResponseBody::Message(description.into()))
    }
}

#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub enum ResponseBody {
    Empty,
    Message(String),
    Commands(Vec<CommandResult>),
    BlocksSet(Vec<SetResult>),
    Blocks(Vec<GetResult>),
    Players(Vec<PlayerRecord>),
    ConnectionClosed,
}

impl ResponseBody {
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseBody::Empty => "empty",
            ResponseBody::Message(_) => "message",
            ResponseBody::Commands(_) => "commands",
            ResponseBody::BlocksSet(_) => "blocks-set",
            ResponseBody::Blocks(_) => "blocks",
            ResponseBody::Players(_) => "players",
            ResponseBody::ConnectionClosed => "connection-closed",
        }
    }
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct SetResult {
    pub success: bool,
    pub exception: Option<String>,
}

/// Lookup result for one queried location, in query order.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct GetResult {
    pub success: bool,
    pub exception: Option<String>,
    pub block_data: Option<String>,
    pub items: Vec<ItemRecord>,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub struct EntityLocationRecord {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub struct PlayerRecord {
    pub name: String,
    pub uuid: String,
    pub online: bool,
    pub location: Option<EntityLocationRecord>,
    pub health: Option<f32>,
    pub address: Option<String>,
    pub items: Vec<ItemRecord>,
}

impl PlayerRecord {
    /// Online player standing at `location` with full health.
    pub fn online(name: &str, uuid: &str, location: LocationRecord) -> Self {
        Self {
            name: name.to_string(),
            uuid: uuid.to_string(),
            online: true,
            location: Some(location.into()),
            health: Some(20.0),
            address: Some("127.0.0.1".to_string()),
            items: Vec::new(),
        }
    }

    pub fn offline(name: &str, uuid: &str) -> Self {
        Self {
            name: name.to_string(),
            uuid: uuid.to_string(),
            online: false,
            location: None,
            health: None,
            address: None,
            items: Vec::new(),
        }
    }
}

impl From<LocationRecord> for EntityLocationRecord {
    fn from(value: LocationRecord) -> Self {
        Self {
            world: value.world,
            x: f64::from(value.x),
            y: f64::from(value.y),
            z: f64::from(value.z),
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}
