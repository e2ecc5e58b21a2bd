use bincode::encode_to_vec;

use crate::{
    command::Command,
    error::ValidationError,
    model::{Block, ItemStack, Location},
};

use super::{
    wire_config,
    request::{BlockRecord, CommandRecord, LocationRecord, Request},
};

/// Encoded request bytes, ready for the session channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPayload {
    kind: &'static str,
    bytes: Vec<u8>,
}

impl RequestPayload {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl TryFrom<Request> for RequestPayload {
    type Error = ValidationError;

    fn try_from(value: Request) -> Result<Self, Self::Error> {
        let bytes = encode_to_vec(&value, wire_config())
            .map_err(|e| ValidationError::Unencodable(e.to_string()))?;
        Ok(Self {
            kind: value.kind(),
            bytes,
        })
    }
}

/// A domain operation the encoder knows how to turn into a request.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    ExecuteCommands(&'a [Command]),
    SetBlocks(&'a [Block]),
    GetBlocks(&'a [Location]),
    GetPlayers { only_online: bool },
    Ping,
}

/// Pure transform from domain operations to request payloads.
///
/// Nothing is ever partially encoded: the whole operation validates or a
/// [`ValidationError`] comes back. Size limits are the batch coordinator's
/// business, not the encoder's.
#[derive(Debug, Clone)]
pub struct RequestEncoder {
    world: String,
}

impl RequestEncoder {
    /// `world` is stamped onto every location the encoder emits.
    pub fn new(world: impl Into<String>) -> Self {
        Self {
            world: world.into(),
        }
    }

    pub fn encode(&self, operation: Operation<'_>) -> Result<RequestPayload, ValidationError> {
        let request = match operation {
            Operation::ExecuteCommands(commands) => {
                if commands.is_empty() {
                    return Err(ValidationError::Empty("command"));
                }
                let records = commands
                    .iter()
                    .map(|c| {
                        c.render().map(|rendered| CommandRecord {
                            text: rendered.text,
                            player: c.player().map(str::to_string),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Request::ExecuteCommands(records)
            }
            Operation::SetBlocks(blocks) => {
                validate_blocks(blocks)?;
                Request::SetBlocks(
                    blocks
                        .iter()
                        .map(|b| BlockRecord::new(&self.world, b))
                        .collect(),
                )
            }
            Operation::GetBlocks(locations) => {
                if locations.is_empty() {
                    return Err(ValidationError::Empty("location"));
                }
                Request::GetBlocks(
                    locations
                        .iter()
                        .map(|l| LocationRecord::new(&self.world, *l))
                        .collect(),
                )
            }
            Operation::GetPlayers { only_online } => Request::GetPlayers { only_online },
            Operation::Ping => Request::Ping,
        };

        request.try_into()
    }

    pub fn execute_commands(&self, commands: &[Command]) -> Result<RequestPayload, ValidationError> {
        self.encode(Operation::ExecuteCommands(commands))
    }

    pub fn set_blocks(&self, blocks: &[Block]) -> Result<RequestPayload, ValidationError> {
        self.encode(Operation::SetBlocks(blocks))
    }

    pub fn get_blocks(&self, locations: &[Location]) -> Result<RequestPayload, ValidationError> {
        self.encode(Operation::GetBlocks(locations))
    }
}

/// Checks a block working set without encoding it.
pub(crate) fn validate_blocks(blocks: &[Block]) -> Result<(), ValidationError> {
    if blocks.is_empty() {
        return Err(ValidationError::Empty("block"));
    }
    for block in blocks {
        if block.name().is_empty() || block.namespace().is_empty() {
            return Err(ValidationError::EmptyName { what: "block" });
        }
        validate_items(block.inventory())?;
    }
    Ok(())
}

// Enchantment levels are left to the server.
fn validate_items(items: &[ItemStack]) -> Result<(), ValidationError> {
    for item in items {
        if item.key().name().is_empty() || item.key().namespace().is_empty() {
            return Err(ValidationError::EmptyName { what: "item" });
        }
        if item.count() == 0 {
            return Err(ValidationError::InvalidField {
                field: "count",
                reason: format!("{} stack must hold at least one item", item.key()),
            });
        }
    }
    Ok(())
}
