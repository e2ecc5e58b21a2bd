use bincode::{Decode, Encode};

use crate::model::{Block, Enchantment, ItemStack, Location};

/// Location as sent on the wire; the world name comes from the session.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct LocationRecord {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl LocationRecord {
    pub fn new(world: &str, location: Location) -> Self {
        Self {
            world: world.to_string(),
            x: location.x,
            y: location.y,
            z: location.z,
        }
    }

    pub fn location(&self) -> Location {
        Location::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct EnchantmentRecord {
    pub namespace: String,
    pub key: String,
    pub level: u32,
}

impl From<&Enchantment> for EnchantmentRecord {
    fn from(value: &Enchantment) -> Self {
        Self {
            namespace: value.key.namespace().to_string(),
            key: value.key.name().to_string(),
            level: value.level,
        }
    }
}

/// Item stack on the wire; an index of `-1` lets the server pick the slot.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct ItemRecord {
    pub namespace: String,
    pub key: String,
    pub index: i32,
    pub count: u32,
    pub enchantments: Vec<EnchantmentRecord>,
}

impl From<&ItemStack> for ItemRecord {
    fn from(value: &ItemStack) -> Self {
        Self {
            namespace: value.key().namespace().to_string(),
            key: value.key().name().to_string(),
            index: value
                .index()
                .and_then(|i| i32::try_from(i).ok())
                .unwrap_or(-1),
            count: value.count(),
            enchantments: value.enchantments().iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct BlockRecord {
    pub location: LocationRecord,
    pub block_data: String,
    pub items: Vec<ItemRecord>,
}

impl BlockRecord {
    pub fn new(world: &str, block: &Block) -> Self {
        Self {
            location: LocationRecord::new(world, block.location()),
            block_data: block.block_data(),
            items: block.inventory().iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct CommandRecord {
    pub text: String,
    pub player: Option<String>,
}

/// Client-to-server message.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub enum Request {
    /// First frame of every session.
    Authenticate {
        username: Option<String>,
        password: Option<String>,
    },
    ExecuteCommands(Vec<CommandRecord>),
    SetBlocks(Vec<BlockRecord>),
    GetBlocks(Vec<LocationRecord>),
    GetPlayers {
        only_online: bool,
    },
    Ping,
    CloseConnection,
}

impl Request {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Authenticate { .. } => "authenticate",
            Request::ExecuteCommands(_) => "execute-commands",
            Request::SetBlocks(_) => "set-blocks",
            Request::GetBlocks(_) => "get-blocks",
            Request::GetPlayers { .. } => "get-players",
            Request::Ping => "ping",
            Request::CloseConnection => "close-connection",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_record_carries_world_and_items() {
        let block = Block::builder("chest", Location::new(1, 64, -2))
            .state("facing", "north")
            .item(ItemStack::new("diamond", 3).with_index(4))
            .item(
                ItemStack::new("iron_sword", 1)
                    .with_enchantment(Enchantment::new("sharpness", 300)),
            )
            .build();

        let record = BlockRecord::new("nether", &block);

        assert_eq!(record.location.world, "nether");
        assert_eq!(record.location.location(), Location::new(1, 64, -2));
        assert_eq!(record.block_data, "minecraft:chest[facing=north]");
        assert_eq!(record.items[0].index, 4);
        assert_eq!(record.items[1].index, -1);
        assert_eq!(record.items[1].enchantments[0].level, 300);
    }
}
