use super::{EntityLocation, ItemStack};

/// A player known to the server.
///
/// Offline players only carry their identity; position, health, address and
/// inventory are reported for online players alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub name: String,
    pub uuid: String,
    pub online: bool,
    pub location: Option<EntityLocation>,
    pub health: Option<f32>,
    pub address: Option<String>,
    pub inventory: Vec<ItemStack>,
}

impl Player {
    pub fn is_online(&self) -> bool {
        self.online
    }
}
