//! Domain values exchanged with the server.
//!
//! Everything here is plain data: locations, blocks, item stacks, enchantments
//! and players. Values are immutable once built; the only mutable pieces are
//! the explicit builders ([`BlockBuilder`], [`ItemStack`]'s `with_*` methods)
//! that hand back a finished value.
mod block;
mod item;
mod location;
mod player;

pub use block::{Block, BlockBuilder, BlockData, DEFAULT_NAMESPACE, NamespacedKey};
pub use item::{Enchantment, ItemStack};
pub use location::{EntityLocation, Facing, Location};
pub use player::Player;
