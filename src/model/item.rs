use super::NamespacedKey;

/// Enchantment applied to an item stack.
///
/// The level is not range-checked; the server decides what it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enchantment {
    pub key: NamespacedKey,
    pub level: u32,
}

impl Enchantment {
    pub fn new(id: &str, level: u32) -> Self {
        Self {
            key: NamespacedKey::parse(id),
            level,
        }
    }
}

/// A stack of items, optionally pinned to an inventory slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStack {
    key: NamespacedKey,
    index: Option<u32>,
    count: u32,
    enchantments: Vec<Enchantment>,
}

impl ItemStack {
    pub fn new(id: &str, count: u32) -> Self {
        Self {
            key: NamespacedKey::parse(id),
            index: None,
            count,
            enchantments: Vec::new(),
        }
    }

    /// Places the stack in a specific slot instead of the first free one.
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_enchantment(mut self, enchantment: Enchantment) -> Self {
        self.enchantments.push(enchantment);
        self
    }

    pub(crate) fn from_parts(
        key: NamespacedKey,
        index: Option<u32>,
        count: u32,
        enchantments: Vec<Enchantment>,
    ) -> Self {
        Self {
            key,
            index,
            count,
            enchantments,
        }
    }

    pub fn key(&self) -> &NamespacedKey {
        &self.key
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn enchantments(&self) -> &[Enchantment] {
        &self.enchantments
    }
}
