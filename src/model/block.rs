use std::{collections::BTreeMap, fmt};

use crate::error::ValidationError;

use super::{ItemStack, Location};

pub const DEFAULT_NAMESPACE: &str = "minecraft";

const AIR_NAMES: [&str; 3] = ["air", "cave_air", "void_air"];

/// `namespace:name` identifier used for blocks, items and enchantments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedKey {
    namespace: String,
    name: String,
}

impl NamespacedKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parses `namespace:name`; a bare `name` lands in the `minecraft` namespace.
    pub fn parse(id: &str) -> Self {
        match id.trim().split_once(':') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::new(DEFAULT_NAMESPACE, id.trim()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for NamespacedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Textual block identity: `namespace:name[key=value,...]`.
///
/// State keys render in sorted order so the same block always produces the
/// same text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    pub key: NamespacedKey,
    pub state: BTreeMap<String, String>,
}

impl BlockData {
    pub fn parse(data: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidField {
            field: "block_data",
            reason: format!("{reason} in '{data}'"),
        };

        let data = data.trim();
        let (id, properties) = match data.split_once('[') {
            Some((id, rest)) => {
                let inner = rest
                    .strip_suffix(']')
                    .ok_or_else(|| invalid("unterminated state list"))?;
                (id, Some(inner))
            }
            None => (data, None),
        };

        let key = NamespacedKey::parse(id);
        if key.name().is_empty() {
            return Err(invalid("missing block name"));
        }

        let mut state = BTreeMap::new();
        for pair in properties
            .into_iter()
            .flat_map(|p| p.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            let (k, v) = pair
                .split_once('=')
                .ok_or_else(|| invalid("state entry without '='"))?;
            let k = k.trim();
            if k.is_empty() {
                return Err(invalid("empty state key"));
            }
            state.insert(k.to_string(), v.trim().to_string());
        }

        Ok(Self { key, state })
    }
}

impl fmt::Display for BlockData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if !self.state.is_empty() {
            let pairs = self
                .state
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>();
            write!(f, "[{}]", pairs.join(","))?;
        }
        Ok(())
    }
}

/// A block placed at a location, with optional state and container inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    key: NamespacedKey,
    location: Location,
    state: BTreeMap<String, String>,
    inventory: Vec<ItemStack>,
}

impl Block {
    /// Creates a stateless block; `id` may carry a namespace (`"minecraft:stone"`).
    pub fn new(id: &str, location: Location) -> Self {
        Self {
            key: NamespacedKey::parse(id),
            location,
            state: BTreeMap::new(),
            inventory: Vec::new(),
        }
    }

    pub fn air(location: Location) -> Self {
        Self::new("air", location)
    }

    pub fn builder(id: &str, location: Location) -> BlockBuilder {
        BlockBuilder {
            block: Self::new(id, location),
        }
    }

    pub(crate) fn from_data(data: BlockData, location: Location, inventory: Vec<ItemStack>) -> Self {
        Self {
            key: data.key,
            location,
            state: data.state,
            inventory,
        }
    }

    pub fn key(&self) -> &NamespacedKey {
        &self.key
    }

    pub fn namespace(&self) -> &str {
        self.key.namespace()
    }

    pub fn name(&self) -> &str {
        self.key.name()
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn state(&self) -> &BTreeMap<String, String> {
        &self.state
    }

    pub fn inventory(&self) -> &[ItemStack] {
        &self.inventory
    }

    pub fn is_air(&self) -> bool {
        self.key.namespace() == DEFAULT_NAMESPACE && AIR_NAMES.contains(&self.key.name())
    }

    /// Canonical `namespace:name[state]` text for this block.
    pub fn block_data(&self) -> String {
        BlockData {
            key: self.key.clone(),
            state: self.state.clone(),
        }
        .to_string()
    }

    /// Air at this block's location.
    pub fn cleared(&self) -> Self {
        Self::air(self.location)
    }
}

/// Incrementally assembles a [`Block`].
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    block: Block,
}

impl BlockBuilder {
    pub fn state(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.block.state.insert(key.into(), value.to_string());
        self
    }

    pub fn states<K, V>(mut self, states: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        for (k, v) in states {
            self.block.state.insert(k.into(), v.to_string());
        }
        self
    }

    pub fn item(mut self, item: ItemStack) -> Self {
        self.block.inventory.push(item);
        self
    }

    pub fn build(self) -> Block {
        self.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_defaults_namespace() {
        let key = NamespacedKey::parse("stone");
        assert_eq!(key.namespace(), "minecraft");
        assert_eq!(key.name(), "stone");

        let key = NamespacedKey::parse("create:cogwheel");
        assert_eq!(key.to_string(), "create:cogwheel");
    }

    #[test]
    fn block_data_renders_sorted_state() {
        let block = Block::builder("chest", Location::new(161, 66, 119))
            .state("waterlogged", false)
            .state("facing", "west")
            .state("type", "single")
            .build();

        assert_eq!(
            block.block_data(),
            "minecraft:chest[facing=west,type=single,waterlogged=false]"
        );
    }

    #[test]
    fn parse_tolerates_whitespace() {
        let data = BlockData::parse("minecraft:chest[facing=west, type=single ]").unwrap();

        assert_eq!(data.key, NamespacedKey::parse("chest"));
        assert_eq!(data.state.get("facing").map(String::as_str), Some("west"));
        assert_eq!(data.state.get("type").map(String::as_str), Some("single"));
    }

    #[test]
    fn parse_without_state() {
        let data = BlockData::parse("minecraft:stone").unwrap();
        assert!(data.state.is_empty());
        assert_eq!(data.to_string(), "minecraft:stone");
    }

    #[test]
    fn parse_rejects_broken_text() {
        for text in ["minecraft:chest[facing=west", "minecraft:", "stone[facing]", ""] {
            assert!(BlockData::parse(text).is_err(), "{text:?} should not parse");
        }
    }

    #[test]
    fn air_variants() {
        let at = Location::ORIGIN;
        assert!(Block::air(at).is_air());
        assert!(Block::new("minecraft:cave_air", at).is_air());
        assert!(!Block::new("stone", at).is_air());
        assert!(!Block::new("othermod:air", at).is_air());
    }

    #[test]
    fn cleared_keeps_location() {
        let block = Block::builder("furnace", Location::new(1, 2, 3))
            .state("lit", true)
            .build();
        let cleared = block.cleared();

        assert!(cleared.is_air());
        assert_eq!(cleared.location(), block.location());
        assert!(cleared.state().is_empty());
    }
}
