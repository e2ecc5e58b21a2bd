//! Console commands sent through the session channel.
//!
//! This module defines the [`Command`] type, which pairs a command body with an
//! optional target player. The body is either opaque text, passed through
//! verbatim, or a [`StructuredCommand`] that is validated field by field and
//! rendered to canonical command text.
//!
//! # Overview
//! The structured commands cover the operations a build script needs most:
//!
//! - `Clear`: empty (part of) a player's inventory.
//! - `Give`: hand a player an item stack, optionally with SNBT tags.
//! - `SetBlock`: place one block, with state, tags and a change policy.
//! - `Fill`: fill a box; corners may be given in any order.
//! - `Summon`: spawn an entity, optionally at a position and with tags.
//!
//! Rendering never yields partial text: either the whole command validates or
//! a [`ValidationError`] is returned.
//!
//! # Example
//! ```rust
//! use craftlink::command::{Command, StructuredCommand};
//!
//! let cmd: Command = StructuredCommand::give("Steve", "diamond", 3).into();
//! assert_eq!(cmd.render().unwrap().text, "give Steve diamond 3");
//! ```
use std::{collections::BTreeMap, fmt};

use crate::{
    error::ValidationError,
    model::{BlockData, Location, NamespacedKey},
};

/// How the coordinates of a command are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinateMode {
    /// World coordinates.
    #[default]
    Absolute,
    /// Offsets from the executing entity (`~`).
    Relative,
    /// Offsets along the executing entity's view direction (`^`).
    Local,
}

impl CoordinateMode {
    fn prefix(self) -> &'static str {
        match self {
            CoordinateMode::Absolute => "",
            CoordinateMode::Relative => "~",
            CoordinateMode::Local => "^",
        }
    }
}

/// One axis of a command position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coord {
    pub mode: CoordinateMode,
    pub value: i32,
}

impl Coord {
    pub const fn abs(value: i32) -> Self {
        Self {
            mode: CoordinateMode::Absolute,
            value,
        }
    }

    pub const fn rel(value: i32) -> Self {
        Self {
            mode: CoordinateMode::Relative,
            value,
        }
    }

    pub const fn local(value: i32) -> Self {
        Self {
            mode: CoordinateMode::Local,
            value,
        }
    }

    fn resolve(self, mode: Option<CoordinateMode>) -> Self {
        match mode {
            Some(mode) => Self { mode, ..self },
            None => self,
        }
    }
}

impl From<i32> for Coord {
    fn from(value: i32) -> Self {
        Self::abs(value)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.mode.prefix(), self.value)
    }
}

/// A command position; each axis may carry its own anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub x: Coord,
    pub y: Coord,
    pub z: Coord,
}

impl Position {
    pub fn new(x: impl Into<Coord>, y: impl Into<Coord>, z: impl Into<Coord>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
            z: z.into(),
        }
    }

    fn resolve(self, mode: Option<CoordinateMode>) -> Self {
        Self {
            x: self.x.resolve(mode),
            y: self.y.resolve(mode),
            z: self.z.resolve(mode),
        }
    }

    /// First non-absolute anchor, if any.
    fn mode(&self) -> CoordinateMode {
        [self.x, self.y, self.z]
            .into_iter()
            .map(|c| c.mode)
            .find(|m| *m != CoordinateMode::Absolute)
            .unwrap_or_default()
    }
}

impl From<Location> for Position {
    fn from(value: Location) -> Self {
        Self::new(value.x, value.y, value.z)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

/// SNBT-style tag value attached to items, blocks and entities.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<TagValue>),
    Compound(Vec<(String, TagValue)>),
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        TagValue::Int(value.into())
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Float(value)
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Bool(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Str(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Str(value)
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Int(v) => write!(f, "{v}"),
            TagValue::Float(v) => write!(f, "{v:?}"),
            TagValue::Bool(v) => write!(f, "{v}"),
            TagValue::Str(v) => {
                write!(f, "\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\""))
            }
            TagValue::List(items) => {
                let items = items.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "[{}]", items.join(","))
            }
            TagValue::Compound(entries) => f.write_str(&format_compound(entries)),
        }
    }
}

fn format_compound(entries: &[(String, TagValue)]) -> String {
    let entries = entries
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>();
    format!("{{{}}}", entries.join(","))
}

/// What `setblock` does with the block already in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockChange {
    #[default]
    Replace,
    Destroy,
    Keep,
}

impl fmt::Display for BlockChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockChange::Replace => "replace",
            BlockChange::Destroy => "destroy",
            BlockChange::Keep => "keep",
        };
        f.write_str(s)
    }
}

/// How `fill` treats the blocks inside the box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHandling {
    Hollow,
    Outline,
    /// Only replace blocks matching the fill's `replace_filter`.
    Replace,
    Destroy,
    Keep,
}

impl fmt::Display for BlockHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockHandling::Hollow => "hollow",
            BlockHandling::Outline => "outline",
            BlockHandling::Replace => "replace",
            BlockHandling::Destroy => "destroy",
            BlockHandling::Keep => "keep",
        };
        f.write_str(s)
    }
}

/// Typed game commands rendered to text before sending.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredCommand {
    Clear {
        player: String,
        item: Option<String>,
        max_count: Option<u32>,
    },
    Give {
        player: String,
        item: String,
        amount: u32,
        tags: Vec<(String, TagValue)>,
    },
    SetBlock {
        pos: Position,
        block: String,
        mode: Option<CoordinateMode>,
        change: BlockChange,
        state: BTreeMap<String, String>,
        tags: Vec<(String, TagValue)>,
    },
    Fill {
        from: Position,
        to: Position,
        block: String,
        mode: Option<CoordinateMode>,
        handling: Option<BlockHandling>,
        replace_filter: Option<String>,
    },
    Summon {
        entity: String,
        pos: Option<Position>,
        mode: Option<CoordinateMode>,
        tags: Vec<(String, TagValue)>,
    },
}

impl StructuredCommand {
    /// Clears a player's whole inventory.
    pub fn clear(player: &str) -> Self {
        StructuredCommand::Clear {
            player: player.to_string(),
            item: None,
            max_count: None,
        }
    }

    pub fn give(player: &str, item: &str, amount: u32) -> Self {
        StructuredCommand::Give {
            player: player.to_string(),
            item: item.to_string(),
            amount,
            tags: Vec::new(),
        }
    }

    pub fn set_block(pos: impl Into<Position>, block: &str) -> Self {
        StructuredCommand::SetBlock {
            pos: pos.into(),
            block: block.to_string(),
            mode: None,
            change: BlockChange::Replace,
            state: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    pub fn fill(from: impl Into<Position>, to: impl Into<Position>, block: &str) -> Self {
        StructuredCommand::Fill {
            from: from.into(),
            to: to.into(),
            block: block.to_string(),
            mode: None,
            handling: None,
            replace_filter: None,
        }
    }

    /// Summons an entity at the executor's position.
    pub fn summon(entity: &str) -> Self {
        StructuredCommand::Summon {
            entity: entity.to_string(),
            pos: None,
            mode: None,
            tags: Vec::new(),
        }
    }

    pub fn render(&self) -> Result<RenderedCommand, ValidationError> {
        match self {
            StructuredCommand::Clear {
                player,
                item,
                max_count,
            } => {
                check_word("player", player)?;
                let mut text = format!("clear {player}");
                if let Some(item) = item {
                    check_word("item", item)?;
                    text.push_str(&format!(" {item}"));
                }
                if let Some(count) = max_count {
                    if item.is_none() {
                        return Err(ValidationError::InvalidField {
                            field: "max_count",
                            reason: "a maximum count requires an item".into(),
                        });
                    }
                    text.push_str(&format!(" {count}"));
                }
                Ok(RenderedCommand::absolute(text))
            }
            StructuredCommand::Give {
                player,
                item,
                amount,
                tags,
            } => {
                check_word("player", player)?;
                check_word("item", item)?;
                if *amount == 0 {
                    return Err(ValidationError::InvalidField {
                        field: "amount",
                        reason: "must be at least 1".into(),
                    });
                }
                let mut text = format!("give {player} {item}");
                if !tags.is_empty() {
                    text.push_str(&format_compound(tags));
                }
                if *amount > 1 {
                    text.push_str(&format!(" {amount}"));
                }
                Ok(RenderedCommand::absolute(text))
            }
            StructuredCommand::SetBlock {
                pos,
                block,
                mode,
                change,
                state,
                tags,
            } => {
                check_word("block", block)?;
                let pos = pos.resolve(*mode);
                let data = BlockData {
                    key: NamespacedKey::parse(block),
                    state: state.clone(),
                };
                let mut text = format!("setblock {pos} {data}");
                if !tags.is_empty() {
                    text.push_str(&format_compound(tags));
                }
                if *change != BlockChange::Replace {
                    text.push_str(&format!(" {change}"));
                }
                Ok(RenderedCommand {
                    text,
                    coordinates: pos.mode(),
                })
            }
            StructuredCommand::Fill {
                from,
                to,
                block,
                mode,
                handling,
                replace_filter,
            } => {
                check_word("block", block)?;
                let (from, to) = normalize_box(from.resolve(*mode), to.resolve(*mode));
                let mut text = format!("fill {from} {to} {block}");
                match (handling, replace_filter) {
                    (Some(BlockHandling::Replace), Some(filter)) => {
                        check_word("replace_filter", filter)?;
                        text.push_str(&format!(" replace {filter}"));
                    }
                    (Some(BlockHandling::Replace), None) => {
                        return Err(ValidationError::InvalidField {
                            field: "replace_filter",
                            reason: "replace handling needs a block to replace".into(),
                        });
                    }
                    (_, Some(_)) => {
                        return Err(ValidationError::InvalidField {
                            field: "replace_filter",
                            reason: "only valid with replace handling".into(),
                        });
                    }
                    (Some(handling), None) => text.push_str(&format!(" {handling}")),
                    (None, None) => {}
                }
                Ok(RenderedCommand {
                    text,
                    coordinates: from.mode(),
                })
            }
            StructuredCommand::Summon {
                entity,
                pos,
                mode,
                tags,
            } => {
                check_word("entity", entity)?;
                let mut text = format!("summon {entity}");
                let mut coordinates = CoordinateMode::Absolute;
                if let Some(pos) = pos {
                    let pos = pos.resolve(*mode);
                    coordinates = pos.mode();
                    text.push_str(&format!(" {pos}"));
                } else if !tags.is_empty() {
                    return Err(ValidationError::InvalidField {
                        field: "tags",
                        reason: "summon tags require a position".into(),
                    });
                }
                if !tags.is_empty() {
                    text.push_str(&format!(" {}", format_compound(tags)));
                }
                Ok(RenderedCommand { text, coordinates })
            }
        }
    }
}

/// Orders each axis min-to-max when both corners share the same anchor.
fn normalize_box(a: Position, b: Position) -> (Position, Position) {
    fn axis(a: Coord, b: Coord) -> (Coord, Coord) {
        if a.mode == b.mode && a.value > b.value {
            (b, a)
        } else {
            (a, b)
        }
    }

    let (x1, x2) = axis(a.x, b.x);
    let (y1, y2) = axis(a.y, b.y);
    let (z1, z2) = axis(a.z, b.z);
    (
        Position {
            x: x1,
            y: y1,
            z: z1,
        },
        Position {
            x: x2,
            y: y2,
            z: z2,
        },
    )
}

fn check_word(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyName { what: field });
    }
    if value.contains(char::is_whitespace) {
        return Err(ValidationError::InvalidField {
            field,
            reason: format!("'{value}' contains whitespace"),
        });
    }
    Ok(())
}

/// Canonical command text plus how its coordinates are anchored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCommand {
    pub text: String,
    pub coordinates: CoordinateMode,
}

impl RenderedCommand {
    fn absolute(text: String) -> Self {
        Self {
            text,
            coordinates: CoordinateMode::Absolute,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandBody {
    Text(String),
    Structured(StructuredCommand),
}

/// A console command, optionally executed on behalf of a player.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    body: CommandBody,
    player: Option<String>,
}

impl Command {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            body: CommandBody::Text(text.into()),
            player: None,
        }
    }

    /// Runs the command as `player`, resolving relative coordinates from them.
    pub fn as_player(mut self, player: impl Into<String>) -> Self {
        self.player = Some(player.into());
        self
    }

    pub fn body(&self) -> &CommandBody {
        &self.body
    }

    pub fn player(&self) -> Option<&str> {
        self.player.as_deref()
    }

    pub fn render(&self) -> Result<RenderedCommand, ValidationError> {
        if let Some(player) = &self.player {
            check_word("player", player)?;
        }

        match &self.body {
            CommandBody::Text(text) if text.trim().is_empty() => {
                Err(ValidationError::EmptyName { what: "command" })
            }
            CommandBody::Text(text) => {
                let coordinates = text
                    .split_whitespace()
                    .find_map(|token| match token.chars().next() {
                        Some('~') => Some(CoordinateMode::Relative),
                        Some('^') => Some(CoordinateMode::Local),
                        _ => None,
                    })
                    .unwrap_or_default();
                Ok(RenderedCommand {
                    text: text.clone(),
                    coordinates,
                })
            }
            CommandBody::Structured(command) => command.render(),
        }
    }
}

impl From<&str> for Command {
    fn from(value: &str) -> Self {
        Command::text(value)
    }
}

impl From<String> for Command {
    fn from(value: String) -> Self {
        Command::text(value)
    }
}

impl From<StructuredCommand> for Command {
    fn from(value: StructuredCommand) -> Self {
        Self {
            body: CommandBody::Structured(value),
            player: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(command: StructuredCommand) -> String {
        command.render().unwrap().text
    }

    #[test]
    fn clear_variants() {
        assert_eq!(text(StructuredCommand::clear("Papa")), "clear Papa");

        let partial = StructuredCommand::Clear {
            player: "Papa".into(),
            item: Some("dirt".into()),
            max_count: Some(5),
        };
        assert_eq!(text(partial), "clear Papa dirt 5");

        let count_only = StructuredCommand::Clear {
            player: "Papa".into(),
            item: None,
            max_count: Some(5),
        };
        assert!(count_only.render().is_err());
    }

    #[test]
    fn give_appends_tags_and_amount() {
        assert_eq!(
            text(StructuredCommand::give("Steve", "diamond", 1)),
            "give Steve diamond"
        );

        let sword = StructuredCommand::Give {
            player: "Steve".into(),
            item: "diamond_sword".into(),
            amount: 2,
            tags: vec![(
                "Enchantments".into(),
                TagValue::List(vec![TagValue::Compound(vec![
                    ("id".into(), "sharpness".into()),
                    ("lvl".into(), TagValue::Int(999)),
                ])]),
            )],
        };
        assert_eq!(
            text(sword),
            "give Steve diamond_sword{Enchantments:[{id:\"sharpness\",lvl:999}]} 2"
        );

        assert!(StructuredCommand::give("Steve", "dirt", 0).render().is_err());
    }

    #[test]
    fn setblock_with_state_and_change() {
        let mut state = BTreeMap::new();
        state.insert("facing".to_string(), "west".to_string());
        let command = StructuredCommand::SetBlock {
            pos: Position::new(Coord::rel(0), Coord::local(70), 161),
            block: "chest".into(),
            mode: None,
            change: BlockChange::Keep,
            state,
            tags: Vec::new(),
        };

        let rendered = command.render().unwrap();
        assert_eq!(rendered.text, "setblock ~0 ^70 161 minecraft:chest[facing=west] keep");
        assert_eq!(rendered.coordinates, CoordinateMode::Relative);
    }

    #[test]
    fn mode_overrides_axis_anchors() {
        let command = StructuredCommand::SetBlock {
            pos: Position::new(196, Coord::local(11), 57),
            block: "stone".into(),
            mode: Some(CoordinateMode::Relative),
            change: BlockChange::Replace,
            state: BTreeMap::new(),
            tags: Vec::new(),
        };

        assert_eq!(text(command), "setblock ~196 ~11 ~57 minecraft:stone");
    }

    #[test]
    fn fill_normalizes_corners() {
        let command = StructuredCommand::fill(
            Location::new(10, 5, -3),
            Location::new(0, 8, -9),
            "glass",
        );

        assert_eq!(text(command), "fill 0 5 -9 10 8 -3 glass");
    }

    #[test]
    fn fill_replace_requires_filter() {
        let command = StructuredCommand::Fill {
            from: Location::ORIGIN.into(),
            to: Location::new(1, 1, 1).into(),
            block: "stone".into(),
            mode: None,
            handling: Some(BlockHandling::Replace),
            replace_filter: None,
        };
        assert!(command.render().is_err());

        let command = StructuredCommand::Fill {
            from: Location::ORIGIN.into(),
            to: Location::new(1, 1, 1).into(),
            block: "stone".into(),
            mode: None,
            handling: Some(BlockHandling::Replace),
            replace_filter: Some("dirt".into()),
        };
        assert_eq!(text(command), "fill 0 0 0 1 1 1 stone replace dirt");
    }

    #[test]
    fn summon_tags_need_position() {
        let command = StructuredCommand::Summon {
            entity: "creeper".into(),
            pos: None,
            mode: None,
            tags: vec![("powered".into(), true.into())],
        };
        assert!(command.render().is_err());

        let command = StructuredCommand::Summon {
            entity: "creeper".into(),
            pos: Some(Position::new(Coord::rel(0), Coord::rel(1), Coord::rel(0))),
            mode: None,
            tags: vec![("powered".into(), true.into())],
        };
        let rendered = command.render().unwrap();
        assert_eq!(rendered.text, "summon creeper ~0 ~1 ~0 {powered:true}");
        assert_eq!(rendered.coordinates, CoordinateMode::Relative);

        assert_eq!(text(StructuredCommand::summon("pig")), "summon pig");
    }

    #[test]
    fn text_commands_pass_through() {
        let command = Command::from("say hello world!");
        let rendered = command.render().unwrap();

        assert_eq!(rendered.text, "say hello world!");
        assert_eq!(rendered.coordinates, CoordinateMode::Absolute);

        let relative = Command::from("tp ~ ~10 ~").as_player("Alex");
        assert_eq!(
            relative.render().unwrap().coordinates,
            CoordinateMode::Relative
        );
        assert_eq!(relative.player(), Some("Alex"));
    }

    #[test]
    fn empty_text_is_rejected() {
        assert_eq!(
            Command::from("   ").render(),
            Err(ValidationError::EmptyName { what: "command" })
        );
    }
}
