//! Producers of block working sets.
//!
//! Anything that can list the non-air cells of a bounded region (a schematic
//! reader, a procedural generator, a text file) implements [`BlockSource`];
//! [`blocks_from_source`] anchors those cells at an origin so they can be
//! handed to a batch.
use std::{collections::BTreeMap, fs, io, path::Path};

use log::debug;
use thiserror::Error;

use crate::{
    error::ValidationError,
    model::{Block, BlockData, Location},
    protocol::validate_blocks,
};

/// One cell of a source region, relative to the region's own origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub offset: Location,
    /// Namespaced block id such as `minecraft:oak_stairs`.
    pub block: String,
    pub properties: BTreeMap<String, String>,
}

pub trait BlockSource {
    /// Every non-air cell of the region.
    fn cells(&self) -> Box<dyn Iterator<Item = Cell> + '_>;
}

/// Anchors every cell of `source` at `origin`, skipping any air it yields.
pub fn blocks_from_source(
    source: &dyn BlockSource,
    origin: Location,
) -> Result<Vec<Block>, ValidationError> {
    let blocks = source
        .cells()
        .map(|cell| {
            let at = origin
                .checked_add(cell.offset)
                .ok_or_else(|| ValidationError::InvalidField {
                    field: "location",
                    reason: format!("offset {} from {origin} is out of range", cell.offset),
                })?;
            Ok(Block::builder(&cell.block, at).states(cell.properties).build())
        })
        .filter(|block| !matches!(block, Ok(b) if b.is_air()))
        .collect::<Result<Vec<_>, ValidationError>>()?;

    validate_blocks(&blocks)?;
    debug!("source produced {} blocks at {origin}", blocks.len());
    Ok(blocks)
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read block list: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Block list in plain text, one `x y z block_data` cell per line.
///
/// Blank lines and lines starting with `#` are ignored:
///
/// ```text
/// # a small pillar
/// 0 0 0 minecraft:stone
/// 0 1 0 minecraft:oak_stairs[facing=east,half=bottom]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockListFile {
    cells: Vec<Cell>,
}

impl BlockListFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn parse(text: &str) -> Result<Self, SourceError> {
        let mut cells = Vec::new();

        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fail = |reason: String| SourceError::Parse { line: i + 1, reason };
            let parts = line.split_whitespace().collect::<Vec<_>>();
            let [x, y, z, data @ ..] = parts.as_slice() else {
                return Err(fail("expected 'x y z block_data'".to_string()));
            };
            if data.is_empty() {
                return Err(fail("missing block data".to_string()));
            }

            let coord = |part: &str| {
                part.parse::<i32>()
                    .map_err(|_| fail(format!("'{part}' is not a coordinate")))
            };
            let offset = Location::new(coord(*x)?, coord(*y)?, coord(*z)?);
            let data = BlockData::parse(&data.join(" ")).map_err(|e| fail(e.to_string()))?;

            cells.push(Cell {
                offset,
                block: data.key.to_string(),
                properties: data.state,
            });
        }

        Ok(Self { cells })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl BlockSource for BlockListFile {
    fn cells(&self) -> Box<dyn Iterator<Item = Cell> + '_> {
        Box::new(self.cells.iter().cloned())
    }
}
