//! Interactive prompt for the `craftlink` binary.
//!
//! Lines starting with `.` are client commands, anything else is sent to the
//! server as console text.
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

use thiserror::Error;

use crate::model::Location;

/// Possible inputs from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// `.exit`, or end of input
    Exit,
    /// `.ping`
    Ping,
    /// `.players [all]`
    Players { all: bool },
    /// `.get x y z`
    Get(Location),
    /// `.set x y z block_data`
    Set { location: Location, data: String },
    /// `.build <file> [x y z]`
    Build { path: PathBuf, origin: Location },
    /// `.clear <file> [x y z]`
    Clear { path: PathBuf, origin: Location },
    /// Console text
    Command(String),
    /// A blank line
    Empty,
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("unrecognized command '{0}'")]
    Unrecognized(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Prompt user for one line of input.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Input, PromptError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Input::Exit);
    }
    parse_input(&s)
}

pub fn parse_input(line: &str) -> Result<Input, PromptError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Input::Empty);
    }
    if !line.starts_with('.') {
        return Ok(Input::Command(line.to_string()));
    }

    let mut words = line.split_whitespace();
    let name = words.next().unwrap_or_default();
    let args = words.collect::<Vec<_>>();

    match (name, args.as_slice()) {
        (".exit", []) => Ok(Input::Exit),
        (".ping", []) => Ok(Input::Ping),
        (".players", []) => Ok(Input::Players { all: false }),
        (".players", ["all"]) => Ok(Input::Players { all: true }),
        (".players", _) => Err(PromptError::Usage(".players [all]")),
        (".get", [x, y, z]) => location(x, y, z)
            .map(Input::Get)
            .ok_or(PromptError::Usage(".get x y z")),
        (".get", _) => Err(PromptError::Usage(".get x y z")),
        (".set", [x, y, z, data @ ..]) if !data.is_empty() => location(x, y, z)
            .map(|location| Input::Set {
                location,
                data: data.join(" "),
            })
            .ok_or(PromptError::Usage(".set x y z block_data")),
        (".set", _) => Err(PromptError::Usage(".set x y z block_data")),
        (".build", rest) => file_at(rest)
            .map(|(path, origin)| Input::Build { path, origin })
            .ok_or(PromptError::Usage(".build <file> [x y z]")),
        (".clear", rest) => file_at(rest)
            .map(|(path, origin)| Input::Clear { path, origin })
            .ok_or(PromptError::Usage(".clear <file> [x y z]")),
        _ => Err(PromptError::Unrecognized(line.to_string())),
    }
}

fn location(x: &str, y: &str, z: &str) -> Option<Location> {
    Some(Location::new(x.parse().ok()?, y.parse().ok()?, z.parse().ok()?))
}

fn file_at(args: &[&str]) -> Option<(PathBuf, Location)> {
    match args {
        [path] => Some((PathBuf::from(*path), Location::ORIGIN)),
        [path, x, y, z] => Some((PathBuf::from(*path), location(x, y, z)?)),
        _ => None,
    }
}
