use std::{
    fmt,
    ops::{Add, Sub},
};

/// Integer block coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Location {
    pub const ORIGIN: Location = Location { x: 0, y: 0, z: 0 };

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Returns a new location shifted by the given deltas.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// `self + other`, or `None` if any axis overflows.
    pub fn checked_add(self, other: Location) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(other.x)?,
            self.y.checked_add(other.y)?,
            self.z.checked_add(other.z)?,
        ))
    }

    /// Vector from `other` to `self`.
    pub const fn difference(self, other: Location) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    /// Component-wise minimum.
    pub fn min(self, other: Location) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum.
    pub fn max(self, other: Location) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

impl Add for Location {
    type Output = Location;

    fn add(self, rhs: Location) -> Self::Output {
        self.offset(rhs.x, rhs.y, rhs.z)
    }
}

impl Sub for Location {
    type Output = Location;

    fn sub(self, rhs: Location) -> Self::Output {
        self.difference(rhs)
    }
}

impl From<(i32, i32, i32)> for Location {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self::new(x, y, z)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.x, self.y, self.z)
    }
}

/// Horizontal direction an entity looks towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facing {
    North,
    South,
    East,
    West,
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Facing::North => "north",
            Facing::South => "south",
            Facing::East => "east",
            Facing::West => "west",
        };
        f.write_str(s)
    }
}

/// Fractional position of an entity, with its view rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityLocation {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl EntityLocation {
    /// Block the entity is standing in.
    pub fn block(&self) -> Location {
        Location::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    /// Cardinal direction derived from `yaw`; yaw 0 looks south.
    pub fn facing(&self) -> Facing {
        let yaw = self.yaw;
        if yaw > -45.0 && yaw <= 45.0 {
            Facing::South
        } else if yaw > 45.0 && yaw <= 135.0 {
            Facing::West
        } else if yaw > -135.0 && yaw <= -45.0 {
            Facing::East
        } else {
            Facing::North
        }
    }
}
