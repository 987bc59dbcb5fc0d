//! Grid positions and eight-way facing.
//!
//! Positions are immutable `Copy` values; movement produces a new position.
//! The grid is integer-addressed with one unit per tile, levels stacked on
//! the z axis.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// One of the eight compass directions an entity can face or move toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Facing {
    /// Movement delta for a single step in this direction, as `(dx, dy)`.
    /// North is negative y, matching screen-space grid convention.
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::NorthEast => (1, -1),
            Self::East => (1, 0),
            Self::SouthEast => (1, 1),
            Self::South => (0, 1),
            Self::SouthWest => (-1, 1),
            Self::West => (-1, 0),
            Self::NorthWest => (-1, -1),
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::North => Self::South,
            Self::NorthEast => Self::SouthWest,
            Self::East => Self::West,
            Self::SouthEast => Self::NorthWest,
            Self::South => Self::North,
            Self::SouthWest => Self::NorthEast,
            Self::West => Self::East,
            Self::NorthWest => Self::SouthEast,
        }
    }

    pub fn all() -> [Facing; 8] {
        [
            Self::North,
            Self::NorthEast,
            Self::East,
            Self::SouthEast,
            Self::South,
            Self::SouthWest,
            Self::West,
            Self::NorthWest,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::North => "north",
            Self::NorthEast => "north_east",
            Self::East => "east",
            Self::SouthEast => "south_east",
            Self::South => "south",
            Self::SouthWest => "south_west",
            Self::West => "west",
            Self::NorthWest => "north_west",
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Facing {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "north" | "n" => Ok(Self::North),
            "north_east" | "northeast" | "ne" => Ok(Self::NorthEast),
            "east" | "e" => Ok(Self::East),
            "south_east" | "southeast" | "se" => Ok(Self::SouthEast),
            "south" | "s" => Ok(Self::South),
            "south_west" | "southwest" | "sw" => Ok(Self::SouthWest),
            "west" | "w" => Ok(Self::West),
            "north_west" | "northwest" | "nw" => Ok(Self::NorthWest),
            other => Err(DomainError::parse(format!("unknown direction '{other}'"))),
        }
    }
}

/// An immutable grid position: tile coordinates, dungeon level, and facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub level: u8,
    pub facing: Facing,
}

impl Position {
    pub fn new(x: i32, y: i32, level: u8) -> Self {
        Self {
            x,
            y,
            level,
            facing: Facing::North,
        }
    }

    pub fn with_facing(mut self, facing: Facing) -> Self {
        self.facing = facing;
        self
    }

    /// One step in the given direction on the same level, facing that way.
    pub fn step(&self, direction: Facing) -> Self {
        let (dx, dy) = direction.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
            level: self.level,
            facing: direction,
        }
    }

    /// Squared Euclidean distance in tiles; `u64::MAX` across levels.
    pub fn distance_squared(&self, other: &Position) -> u64 {
        if self.level != other.level {
            return u64::MAX;
        }
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        (dx * dx + dy * dy) as u64
    }

    /// Manhattan distance in tiles; `u32::MAX` across levels.
    pub fn manhattan_distance(&self, other: &Position) -> u32 {
        if self.level != other.level {
            return u32::MAX;
        }
        (self.x.abs_diff(other.x) + self.y.abs_diff(other.y)) as u32
    }

    /// Chebyshev distance, the number of 8-way steps between two tiles.
    pub fn chebyshev_distance(&self, other: &Position) -> u32 {
        if self.level != other.level {
            return u32::MAX;
        }
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Whether `other` occupies the same tile (facing ignored).
    pub fn same_tile(&self, other: &Position) -> bool {
        self.x == other.x && self.y == other.y && self.level == other.level
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, L{})", self.x, self.y, self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_moves_and_faces() {
        let pos = Position::new(5, 5, 0);
        let moved = pos.step(Facing::NorthEast);
        assert_eq!((moved.x, moved.y), (6, 4));
        assert_eq!(moved.facing, Facing::NorthEast);
        // original untouched
        assert_eq!((pos.x, pos.y), (5, 5));
    }

    #[test]
    fn test_distance_squared() {
        let a = Position::new(0, 0, 0);
        let b = Position::new(3, 4, 0);
        assert_eq!(a.distance_squared(&b), 25);
    }

    #[test]
    fn test_cross_level_distances_are_infinite() {
        let a = Position::new(0, 0, 0);
        let b = Position::new(0, 0, 1);
        assert_eq!(a.distance_squared(&b), u64::MAX);
        assert_eq!(a.manhattan_distance(&b), u32::MAX);
    }

    #[test]
    fn test_direction_parse_aliases() {
        assert_eq!("NE".parse::<Facing>().expect("parses"), Facing::NorthEast);
        assert_eq!("south".parse::<Facing>().expect("parses"), Facing::South);
        assert!("up".parse::<Facing>().is_err());
    }

    #[test]
    fn test_opposite_round_trip() {
        for facing in Facing::all() {
            assert_eq!(facing.opposite().opposite(), facing);
        }
    }
}
