use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Offsets of the cells an agent senses around itself (a radius-2 diamond).
pub const SENSING_FOOTPRINT: [(i32, i32); 13] = [
    (0, -2),
    (-1, -1),
    (0, -1),
    (1, -1),
    (-2, 0),
    (-1, 0),
    (0, 0),
    (1, 0),
    (2, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (0, 2),
];

/// A grid cell. `y` grows downwards, as in the world the agents live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub fn manhattan(self, other: Cell) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn within_range(self, other: Cell, range: i32) -> bool {
        self.manhattan(other) <= range
    }

    pub fn axis_delta(self, other: Cell, axis: Axis) -> i32 {
        match axis {
            Axis::X => (self.x - other.x).abs(),
            Axis::Y => (self.y - other.y).abs(),
        }
    }

    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        self.offset(dx, dy)
    }

    /// Cells covered by the sensing footprint centred on `self`.
    pub fn footprint(self) -> impl Iterator<Item = Cell> {
        SENSING_FOOTPRINT
            .iter()
            .map(move |(dx, dy)| self.offset(*dx, *dy))
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl FromStr for Cell {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.trim().split(',').collect();
        if parts.len() != 2 {
            return Err("cell must be formatted as x,y".into());
        }
        let x = parts[0]
            .trim()
            .parse::<i32>()
            .map_err(|_| "x must be an integer")?;
        let y = parts[1]
            .trim()
            .parse::<i32>()
            .map_err(|_| "y must be an integer")?;
        Ok(Cell { x, y })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    #[default]
    Y,
}

impl Axis {
    pub const fn flipped(self) -> Self {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
        }
    }

    pub const fn action_name(self) -> &'static str {
        match self {
            Direction::North => "MoveNorth",
            Direction::East => "MoveEast",
            Direction::South => "MoveSouth",
            Direction::West => "MoveWest",
        }
    }

    /// First step from `from` towards `to`, closing the x gap before the y gap.
    pub fn towards(from: Cell, to: Cell) -> Option<Direction> {
        if to.x > from.x {
            Some(Direction::East)
        } else if to.x < from.x {
            Some(Direction::West)
        } else if to.y > from.y {
            Some(Direction::South)
        } else if to.y < from.y {
            Some(Direction::North)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footprint_is_a_thirteen_cell_diamond() {
        let centre = Cell::new(5, 5);
        let cells: Vec<_> = centre.footprint().collect();
        assert_eq!(cells.len(), 13);
        assert!(cells.iter().all(|c| c.manhattan(centre) <= 2));
        assert!(!cells.contains(&Cell::new(7, 7)));
    }

    #[test]
    fn towards_closes_x_first() {
        let from = Cell::new(0, 0);
        assert_eq!(
            Direction::towards(from, Cell::new(2, 3)),
            Some(Direction::East)
        );
        assert_eq!(
            Direction::towards(from, Cell::new(0, -3)),
            Some(Direction::North)
        );
        assert_eq!(Direction::towards(from, from), None);
    }

    #[test]
    fn parses_cell_args() {
        assert_eq!("3, -4".parse::<Cell>(), Ok(Cell::new(3, -4)));
        assert!("3".parse::<Cell>().is_err());
    }
}
