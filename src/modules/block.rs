use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::modules::grid::Cell;

pub type BlockId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase", try_from = "KindRepr")]
pub enum Shape {
    Square,
    Triangle,
    Circle,
}

impl Shape {
    pub const fn label(self) -> &'static str {
        match self {
            Shape::Square => "square",
            Shape::Triangle => "triangle",
            Shape::Circle => "circle",
        }
    }

    /// Numeric shape codes used by the world's visualization layer.
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Shape::Square),
            1 => Some(Shape::Triangle),
            2 => Some(Shape::Circle),
            _ => None,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Shape {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_lowercase();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Shape::from_code(code).ok_or(());
        }
        match trimmed.as_str() {
            "square" => Ok(Shape::Square),
            "triangle" => Ok(Shape::Triangle),
            "circle" => Ok(Shape::Circle),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Colour {
    Red,
    Green,
    Blue,
    Yellow,
    Purple,
    Orange,
}

impl Colour {
    pub const fn label(self) -> &'static str {
        match self {
            Colour::Red => "red",
            Colour::Green => "green",
            Colour::Blue => "blue",
            Colour::Yellow => "yellow",
            Colour::Purple => "purple",
            Colour::Orange => "orange",
        }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Colour {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "red" => Ok(Colour::Red),
            "green" => Ok(Colour::Green),
            "blue" => Ok(Colour::Blue),
            "yellow" => Ok(Colour::Yellow),
            "purple" => Ok(Colour::Purple),
            "orange" => Ok(Colour::Orange),
            _ => Err(()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KindRepr {
    Code(u8),
    Name(String),
}

impl TryFrom<KindRepr> for Shape {
    type Error = String;

    fn try_from(repr: KindRepr) -> Result<Self, Self::Error> {
        match repr {
            KindRepr::Code(code) => {
                Shape::from_code(code).ok_or_else(|| format!("unknown shape code {}", code))
            }
            KindRepr::Name(name) => {
                name.parse::<Shape>().map_err(|_| format!("unknown shape '{}'", name))
            }
        }
    }
}

/// Which of {shape, colour} are known. Bit 0 is shape, bit 1 is colour.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeMask(u8);

impl KnowledgeMask {
    pub const NONE: KnowledgeMask = KnowledgeMask(0);
    pub const SHAPE: KnowledgeMask = KnowledgeMask(1);
    pub const COLOUR: KnowledgeMask = KnowledgeMask(2);
    pub const FULL: KnowledgeMask = KnowledgeMask(3);

    pub const fn from_bits(bits: u8) -> Self {
        KnowledgeMask(bits & 3)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn of(shape_known: bool, colour_known: bool) -> Self {
        KnowledgeMask((shape_known as u8) | ((colour_known as u8) << 1))
    }

    pub const fn contains(self, other: KnowledgeMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_full(self) -> bool {
        self.0 == 3
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for KnowledgeMask {
    type Output = KnowledgeMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        KnowledgeMask(self.0 | rhs.0)
    }
}

impl fmt::Display for KnowledgeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sensed entity exactly as an agent perceived it. Also the payload unit of
/// `BlockFound` messages.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensedObject {
    pub id: BlockId,
    pub location: Cell,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Shape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colour: Option<Colour>,
    #[serde(default = "default_collectable")]
    pub collectable: bool,
}

fn default_collectable() -> bool {
    true
}

impl SensedObject {
    pub fn knowledge(&self) -> KnowledgeMask {
        KnowledgeMask::of(self.shape.is_some(), self.colour.is_some())
    }

    pub fn is_ghost(&self) -> bool {
        !self.collectable
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub location: Cell,
    pub shape: Option<Shape>,
    pub colour: Option<Colour>,
    pub collectable: bool,
}

impl Block {
    pub fn knowledge(&self) -> KnowledgeMask {
        KnowledgeMask::of(self.shape.is_some(), self.colour.is_some())
    }

    /// Monotonic merge: unknown fields in `sensed` never erase known ones.
    /// Returns true when anything changed.
    pub fn merge(&mut self, sensed: &SensedObject) -> bool {
        let mut changed = false;
        if self.location != sensed.location {
            self.location = sensed.location;
            changed = true;
        }
        if let Some(shape) = sensed.shape {
            if self.shape != Some(shape) {
                self.shape = Some(shape);
                changed = true;
            }
        }
        if let Some(colour) = sensed.colour {
            if self.colour != Some(colour) {
                self.colour = Some(colour);
                changed = true;
            }
        }
        changed
    }
}

impl From<&SensedObject> for Block {
    fn from(sensed: &SensedObject) -> Self {
        Block {
            id: sensed.id.clone(),
            location: sensed.location,
            shape: sensed.shape,
            colour: sensed.colour,
            collectable: sensed.collectable,
        }
    }
}
