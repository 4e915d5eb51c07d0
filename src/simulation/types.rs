//! Core types for the farm simulation
//!
//! Identifiers, the 2D position type used for every map coordinate (map pixel
//! space, y pointing down) and the handful of enums shared across modules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimId(pub usize);

/// A wrapper type for vehicle IDs (tractors and harvesters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub SimId);

/// A wrapper type for implement IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImplementId(pub SimId);

/// A wrapper type for sell point IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SellPointId(pub SimId);

/// Paddocks are identified by their map number ("Paddock 3")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PaddockId(pub u32);

impl fmt::Display for PaddockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Paddock {}", self.0)
    }
}

/// A 2D position in map pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `degrees` (0 = +x, 90 = +y)
    pub fn from_heading(degrees: f32) -> Self {
        let radians = degrees.to_radians();
        Self::new(radians.cos(), radians.sin())
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn dot(&self, other: &Position) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn lerp(&self, other: &Position, t: f32) -> Position {
        Position {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Angle in degrees from this position to another
    pub fn angle_to(&self, other: &Position) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        if dx == 0.0 && dy == 0.0 {
            0.0
        } else {
            dy.atan2(dx).to_degrees()
        }
    }

    /// Rotate a local offset (x forward, y to the right) into world space
    pub fn rotated(&self, degrees: f32) -> Position {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Position {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    /// Nearest integer pixel
    pub fn rounded(&self) -> (i32, i32) {
        (self.x.round() as i32, self.y.round() as i32)
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Position {
    type Output = Position;

    fn mul(self, rhs: f32) -> Position {
        Position::new(self.x * rhs, self.y * rhs)
    }
}

impl From<(f32, f32)> for Position {
    fn from((x, y): (f32, f32)) -> Self {
        Position::new(x, y)
    }
}

/// Category of an implement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolType {
    Cultivator,
    Seeder,
    Spreader,
    Sprayer,
    Trailer,
}

impl ToolType {
    /// Whether the implement carries material at all
    pub fn has_storage(self) -> bool {
        !matches!(self, ToolType::Cultivator)
    }

    /// Whether the implement paints the field while working
    pub fn paints(self) -> bool {
        !matches!(self, ToolType::Trailer)
    }

    /// Whether `fill_type` may be loaded into this kind of implement
    pub fn accepts(self, fill_type: FillType) -> bool {
        match self {
            ToolType::Cultivator => false,
            ToolType::Seeder | ToolType::Trailer => fill_type.is_crop(),
            ToolType::Spreader => matches!(fill_type, FillType::Lime | FillType::Super | FillType::Urea),
            ToolType::Sprayer => fill_type == FillType::Herbicide,
        }
    }

    /// Verb shown while the implement is working
    pub fn working_status(self) -> &'static str {
        match self {
            ToolType::Cultivator => "Cultivating...",
            ToolType::Seeder => "Seeding...",
            ToolType::Spreader => "Spreading...",
            ToolType::Sprayer => "Spraying...",
            ToolType::Trailer => "Hauling...",
        }
    }
}

/// Material held by a vehicle, implement or silo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FillType {
    Wheat,
    Barley,
    Canola,
    Oats,
    Lime,
    Super,
    Urea,
    Herbicide,
}

impl FillType {
    pub const CROPS: [FillType; 4] = [FillType::Wheat, FillType::Barley, FillType::Canola, FillType::Oats];

    pub fn is_crop(self) -> bool {
        Self::CROPS.contains(&self)
    }

    /// Relative yield of a crop; non-crops yield nothing
    pub fn crop_yield_factor(self) -> f32 {
        match self {
            FillType::Wheat => 1.0,
            FillType::Barley => 1.1,
            FillType::Canola => 0.7,
            FillType::Oats => 0.9,
            _ => 0.0,
        }
    }
}

/// Tolerance used when comparing fill amounts
pub const FILL_EPSILON: f32 = 1e-4;
