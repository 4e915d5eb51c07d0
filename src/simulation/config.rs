//! Typed configuration for the simulation
//!
//! Tuning constants, the map (paddocks, roads, sell points, shed) and the
//! equipment catalogue. Everything deserialises from JSON and is validated
//! once at load time so the simulation never has to re-check it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::geometry;
use super::paddock::PaddockState;
use super::types::{FillType, Position, ToolType};

/// How far a gate may sit from its paddock boundary, in pixels
pub const GATE_TOLERANCE: f32 = 15.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("paddock {0} boundary needs at least 3 vertices")]
    BoundaryTooSmall(u32),
    #[error("paddock {paddock} gate is {distance:.1}px from its boundary")]
    GateOffBoundary { paddock: u32, distance: f32 },
    #[error("duplicate paddock number {0}")]
    DuplicatePaddock(u32),
    #[error("road {0:?} needs at least 2 points")]
    RoadTooShort(String),
    #[error("{0} must be positive")]
    NotPositive(&'static str),
    #[error("{0} must not be negative")]
    Negative(&'static str),
    #[error("map may have at most one silo, found {0}")]
    SiloCount(usize),
    #[error("{0} {1} has an invalid working width")]
    InvalidWidth(&'static str, String),
    #[error("{0} {1} has a negative capacity")]
    InvalidCapacity(&'static str, String),
}

/// Fill moved per painted pixel, per kind of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FillRates {
    pub seeder: f32,
    pub spreader: f32,
    pub sprayer: f32,
    pub harvester: f32,
}

impl Default for FillRates {
    fn default() -> Self {
        Self {
            seeder: 0.002,
            spreader: 0.003,
            sprayer: 0.001,
            harvester: 0.004,
        }
    }
}

impl FillRates {
    /// Per-pixel rate for an implement type, `None` when it does not consume
    pub fn for_tool(&self, tool_type: ToolType) -> Option<f32> {
        match tool_type {
            ToolType::Seeder => Some(self.seeder),
            ToolType::Spreader => Some(self.spreader),
            ToolType::Sprayer => Some(self.sprayer),
            ToolType::Cultivator | ToolType::Trailer => None,
        }
    }
}

/// Simulation tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Physics sub-steps per simulated second
    pub sim_rate: f32,
    /// Maximum vehicle turn rate in degrees per second
    pub turn_rate: f32,
    /// Speed while working a paddock, px/s
    pub working_speed: f32,
    /// Speed on transport legs, px/s
    pub transport_speed: f32,
    /// Distance at which a waypoint counts as reached while working
    pub pop_radius: f32,
    /// Pop radius multiplier on transport legs
    pub transport_pop_multiplier: f32,
    /// Gap between the vehicle hitch and the implement hitch
    pub hitch_gap: f32,
    /// Proportional gain of the implement's chase of the vehicle hitch
    pub chase_gain: f32,
    /// Minimum footprint movement before the paint mask is resampled
    pub paint_move_threshold: f32,
    /// Length of the painted footprint along the heading
    pub footprint_length: f32,
    /// Headland laps around each paddock
    pub headland_laps: usize,
    /// Visit run-lines in skip-row order
    pub skip_rows: bool,
    /// Shrink the innermost lap instead of lap 1 for the run-line region
    pub collision_from_innermost_lap: bool,
    /// Fill moved from header to trailer per unload interval
    pub unload_rate: f32,
    /// Seconds between header-to-trailer transfers
    pub unload_interval: f32,
    /// Fill moved from trailer to silo per interval
    pub silo_unload_rate: f32,
    /// Seconds between trailer-to-silo transfers
    pub silo_unload_interval: f32,
    /// Fuel burnt per pixel travelled
    pub fuel_per_px: f32,
    pub fill_rates: FillRates,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sim_rate: 60.0,
            turn_rate: 240.0,
            working_speed: 30.0,
            transport_speed: 90.0,
            pop_radius: 3.0,
            transport_pop_multiplier: 3.0,
            hitch_gap: 5.0,
            chase_gain: 0.08,
            paint_move_threshold: 2.0,
            footprint_length: 6.0,
            headland_laps: 2,
            skip_rows: true,
            collision_from_innermost_lap: false,
            unload_rate: 2.0,
            unload_interval: 0.25,
            silo_unload_rate: 4.0,
            silo_unload_interval: 0.25,
            fuel_per_px: 0.001,
            fill_rates: FillRates::default(),
        }
    }
}

impl SimConfig {
    pub fn sub_step(&self) -> f32 {
        1.0 / self.sim_rate
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positives = [
            ("sim_rate", self.sim_rate),
            ("turn_rate", self.turn_rate),
            ("working_speed", self.working_speed),
            ("transport_speed", self.transport_speed),
            ("pop_radius", self.pop_radius),
            ("transport_pop_multiplier", self.transport_pop_multiplier),
            ("footprint_length", self.footprint_length),
            ("unload_rate", self.unload_rate),
            ("unload_interval", self.unload_interval),
            ("silo_unload_rate", self.silo_unload_rate),
            ("silo_unload_interval", self.silo_unload_interval),
            ("chase_gain", self.chase_gain),
        ];
        for (name, value) in positives {
            if value <= 0.0 || !value.is_finite() {
                return Err(ConfigError::NotPositive(name));
            }
        }
        let non_negatives = [
            ("hitch_gap", self.hitch_gap),
            ("paint_move_threshold", self.paint_move_threshold),
            ("fuel_per_px", self.fuel_per_px),
            ("fill_rates.seeder", self.fill_rates.seeder),
            ("fill_rates.spreader", self.fill_rates.spreader),
            ("fill_rates.sprayer", self.fill_rates.sprayer),
            ("fill_rates.harvester", self.fill_rates.harvester),
        ];
        for (name, value) in non_negatives {
            if value < 0.0 || !value.is_finite() {
                return Err(ConfigError::Negative(name));
            }
        }
        if self.headland_laps == 0 {
            return Err(ConfigError::NotPositive("headland_laps"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaddockConfig {
    pub number: u32,
    pub boundary: Vec<Position>,
    pub gate: Position,
    #[serde(default)]
    pub hectares: f32,
    #[serde(default)]
    pub state: Option<PaddockState>,
    #[serde(default)]
    pub lime_years: u8,
    #[serde(default)]
    pub super_spread: bool,
    #[serde(default)]
    pub urea_spread: bool,
    #[serde(default)]
    pub weeds: u8,
    #[serde(default)]
    pub crop: Option<FillType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadConfig {
    pub name: String,
    pub points: Vec<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellPointConfig {
    pub name: String,
    pub position: Position,
    #[serde(default)]
    pub silo: bool,
}

/// The static map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfig {
    pub name: String,
    pub shed: Position,
    pub paddocks: Vec<PaddockConfig>,
    #[serde(default)]
    pub roads: Vec<RoadConfig>,
    #[serde(default)]
    pub sell_points: Vec<SellPointConfig>,
}

impl MapConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut numbers = std::collections::HashSet::new();
        for paddock in &self.paddocks {
            if !numbers.insert(paddock.number) {
                return Err(ConfigError::DuplicatePaddock(paddock.number));
            }
            if paddock.boundary.len() < 3 {
                return Err(ConfigError::BoundaryTooSmall(paddock.number));
            }
            let distance = geometry::distance_to_polygon(&paddock.gate, &paddock.boundary);
            if distance > GATE_TOLERANCE {
                return Err(ConfigError::GateOffBoundary {
                    paddock: paddock.number,
                    distance,
                });
            }
        }
        for road in &self.roads {
            if road.points.len() < 2 {
                return Err(ConfigError::RoadTooShort(road.name.clone()));
            }
        }
        let silos = self.sell_points.iter().filter(|s| s.silo).count();
        if silos > 1 {
            return Err(ConfigError::SiloCount(silos));
        }
        Ok(())
    }
}

/// Static description of a towing or self-propelled vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum VehicleConfig {
    Tractor {
        brand: String,
        model: String,
        max_fuel: f32,
        /// Hitch point in local space (x forward, y right)
        hitch: Position,
    },
    Harvester {
        brand: String,
        model: String,
        max_fuel: f32,
        working_width: f32,
        capacity: f32,
        /// Distance from the machine's centre to the middle of its header front
        header_offset: f32,
    },
}

impl VehicleConfig {
    pub fn name(&self) -> String {
        match self {
            VehicleConfig::Tractor { brand, model, .. } | VehicleConfig::Harvester { brand, model, .. } => {
                format!("{} {}", brand, model)
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            VehicleConfig::Tractor { max_fuel, .. } => {
                if *max_fuel <= 0.0 {
                    return Err(ConfigError::NotPositive("max_fuel"));
                }
            }
            VehicleConfig::Harvester {
                max_fuel,
                working_width,
                capacity,
                ..
            } => {
                if *max_fuel <= 0.0 {
                    return Err(ConfigError::NotPositive("max_fuel"));
                }
                if *working_width < 1.0 {
                    return Err(ConfigError::InvalidWidth("harvester", self.name()));
                }
                if *capacity < 0.0 {
                    return Err(ConfigError::InvalidCapacity("harvester", self.name()));
                }
            }
        }
        Ok(())
    }
}

/// Static description of a towed implement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementConfig {
    pub tool_type: ToolType,
    pub brand: String,
    pub model: String,
    pub working_width: f32,
    #[serde(default)]
    pub capacity: f32,
    /// Distance from the implement's centre forward to its hitch
    pub hitch_length: f32,
}

impl ImplementConfig {
    pub fn name(&self) -> String {
        format!("{} {}", self.brand, self.model)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool_type != ToolType::Trailer && self.working_width < 1.0 {
            return Err(ConfigError::InvalidWidth("implement", self.name()));
        }
        if self.capacity < 0.0 {
            return Err(ConfigError::InvalidCapacity("implement", self.name()));
        }
        if self.hitch_length <= 0.0 {
            return Err(ConfigError::NotPositive("hitch_length"));
        }
        Ok(())
    }
}

/// Equipment present in the shed at load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquipmentConfig {
    #[serde(default)]
    pub vehicles: Vec<VehicleConfig>,
    #[serde(default)]
    pub implements: Vec<ImplementConfig>,
}

impl EquipmentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vehicles.iter().try_for_each(VehicleConfig::validate)?;
        self.implements.iter().try_for_each(ImplementConfig::validate)
    }
}

fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path: display, source })
}

impl MapConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let map: MapConfig = load_json(path.as_ref())?;
        map.validate()?;
        Ok(map)
    }
}

impl EquipmentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let equipment: EquipmentConfig = load_json(path.as_ref())?;
        equipment.validate()?;
        Ok(equipment)
    }
}

impl SimConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: SimConfig = load_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }
}
