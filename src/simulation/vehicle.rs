//! Vehicle movement logic for the farm simulation
//!
//! Tractors and harvesters follow their waypoint list one sub-step at a time.
//! Task bookkeeping (stages, painting, unloading) lives in the world; this
//! module only knows how to drive.

use std::collections::VecDeque;

use log::{debug, warn};

use super::config::{SimConfig, VehicleConfig};
use super::destination::{Destination, DestinationRef};
use super::geometry::angle_difference;
use super::hitch::Hitch;
use super::job::Job;
use super::paint::PaintSampler;
use super::stage::{Stage, TaskKind};
use super::types::{FillType, ImplementId, Position, VehicleId, FILL_EPSILON};
use super::unload::{HeaderUnload, TrailerPhase};

/// Result of a vehicle drive step indicating what the world should do next
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleUpdateResult {
    Continue,   // Still following the current waypoint list
    PathEnded,  // Waypoint list exhausted
    OutOfFuel,  // Stalled until refuelled
}

/// A tractor or self-propelled harvester
#[derive(Debug, Clone)]
pub struct SimVehicle {
    pub id: VehicleId,
    pub config: VehicleConfig,
    pub position: Position,
    /// Heading in degrees, 0 = +x, 90 = +y
    pub rotation: f32,
    pub velocity: Position,
    pub active: bool,
    pub stage: Stage,
    pub task: Option<TaskKind>,
    pub destination: Option<Destination>,
    /// Destination loaded from a snapshot, resolved lazily
    pub pending_destination: Option<DestinationRef>,
    pub waypoints: VecDeque<Position>,
    pub implement: Option<ImplementId>,
    pub fuel: f32,
    /// Grain tank (harvesters only)
    pub fill: f32,
    pub fill_type: Option<FillType>,
    pub status: String,
    /// The job that produced the current leg
    pub job: Option<Job>,
    pub paint: PaintSampler,
    pub header_unload: HeaderUnload,
    pub trailer_phase: TrailerPhase,
    /// Completed trailer holds in the current task
    pub wait_cycles: u32,
    /// Harvester this tractor is assigned to unload
    pub unload_target: Option<VehicleId>,
    /// Route from the gate to the docked harvester, replayed backwards to leave
    pub docking_path: Vec<Position>,
    warned_unresolved: bool,
}

impl SimVehicle {
    pub fn new(id: VehicleId, config: VehicleConfig, position: Position) -> Self {
        let fuel = config.max_fuel();
        Self {
            id,
            config,
            position,
            rotation: 0.0,
            velocity: Position::default(),
            active: false,
            stage: Stage::TravellingTo,
            task: None,
            destination: None,
            pending_destination: None,
            waypoints: VecDeque::new(),
            implement: None,
            fuel,
            fill: 0.0,
            fill_type: None,
            status: "Idle".to_string(),
            job: None,
            paint: PaintSampler::default(),
            header_unload: HeaderUnload::Normal,
            trailer_phase: TrailerPhase::ToField,
            wait_cycles: 0,
            unload_target: None,
            docking_path: Vec::new(),
            warned_unresolved: false,
        }
    }

    pub fn name(&self) -> String {
        self.config.name()
    }

    pub fn is_harvester(&self) -> bool {
        matches!(self.config, VehicleConfig::Harvester { .. })
    }

    /// Rear hitch; harvesters have none
    pub fn hitch(&self) -> Option<Hitch> {
        match &self.config {
            VehicleConfig::Tractor { hitch, .. } => Some(Hitch::new(*hitch)),
            VehicleConfig::Harvester { .. } => None,
        }
    }

    pub fn hitch_position(&self) -> Option<Position> {
        self.hitch().map(|h| h.world(self.position, self.rotation))
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    pub fn heading(&self) -> Position {
        Position::from_heading(self.rotation)
    }

    /// Centre of the header front (harvesters only)
    pub fn header_center(&self) -> Option<Position> {
        match &self.config {
            VehicleConfig::Harvester { header_offset, .. } => Some(self.position + self.heading() * *header_offset),
            VehicleConfig::Tractor { .. } => None,
        }
    }

    pub fn capacity(&self) -> f32 {
        self.config.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.fill >= self.capacity() - FILL_EPSILON
    }

    /// Replace the waypoint list, dropping whatever was left of the old one
    pub fn set_path(&mut self, path: Vec<Position>) {
        self.waypoints = path.into();
    }

    pub fn set_status(&mut self, status: impl Into<String>) -> bool {
        let status = status.into();
        if self.status == status {
            return false;
        }
        debug!("{} ({:?}): {}", self.name(), self.id, status);
        self.status = status;
        true
    }

    /// Forget everything tied to the current task
    pub fn clear_task_state(&mut self) {
        self.waypoints.clear();
        self.job = None;
        self.paint.reset();
        self.header_unload = HeaderUnload::Normal;
        self.trailer_phase = TrailerPhase::ToField;
        self.wait_cycles = 0;
        self.unload_target = None;
        self.docking_path.clear();
        self.warned_unresolved = false;
    }

    pub fn refuel(&mut self) {
        self.fuel = self.config.max_fuel();
    }

    /// Warn once per task about a destination that cannot be resolved yet
    pub fn warn_unresolved(&mut self) {
        if !self.warned_unresolved {
            warn!("{} is waiting for its destination to load", self.name());
            self.warned_unresolved = true;
        }
    }

    /// Hold position for this sub-step
    pub fn halt(&mut self) {
        self.velocity = Position::default();
    }

    /// Advance along the waypoint list by one sub-step.
    ///
    /// Reached waypoints (within the pop radius) are dropped first. The
    /// heading turns toward the next waypoint at a capped rate and the
    /// vehicle slows down while the turn is sharp, so it never orbits a
    /// waypoint it cannot turn into.
    pub fn drive(&mut self, step: f32, config: &SimConfig) -> VehicleUpdateResult {
        let transport = self.stage.is_transport();
        let pop_radius = if transport {
            config.pop_radius * config.transport_pop_multiplier
        } else {
            config.pop_radius
        };

        while let Some(target) = self.waypoints.front() {
            if self.position.distance(target) <= pop_radius {
                self.waypoints.pop_front();
            } else {
                break;
            }
        }
        let Some(target) = self.waypoints.front().copied() else {
            self.halt();
            return VehicleUpdateResult::PathEnded;
        };

        if self.fuel <= 0.0 {
            self.halt();
            return VehicleUpdateResult::OutOfFuel;
        }

        let desired = self.position.angle_to(&target);
        let difference = angle_difference(self.rotation, desired);
        let max_turn = config.turn_rate * step;
        self.rotation = (self.rotation + difference.clamp(-max_turn, max_turn)).rem_euclid(360.0);

        let remaining = angle_difference(self.rotation, desired);
        let profile = if transport {
            config.transport_speed
        } else {
            config.working_speed
        };
        let speed = if remaining.abs() >= 90.0 {
            0.0
        } else {
            profile * remaining.to_radians().cos()
        };

        let distance = speed * step;
        self.velocity = self.heading() * speed;
        self.position = self.position + self.heading() * distance;
        self.fuel = (self.fuel - distance * config.fuel_per_px).max(0.0);
        VehicleUpdateResult::Continue
    }
}

impl VehicleConfig {
    pub fn max_fuel(&self) -> f32 {
        match self {
            VehicleConfig::Tractor { max_fuel, .. } | VehicleConfig::Harvester { max_fuel, .. } => *max_fuel,
        }
    }

    /// Grain tank capacity, zero for tractors
    pub fn capacity(&self) -> f32 {
        match self {
            VehicleConfig::Harvester { capacity, .. } => *capacity,
            VehicleConfig::Tractor { .. } => 0.0,
        }
    }

    pub fn working_width(&self) -> Option<f32> {
        match self {
            VehicleConfig::Harvester { working_width, .. } => Some(*working_width),
            VehicleConfig::Tractor { .. } => None,
        }
    }
}
