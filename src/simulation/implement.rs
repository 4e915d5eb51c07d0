//! Towed implements and their hitch follow behaviour
//!
//! Implements never follow a path themselves. Every sub-step the towing
//! vehicle hands over its hitch position and the implement re-aims at it,
//! then snaps back onto the hitch.

use log::warn;

use super::config::{ImplementConfig, SimConfig};
use super::error::SimError;
use super::geometry::angle_difference;
use super::hitch::Hitch;
use super::types::{FillType, ImplementId, Position, ToolType, VehicleId, FILL_EPSILON};

#[derive(Debug, Clone)]
pub struct SimImplement {
    pub id: ImplementId,
    pub config: ImplementConfig,
    /// Centre of the implement
    pub position: Position,
    pub rotation: f32,
    pub fill: f32,
    pub fill_type: Option<FillType>,
    /// Vehicle currently towing this implement (non-owning)
    pub attached_to: Option<VehicleId>,
    /// Visual pose flag, lowered while working
    pub working: bool,
}

impl SimImplement {
    pub fn new(id: ImplementId, config: ImplementConfig, position: Position) -> Self {
        Self {
            id,
            config,
            position,
            rotation: 0.0,
            fill: 0.0,
            fill_type: None,
            attached_to: None,
            working: false,
        }
    }

    pub fn tool_type(&self) -> ToolType {
        self.config.tool_type
    }

    pub fn working_width(&self) -> f32 {
        self.config.working_width
    }

    pub fn capacity(&self) -> f32 {
        self.config.capacity
    }

    pub fn name(&self) -> String {
        self.config.name()
    }

    pub fn remaining_capacity(&self) -> f32 {
        (self.capacity() - self.fill).max(0.0)
    }

    pub fn is_full(&self) -> bool {
        self.fill >= self.capacity() - FILL_EPSILON
    }

    pub fn is_empty(&self) -> bool {
        self.fill <= FILL_EPSILON
    }

    /// The implement's own hitch, at the front of its drawbar
    pub fn hitch(&self) -> Hitch {
        Hitch::inline(self.config.hitch_length)
    }

    /// Load material. Rejects fill types the implement cannot hold and
    /// amounts outside its capacity without touching the current fill.
    pub fn set_fill(&mut self, fill_type: FillType, amount: f32) -> Result<(), SimError> {
        let tool_type = self.tool_type();
        if !tool_type.has_storage() || !tool_type.accepts(fill_type) {
            log::error!("{} ({:?}) cannot hold {:?}", self.name(), tool_type, fill_type);
            return Err(SimError::InvalidFill { tool_type, fill_type });
        }
        if amount < 0.0 || amount > self.capacity() + FILL_EPSILON {
            warn!(
                "{} cannot hold {:.2} of {:?} (capacity {:.2})",
                self.name(),
                amount,
                fill_type,
                self.capacity()
            );
            return Err(SimError::InvalidFill { tool_type, fill_type });
        }
        self.fill = amount.min(self.capacity());
        self.fill_type = (amount > 0.0).then_some(fill_type);
        Ok(())
    }

    /// Re-aim at the towing vehicle's hitch and snap onto it.
    ///
    /// The turn is proportional to the vehicle's speed, so a stationary
    /// vehicle leaves the implement's rotation untouched. The resulting pose
    /// depends only on the vehicle's current hitch and heading and on the
    /// implement's previous rotation.
    pub fn follow(
        &mut self,
        vehicle_hitch: Position,
        vehicle_rotation: f32,
        vehicle_speed: f32,
        step: f32,
        config: &SimConfig,
    ) {
        let desired = self.position.angle_to(&vehicle_hitch);
        let gain = (config.chase_gain * vehicle_speed.abs() * step).clamp(0.0, 1.0);
        self.rotation = (self.rotation + angle_difference(self.rotation, desired) * gain).rem_euclid(360.0);
        self.snap_to(vehicle_hitch, vehicle_rotation, config.hitch_gap);
    }

    /// Place the implement so its hitch sits `gap` behind the vehicle hitch
    pub fn snap_to(&mut self, vehicle_hitch: Position, vehicle_rotation: f32, gap: f32) {
        let hitch_world = vehicle_hitch - Position::from_heading(vehicle_rotation) * gap;
        self.position = hitch_world - Position::from_heading(self.rotation) * self.config.hitch_length;
    }

    /// Line the implement up straight behind a vehicle, used when attaching
    pub fn align_behind(&mut self, vehicle_hitch: Position, vehicle_rotation: f32, gap: f32) {
        self.rotation = vehicle_rotation;
        self.snap_to(vehicle_hitch, vehicle_rotation, gap);
    }
}
