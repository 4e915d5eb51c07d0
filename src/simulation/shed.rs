//! Equipment inventory
//!
//! The shed owns every vehicle and implement. Attachment is only a pair of
//! ids on both sides; nothing is moved out of the shed when it is towed.

use std::collections::BTreeMap;

use log::info;

use super::config::SimConfig;
use super::error::SimError;
use super::implement::SimImplement;
use super::types::{ImplementId, Position, VehicleId};
use super::vehicle::SimVehicle;

#[derive(Debug, Clone, Default)]
pub struct Shed {
    pub position: Position,
    /// Ordered so vehicles are always updated in the same order
    pub vehicles: BTreeMap<VehicleId, SimVehicle>,
    pub implements: BTreeMap<ImplementId, SimImplement>,
}

impl Shed {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn vehicle(&self, id: VehicleId) -> Result<&SimVehicle, SimError> {
        self.vehicles.get(&id).ok_or(SimError::VehicleNotFound(id))
    }

    pub fn vehicle_mut(&mut self, id: VehicleId) -> Result<&mut SimVehicle, SimError> {
        self.vehicles.get_mut(&id).ok_or(SimError::VehicleNotFound(id))
    }

    pub fn implement(&self, id: ImplementId) -> Result<&SimImplement, SimError> {
        self.implements.get(&id).ok_or(SimError::ImplementNotFound(id))
    }

    pub fn implement_mut(&mut self, id: ImplementId) -> Result<&mut SimImplement, SimError> {
        self.implements.get_mut(&id).ok_or(SimError::ImplementNotFound(id))
    }

    /// Hitch an implement to a tractor. One implement per tractor, none on
    /// harvesters, and an implement can only be towed by one vehicle.
    pub fn attach_implement(
        &mut self,
        vehicle_id: VehicleId,
        implement_id: ImplementId,
        config: &SimConfig,
    ) -> Result<(), SimError> {
        let vehicle = self.vehicle(vehicle_id)?;
        let Some(hitch) = vehicle.hitch_position() else {
            return Err(SimError::CannotTow(vehicle_id));
        };
        let rotation = vehicle.rotation;
        match vehicle.implement {
            Some(current) if current == implement_id => return Ok(()),
            Some(_) => return Err(SimError::AlreadyAttached(vehicle_id)),
            None => {}
        }

        let implement = self.implement_mut(implement_id)?;
        if implement.attached_to.is_some_and(|owner| owner != vehicle_id) {
            return Err(SimError::ImplementInUse(implement_id));
        }
        implement.attached_to = Some(vehicle_id);
        implement.align_behind(hitch, rotation, config.hitch_gap);
        let implement_name = implement.name();

        let vehicle = self.vehicle_mut(vehicle_id)?;
        vehicle.implement = Some(implement_id);
        info!("Attached {} to {}", implement_name, vehicle.name());
        Ok(())
    }

    /// Unhitch whatever the vehicle is towing. Returns the implement, if any.
    pub fn detach_implement(&mut self, vehicle_id: VehicleId) -> Result<Option<ImplementId>, SimError> {
        let vehicle = self.vehicle_mut(vehicle_id)?;
        let Some(implement_id) = vehicle.implement.take() else {
            return Ok(None);
        };
        if let Some(implement) = self.implements.get_mut(&implement_id) {
            implement.attached_to = None;
            implement.working = false;
        }
        Ok(Some(implement_id))
    }
}
