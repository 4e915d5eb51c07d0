//! Save and restore of the mutable world state
//!
//! Only what changes during play is saved. Destinations are written as
//! `DestinationRef`s and resolved lazily after restore, so a save can be
//! loaded before every paddock or sell point is back in place.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::destination::DestinationRef;
use super::error::SimError;
use super::paddock::PaddockState;
use super::stage::{Stage, TaskKind};
use super::types::{FillType, ImplementId, PaddockId, Position, VehicleId};
use super::unload::TrailerPhase;
use super::world::SimWorld;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    pub position: Position,
    pub rotation: f32,
    pub active: bool,
    pub stage: Stage,
    pub task: Option<TaskKind>,
    pub destination: Option<DestinationRef>,
    pub waypoints: Vec<Position>,
    pub fill: f32,
    pub fill_type: Option<FillType>,
    pub fuel: f32,
    pub implement: Option<ImplementId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementSnapshot {
    pub id: ImplementId,
    pub position: Position,
    pub rotation: f32,
    pub fill: f32,
    pub fill_type: Option<FillType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaddockSnapshot {
    pub number: u32,
    pub state: PaddockState,
    pub lime_years: u8,
    pub super_spread: bool,
    pub urea_spread: bool,
    pub weeds: u8,
    pub crop: Option<FillType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub time: f32,
    pub vehicles: Vec<VehicleSnapshot>,
    pub implements: Vec<ImplementSnapshot>,
    pub paddocks: Vec<PaddockSnapshot>,
    /// Sell point contents, keyed by sell point name
    #[serde(default)]
    pub sell_points: BTreeMap<String, BTreeMap<FillType, f32>>,
}

impl WorldSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl SimWorld {
    pub fn snapshot(&self) -> WorldSnapshot {
        let vehicles = self
            .shed
            .vehicles
            .values()
            .map(|v| VehicleSnapshot {
                id: v.id,
                position: v.position,
                rotation: v.rotation,
                active: v.active,
                stage: v.stage,
                task: v.task,
                destination: v
                    .destination
                    .map(|d| d.to_ref(&self.sell_points))
                    .or_else(|| v.pending_destination.clone()),
                waypoints: v.waypoints.iter().copied().collect(),
                fill: v.fill,
                fill_type: v.fill_type,
                fuel: v.fuel,
                implement: v.implement,
            })
            .collect();

        let implements = self
            .shed
            .implements
            .values()
            .map(|i| ImplementSnapshot {
                id: i.id,
                position: i.position,
                rotation: i.rotation,
                fill: i.fill,
                fill_type: i.fill_type,
            })
            .collect();

        let paddocks = self
            .paddocks
            .values()
            .map(|p| PaddockSnapshot {
                number: p.id.0,
                state: p.state,
                lime_years: p.lime_years,
                super_spread: p.super_spread,
                urea_spread: p.urea_spread,
                weeds: p.weeds,
                crop: p.crop,
            })
            .collect();

        let sell_points = self
            .sell_points
            .values()
            .filter(|s| !s.contents.is_empty())
            .map(|s| (s.name.clone(), s.contents.clone()))
            .collect();

        WorldSnapshot {
            time: self.time,
            vehicles,
            implements,
            paddocks,
            sell_points,
        }
    }

    /// Apply a snapshot to a world built from the same equipment.
    ///
    /// Active vehicles resume on their saved waypoints. Their destinations
    /// resolve on the next update; coverage progress of an unfinished working
    /// stage is not saved and starts over.
    pub fn restore(&mut self, snapshot: &WorldSnapshot) -> Result<(), SimError> {
        self.time = snapshot.time;

        for saved in &snapshot.paddocks {
            let Some(paddock) = self.paddock_mut(PaddockId(saved.number)) else {
                warn!("Snapshot names unknown paddock {}", saved.number);
                continue;
            };
            paddock.state = saved.state;
            paddock.lime_years = saved.lime_years;
            paddock.super_spread = saved.super_spread;
            paddock.urea_spread = saved.urea_spread;
            paddock.weeds = saved.weeds;
            paddock.crop = saved.crop;
            paddock.assigned = None;
            paddock.reset_paint();
        }

        for saved in &snapshot.implements {
            let implement = self.shed.implement_mut(saved.id)?;
            implement.position = saved.position;
            implement.rotation = saved.rotation;
            implement.fill = saved.fill;
            implement.fill_type = saved.fill_type;
            implement.attached_to = None;
            implement.working = false;
        }

        for saved in &snapshot.vehicles {
            let vehicle = self.shed.vehicle_mut(saved.id)?;
            vehicle.clear_task_state();
            vehicle.position = saved.position;
            vehicle.rotation = saved.rotation;
            vehicle.active = saved.active;
            vehicle.stage = saved.stage;
            vehicle.task = saved.task;
            vehicle.destination = None;
            vehicle.pending_destination = saved.destination.clone();
            vehicle.set_path(saved.waypoints.clone());
            vehicle.fill = saved.fill;
            vehicle.fill_type = saved.fill_type;
            vehicle.fuel = saved.fuel;
            vehicle.implement = saved.implement;
            vehicle.halt();
            if saved.task == Some(TaskKind::Delivery) && saved.stage == Stage::TransportingFrom {
                vehicle.trailer_phase = TrailerPhase::ToSilo;
            }

            if let Some(implement_id) = saved.implement {
                self.shed.implement_mut(implement_id)?.attached_to = Some(saved.id);
            }
        }

        for (name, contents) in &snapshot.sell_points {
            match self.sell_points.values_mut().find(|s| &s.name == name) {
                Some(sell_point) => sell_point.contents = contents.clone(),
                None => warn!("Snapshot names unknown sell point {:?}", name),
            }
        }

        for saved in snapshot.vehicles.iter().filter(|v| v.active) {
            if let Some(paddock) = saved.destination.as_ref().and_then(|d| match d {
                DestinationRef::Paddock(number) if saved.task != Some(TaskKind::Delivery) => Some(PaddockId(*number)),
                _ => None,
            }) {
                if let Some(paddock) = self.paddock_mut(paddock) {
                    paddock.assigned = Some(saved.id);
                }
            }
        }

        info!(
            "Restored {} vehicles, {} implements, {} paddocks at t={:.1}",
            snapshot.vehicles.len(),
            snapshot.implements.len(),
            snapshot.paddocks.len(),
            snapshot.time
        );
        Ok(())
    }
}
