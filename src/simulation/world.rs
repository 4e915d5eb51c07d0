//! Main simulation world that ties everything together
//!
//! This is the entry point for running the farm simulation headless. It owns
//! the map, the shed and the dispatch surface, and advances every active
//! vehicle in fixed sub-steps.

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

use super::config::{
    EquipmentConfig, ImplementConfig, MapConfig, PaddockConfig, RoadConfig, SellPointConfig, SimConfig, VehicleConfig,
};
use super::destination::Destination;
use super::error::SimError;
use super::geometry::{simplify_path, trace_collision_boundary};
use super::implement::SimImplement;
use super::job::{headland_lap, Job, PlanningContext};
use super::paddock::{Paddock, PaddockState, WorkKind};
use super::paint::{paint_consume, paint_harvest, paint_plain};
use super::road_network::SimRoadNetwork;
use super::sellpoint::SellPoint;
use super::shed::Shed;
use super::stage::{stage_status, Stage, TaskKind};
use super::types::{FillType, ImplementId, PaddockId, Position, SellPointId, SimId, ToolType, VehicleId, FILL_EPSILON};
use super::unload::{tick_interval, transfer, HeaderUnload, TrailerPhase};
use super::vehicle::{SimVehicle, VehicleUpdateResult};

/// Notifications for whoever displays the simulation
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    StatusChanged { vehicle: VehicleId, status: String },
    /// Fill or stage changed in a way a panel would show
    RedrawRequested(VehicleId),
    /// A harvester is full and needs a trailer assigned
    UnloadRequested { header: VehicleId, paddock: Option<PaddockId> },
}

/// The main simulation world
pub struct SimWorld {
    pub config: SimConfig,

    /// All paddocks, by map number
    pub paddocks: BTreeMap<PaddockId, Paddock>,

    /// Sell points, including the silo
    pub sell_points: BTreeMap<SellPointId, SellPoint>,

    /// Road polylines for transport legs
    pub road_network: SimRoadNetwork,

    /// Vehicles and implements
    pub shed: Shed,

    /// Next ID to assign
    next_id: usize,

    /// Simulation time
    pub time: f32,

    /// Unspent frame time, carried to the next tick
    accumulator: f32,

    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,

    events: Vec<SimEvent>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimWorld {
    fn new_internal(config: SimConfig, rng: Option<StdRng>) -> Self {
        Self {
            config,
            paddocks: BTreeMap::new(),
            sell_points: BTreeMap::new(),
            road_network: SimRoadNetwork::new(),
            shed: Shed::new(Position::default()),
            next_id: 0,
            time: 0.0,
            accumulator: 0.0,
            rng,
            events: Vec::new(),
        }
    }

    pub fn new(config: SimConfig) -> Self {
        Self::new_internal(config, None)
    }

    /// Create a new SimWorld with a seeded RNG for reproducible simulations
    pub fn new_with_seed(config: SimConfig, seed: u64) -> Self {
        Self::new_internal(config, Some(StdRng::seed_from_u64(seed)))
    }

    /// Build a world from loaded configuration. Vehicles start at the shed.
    pub fn from_configs(
        config: SimConfig,
        map: &MapConfig,
        equipment: &EquipmentConfig,
        seed: Option<u64>,
    ) -> Result<Self> {
        config.validate().context("Invalid simulation config")?;
        map.validate().with_context(|| format!("Invalid map {}", map.name))?;
        equipment.validate().context("Invalid equipment")?;

        let mut world = match seed {
            Some(seed) => Self::new_with_seed(config, seed),
            None => Self::new(config),
        };
        world.shed.position = map.shed;
        for paddock in &map.paddocks {
            world.add_paddock(paddock);
        }
        for road in &map.roads {
            world.road_network.add_road(road.name.clone(), road.points.clone());
        }
        for sell_point in &map.sell_points {
            world.add_sell_point(sell_point);
        }
        for vehicle in &equipment.vehicles {
            world.add_vehicle(vehicle.clone(), map.shed);
        }
        for implement in &equipment.implements {
            world.add_implement(implement.clone());
        }
        info!(
            "Loaded {}: {} paddocks, {} roads, {} vehicles, {} implements",
            map.name,
            world.paddocks.len(),
            world.road_network.road_count(),
            world.shed.vehicles.len(),
            world.shed.implements.len()
        );
        Ok(world)
    }

    fn next_sim_id(&mut self) -> SimId {
        let id = SimId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_paddock(&mut self, config: &PaddockConfig) -> PaddockId {
        let paddock = match &mut self.rng {
            Some(rng) => Paddock::from_config(config, rng),
            None => Paddock::from_config(config, &mut rand::rng()),
        };
        let id = paddock.id;
        if paddock.field_pixels() == 0 {
            warn!("{} has an empty interior", id);
        }
        self.paddocks.insert(id, paddock);
        id
    }

    pub fn add_sell_point(&mut self, config: &SellPointConfig) -> SellPointId {
        let id = SellPointId(self.next_sim_id());
        self.sell_points.insert(id, SellPoint::from_config(id, config));
        id
    }

    pub fn add_road(&mut self, name: impl Into<String>, points: Vec<Position>) {
        self.road_network.add_road(name, points);
    }

    pub fn add_vehicle(&mut self, config: VehicleConfig, position: Position) -> VehicleId {
        let id = VehicleId(self.next_sim_id());
        self.shed.vehicles.insert(id, SimVehicle::new(id, config, position));
        id
    }

    pub fn add_implement(&mut self, config: ImplementConfig) -> ImplementId {
        let id = ImplementId(self.next_sim_id());
        let position = self.shed.position;
        self.shed.implements.insert(id, SimImplement::new(id, config, position));
        id
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&SimVehicle> {
        self.shed.vehicles.get(&id)
    }

    pub fn vehicle_mut(&mut self, id: VehicleId) -> Option<&mut SimVehicle> {
        self.shed.vehicles.get_mut(&id)
    }

    pub fn implement(&self, id: ImplementId) -> Option<&SimImplement> {
        self.shed.implements.get(&id)
    }

    pub fn paddock(&self, id: PaddockId) -> Option<&Paddock> {
        self.paddocks.get(&id)
    }

    pub fn paddock_mut(&mut self, id: PaddockId) -> Option<&mut Paddock> {
        self.paddocks.get_mut(&id)
    }

    pub fn silo(&self) -> Option<&SellPoint> {
        self.sell_points.values().find(|s| s.silo)
    }

    fn silo_id(&self) -> Option<SellPointId> {
        self.silo().map(|s| s.id)
    }

    /// Take every event raised since the last call
    pub fn drain_events(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn attach_implement(&mut self, vehicle: VehicleId, implement: ImplementId) -> Result<(), SimError> {
        self.shed.attach_implement(vehicle, implement, &self.config)
    }

    pub fn detach_implement(&mut self, vehicle: VehicleId) -> Result<Option<ImplementId>, SimError> {
        self.shed.detach_implement(vehicle)
    }

    /// Load an implement, validating fill type and capacity
    pub fn set_implement_fill(&mut self, implement: ImplementId, fill_type: FillType, amount: f32) -> Result<(), SimError> {
        let implement = self.shed.implement_mut(implement)?;
        implement.set_fill(fill_type, amount)?;
        if let Some(owner) = implement.attached_to {
            self.events.push(SimEvent::RedrawRequested(owner));
        }
        Ok(())
    }

    pub fn refuel(&mut self, vehicle: VehicleId) -> Result<(), SimError> {
        self.shed.vehicle_mut(vehicle)?.refuel();
        if self.shed.vehicle(vehicle)?.active {
            self.refresh_status(vehicle);
        }
        Ok(())
    }

    /// Grow every planted paddock one stage
    pub fn advance_growth(&mut self) {
        for paddock in self.paddocks.values_mut() {
            match &mut self.rng {
                Some(rng) => paddock.advance_growth(rng),
                None => paddock.advance_growth(&mut rand::rng()),
            }
        }
    }

    fn set_status(&mut self, vehicle_id: VehicleId, status: String) {
        if let Some(vehicle) = self.shed.vehicles.get_mut(&vehicle_id) {
            if vehicle.set_status(status.clone()) {
                self.events.push(SimEvent::StatusChanged {
                    vehicle: vehicle_id,
                    status,
                });
            }
        }
    }

    /// Status text for the vehicle's current stage
    fn stage_status_for(&self, vehicle: &SimVehicle) -> String {
        let destination = match (vehicle.stage, vehicle.destination) {
            (Stage::TransportingFrom, Some(destination)) => self
                .delivery_target(&destination)
                .map(|id| Destination::SellPoint(id).name(&self.sell_points))
                .unwrap_or_else(|| "Silo".to_string()),
            (_, Some(destination)) => destination.name(&self.sell_points),
            (_, None) => "--".to_string(),
        };
        let working = if vehicle.is_harvester() {
            "Harvesting..."
        } else {
            vehicle
                .implement
                .and_then(|id| self.shed.implements.get(&id))
                .map_or("Working...", |implement| implement.tool_type().working_status())
        };
        stage_status(vehicle.stage, &destination, working)
    }

    fn refresh_status(&mut self, vehicle_id: VehicleId) {
        if let Some(vehicle) = self.shed.vehicles.get(&vehicle_id) {
            let status = self.stage_status_for(vehicle);
            self.set_status(vehicle_id, status);
        }
    }

    /// Sell point a delivery unloads at: the given one, or the silo
    fn delivery_target(&self, destination: &Destination) -> Option<SellPointId> {
        match destination {
            Destination::SellPoint(id) => Some(*id),
            _ => self.silo_id(),
        }
    }

    /// Dispatch a vehicle.
    ///
    /// Builds the task for the vehicle's kind (harvesting, working with an
    /// implement, or carting with a trailer), discards whatever it was doing
    /// and starts at `resume_stage` or the task's first stage.
    pub fn assign_task(
        &mut self,
        vehicle_id: VehicleId,
        implement: Option<ImplementId>,
        destination: Destination,
        resume_stage: Option<Stage>,
    ) -> Result<(), SimError> {
        let vehicle = self.shed.vehicle(vehicle_id)?;
        let is_harvester = vehicle.is_harvester();

        match (implement, vehicle.implement) {
            (Some(new), Some(current)) if new != current => {
                self.shed.detach_implement(vehicle_id)?;
                self.shed.attach_implement(vehicle_id, new, &self.config)?;
            }
            (Some(new), None) => self.shed.attach_implement(vehicle_id, new, &self.config)?,
            (None, Some(_)) => {
                self.shed.detach_implement(vehicle_id)?;
            }
            _ => {}
        }

        let tool_type = implement
            .and_then(|id| self.shed.implements.get(&id))
            .map(SimImplement::tool_type);
        let task = match (is_harvester, tool_type) {
            (true, _) => TaskKind::Harvest,
            (false, Some(ToolType::Trailer)) => TaskKind::Delivery,
            (false, Some(_)) => TaskKind::Work,
            (false, None) if destination == Destination::Shed => TaskKind::Work,
            (false, None) => return Err(SimError::InvalidTask(vehicle_id)),
        };

        let stage = match (resume_stage, destination) {
            (Some(stage), _) => stage,
            (None, Destination::Paddock(_)) => task.first_stage(),
            (None, Destination::Shed) => Stage::TravellingFrom,
            (None, Destination::SellPoint(_)) if task == TaskKind::Delivery => Stage::TransportingFrom,
            (None, Destination::SellPoint(_)) => return Err(SimError::InvalidTask(vehicle_id)),
        };
        if !task.contains(stage) {
            return Err(SimError::InvalidTask(vehicle_id));
        }

        match destination {
            Destination::Paddock(paddock_id) => {
                let paddock = self
                    .paddocks
                    .get(&paddock_id)
                    .ok_or(SimError::PaddockNotFound(paddock_id))?;
                if let Some(other) = paddock.assigned.filter(|other| *other != vehicle_id) {
                    if task != TaskKind::Delivery {
                        warn!("{} is already assigned to {:?}, sharing it with {:?}", paddock_id, other, vehicle_id);
                    }
                }
            }
            Destination::SellPoint(id) if !self.sell_points.contains_key(&id) => {
                return Err(SimError::SellPointNotFound(id));
            }
            _ => {}
        }

        self.cancel_task(vehicle_id);
        if let Destination::Paddock(paddock_id) = destination {
            if task != TaskKind::Delivery {
                if let Some(paddock) = self.paddocks.get_mut(&paddock_id) {
                    paddock.assigned = Some(vehicle_id);
                }
            }
        }

        let vehicle = self.shed.vehicle_mut(vehicle_id)?;
        vehicle.task = Some(task);
        vehicle.destination = Some(destination);
        vehicle.pending_destination = None;
        vehicle.active = true;
        info!("{} assigned to {:?} from {:?}", vehicle.name(), destination, stage);

        self.enter_stage(vehicle_id, stage);
        Ok(())
    }

    /// Drop the vehicle's current task: waypoints, waiting flags, paddock
    /// assignment and any unload handshake it takes part in.
    fn cancel_task(&mut self, vehicle_id: VehicleId) {
        let Some(vehicle) = self.shed.vehicles.get(&vehicle_id) else {
            return;
        };
        let unloader = vehicle.header_unload.unloader();
        let unload_target = vehicle.unload_target;
        let was_working = vehicle.active && vehicle.stage == Stage::Working;
        let implement = vehicle.implement;

        if let Some(tractor) = unloader.and_then(|id| self.shed.vehicles.get_mut(&id)) {
            tractor.unload_target = None;
        }
        if let Some(header_id) = unload_target {
            if let Some(header) = self.shed.vehicles.get_mut(&header_id) {
                if header.header_unload.unloader() == Some(vehicle_id) {
                    header.header_unload = HeaderUnload::WaitingForAssignment;
                    let paddock = header.destination.and_then(|d| d.paddock());
                    self.events.push(SimEvent::UnloadRequested {
                        header: header_id,
                        paddock,
                    });
                }
            }
        }
        for paddock in self.paddocks.values_mut() {
            if paddock.assigned == Some(vehicle_id) {
                paddock.assigned = None;
                if was_working {
                    paddock.reset_paint();
                }
            }
        }
        if let Some(implement) = implement.and_then(|id| self.shed.implements.get_mut(&id)) {
            implement.working = false;
        }
        if let Some(vehicle) = self.shed.vehicles.get_mut(&vehicle_id) {
            vehicle.clear_task_state();
        }
    }

    /// Destinations for the leg a stage drives
    fn leg_for(&self, vehicle: &SimVehicle, stage: Stage) -> Option<(Destination, Destination)> {
        let destination = vehicle.destination?;
        let leg = match stage {
            Stage::TravellingTo | Stage::TransportingTo => (Destination::Shed, destination),
            Stage::Working => (destination, destination),
            Stage::TransportingFrom => {
                let target = Destination::SellPoint(self.delivery_target(&destination)?);
                let origin = if destination.is_paddock() { destination } else { Destination::Shed };
                (origin, target)
            }
            Stage::TravellingFrom => {
                let origin = match vehicle.task {
                    Some(TaskKind::Delivery) => self
                        .delivery_target(&destination)
                        .map_or(destination, Destination::SellPoint),
                    _ => destination,
                };
                (origin, Destination::Shed)
            }
        };
        Some(leg)
    }

    fn working_width(&self, vehicle: &SimVehicle) -> f32 {
        vehicle.config.working_width().unwrap_or_else(|| {
            vehicle
                .implement
                .and_then(|id| self.shed.implements.get(&id))
                .map_or(0.0, SimImplement::working_width)
        })
    }

    /// Switch a vehicle into `stage` and request that stage's path
    fn enter_stage(&mut self, vehicle_id: VehicleId, stage: Stage) {
        let Some(vehicle) = self.shed.vehicles.get(&vehicle_id) else {
            return;
        };
        let leg = self.leg_for(vehicle, stage);
        let implement = vehicle.implement;
        let tool_type = implement
            .and_then(|id| self.shed.implements.get(&id))
            .map(SimImplement::tool_type);
        let width = self.working_width(vehicle);

        let (path, job) = match leg {
            Some((start, end)) => {
                let mut job = Job::new(start, end, vehicle_id, implement, tool_type, width);
                let ctx = PlanningContext {
                    paddocks: &self.paddocks,
                    sell_points: &self.sell_points,
                    roads: &self.road_network,
                    shed: self.shed.position,
                    config: &self.config,
                };
                let path = job.generate_path(&ctx);
                (path, Some(job))
            }
            None => {
                warn!("No leg for {:?} in {:?}, holding", vehicle_id, stage);
                (Vec::new(), None)
            }
        };

        if stage == Stage::Working {
            if let Some(paddock) = self.leg_paddock(vehicle_id) {
                if let Some(paddock) = self.paddocks.get_mut(&paddock) {
                    paddock.reset_paint();
                }
            }
            if let Some(implement) = implement.and_then(|id| self.shed.implements.get_mut(&id)) {
                implement.working = implement.tool_type().paints();
            }
        }

        if let Some(vehicle) = self.shed.vehicles.get_mut(&vehicle_id) {
            debug!("{} enters {:?} with {} waypoints", vehicle.name(), stage, path.len());
            vehicle.stage = stage;
            vehicle.set_path(path);
            vehicle.paint.reset();
            vehicle.job = job;
            if vehicle.task == Some(TaskKind::Delivery) {
                vehicle.trailer_phase = match stage {
                    Stage::TransportingFrom => TrailerPhase::ToSilo,
                    _ => TrailerPhase::ToField,
                };
            }
        }
        self.refresh_status(vehicle_id);
        self.events.push(SimEvent::RedrawRequested(vehicle_id));
    }

    fn leg_paddock(&self, vehicle_id: VehicleId) -> Option<PaddockId> {
        self.shed.vehicles.get(&vehicle_id)?.destination?.paddock()
    }

    /// Commit (or abandon) the paddock effect of a working stage
    fn leave_working(&mut self, vehicle_id: VehicleId, commit: bool) {
        let Some(vehicle) = self.shed.vehicles.get(&vehicle_id) else {
            return;
        };
        let implement = vehicle.implement.and_then(|id| self.shed.implements.get(&id));
        let work = if vehicle.is_harvester() {
            Some(WorkKind::Harvest)
        } else {
            implement.map(|i| WorkKind::Tool(i.tool_type(), i.fill_type))
        };
        let implement_id = vehicle.implement;

        if let Some(paddock) = vehicle
            .destination
            .and_then(|d| d.paddock())
            .and_then(|id| self.paddocks.get_mut(&id))
        {
            if commit {
                if let Some(work) = work {
                    if let Err(e) = paddock.apply_work(work) {
                        warn!("{:?} left {} unchanged: {}", vehicle_id, paddock.name(), e);
                    }
                }
                info!("{} finished at {:.0}% coverage", paddock.name(), paddock.completion() * 100.0);
            }
            paddock.reset_paint();
        }
        if let Some(implement) = implement_id.and_then(|id| self.shed.implements.get_mut(&id)) {
            implement.working = false;
        }
    }

    /// Move to the next stage of the task, or finish it
    fn advance_stage(&mut self, vehicle_id: VehicleId) {
        let Some(vehicle) = self.shed.vehicles.get(&vehicle_id) else {
            return;
        };
        let Some(task) = vehicle.task else {
            return;
        };
        let stage = vehicle.stage;
        if stage == Stage::Working {
            self.leave_working(vehicle_id, true);
        }
        match task.next(stage) {
            Some(next) => self.enter_stage(vehicle_id, next),
            None => self.complete_task(vehicle_id),
        }
    }

    fn complete_task(&mut self, vehicle_id: VehicleId) {
        self.cancel_task(vehicle_id);
        if let Some(vehicle) = self.shed.vehicles.get_mut(&vehicle_id) {
            vehicle.active = false;
            vehicle.task = None;
            vehicle.destination = None;
            vehicle.halt();
            info!("{} is back at the shed", vehicle.name());
        }
        self.set_status(vehicle_id, "Idle".to_string());
        self.events.push(SimEvent::RedrawRequested(vehicle_id));
    }

    /// Assign a tractor with a trailer to unload a full harvester.
    ///
    /// An idle tractor is dispatched to the harvester's paddock first. The
    /// tractor gets a path around lap 1 from the gate to the harvester and
    /// will hold there until the harvester releases it.
    pub fn assign_unloader(&mut self, header_id: VehicleId, tractor_id: VehicleId) -> Result<(), SimError> {
        let header = self.shed.vehicle(header_id)?;
        if !header.is_harvester() {
            return Err(SimError::NotAHarvester(header_id));
        }
        if header.header_unload.unloader().is_some() {
            return Err(SimError::UnloaderAlreadyAssigned(header_id));
        }
        if header.header_unload != HeaderUnload::WaitingForAssignment {
            return Err(SimError::NotWaitingForUnload(header_id));
        }
        let header_position = header.position;
        let incoming = header.fill_type;
        let paddock_id = header
            .destination
            .and_then(|d| d.paddock())
            .ok_or(SimError::NotWaitingForUnload(header_id))?;
        let paddock = self
            .paddocks
            .get(&paddock_id)
            .ok_or(SimError::PaddockNotFound(paddock_id))?;
        let gate = paddock.gate;
        // A restored harvester has no plan yet, so lap 1 comes from the boundary
        let lap_1 = match header.job.as_ref().map(Job::lap_1).filter(|lap| !lap.is_empty()) {
            Some(lap) => lap.to_vec(),
            None => headland_lap(&paddock.boundary, gate, self.working_width(header)),
        };

        let tractor = self.shed.vehicle(tractor_id)?;
        let trailer = tractor
            .implement
            .filter(|id| {
                self.shed
                    .implements
                    .get(id)
                    .is_some_and(|i| i.tool_type() == ToolType::Trailer)
            })
            .ok_or(SimError::NoTrailer(tractor_id))?;
        let loaded = self
            .shed
            .implements
            .get(&trailer)
            .filter(|t| !t.is_empty())
            .and_then(|t| t.fill_type);
        if let (Some(loaded), Some(incoming)) = (loaded, incoming) {
            if loaded != incoming {
                return Err(SimError::MixedLoad {
                    trailer,
                    loaded,
                    incoming,
                });
            }
        }
        if !tractor.active {
            self.assign_task(tractor_id, Some(trailer), Destination::Paddock(paddock_id), None)?;
        }

        let tractor = self.shed.vehicle(tractor_id)?;
        let available = tractor.task == Some(TaskKind::Delivery)
            && tractor.stage == Stage::TransportingTo
            && tractor.unload_target.is_none()
            && matches!(
                tractor.trailer_phase,
                TrailerPhase::ToField | TrailerPhase::AtField { .. }
            )
            && tractor.destination == Some(Destination::Paddock(paddock_id));
        if !available {
            return Err(SimError::UnloaderUnavailable(tractor_id));
        }

        let mut docking = simplify_path(&trace_collision_boundary(&gate, &header_position, &lap_1), 1.0);
        docking.push(header_position);

        let tractor = self.shed.vehicle_mut(tractor_id)?;
        if tractor.trailer_phase != TrailerPhase::ToField {
            tractor.waypoints.clear();
            tractor.trailer_phase = TrailerPhase::ToField;
        }
        tractor.waypoints.extend(docking.iter().copied());
        tractor.docking_path = docking;
        tractor.unload_target = Some(header_id);
        info!("{} heading over to unload {:?}", tractor.name(), header_id);

        let header = self.shed.vehicle_mut(header_id)?;
        header.header_unload = HeaderUnload::WaitingForArrival { unloader: tractor_id };
        self.set_status(header_id, "Waiting for trailer to arrive...".to_string());
        self.events.push(SimEvent::RedrawRequested(header_id));
        Ok(())
    }

    /// Advance the simulation by `delta_secs`, split into fixed sub-steps.
    /// Leftover time is carried into the next call.
    pub fn tick(&mut self, delta_secs: f32) {
        self.accumulator += delta_secs;
        let step = self.config.sub_step();
        while self.accumulator >= step {
            self.accumulator -= step;
            self.step(step);
        }
    }

    fn step(&mut self, step: f32) {
        self.time += step;
        let ids: Vec<VehicleId> = self.shed.vehicles.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.update_vehicle(id, step) {
                warn!("Failed to update vehicle {:?}: {:#}", id, e);
            }
        }
    }

    /// One sub-step for one vehicle
    fn update_vehicle(&mut self, vehicle_id: VehicleId, step: f32) -> Result<()> {
        let vehicle = self
            .shed
            .vehicles
            .get(&vehicle_id)
            .context("Vehicle not found")?;
        if !vehicle.active {
            return Ok(());
        }

        if vehicle.destination.is_none() {
            let resolved = vehicle
                .pending_destination
                .as_ref()
                .and_then(|r| r.resolve(&self.paddocks, &self.sell_points));
            let vehicle = self.shed.vehicles.get_mut(&vehicle_id).context("Vehicle not found")?;
            match resolved {
                Some(destination) => {
                    debug!("{} resolved its destination to {:?}", vehicle.name(), destination);
                    vehicle.destination = Some(destination);
                    vehicle.pending_destination = None;
                }
                None => {
                    vehicle.warn_unresolved();
                    vehicle.halt();
                    return Ok(());
                }
            }
        }

        let vehicle = self.shed.vehicles.get(&vehicle_id).context("Vehicle not found")?;
        if vehicle.header_unload.is_stalled() {
            return self.update_header_unload(vehicle_id, step);
        }
        if vehicle.task == Some(TaskKind::Delivery) && vehicle.trailer_phase.is_holding() {
            return self.update_trailer_hold(vehicle_id, step);
        }

        let vehicle = self.shed.vehicles.get_mut(&vehicle_id).context("Vehicle not found")?;
        let was_out_of_fuel = vehicle.status == "Out of fuel";
        let result = vehicle.drive(step, &self.config);
        self.follow_implement(vehicle_id, step)?;

        match result {
            VehicleUpdateResult::OutOfFuel => {
                self.set_status(vehicle_id, "Out of fuel".to_string());
            }
            VehicleUpdateResult::Continue => {
                if was_out_of_fuel {
                    self.refresh_status(vehicle_id);
                }
                let stage = self.shed.vehicles.get(&vehicle_id).map(|v| v.stage);
                if stage == Some(Stage::Working) {
                    self.update_paint(vehicle_id)?;
                }
            }
            VehicleUpdateResult::PathEnded => self.on_path_ended(vehicle_id),
        }
        Ok(())
    }

    /// Let the towed implement chase the vehicle's hitch
    fn follow_implement(&mut self, vehicle_id: VehicleId, step: f32) -> Result<()> {
        let vehicle = self.shed.vehicles.get(&vehicle_id).context("Vehicle not found")?;
        let (Some(implement_id), Some(hitch)) = (vehicle.implement, vehicle.hitch_position()) else {
            return Ok(());
        };
        let (rotation, speed) = (vehicle.rotation, vehicle.speed());
        let implement = self
            .shed
            .implements
            .get_mut(&implement_id)
            .context("Attached implement not found")?;
        implement.follow(hitch, rotation, speed, step, &self.config);
        Ok(())
    }

    fn on_path_ended(&mut self, vehicle_id: VehicleId) {
        let Some(vehicle) = self.shed.vehicles.get_mut(&vehicle_id) else {
            return;
        };
        if vehicle.task == Some(TaskKind::Delivery) {
            let next = match (vehicle.stage, vehicle.trailer_phase) {
                (Stage::TransportingTo, TrailerPhase::ToField) => Some(TrailerPhase::AtField { has_waited: false }),
                (Stage::TransportingTo, TrailerPhase::ToGate) => Some(TrailerPhase::AtGate { has_waited: false }),
                (Stage::TransportingFrom, TrailerPhase::ToSilo) => Some(TrailerPhase::AtSilo { timer: 0.0 }),
                _ => None,
            };
            if let Some(phase) = next {
                debug!("{} now {:?}", vehicle.name(), phase);
                vehicle.trailer_phase = phase;
                let status = match phase {
                    TrailerPhase::AtSilo { .. } => "Unloading...".to_string(),
                    _ => "Waiting...".to_string(),
                };
                self.set_status(vehicle_id, status);
                return;
            }
        }
        self.advance_stage(vehicle_id);
    }

    /// Trailer holds: at the field (or docked), at the gate, and at the silo
    fn update_trailer_hold(&mut self, vehicle_id: VehicleId, step: f32) -> Result<()> {
        let silo = self.silo_id();
        let vehicle = self.shed.vehicles.get_mut(&vehicle_id).context("Vehicle not found")?;
        vehicle.halt();
        let delivery_target = match vehicle.destination {
            Some(Destination::SellPoint(id)) => Some(id),
            _ => silo,
        };

        match vehicle.trailer_phase {
            TrailerPhase::AtField { .. } if vehicle.unload_target.is_some() => {
                // Docked to a harvester, held until it releases us
                vehicle.trailer_phase = TrailerPhase::AtField { has_waited: false };
            }
            TrailerPhase::AtField { has_waited: false } => {
                vehicle.trailer_phase = TrailerPhase::AtField { has_waited: true };
            }
            TrailerPhase::AtField { has_waited: true } => {
                vehicle.wait_cycles += 1;
                vehicle.trailer_phase = TrailerPhase::ToGate;
                let gate = vehicle
                    .destination
                    .and_then(|d| d.paddock())
                    .and_then(|id| self.paddocks.get(&id))
                    .map(|p| p.gate);
                let mut path: Vec<Position> = vehicle.docking_path.iter().rev().copied().collect();
                path.extend(gate);
                vehicle.set_path(path);
                let status = format!("Leaving {}...", vehicle.destination.map_or_else(String::new, |d| d.name(&self.sell_points)));
                self.set_status(vehicle_id, status);
            }
            TrailerPhase::AtGate { has_waited: false } => {
                vehicle.trailer_phase = TrailerPhase::AtGate { has_waited: true };
            }
            TrailerPhase::AtGate { has_waited: true } => {
                if delivery_target.is_none() {
                    vehicle.warn_unresolved();
                    self.set_status(vehicle_id, "Waiting for silo...".to_string());
                    return Ok(());
                }
                vehicle.wait_cycles += 1;
                debug!("{} leaves the gate after {} holds", vehicle.name(), vehicle.wait_cycles);
                self.advance_stage(vehicle_id);
            }
            TrailerPhase::AtSilo { mut timer } => {
                let fired = tick_interval(&mut timer, step, self.config.silo_unload_interval);
                vehicle.trailer_phase = TrailerPhase::AtSilo { timer };
                let trailer_id = vehicle.implement.context("Trailer detached mid delivery")?;
                let trailer = self
                    .shed
                    .implements
                    .get_mut(&trailer_id)
                    .context("Trailer not found")?;
                let target = delivery_target.and_then(|id| self.sell_points.get_mut(&id));
                let Some(target) = target else {
                    warn!("Silo disappeared, holding {:?}", vehicle_id);
                    return Ok(());
                };

                let mut unloaded = 0.0;
                for _ in 0..fired {
                    transfer(&mut trailer.fill, &mut unloaded, f32::INFINITY, self.config.silo_unload_rate);
                }
                if let Some(fill_type) = trailer.fill_type.filter(|_| unloaded > 0.0) {
                    target.deposit(fill_type, unloaded);
                }
                if trailer.is_empty() {
                    trailer.fill = 0.0;
                    trailer.fill_type = None;
                    self.events.push(SimEvent::RedrawRequested(vehicle_id));
                    self.advance_stage(vehicle_id);
                } else if fired > 0 {
                    self.events.push(SimEvent::RedrawRequested(vehicle_id));
                }
            }
            TrailerPhase::ToField | TrailerPhase::ToGate | TrailerPhase::ToSilo => {}
        }
        Ok(())
    }

    /// Harvester side of the unload handshake
    fn update_header_unload(&mut self, header_id: VehicleId, step: f32) -> Result<()> {
        let header = self.shed.vehicles.get_mut(&header_id).context("Vehicle not found")?;
        header.halt();
        let state = header.header_unload;

        match state {
            HeaderUnload::Normal | HeaderUnload::WaitingForAssignment => {}
            HeaderUnload::WaitingForArrival { unloader } => {
                let tractor = self.shed.vehicles.get(&unloader);
                let still_assigned = tractor.is_some_and(|t| t.active && t.unload_target == Some(header_id));
                if !still_assigned {
                    warn!("Unloader {:?} no longer coming for {:?}", unloader, header_id);
                    self.request_unload(header_id);
                    return Ok(());
                }
                let docked = tractor.is_some_and(|t| matches!(t.trailer_phase, TrailerPhase::AtField { .. }));
                if docked {
                    if let Some(header) = self.shed.vehicles.get_mut(&header_id) {
                        header.header_unload = HeaderUnload::Unloading { unloader, timer: 0.0 };
                    }
                    self.set_status(header_id, "Unloading...".to_string());
                }
            }
            HeaderUnload::Unloading { unloader, mut timer } => {
                let fired = tick_interval(&mut timer, step, self.config.unload_interval);
                let trailer_id = self
                    .shed
                    .vehicles
                    .get(&unloader)
                    .and_then(|t| t.implement)
                    .context("Unloader lost its trailer")?;
                let header = self.shed.vehicles.get_mut(&header_id).context("Vehicle not found")?;
                let trailer = self
                    .shed
                    .implements
                    .get_mut(&trailer_id)
                    .context("Trailer not found")?;

                if !trailer.is_empty() && header.fill_type.is_some() && trailer.fill_type != header.fill_type {
                    error!(
                        "{} holds {:?}, refusing {:?} from {}",
                        trailer.name(),
                        trailer.fill_type,
                        header.fill_type,
                        header.name()
                    );
                    if let Some(tractor) = self.shed.vehicles.get_mut(&unloader) {
                        tractor.unload_target = None;
                    }
                    self.request_unload(header_id);
                    return Ok(());
                }

                for _ in 0..fired {
                    let moved = transfer(&mut header.fill, &mut trailer.fill, trailer.config.capacity, self.config.unload_rate);
                    if moved > 0.0 {
                        trailer.fill_type = header.fill_type.or(trailer.fill_type);
                    }
                }
                header.header_unload = HeaderUnload::Unloading { unloader, timer };

                let header_empty = header.fill <= FILL_EPSILON;
                if header_empty || trailer.is_full() {
                    if header_empty {
                        header.fill = 0.0;
                        header.fill_type = None;
                    }
                    header.header_unload = HeaderUnload::Normal;
                    header.paint.reset();
                    info!(
                        "{} unloaded, trailer at {:.1}/{:.1}",
                        header.name(),
                        trailer.fill,
                        trailer.capacity()
                    );
                    if let Some(tractor) = self.shed.vehicles.get_mut(&unloader) {
                        tractor.unload_target = None;
                    }
                    self.refresh_status(header_id);
                }
                if fired > 0 {
                    self.events.push(SimEvent::RedrawRequested(header_id));
                    self.events.push(SimEvent::RedrawRequested(unloader));
                }
            }
        }
        Ok(())
    }

    fn request_unload(&mut self, header_id: VehicleId) {
        let Some(header) = self.shed.vehicles.get_mut(&header_id) else {
            return;
        };
        header.header_unload = HeaderUnload::WaitingForAssignment;
        let paddock = header.destination.and_then(|d| d.paddock());
        info!("{} is full and waiting for a trailer", header.name());
        self.events.push(SimEvent::UnloadRequested {
            header: header_id,
            paddock,
        });
        self.set_status(header_id, "Waiting for trailer...".to_string());
    }

    /// Paint the tool footprint into the paddock and move fill accordingly
    fn update_paint(&mut self, vehicle_id: VehicleId) -> Result<()> {
        let config = &self.config;
        let vehicle = self.shed.vehicles.get_mut(&vehicle_id).context("Vehicle not found")?;
        let Some(paddock) = vehicle
            .destination
            .and_then(|d| d.paddock())
            .and_then(|id| self.paddocks.get_mut(&id))
        else {
            return Ok(());
        };

        if let Some(header_center) = vehicle.header_center() {
            let width = vehicle.config.working_width().unwrap_or(0.0);
            let Some(footprint) = vehicle.paint.sample(
                header_center,
                width,
                config.footprint_length,
                vehicle.rotation,
                config.paint_move_threshold,
            ) else {
                return Ok(());
            };
            let capacity = vehicle.capacity();
            let outcome = paint_harvest(paddock, &footprint, &mut vehicle.fill, capacity, config.fill_rates.harvester);
            if outcome.fill_delta > 0.0 {
                vehicle.fill_type = paddock.crop;
                self.events.push(SimEvent::RedrawRequested(vehicle_id));
            }
            if outcome.exhausted {
                self.request_unload(vehicle_id);
            }
            return Ok(());
        }

        let implement_id = vehicle.implement.context("Working without an implement")?;
        let implement = self
            .shed
            .implements
            .get_mut(&implement_id)
            .context("Implement not found")?;
        let tool_type = implement.tool_type();
        if !tool_type.paints() {
            return Ok(());
        }
        let Some(footprint) = vehicle.paint.sample(
            implement.position,
            implement.working_width(),
            config.footprint_length,
            implement.rotation,
            config.paint_move_threshold,
        ) else {
            return Ok(());
        };

        match config.fill_rates.for_tool(tool_type) {
            Some(rate) => {
                let outcome = paint_consume(paddock, &footprint, &mut implement.fill, rate);
                if outcome.fill_delta != 0.0 {
                    self.events.push(SimEvent::RedrawRequested(vehicle_id));
                }
                if outcome.exhausted {
                    let fill_name = implement
                        .fill_type
                        .map_or_else(|| "fill".to_string(), |f| format!("{:?}", f));
                    if implement.is_empty() {
                        implement.fill = 0.0;
                        implement.fill_type = None;
                    }
                    warn!("{} ran out of {} in {}", implement.name(), fill_name, paddock.name());
                    self.set_status(vehicle_id, format!("Out of {}", fill_name));
                    self.leave_working(vehicle_id, false);
                    self.enter_stage(vehicle_id, Stage::TravellingFrom);
                }
            }
            None => {
                paint_plain(paddock, &footprint);
            }
        }
        Ok(())
    }

    /// Create the built-in demo farm
    pub fn create_demo_world(seed: Option<u64>) -> Result<Self> {
        let (map, equipment) = demo_configs();
        Self::from_configs(SimConfig::default(), &map, &equipment, seed)
    }

    /// Print a summary of the world state
    pub fn print_summary(&self) {
        println!("=== Farm Simulation Summary ===");
        println!("Time: {:.2}s", self.time);
        println!(
            "Paddocks: {}, Roads: {}, Sell points: {}",
            self.paddocks.len(),
            self.road_network.road_count(),
            self.sell_points.len()
        );
        println!();

        println!("--- Paddocks ---");
        for paddock in self.paddocks.values() {
            println!(
                "  {}: {:?}, crop={:?}, lime={}, weeds={}, coverage={:.0}%",
                paddock.id,
                paddock.state,
                paddock.crop,
                paddock.lime_years,
                paddock.weeds,
                paddock.completion() * 100.0
            );
        }

        println!("--- Vehicles ---");
        for vehicle in self.shed.vehicles.values() {
            println!(
                "  {} {:?}: {} stage={:?} pos=({:.1}, {:.1}) waypoints={} fuel={:.1} fill={:.2}",
                vehicle.name(),
                vehicle.id.0,
                vehicle.status,
                vehicle.stage,
                vehicle.position.x,
                vehicle.position.y,
                vehicle.waypoints.len(),
                vehicle.fuel,
                vehicle.fill
            );
        }

        println!("--- Implements ---");
        for implement in self.shed.implements.values() {
            println!(
                "  {} ({:?}): fill={:.2}/{:.2} {:?}, attached={}",
                implement.name(),
                implement.tool_type(),
                implement.fill,
                implement.capacity(),
                implement.fill_type,
                implement.attached_to.map_or("no".to_string(), |v| format!("{:?}", v.0))
            );
        }

        if let Some(silo) = self.silo() {
            println!("--- {} ---", silo.name);
            for (fill_type, amount) in &silo.contents {
                println!("  {:?}: {:.2}", fill_type, amount);
            }
        }
    }

    /// Draw a visual map of the world in the terminal
    pub fn draw_map(&self) {
        let mut points: Vec<Position> = vec![self.shed.position];
        for paddock in self.paddocks.values() {
            points.extend(paddock.boundary.iter().copied());
        }
        for road in self.road_network.roads() {
            points.extend(road.points.iter().copied());
        }
        let rect = super::geometry::get_polygon_rect(&points);

        let scale = 0.1; // one character per 10px
        let width = ((rect.w as f32 * scale) as usize + 1).max(1);
        let height = ((rect.h as f32 * scale * 0.5) as usize + 1).max(1);
        let mut grid = vec![vec![' '; width]; height];

        let to_grid = |p: &Position| -> (i32, i32) {
            let col = ((p.x - rect.x as f32) * scale) as i32;
            let row = ((p.y - rect.y as f32) * scale * 0.5) as i32;
            (col.clamp(0, width as i32 - 1), row.clamp(0, height as i32 - 1))
        };
        let plot = |grid: &mut [Vec<char>], a: &Position, b: &Position, c: char| {
            for (x, y) in super::geometry::bresenham(to_grid(a), to_grid(b)) {
                let cell = &mut grid[y as usize][x as usize];
                if *cell == ' ' {
                    *cell = c;
                }
            }
        };

        for road in self.road_network.roads() {
            for pair in road.points.windows(2) {
                plot(&mut grid, &pair[0], &pair[1], '=');
            }
        }
        for paddock in self.paddocks.values() {
            let n = paddock.boundary.len();
            for i in 0..n {
                plot(&mut grid, &paddock.boundary[i], &paddock.boundary[(i + 1) % n], '#');
            }
            let (col, row) = to_grid(&paddock.gate);
            grid[row as usize][col as usize] = 'G';
        }
        for sell_point in self.sell_points.values() {
            let (col, row) = to_grid(&sell_point.position);
            grid[row as usize][col as usize] = if sell_point.silo { 'O' } else { '$' };
        }
        let (col, row) = to_grid(&self.shed.position);
        grid[row as usize][col as usize] = 'S';
        for vehicle in self.shed.vehicles.values() {
            let (col, row) = to_grid(&vehicle.position);
            grid[row as usize][col as usize] = if vehicle.is_harvester() { 'H' } else { 'T' };
        }

        println!("\n=== Farm Map ===");
        println!("Legend: #=Paddock, G=Gate, ==Road, S=Shed, O=Silo, $=Sell point, T=Tractor, H=Harvester");
        println!();
        for row in &grid {
            let line: String = row.iter().collect();
            println!("{}", line);
        }
        println!();
    }
}

/// Demo map: three paddocks with a track each, a silo and a grain buyer
pub fn demo_configs() -> (MapConfig, EquipmentConfig) {
    let rect = |x: f32, y: f32, w: f32, h: f32| {
        vec![
            Position::new(x, y),
            Position::new(x + w, y),
            Position::new(x + w, y + h),
            Position::new(x, y + h),
        ]
    };
    let map = MapConfig {
        name: "Demo Farm".to_string(),
        shed: Position::new(40.0, 260.0),
        paddocks: vec![
            PaddockConfig {
                number: 1,
                boundary: rect(100.0, 40.0, 200.0, 160.0),
                gate: Position::new(200.0, 200.0),
                hectares: 32.0,
                state: Some(PaddockState::Harvested),
                lime_years: 0,
                super_spread: false,
                urea_spread: false,
                weeds: 1,
                crop: None,
            },
            PaddockConfig {
                number: 2,
                boundary: vec![
                    Position::new(340.0, 40.0),
                    Position::new(560.0, 40.0),
                    Position::new(560.0, 200.0),
                    Position::new(460.0, 200.0),
                    Position::new(460.0, 120.0),
                    Position::new(420.0, 120.0),
                    Position::new(420.0, 200.0),
                    Position::new(340.0, 200.0),
                ],
                gate: Position::new(380.0, 200.0),
                hectares: 28.0,
                state: Some(PaddockState::ReadyToHarvest),
                lime_years: 2,
                super_spread: true,
                urea_spread: false,
                weeds: 0,
                crop: Some(FillType::Wheat),
            },
            PaddockConfig {
                number: 3,
                boundary: rect(100.0, 320.0, 180.0, 120.0),
                gate: Position::new(190.0, 320.0),
                hectares: 21.0,
                state: None,
                lime_years: 0,
                super_spread: false,
                urea_spread: false,
                weeds: 0,
                crop: None,
            },
        ],
        // One track per gate, each running from the gate back to the shed
        roads: vec![
            RoadConfig {
                name: "North Track".to_string(),
                points: vec![
                    Position::new(200.0, 225.0),
                    Position::new(200.0, 260.0),
                    Position::new(40.0, 260.0),
                ],
            },
            RoadConfig {
                name: "East Track".to_string(),
                points: vec![
                    Position::new(380.0, 225.0),
                    Position::new(380.0, 262.0),
                    Position::new(42.0, 262.0),
                ],
            },
            RoadConfig {
                name: "South Track".to_string(),
                points: vec![
                    Position::new(190.0, 295.0),
                    Position::new(190.0, 264.0),
                    Position::new(44.0, 264.0),
                ],
            },
        ],
        sell_points: vec![
            SellPointConfig {
                name: "Silo".to_string(),
                position: Position::new(60.0, 300.0),
                silo: true,
            },
            SellPointConfig {
                name: "Grain Co-op".to_string(),
                position: Position::new(600.0, 280.0),
                silo: false,
            },
        ],
    };

    let equipment = EquipmentConfig {
        vehicles: vec![
            VehicleConfig::Tractor {
                brand: "Fendt".to_string(),
                model: "724".to_string(),
                max_fuel: 400.0,
                hitch: Position::new(-8.0, 0.0),
            },
            VehicleConfig::Harvester {
                brand: "Claas".to_string(),
                model: "Lexion".to_string(),
                max_fuel: 600.0,
                working_width: 20.0,
                capacity: 12.0,
                header_offset: 10.0,
            },
            VehicleConfig::Tractor {
                brand: "John Deere".to_string(),
                model: "8R".to_string(),
                max_fuel: 500.0,
                hitch: Position::new(-9.0, 0.0),
            },
        ],
        implements: vec![
            ImplementConfig {
                tool_type: ToolType::Cultivator,
                brand: "Horsch".to_string(),
                model: "Tiger".to_string(),
                working_width: 16.0,
                capacity: 0.0,
                hitch_length: 6.0,
            },
            ImplementConfig {
                tool_type: ToolType::Trailer,
                brand: "Bergmann".to_string(),
                model: "GTW".to_string(),
                working_width: 0.0,
                capacity: 30.0,
                hitch_length: 8.0,
            },
            ImplementConfig {
                tool_type: ToolType::Seeder,
                brand: "Amazone".to_string(),
                model: "Cirrus".to_string(),
                working_width: 14.0,
                capacity: 40.0,
                hitch_length: 6.0,
            },
        ],
    };
    (map, equipment)
}
